//! 무결성 코덱
//!
//! 데이터 패킷과 ACK 패킷 모두 같은 고정 길이 다이제스트(CRC-32)로 보호한다.
//! 패킷 필드는 위치 기반으로 잘리므로 길이는 프로토콜 상수다.

use std::fmt;

/// 다이제스트 길이 (바이트)
pub const DIGEST_LEN: usize = 4;

/// 고정 길이 다이제스트 토큰
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// "이전 패킷 없음" 센티널
    pub const ZERO: Digest = Digest([0u8; DIGEST_LEN]);

    /// 바이트열의 다이제스트
    pub fn of(bytes: &[u8]) -> Self {
        Self(crc32fast::hash(bytes).to_be_bytes())
    }

    /// 여러 조각을 이어 붙인 것의 다이제스트 (할당 없이)
    pub fn of_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = crc32fast::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().to_be_bytes())
    }

    /// 와이어에서 잘라낸 슬라이스로부터 생성
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; DIGEST_LEN] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

/// `bytes`의 다이제스트 계산
pub fn digest(bytes: &[u8]) -> Digest {
    Digest::of(bytes)
}

/// `digest(bytes) == token`
pub fn verify(bytes: &[u8], token: &Digest) -> bool {
    digest(bytes) == *token
}
