//! 패킷 프레이머
//!
//! 데이터 패킷과 ACK 패킷 두 가지 와이어 포맷만 존재한다.
//! 모든 필드는 고정 오프셋으로 잘린다 (D = [`DIGEST_LEN`]).
//!
//! ```text
//! DataPacket: [0:D) checksum | [D:2D) prev checksum | [2D] seq | [2D+1:] payload
//! AckPacket:  [0:D) checksum | [D] ack
//! ```
//!
//! 데이터 패킷의 checksum은 `[D:end)` 전체, ACK 패킷의 checksum은 `[D]` 한 바이트를 덮는다.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::digest::{Digest, DIGEST_LEN};
use crate::error::PacketError;

/// 와이어 상 시퀀스 번호 모듈러스 (1바이트 필드)
pub const SEQ_MODULUS: u16 = 256;

/// 데이터 패킷 헤더 길이: checksum + prev checksum + seq
pub const DATA_HEADER_LEN: usize = 2 * DIGEST_LEN + 1;

/// ACK 패킷 길이: checksum + ack
pub const ACK_LEN: usize = DIGEST_LEN + 1;

const OFF_PREV: usize = DIGEST_LEN;
const OFF_SEQ: usize = 2 * DIGEST_LEN;

/// 순환 시퀀스 번호
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct SeqNum(u8);

impl SeqNum {
    pub const ZERO: SeqNum = SeqNum(0);

    pub fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// 청크 인덱스 i 에 대응하는 시퀀스 번호 (i mod M)
    pub fn from_index(index: u64) -> Self {
        Self((index % SEQ_MODULUS as u64) as u8)
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 송신 프레임 태그
///
/// `Fresh`는 처음 보내는 프레임, `Resend`는 캐시된 프레임을 그대로 다시 보내는 것
/// (암묵적 NACK).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transmission {
    Fresh(Bytes),
    Resend(Bytes),
}

impl Transmission {
    pub fn frame(&self) -> &Bytes {
        match self {
            Transmission::Fresh(frame) | Transmission::Resend(frame) => frame,
        }
    }

    pub fn is_resend(&self) -> bool {
        matches!(self, Transmission::Resend(_))
    }
}

/// 데이터 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// `prev_checksum ++ seq ++ payload` 의 다이제스트
    pub checksum: Digest,

    /// 직전에 보낸 패킷의 checksum (첫 패킷은 [`Digest::ZERO`])
    pub prev_checksum: Digest,

    /// 시퀀스 번호
    pub seq: SeqNum,

    /// 페이로드
    pub payload: Bytes,
}

impl DataPacket {
    /// 새 패킷 생성 (checksum 계산 포함)
    pub fn new(prev_checksum: Digest, seq: SeqNum, payload: Bytes) -> Self {
        let checksum = Digest::of_parts(&[&prev_checksum.as_bytes()[..], &[seq.get()][..], &payload[..]]);
        Self {
            checksum,
            prev_checksum,
            seq,
            payload,
        }
    }

    /// 와이어 포맷으로 직렬화
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(DATA_HEADER_LEN + self.payload.len());
        buf.put_slice(self.checksum.as_bytes());
        buf.put_slice(self.prev_checksum.as_bytes());
        buf.put_u8(self.seq.get());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// 와이어 포맷에서 역직렬화 (checksum 검증 포함)
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < DATA_HEADER_LEN {
            return Err(PacketError::Truncated {
                len: buf.len(),
                min: DATA_HEADER_LEN,
            });
        }

        let (carried, body) = buf.split_at(DIGEST_LEN);
        let carried = Digest::from_slice(carried).ok_or(PacketError::Truncated {
            len: buf.len(),
            min: DATA_HEADER_LEN,
        })?;
        let computed = Digest::of(body);
        if computed != carried {
            return Err(PacketError::ChecksumMismatch {
                expected: carried,
                got: computed,
            });
        }

        let prev_checksum = Digest::from_slice(&buf[OFF_PREV..OFF_SEQ]).unwrap_or_default();

        Ok(Self {
            checksum: carried,
            prev_checksum,
            seq: SeqNum(buf[OFF_SEQ]),
            payload: Bytes::copy_from_slice(&buf[DATA_HEADER_LEN..]),
        })
    }
}

/// ACK 패킷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    /// ack 바이트의 다이제스트
    pub checksum: Digest,

    /// 수신측이 다음으로 기대하는 시퀀스 번호
    pub ack: SeqNum,
}

impl AckPacket {
    pub fn new(ack: SeqNum) -> Self {
        Self {
            checksum: Digest::of(&[ack.get()]),
            ack,
        }
    }

    /// 아직 아무것도 수락하지 않은 수신측이 보내는 프레임
    ///
    /// 전부 0이므로 checksum 검증을 통과하지 못하고, 송신측은 이를 손상된 ACK로 보고 재전송한다.
    pub fn placeholder() -> Bytes {
        Bytes::from_static(&[0u8; ACK_LEN])
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ACK_LEN);
        buf.put_slice(self.checksum.as_bytes());
        buf.put_u8(self.ack.get());
        buf.freeze()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < ACK_LEN {
            return Err(PacketError::Truncated {
                len: buf.len(),
                min: ACK_LEN,
            });
        }
        if buf.len() != ACK_LEN {
            return Err(PacketError::LengthMismatch {
                expected: ACK_LEN,
                got: buf.len(),
            });
        }

        let carried = Digest::from_slice(&buf[..DIGEST_LEN]).unwrap_or_default();
        let computed = Digest::of(&buf[DIGEST_LEN..]);
        if computed != carried {
            return Err(PacketError::ChecksumMismatch {
                expected: carried,
                got: computed,
            });
        }

        Ok(Self {
            checksum: carried,
            ack: SeqNum(buf[DIGEST_LEN]),
        })
    }
}
