//! 에러 타입 정의

use thiserror::Error;

use crate::digest::Digest;

/// 프레임 해석 에러
///
/// 상태 머신은 이 에러를 실패로 올리지 않고 판정(verdict)으로 소비한다.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("프레임이 너무 짧음: {len} bytes (최소 {min} bytes)")]
    Truncated { len: usize, min: usize },

    #[error("프레임 길이 불일치: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("체크섬 불일치: expected {expected}, got {got}")]
    ChecksumMismatch { expected: Digest, got: Digest },
}

/// SAW 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("패킷 에러: {0}")]
    Packet(#[from] PacketError),

    #[error("설정 파일 파싱 에러: {0}")]
    Json(#[from] serde_json::Error),

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
