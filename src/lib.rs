//! # SAW (Stop-And-Wait)
//!
//! 손실/손상/중복이 있는 데이터그램 채널 위의 stop-and-wait ARQ
//!
//! ## 핵심 특징
//! - **한 번에 하나**: 패킷 하나를 보내고 ACK를 받아야 다음 패킷
//! - **CRC-32 무결성**: 손상된 패킷/ACK는 유실과 동일하게 처리
//! - **checksum 체인**: 각 패킷이 직전 패킷의 checksum을 실어 통째로 사라진 패킷을 감지
//! - **암묵적 NACK**: 실패하면 마지막 ACK를 그대로 재전송
//! - **적응형 타임아웃**: 수신측 타임아웃이 손실 시 두 배, 복구 시 절반
//! - **장애 주입**: 유실/손상/중복을 흉내내는 채널 래퍼

pub mod channel;
pub mod config;
pub mod digest;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod stats;

pub use channel::{Channel, MemoryChannel, UdpChannel};
pub use config::Config;
pub use digest::Digest;
pub use error::{Error, PacketError, Result};
pub use packet::{AckPacket, DataPacket, SeqNum, Transmission};
pub use receiver::{Receiver, ReceiverSession, ReceiverState};
pub use sender::{Sender, SenderSession};
pub use simulator::{FaultConfig, LossyChannel};
pub use stats::TransferStats;

/// 수신 버퍼 크기 (IPv4 UDP 데이터그램 최대값)
pub const MAX_DATAGRAM: usize = 65535;

/// UDP 페이로드 최대 크기 (65535 - IP 헤더 20 - UDP 헤더 8)
pub const MAX_UDP_PAYLOAD: usize = 65507;

/// 기본 데이터그램 크기 (바이트)
pub const DEFAULT_DATAGRAM_SIZE: usize = 1024;

/// 기본 세그먼트 크기 (데이터그램 - 헤더)
pub const DEFAULT_SEGMENT_SIZE: usize = DEFAULT_DATAGRAM_SIZE - packet::DATA_HEADER_LEN;

/// 기본 포트 (송신자 -> 수신자 방향)
pub const DEFAULT_DATA_PORT: u16 = 50005;

/// 기본 포트 (수신자 -> 송신자 방향)
pub const DEFAULT_ACK_PORT: u16 = 50006;
