//! 송신자
//!
//! - 페이로드를 `max_segment_size` 단위로 분할
//! - 한 번에 하나의 패킷만 전송 (stop-and-wait)
//! - 타임아웃/손상 ACK/번호 불일치 ACK 모두 같은 프레임 재전송으로 처리
//!
//! 상태 전이는 I/O 없는 [`SenderSession`]에 있고, [`Sender`]는 채널과 타이머만 다룬다.

use bytes::Bytes;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::digest::Digest;
use crate::error::PacketError;
use crate::packet::{AckPacket, DataPacket, SeqNum, Transmission};
use crate::stats::TransferStats;
use crate::{Config, Result};

/// ACK 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckVerdict {
    /// 기대한 번호의 ACK. `finished`면 페이로드 전체가 확인됨
    Accepted { finished: bool },

    /// 유효하지만 번호가 다른 ACK (수신측이 아직 이 패킷을 수락하지 않음)
    Stale { expected: SeqNum, got: SeqNum },

    /// 체크섬이 깨진 ACK
    Corrupt(PacketError),

    /// 대기 중인 패킷이 없을 때 도착한 ACK
    Idle,
}

impl AckVerdict {
    /// 재전송이 필요한 판정인지
    pub fn needs_retransmit(&self) -> bool {
        matches!(self, AckVerdict::Stale { .. } | AckVerdict::Corrupt(_))
    }
}

/// 송신 세션 상태 (`send` 한 번의 수명)
#[derive(Debug)]
pub struct SenderSession {
    payload: Bytes,
    max_segment_size: usize,

    /// 다음에 만들 패킷의 시퀀스 번호
    next_seq: SeqNum,

    /// 다음 청크가 시작할 페이로드 오프셋
    offset: usize,

    /// 재전송용으로 보관하는 마지막 프레임
    last_frame: Option<Bytes>,

    /// 다음 패킷의 `prev_checksum`이 될 값
    last_sent_checksum: Digest,

    awaiting_ack: bool,

    /// 현재 패킷을 확인하는 ACK가 실어야 하는 번호
    expected_ack: SeqNum,

    /// 확인된 바이트 수
    acked_bytes: usize,

    finished: bool,
}

impl SenderSession {
    pub fn new(payload: Bytes, max_segment_size: usize) -> Self {
        Self {
            payload,
            max_segment_size: max_segment_size.max(1),
            next_seq: SeqNum::ZERO,
            offset: 0,
            last_frame: None,
            last_sent_checksum: Digest::ZERO,
            awaiting_ack: false,
            expected_ack: SeqNum::ZERO,
            acked_bytes: 0,
            finished: false,
        }
    }

    /// 다음에 보낼 프레임
    ///
    /// ACK 대기 중이면 보관한 프레임을 그대로 `Resend`, 아니면 다음 청크를 `Fresh`로 만든다.
    /// 전체가 확인되면 `None`.
    pub fn next_transmission(&mut self) -> Option<Transmission> {
        if self.finished {
            return None;
        }

        if self.awaiting_ack {
            return self.last_frame.clone().map(Transmission::Resend);
        }

        let end = (self.offset + self.max_segment_size).min(self.payload.len());
        let chunk = self.payload.slice(self.offset..end);
        let packet = DataPacket::new(self.last_sent_checksum, self.next_seq, chunk);

        // ACK 매칭용 번호는 전송 전에 미리 전진
        self.next_seq = self.next_seq.next();
        self.expected_ack = self.next_seq;
        self.last_sent_checksum = packet.checksum;
        self.offset = end;
        self.awaiting_ack = true;

        let frame = packet.encode();
        self.last_frame = Some(frame.clone());
        Some(Transmission::Fresh(frame))
    }

    /// 수신한 ACK 데이터그램 처리
    pub fn on_ack(&mut self, datagram: &[u8]) -> AckVerdict {
        if !self.awaiting_ack {
            return AckVerdict::Idle;
        }

        let ack = match AckPacket::decode(datagram) {
            Ok(ack) => ack,
            Err(e) => return AckVerdict::Corrupt(e),
        };

        if ack.ack != self.expected_ack {
            return AckVerdict::Stale {
                expected: self.expected_ack,
                got: ack.ack,
            };
        }

        self.awaiting_ack = false;
        self.acked_bytes = self.offset;
        if self.offset >= self.payload.len() {
            self.finished = true;
        }

        AckVerdict::Accepted {
            finished: self.finished,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn acked_bytes(&self) -> usize {
        self.acked_bytes
    }

    /// 현재 전송 중인 패킷의 시퀀스 번호
    pub fn in_flight_seq(&self) -> Option<SeqNum> {
        self.awaiting_ack
            .then(|| SeqNum::new(self.expected_ack.get().wrapping_sub(1)))
    }
}

/// 송신자
pub struct Sender<C> {
    channel: C,
    config: Config,
    stats: TransferStats,
}

impl<C: Channel> Sender<C> {
    pub fn new(channel: C, config: Config) -> Self {
        Self {
            channel,
            config,
            stats: TransferStats::new(),
        }
    }

    /// 페이로드 전체가 확인될 때까지 전송
    ///
    /// 재시도 횟수 제한은 없다. 링크가 영구히 끊기면 반환하지 않는다.
    /// 에러는 채널 I/O 실패일 때만 반환된다.
    pub async fn send(&mut self, payload: impl Into<Bytes>) -> Result<TransferStats> {
        let payload = payload.into();
        let total = payload.len();
        let ack_timeout = self.config.ack_timeout();

        self.stats = TransferStats::new();
        let mut session = SenderSession::new(payload, self.config.max_segment_size);

        info!(
            "Sending {} bytes (segment {} bytes, ack timeout {:?})",
            total, self.config.max_segment_size, ack_timeout
        );

        while let Some(transmission) = session.next_transmission() {
            if transmission.is_resend() {
                self.stats.retransmissions += 1;
            }
            self.channel.send(transmission.frame()).await?;
            self.stats.datagrams_sent += 1;

            let datagram = match timeout(ack_timeout, self.channel.recv()).await {
                Ok(result) => result?,
                Err(_) => {
                    self.stats.timeouts += 1;
                    debug!(
                        "ACK 타임아웃, 재전송: seq={:?}",
                        session.in_flight_seq()
                    );
                    continue;
                }
            };

            let verdict = session.on_ack(&datagram);
            match &verdict {
                AckVerdict::Accepted { finished } => {
                    self.stats.acks_accepted += 1;
                    self.stats.payload_bytes = session.acked_bytes() as u64;
                    debug!("ACK 수신: {}/{} bytes", session.acked_bytes(), total);
                    if *finished {
                        break;
                    }
                }
                AckVerdict::Stale { .. } => self.stats.stale_acks += 1,
                AckVerdict::Corrupt(_) => self.stats.corrupt_acks += 1,
                AckVerdict::Idle => {}
            }

            if verdict.needs_retransmit() {
                debug!(
                    "재전송: seq={:?}, {:?}",
                    session.in_flight_seq(),
                    verdict
                );
            }
        }

        info!("Transfer complete: {}", self.stats.summary());
        Ok(self.stats.clone())
    }

    pub fn into_channel(self) -> C {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack_frame(n: u8) -> Bytes {
        AckPacket::new(SeqNum::new(n)).encode()
    }

    #[test]
    fn test_two_segment_scenario() {
        let mut session = SenderSession::new(Bytes::from_static(b"ABCDEFGH"), 4);

        assert!(!session.awaiting_ack());
        let first = session.next_transmission().unwrap();
        assert!(!first.is_resend());
        assert!(session.awaiting_ack());
        assert_eq!(session.offset(), 4);
        assert_eq!(session.acked_bytes(), 0);
        let p0 = DataPacket::decode(first.frame()).unwrap();
        assert_eq!(p0.seq, SeqNum::new(0));
        assert_eq!(p0.prev_checksum, Digest::ZERO);
        assert_eq!(p0.payload.as_ref(), b"ABCD");

        assert_eq!(
            session.on_ack(&ack_frame(1)),
            AckVerdict::Accepted { finished: false }
        );

        let second = session.next_transmission().unwrap();
        let p1 = DataPacket::decode(second.frame()).unwrap();
        assert_eq!(p1.seq, SeqNum::new(1));
        assert_eq!(p1.prev_checksum, p0.checksum);
        assert_eq!(p1.payload.as_ref(), b"EFGH");

        assert_eq!(
            session.on_ack(&ack_frame(2)),
            AckVerdict::Accepted { finished: true }
        );
        assert!(session.is_finished());
        assert_eq!(session.acked_bytes(), 8);
        assert_eq!(session.next_transmission(), None);
    }

    #[test]
    fn test_stale_ack_resends_identical_frame() {
        let mut session = SenderSession::new(Bytes::from_static(b"ABCDEFGH"), 4);
        let first = session.next_transmission().unwrap();

        let verdict = session.on_ack(&ack_frame(0));
        assert_eq!(
            verdict,
            AckVerdict::Stale {
                expected: SeqNum::new(1),
                got: SeqNum::new(0)
            }
        );
        assert!(verdict.needs_retransmit());

        let again = session.next_transmission().unwrap();
        assert!(again.is_resend());
        assert_eq!(again.frame(), first.frame());
        assert_eq!(session.in_flight_seq(), Some(SeqNum::new(0)));
    }

    #[test]
    fn test_corrupt_ack_resends() {
        let mut session = SenderSession::new(Bytes::from_static(b"ABCD"), 4);
        let first = session.next_transmission().unwrap();

        assert!(matches!(
            session.on_ack(&AckPacket::placeholder()),
            AckVerdict::Corrupt(PacketError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            session.on_ack(&[1, 2]),
            AckVerdict::Corrupt(PacketError::Truncated { .. })
        ));

        let mut flipped = ack_frame(1).to_vec();
        flipped[0] ^= 0x01;
        assert!(matches!(session.on_ack(&flipped), AckVerdict::Corrupt(_)));

        assert_eq!(session.next_transmission(), Some(Transmission::Resend(first.frame().clone())));
    }

    #[test]
    fn test_empty_payload_sends_one_packet() {
        let mut session = SenderSession::new(Bytes::new(), 4);
        let only = session.next_transmission().unwrap();
        let packet = DataPacket::decode(only.frame()).unwrap();
        assert!(packet.payload.is_empty());

        assert_eq!(
            session.on_ack(&ack_frame(1)),
            AckVerdict::Accepted { finished: true }
        );
        assert_eq!(session.next_transmission(), None);
    }

    #[test]
    fn test_ack_when_idle_ignored() {
        let mut session = SenderSession::new(Bytes::from_static(b"AB"), 4);
        assert_eq!(session.on_ack(&ack_frame(1)), AckVerdict::Idle);
    }

    #[test]
    fn test_sequence_wraps_and_chain_continues() {
        let payload = Bytes::from(vec![7u8; 300]);
        let mut session = SenderSession::new(payload, 1);
        let mut prev = Digest::ZERO;

        for i in 0..300u64 {
            let tx = session.next_transmission().unwrap();
            let packet = DataPacket::decode(tx.frame()).unwrap();
            assert_eq!(packet.seq, SeqNum::from_index(i));
            assert_eq!(packet.prev_checksum, prev);
            prev = packet.checksum;

            let ack = SeqNum::from_index(i).next().get();
            assert!(matches!(
                session.on_ack(&ack_frame(ack)),
                AckVerdict::Accepted { .. }
            ));
        }
        assert!(session.is_finished());
    }
}
