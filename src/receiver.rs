//! 수신자
//!
//! - 체크섬 검증 후 시퀀스 번호와 이전 checksum 체인이 모두 맞을 때만 수락
//! - 수락한 페이로드는 즉시 출력 싱크로 기록
//! - 실패하면 마지막 ACK를 그대로 재전송 (암묵적 NACK)
//! - 적응형 타임아웃: 손실이 이어지면 두 배로, 수신이 재개되면 절반으로.
//!   상한을 넘으면 전송 종료로 간주하고 루프를 끝낸다.
//!
//! 상태 전이는 I/O 없는 [`ReceiverSession`]에 있고, [`Receiver`]는 채널/싱크/타이머만 다룬다.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::digest::Digest;
use crate::error::PacketError;
use crate::packet::{AckPacket, DataPacket, SeqNum, Transmission};
use crate::stats::TransferStats;
use crate::{Config, Result};

/// 수신 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// 아직 아무 패킷도 수락하지 않음
    AwaitingFirstPacket,

    /// 세션 진행 중
    InSession { expected_seq: SeqNum },

    /// 타임아웃 상한 초과로 종료
    Terminated,
}

/// 패킷 거부 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// 체크섬 불일치 또는 잘린 프레임
    Corrupt(PacketError),

    /// 시퀀스 번호 불일치 (중복 포함)
    OutOfSequence { expected: SeqNum, got: SeqNum },

    /// 직전 패킷이 통째로 유실되어 checksum 체인이 끊김
    BrokenChain { expected: Digest, got: Digest },

    /// 이미 종료된 세션
    Terminated,
}

/// 데이터그램 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// 수락: 페이로드를 출력하고 새 ACK를 보낸다
    Accept { payload: Bytes, ack: Bytes },

    /// 거부: 캐시된 마지막 ACK를 그대로 다시 보낸다
    Reject { reason: RejectReason, ack: Bytes },
}

impl Verdict {
    pub fn reply(&self) -> Transmission {
        match self {
            Verdict::Accept { ack, .. } => Transmission::Fresh(ack.clone()),
            Verdict::Reject { ack, .. } => Transmission::Resend(ack.clone()),
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept { .. })
    }
}

/// 타임아웃 처리 후 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// 연속 타임아웃 횟수만 증가
    Waiting,

    /// 타임아웃을 두 배로 늘림
    BackedOff(Duration),

    /// 상한 초과: 전송 종료
    Exhausted,
}

/// 타임아웃 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Silence {
    pub ack: Bytes,
    pub outcome: TimeoutOutcome,
}

impl Silence {
    pub fn reply(&self) -> Transmission {
        Transmission::Resend(self.ack.clone())
    }
}

/// 수신 세션 상태 (수신 루프 한 번의 수명)
#[derive(Debug)]
pub struct ReceiverSession {
    state: ReceiverState,

    /// 마지막으로 수락한 패킷의 checksum (처음엔 ZERO)
    expected_prev_checksum: Digest,

    /// 실패 시 그대로 재전송할 마지막 ACK 프레임
    last_ack: Bytes,

    current_timeout: Duration,
    consecutive_timeouts: u32,

    low_water: Duration,
    ceiling: Duration,
    timeouts_before_backoff: u32,

    backoffs: u64,
    halvings: u64,
}

impl ReceiverSession {
    pub fn new(config: &Config) -> Self {
        Self {
            state: ReceiverState::AwaitingFirstPacket,
            expected_prev_checksum: Digest::ZERO,
            last_ack: AckPacket::placeholder(),
            current_timeout: config.initial_timeout(),
            consecutive_timeouts: 0,
            low_water: config.timeout_low_water(),
            ceiling: config.timeout_ceiling(),
            timeouts_before_backoff: config.timeouts_before_backoff.max(1),
            backoffs: 0,
            halvings: 0,
        }
    }

    /// 수신한 데이터그램 하나 처리
    pub fn on_datagram(&mut self, datagram: &[u8]) -> Verdict {
        // 손실 구간이 끝났으면 다시 민감하게
        if self.current_timeout > self.low_water {
            self.current_timeout /= 2;
            self.consecutive_timeouts = 0;
            self.halvings += 1;
        }

        let packet = match DataPacket::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => return self.reject(RejectReason::Corrupt(e)),
        };

        match self.state {
            ReceiverState::Terminated => return self.reject(RejectReason::Terminated),
            ReceiverState::InSession { expected_seq } if packet.seq != expected_seq => {
                return self.reject(RejectReason::OutOfSequence {
                    expected: expected_seq,
                    got: packet.seq,
                });
            }
            _ => {}
        }

        if packet.prev_checksum != self.expected_prev_checksum {
            return self.reject(RejectReason::BrokenChain {
                expected: self.expected_prev_checksum,
                got: packet.prev_checksum,
            });
        }

        let next = packet.seq.next();
        self.state = ReceiverState::InSession { expected_seq: next };
        self.expected_prev_checksum = packet.checksum;
        self.last_ack = AckPacket::new(next).encode();

        Verdict::Accept {
            payload: packet.payload,
            ack: self.last_ack.clone(),
        }
    }

    /// 수신 대기 타임아웃 처리
    pub fn on_timeout(&mut self) -> Silence {
        let ack = self.last_ack.clone();

        self.consecutive_timeouts += 1;
        if self.consecutive_timeouts < self.timeouts_before_backoff {
            return Silence {
                ack,
                outcome: TimeoutOutcome::Waiting,
            };
        }

        self.consecutive_timeouts = 0;
        self.current_timeout *= 2;
        self.backoffs += 1;

        let outcome = if self.current_timeout > self.ceiling {
            self.state = ReceiverState::Terminated;
            TimeoutOutcome::Exhausted
        } else {
            TimeoutOutcome::BackedOff(self.current_timeout)
        };

        Silence { ack, outcome }
    }

    fn reject(&self, reason: RejectReason) -> Verdict {
        Verdict::Reject {
            reason,
            ack: self.last_ack.clone(),
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ReceiverState::Terminated
    }

    pub fn current_timeout(&self) -> Duration {
        self.current_timeout
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    pub fn backoffs(&self) -> u64 {
        self.backoffs
    }

    pub fn halvings(&self) -> u64 {
        self.halvings
    }
}

/// 수신자
pub struct Receiver<C, W> {
    channel: C,
    sink: W,
    session: ReceiverSession,
    stats: TransferStats,
}

impl<C, W> Receiver<C, W>
where
    C: Channel,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(channel: C, sink: W, config: &Config) -> Self {
        Self {
            channel,
            sink,
            session: ReceiverSession::new(config),
            stats: TransferStats::new(),
        }
    }

    /// 세션 하나를 끝까지 수신
    ///
    /// 타임아웃이 상한을 넘으면 정상 종료로 반환한다.
    /// 에러는 채널이나 출력 싱크의 I/O 실패일 때만 반환된다.
    pub async fn receive(&mut self) -> Result<TransferStats> {
        info!(
            "Receiving (initial timeout {:?})",
            self.session.current_timeout()
        );

        while !self.session.is_terminated() {
            let wait = self.session.current_timeout();

            match timeout(wait, self.channel.recv()).await {
                Ok(result) => {
                    let datagram = result?;
                    let verdict = self.session.on_datagram(&datagram);
                    self.record(&verdict);

                    if let Verdict::Accept { payload, .. } = &verdict {
                        self.sink.write_all(payload).await?;
                        self.sink.flush().await?;
                    }

                    self.transmit(&verdict.reply()).await?;
                }
                Err(_) => {
                    self.stats.timeouts += 1;
                    let silence = self.session.on_timeout();
                    self.transmit(&silence.reply()).await?;

                    match silence.outcome {
                        TimeoutOutcome::Waiting => {}
                        TimeoutOutcome::BackedOff(next) => {
                            debug!("수신 타임아웃 증가: {:?}", next);
                        }
                        TimeoutOutcome::Exhausted => {
                            info!(
                                "No data for {:?}, assuming end of transmission",
                                self.session.current_timeout()
                            );
                        }
                    }
                }
            }
        }

        self.stats.backoffs = self.session.backoffs();
        self.stats.halvings = self.session.halvings();
        info!("Receive complete: {}", self.stats.summary());
        Ok(self.stats.clone())
    }

    fn record(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Accept { payload, .. } => {
                self.stats.packets_accepted += 1;
                self.stats.payload_bytes += payload.len() as u64;
                debug!("패킷 수락: {} bytes", payload.len());
            }
            Verdict::Reject { reason, .. } => {
                match reason {
                    RejectReason::Corrupt(_) => self.stats.corrupt_packets += 1,
                    RejectReason::OutOfSequence { .. } | RejectReason::Terminated => {
                        self.stats.out_of_sequence += 1
                    }
                    RejectReason::BrokenChain { .. } => self.stats.broken_chain += 1,
                }
                debug!("패킷 거부: {:?}", reason);
            }
        }
    }

    async fn transmit(&mut self, transmission: &Transmission) -> Result<()> {
        self.channel.send(transmission.frame()).await?;
        self.stats.datagrams_sent += 1;
        if transmission.is_resend() {
            self.stats.retransmissions += 1;
        }
        Ok(())
    }

    pub fn into_sink(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 연속된 체인으로 묶인 패킷들
    fn chain(chunks: &[&[u8]]) -> Vec<DataPacket> {
        let mut prev = Digest::ZERO;
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let packet = DataPacket::new(
                    prev,
                    SeqNum::from_index(i as u64),
                    Bytes::copy_from_slice(chunk),
                );
                prev = packet.checksum;
                packet
            })
            .collect()
    }

    fn accepted_payload(verdict: Verdict) -> Bytes {
        match verdict {
            Verdict::Accept { payload, .. } => payload,
            other => panic!("expected accept, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_emitted_once() {
        let packets = chain(&[b"ABCD", b"EFGH"]);
        let mut session = ReceiverSession::new(&Config::default());
        let mut output = Vec::new();

        for packet in [&packets[0], &packets[0], &packets[1]] {
            if let Verdict::Accept { payload, .. } = session.on_datagram(&packet.encode()) {
                output.push(payload);
            }
        }

        assert_eq!(
            output,
            vec![Bytes::from_static(b"ABCD"), Bytes::from_static(b"EFGH")]
        );
        assert_eq!(
            session.state(),
            ReceiverState::InSession {
                expected_seq: SeqNum::new(2)
            }
        );
    }

    #[test]
    fn test_duplicate_resends_cached_ack() {
        let packets = chain(&[b"ABCD"]);
        let mut session = ReceiverSession::new(&Config::default());

        let first = session.on_datagram(&packets[0].encode());
        let first_ack = first.reply();
        assert!(!first_ack.is_resend());
        assert_eq!(
            AckPacket::decode(first_ack.frame()).unwrap().ack,
            SeqNum::new(1)
        );

        let dup = session.on_datagram(&packets[0].encode());
        assert_eq!(
            dup,
            Verdict::Reject {
                reason: RejectReason::OutOfSequence {
                    expected: SeqNum::new(1),
                    got: SeqNum::new(0)
                },
                ack: first_ack.frame().clone(),
            }
        );
        assert!(dup.reply().is_resend());
    }

    #[test]
    fn test_corrupt_packet_before_first_accept() {
        let packets = chain(&[b"ABCD"]);
        let mut session = ReceiverSession::new(&Config::default());

        let mut corrupted = packets[0].encode().to_vec();
        corrupted[10] ^= 0x40;
        let verdict = session.on_datagram(&corrupted);

        match verdict {
            Verdict::Reject {
                reason: RejectReason::Corrupt(_),
                ack,
            } => assert_eq!(ack, AckPacket::placeholder()),
            other => panic!("expected corrupt reject, got {:?}", other),
        }
        assert_eq!(session.state(), ReceiverState::AwaitingFirstPacket);

        // 손상이 상태를 바꾸지 않았으므로 원본은 여전히 수락
        assert!(session.on_datagram(&packets[0].encode()).is_accept());
    }

    #[test]
    fn test_lost_first_packet_breaks_chain() {
        let packets = chain(&[b"ABCD", b"EFGH"]);
        let mut session = ReceiverSession::new(&Config::default());

        // 첫 패킷이 통째로 유실되고 두 번째가 먼저 도착
        let verdict = session.on_datagram(&packets[1].encode());
        assert!(matches!(
            verdict,
            Verdict::Reject {
                reason: RejectReason::BrokenChain { .. },
                ..
            }
        ));
        assert_eq!(session.state(), ReceiverState::AwaitingFirstPacket);
    }

    #[test]
    fn test_gap_detected_across_wraparound() {
        let data: Vec<[u8; 1]> = (0..258u32).map(|i| [i as u8]).collect();
        let chunks: Vec<&[u8]> = data.iter().map(|d| d.as_slice()).collect();
        let packets = chain(&chunks);

        let mut session = ReceiverSession::new(&Config::default());
        assert!(session.on_datagram(&packets[0].encode()).is_accept());

        // 257번째 패킷은 seq가 1로 돌아와 기대 번호와 같지만 체인이 다르다
        assert_eq!(packets[257].seq, SeqNum::new(1));
        let verdict = session.on_datagram(&packets[257].encode());
        assert_eq!(
            verdict,
            Verdict::Reject {
                reason: RejectReason::BrokenChain {
                    expected: packets[0].checksum,
                    got: packets[256].checksum,
                },
                ack: AckPacket::new(SeqNum::new(1)).encode(),
            }
        );

        assert_eq!(
            accepted_payload(session.on_datagram(&packets[1].encode())).as_ref(),
            &[1u8]
        );
    }

    #[test]
    fn test_timeout_escalation_until_exhausted() {
        let mut session = ReceiverSession::new(&Config::default());
        let mut outcomes = Vec::new();

        while !session.is_terminated() {
            let silence = session.on_timeout();
            assert!(silence.reply().is_resend());
            outcomes.push(silence.outcome);
        }

        // 10ms -> 20ms -> ... -> 10240ms, 세 번마다 두 배
        assert_eq!(outcomes.len(), 30);
        assert_eq!(outcomes[0], TimeoutOutcome::Waiting);
        assert_eq!(
            outcomes[2],
            TimeoutOutcome::BackedOff(Duration::from_millis(20))
        );
        assert_eq!(
            outcomes[26],
            TimeoutOutcome::BackedOff(Duration::from_millis(5120))
        );
        assert_eq!(outcomes[29], TimeoutOutcome::Exhausted);
        assert_eq!(session.backoffs(), 10);
        assert_eq!(session.current_timeout(), Duration::from_millis(10240));
    }

    #[test]
    fn test_zero_initial_timeout_still_terminates() {
        let config = Config {
            initial_timeout_ms: 0,
            ..Config::default()
        };
        let mut session = ReceiverSession::new(&config);
        assert!(session.current_timeout() > Duration::ZERO);

        let mut timeouts = 0;
        while !session.is_terminated() && timeouts < 1000 {
            session.on_timeout();
            timeouts += 1;
        }

        // 1ms -> 16384ms: 14번 두 배
        assert!(session.is_terminated());
        assert_eq!(timeouts, 42);
        assert_eq!(session.backoffs(), 14);
    }

    #[test]
    fn test_datagram_after_termination_rejected() {
        let packets = chain(&[b"ABCD"]);
        let mut session = ReceiverSession::new(&Config::default());
        while !session.is_terminated() {
            session.on_timeout();
        }

        let verdict = session.on_datagram(&packets[0].encode());
        assert_eq!(
            verdict,
            Verdict::Reject {
                reason: RejectReason::Terminated,
                ack: AckPacket::placeholder(),
            }
        );
        assert!(verdict.reply().is_resend());
        assert_eq!(session.state(), ReceiverState::Terminated);
    }

    #[test]
    fn test_timeout_halves_after_recovery() {
        let mut session = ReceiverSession::new(&Config::default());
        for _ in 0..12 {
            session.on_timeout();
        }
        assert_eq!(session.current_timeout(), Duration::from_millis(160));

        session.on_timeout();
        assert_eq!(session.consecutive_timeouts(), 1);

        // 손상된 데이터그램이라도 도착 자체로 타임아웃은 줄어든다
        session.on_datagram(b"garbage");
        assert_eq!(session.current_timeout(), Duration::from_millis(80));
        assert_eq!(session.consecutive_timeouts(), 0);
        assert_eq!(session.halvings(), 1);

        // low-water(100ms) 이하에서는 그대로
        session.on_datagram(b"garbage");
        assert_eq!(session.current_timeout(), Duration::from_millis(80));
        assert_eq!(session.halvings(), 1);
    }

    #[test]
    fn test_counter_survives_success_below_low_water() {
        let packets = chain(&[b"A", b"B"]);
        let mut session = ReceiverSession::new(&Config::default());

        session.on_timeout();
        session.on_timeout();
        assert!(session.on_datagram(&packets[0].encode()).is_accept());
        assert_eq!(session.consecutive_timeouts(), 2);

        let silence = session.on_timeout();
        assert_eq!(
            silence.outcome,
            TimeoutOutcome::BackedOff(Duration::from_millis(20))
        );
        assert_eq!(silence.ack, AckPacket::new(SeqNum::new(1)).encode());
    }
}
