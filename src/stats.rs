//! 전송 통계

use std::time::{Duration, Instant};

/// 엔드포인트별 전송 통계
///
/// 송신측과 수신측이 같은 구조체를 쓰며, 각자 해당하는 카운터만 증가시킨다.
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 채널로 보낸 총 데이터그램 수 (재전송 포함)
    pub datagrams_sent: u64,

    /// 캐시된 프레임 재전송 수
    pub retransmissions: u64,

    /// 수신 대기 타임아웃 수
    pub timeouts: u64,

    /// 송신측: 기대한 번호의 ACK
    pub acks_accepted: u64,

    /// 송신측: 번호가 맞지 않는 ACK
    pub stale_acks: u64,

    /// 송신측: 체크섬이 깨진 ACK
    pub corrupt_acks: u64,

    /// 수신측: 수락한 패킷 수
    pub packets_accepted: u64,

    /// 수신측: 체크섬이 깨진 패킷 수
    pub corrupt_packets: u64,

    /// 수신측: 시퀀스 번호가 맞지 않는 패킷 수 (중복 포함)
    pub out_of_sequence: u64,

    /// 수신측: 이전 checksum 체인이 끊긴 패킷 수
    pub broken_chain: u64,

    /// 송신측은 ACK 받은 바이트, 수신측은 출력한 바이트
    pub payload_bytes: u64,

    /// 타임아웃을 두 배로 늘린 횟수
    pub backoffs: u64,

    /// 타임아웃을 절반으로 줄인 횟수
    pub halvings: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            datagrams_sent: 0,
            retransmissions: 0,
            timeouts: 0,
            acks_accepted: 0,
            stale_acks: 0,
            corrupt_acks: 0,
            packets_accepted: 0,
            corrupt_packets: 0,
            out_of_sequence: 0,
            broken_chain: 0,
            payload_bytes: 0,
            backoffs: 0,
            halvings: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 데이터그램 중 재전송 비율
    pub fn retransmission_ratio(&self) -> f64 {
        if self.datagrams_sent == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.datagrams_sent as f64
    }

    /// 수신측이 거부한 패킷 총합
    pub fn rejected_packets(&self) -> u64 {
        self.corrupt_packets + self.out_of_sequence + self.broken_chain
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Bytes: {} | Sent: {} (retx {:.1}%) | Timeouts: {} | ACKs ok/stale/corrupt: {}/{}/{} | Packets ok/rejected: {}/{} | Backoffs: {}",
            self.elapsed().as_secs_f64(),
            self.payload_bytes,
            self.datagrams_sent,
            self.retransmission_ratio() * 100.0,
            self.timeouts,
            self.acks_accepted,
            self.stale_acks,
            self.corrupt_acks,
            self.packets_accepted,
            self.rejected_packets(),
            self.backoffs,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
