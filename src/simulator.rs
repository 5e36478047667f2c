//! 채널 시뮬레이터
//!
//! 임의의 [`Channel`]을 감싸서 송신 시점에 장애를 주입한다.
//! - 결정적 유실: n번째 데이터그램마다 버림
//! - 확률적 유실 / 단일 비트 손상 / 중복
//!
//! 순서는 절대 바꾸지 않는다. 같은 seed는 같은 장애 패턴을 만든다.

use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::{Channel, RecvFuture, SendFuture};

/// 장애 모델 설정
///
/// 확률은 모두 `[0.0, 1.0]` 범위.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// 데이터그램이 조용히 사라질 확률
    pub loss_rate: f64,

    /// 데이터그램의 임의 비트 하나가 뒤집힐 확률
    pub corrupt_rate: f64,

    /// 데이터그램이 두 번 전달될 확률
    pub duplicate_rate: f64,

    /// n번째 데이터그램마다 결정적으로 버림 (`None`이면 비활성)
    pub drop_every: Option<u64>,

    /// RNG seed
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        // 기본값은 장애 없는 통과
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            duplicate_rate: 0.0,
            drop_every: None,
            seed: 0,
        }
    }
}

impl FaultConfig {
    /// 장애가 전혀 없는 설정인지
    pub fn is_transparent(&self) -> bool {
        self.loss_rate <= 0.0
            && self.corrupt_rate <= 0.0
            && self.duplicate_rate <= 0.0
            && self.drop_every.map_or(true, |n| n == 0)
    }
}

/// 주입된 장애 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub duplicated: u64,
}

struct FaultState {
    rng: StdRng,
    sent: u64,
    stats: FaultStats,
}

/// 송신 방향에 장애를 주입하는 채널 래퍼
pub struct LossyChannel<C> {
    inner: C,
    faults: FaultConfig,
    state: Mutex<FaultState>,
}

impl<C: Channel> LossyChannel<C> {
    pub fn new(inner: C, faults: FaultConfig) -> Self {
        let rng = StdRng::seed_from_u64(faults.seed);
        Self {
            inner,
            faults,
            state: Mutex::new(FaultState {
                rng,
                sent: 0,
                stats: FaultStats::default(),
            }),
        }
    }

    pub fn fault_stats(&self) -> FaultStats {
        self.state.lock().stats
    }

    /// 장애 모델 적용 결과: 실제로 내보낼 데이터그램들 (0, 1, 2개)
    fn apply_faults(&self, datagram: &[u8]) -> Vec<Bytes> {
        let mut state = self.state.lock();
        state.sent += 1;

        if let Some(n) = self.faults.drop_every.filter(|&n| n > 0) {
            if state.sent % n == 0 {
                debug!("Deterministically dropping datagram #{}", state.sent);
                state.stats.dropped += 1;
                return Vec::new();
            }
        }

        if state.rng.gen::<f64>() < self.faults.loss_rate {
            debug!("Datagram #{} lost in channel", state.sent);
            state.stats.dropped += 1;
            return Vec::new();
        }

        let mut bytes = datagram.to_vec();
        if !bytes.is_empty() && state.rng.gen::<f64>() < self.faults.corrupt_rate {
            let index = state.rng.gen_range(0..bytes.len());
            let bit = state.rng.gen_range(0..8u8);
            bytes[index] ^= 1 << bit;
            debug!("Datagram #{} corrupted at byte {}", state.sent, index);
            state.stats.corrupted += 1;
        }

        let bytes = Bytes::from(bytes);
        state.stats.forwarded += 1;

        if state.rng.gen::<f64>() < self.faults.duplicate_rate {
            debug!("Datagram #{} duplicated", state.sent);
            state.stats.duplicated += 1;
            return vec![bytes.clone(), bytes];
        }

        vec![bytes]
    }
}

impl<C: Channel> Channel for LossyChannel<C> {
    fn send<'a>(&'a self, datagram: &'a [u8]) -> SendFuture<'a> {
        let outgoing = self.apply_faults(datagram);
        Box::pin(async move {
            for bytes in outgoing {
                self.inner.send(&bytes).await?;
            }
            Ok(())
        })
    }

    fn recv(&self) -> RecvFuture<'_> {
        self.inner.recv()
    }
}
