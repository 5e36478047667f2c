//! 프로토콜 설정

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::packet::DATA_HEADER_LEN;
use crate::{Error, Result, DEFAULT_SEGMENT_SIZE, MAX_UDP_PAYLOAD};

/// 세그먼트 최대 크기 상한 (UDP 페이로드 한계 - 헤더)
pub const MAX_SEGMENT_SIZE: usize = MAX_UDP_PAYLOAD - DATA_HEADER_LEN;

/// 대기 타임아웃 하한. 0이면 두 배로 늘려도 0이라 백오프가 끝나지 않는다
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// SAW 프로토콜 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 패킷당 최대 페이로드 크기 (바이트)
    pub max_segment_size: usize,

    /// 송신측 ACK 대기 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// 수신측 초기 수신 타임아웃 (밀리초)
    pub initial_timeout_ms: u64,

    /// 수신 성공 시 이 값보다 크면 타임아웃을 절반으로 줄임 (밀리초)
    pub timeout_low_water_ms: u64,

    /// 두 배로 늘린 타임아웃이 이 값을 넘으면 전송 종료로 간주 (밀리초)
    pub timeout_ceiling_ms: u64,

    /// 타임아웃을 두 배로 늘리기 전 연속 타임아웃 횟수
    pub timeouts_before_backoff: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_segment_size: DEFAULT_SEGMENT_SIZE,
            ack_timeout_ms: 100,         // 100ms
            initial_timeout_ms: 10,      // 10ms
            timeout_low_water_ms: 100,   // 100ms
            timeout_ceiling_ms: 10_000,  // 10초
            timeouts_before_backoff: 3,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON 파일에서 설정 로드 (빠진 필드는 기본값)
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.max_segment_size == 0 || self.max_segment_size > MAX_SEGMENT_SIZE {
            return Err(Error::InvalidConfig(format!(
                "max_segment_size는 1 ~ {} 사이여야 함: {}",
                MAX_SEGMENT_SIZE, self.max_segment_size
            )));
        }
        if self.ack_timeout_ms == 0 || self.initial_timeout_ms == 0 {
            return Err(Error::InvalidConfig("타임아웃은 0보다 커야 함".into()));
        }
        if self.timeout_ceiling_ms < self.initial_timeout_ms {
            return Err(Error::InvalidConfig(format!(
                "timeout_ceiling_ms({}) < initial_timeout_ms({})",
                self.timeout_ceiling_ms, self.initial_timeout_ms
            )));
        }
        if self.timeouts_before_backoff == 0 {
            return Err(Error::InvalidConfig(
                "timeouts_before_backoff는 1 이상이어야 함".into(),
            ));
        }
        Ok(())
    }

    /// 송신측 ACK 대기 시간 (최소 [`MIN_TIMEOUT`])
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms).max(MIN_TIMEOUT)
    }

    /// 수신측 초기 대기 시간 (최소 [`MIN_TIMEOUT`])
    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms).max(MIN_TIMEOUT)
    }

    pub fn timeout_low_water(&self) -> Duration {
        Duration::from_millis(self.timeout_low_water_ms)
    }

    pub fn timeout_ceiling(&self) -> Duration {
        Duration::from_millis(self.timeout_ceiling_ms)
    }

    /// 루프백/저지연 링크용 설정
    pub fn low_latency() -> Self {
        Self {
            max_segment_size: MAX_SEGMENT_SIZE,
            ack_timeout_ms: 20,
            initial_timeout_ms: 5,
            timeout_low_water_ms: 50,
            timeout_ceiling_ms: 5_000,
            timeouts_before_backoff: 3,
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            max_segment_size: 512,         // 작은 세그먼트
            ack_timeout_ms: 250,
            initial_timeout_ms: 20,
            timeout_low_water_ms: 200,
            timeout_ceiling_ms: 20_000,
            timeouts_before_backoff: 4,
        }
    }
}
