//! SAW 송신자
//!
//! 표준 입력(또는 파일) 전체를 읽어 stop-and-wait로 전송한 뒤 종료한다.
//!
//! 사용법:
//!   cargo run --release --bin saw-sender -- [OPTIONS] < data.bin
//!
//! 예시:
//!   # 로컬 수신자로 전송
//!   cargo run --release --bin saw-sender -- --input data.bin
//!
//!   # 10% 유실 + 5% 손상 시뮬레이션
//!   cargo run --release --bin saw-sender -- -i data.bin --loss 0.1 --corrupt 0.05 --seed 7

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use saw::{Channel, Config, FaultConfig, LossyChannel, Sender, UdpChannel};

#[derive(Debug, Parser)]
#[command(name = "saw-sender", about = "Stop-and-wait 송신자")]
struct Args {
    /// 수신자 호스트 (로컬은 같은 주소 체계의 모든 인터페이스에 바인딩)
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// ACK를 받을 로컬 포트
    #[arg(long, default_value_t = saw::DEFAULT_ACK_PORT)]
    inbound_port: u16,

    /// 데이터를 보낼 수신자 포트
    #[arg(long, default_value_t = saw::DEFAULT_DATA_PORT)]
    outbound_port: u16,

    /// 전송할 파일 (없으면 표준 입력)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON 설정 파일
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 패킷당 최대 페이로드 (바이트)
    #[arg(long)]
    segment_size: Option<usize>,

    /// ACK 대기 타임아웃 (밀리초)
    #[arg(long)]
    ack_timeout_ms: Option<u64>,

    /// 송신 데이터그램 유실 확률
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// 송신 데이터그램 손상 확률
    #[arg(long, default_value_t = 0.0)]
    corrupt: f64,

    /// 송신 데이터그램 중복 확률
    #[arg(long, default_value_t = 0.0)]
    duplicate: f64,

    /// n번째 송신 데이터그램마다 버림
    #[arg(long)]
    drop_every: Option<u64>,

    /// 장애 주입 RNG seed
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl Args {
    fn protocol_config(&self) -> saw::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        if let Some(size) = self.segment_size {
            config.max_segment_size = size;
        }
        if let Some(ms) = self.ack_timeout_ms {
            config.ack_timeout_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }

    fn faults(&self) -> FaultConfig {
        FaultConfig {
            loss_rate: self.loss,
            corrupt_rate: self.corrupt,
            duplicate_rate: self.duplicate,
            drop_every: self.drop_every,
            seed: self.seed,
        }
    }
}

/// 상대 주소와 같은 주소 체계의 와일드카드 주소
fn unspecified_like(host: IpAddr) -> IpAddr {
    match host {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = args.protocol_config()?;

    // 전송할 데이터 준비
    let data = match &args.input {
        Some(path) => {
            info!("Loading file: {:?}", path);
            tokio::fs::read(path).await?
        }
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            buf
        }
    };

    let inbound = SocketAddr::new(unspecified_like(args.host), args.inbound_port);
    let outbound = SocketAddr::new(args.host, args.outbound_port);
    let udp = UdpChannel::bind(inbound, outbound).await?;

    let faults = args.faults();
    let channel: Box<dyn Channel> = if faults.is_transparent() {
        Box::new(udp)
    } else {
        info!("Fault injection enabled: {:?}", faults);
        Box::new(LossyChannel::new(udp, faults))
    };

    info!("SAW Sender starting...");
    info!("Peer: {}", outbound);
    info!("Payload: {} bytes", data.len());

    let mut sender = Sender::new(channel, config);
    let stats = sender.send(data).await?;

    info!("=== 전송 완료 ===");
    info!("{}", stats.summary());

    Ok(())
}
