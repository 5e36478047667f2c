//! SAW 수신자
//!
//! 검증된 페이로드를 순서대로 표준 출력(또는 파일)에 기록한다.
//! 수신 타임아웃이 상한을 넘으면 전송이 끝난 것으로 보고 종료한다.
//!
//! 사용법:
//!   cargo run --release --bin saw-receiver -- [OPTIONS] > out.bin
//!
//! 예시:
//!   # 파일로 저장
//!   cargo run --release --bin saw-receiver -- --output out.bin
//!
//!   # ACK 방향에 결정적 유실 주입
//!   cargo run --release --bin saw-receiver -- -o out.bin --drop-every 3

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tokio::io::AsyncWrite;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use saw::{Channel, Config, FaultConfig, LossyChannel, Receiver, UdpChannel};

#[derive(Debug, Parser)]
#[command(name = "saw-receiver", about = "Stop-and-wait 수신자")]
struct Args {
    /// 송신자 호스트 (로컬은 같은 주소 체계의 모든 인터페이스에 바인딩)
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// 데이터를 받을 로컬 포트
    #[arg(long, default_value_t = saw::DEFAULT_DATA_PORT)]
    inbound_port: u16,

    /// ACK를 보낼 송신자 포트
    #[arg(long, default_value_t = saw::DEFAULT_ACK_PORT)]
    outbound_port: u16,

    /// 출력 파일 (없으면 표준 출력)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON 설정 파일
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 초기 수신 타임아웃 (밀리초)
    #[arg(long)]
    initial_timeout_ms: Option<u64>,

    /// 수신 타임아웃 상한 (밀리초)
    #[arg(long)]
    timeout_ceiling_ms: Option<u64>,

    /// 송신 ACK 유실 확률
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// 송신 ACK 손상 확률
    #[arg(long, default_value_t = 0.0)]
    corrupt: f64,

    /// 송신 ACK 중복 확률
    #[arg(long, default_value_t = 0.0)]
    duplicate: f64,

    /// n번째 송신 ACK마다 버림
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
        if let Some(ms) = self.initial_timeout_ms {
            config.initial_timeout_ms = ms;
        }
        if let Some(ms) = self.timeout_ceiling_ms {
            config.timeout_ceiling_ms = ms;
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
    // 로깅 설정 (stdout은 페이로드 전용)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = args.protocol_config()?;

    let sink: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => {
            info!("Writing to file: {:?}", path);
            Box::new(tokio::fs::File::create(path).await?)
        }
        None => Box::new(tokio::io::stdout()),
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

    info!("SAW Receiver starting...");
    info!("Listening on {}", inbound);
    info!(
        "Timeout: initial {}ms, ceiling {}ms",
        config.initial_timeout_ms, config.timeout_ceiling_ms
    );

    let mut receiver = Receiver::new(channel, sink, &config);
    let stats = receiver.receive().await?;

    info!("=== 수신 종료 ===");
    info!("{}", stats.summary());

    Ok(())
}
