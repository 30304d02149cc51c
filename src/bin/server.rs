//! RDT 서버 - Reliable Data Transfer
//!
//! 접속한 클라이언트마다 핸드쉐이크 후 세션 하나를 띄우고,
//! 재조립(복호화)된 메시지를 로그로 출력한다.
//!
//! 사용법:
//!   cargo run --release --bin rdt-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 실행
//!   cargo run --release --bin rdt-server -- --bind 0.0.0.0:9000
//!
//!   # ACK 20% 손실 시뮬레이션, 윈도우 3
//!   cargo run --release --bin rdt-server -- --window 3 --loss 0.2 --seed 42

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rdt::framing::{MessageReader, MessageWriter};
use rdt::handshake::server_handshake;
use rdt::{
    Config, CorruptionKind, FaultConfig, FaultInjector, OperationMode, Session, SessionEvent,
    TransportStats, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_RETRANSMITS, DEFAULT_TIMEOUT_MS,
    DEFAULT_WINDOW_SIZE,
};

/// 통계 출력 주기
const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "rdt-server", version, about = "RDT 서버 - Go-Back-N / Selective Repeat 신뢰성 전송")]
struct Args {
    /// 바인드 주소
    #[arg(short, long, default_value = "0.0.0.0:9000")]
    bind: SocketAddr,

    /// 윈도우 크기 (1~5)
    #[arg(short, long, default_value_t = DEFAULT_WINDOW_SIZE)]
    window: usize,

    /// 재전송 타임아웃 (밀리초)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// 패킷당 최대 재전송 횟수
    #[arg(long, default_value_t = DEFAULT_MAX_RETRANSMITS)]
    max_retransmits: u32,

    /// 서버측 최대 메시지 크기 (문자)
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    max_message_size: usize,

    /// 송신 패킷 손실 확률 (0.0~1.0)
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// 송신 패킷 손상 확률 (0.0~1.0)
    #[arg(long, default_value_t = 0.0)]
    corrupt: f64,

    /// 손상 방식 (random, bit_flip, character_change)
    #[arg(long, default_value = "random")]
    error_type: CorruptionKind,

    /// 시뮬레이션 시드
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn to_config(&self) -> Config {
        Config {
            window_size: self.window,
            timeout_ms: self.timeout_ms,
            max_retransmits: self.max_retransmits,
            max_message_size: self.max_message_size,
            fault: FaultConfig {
                loss_probability: self.loss,
                corruption_probability: self.corrupt,
                corruption: self.error_type,
                seed: self.seed,
            },
            ..Config::default()
        }
    }
}

/// 접속 중인 클라이언트 정보
#[derive(Debug, Clone)]
struct ConnectionInfo {
    connected_at: Instant,
    mode: OperationMode,
    window_size: usize,
    stats: Arc<RwLock<TransportStats>>,
}

type Registry = Arc<DashMap<SocketAddr, ConnectionInfo>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG, 기본 info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = args.to_config();
    config.validate()?;

    info!("RDT Server starting...");
    info!("Bind address: {}", args.bind);
    info!("Window size: {}", config.window_size);
    info!("Timeout: {}ms, max retransmits: {}", config.timeout_ms, config.max_retransmits);
    if config.fault.is_active() {
        info!(
            "Fault simulation: loss {:.1}%, corruption {:.1}% ({:?})",
            config.fault.loss_probability * 100.0,
            config.fault.corruption_probability * 100.0,
            config.fault.corruption
        );
    }

    let listener = TcpListener::bind(args.bind).await?;
    info!("Server listening on {}", args.bind);

    let registry: Registry = Arc::new(DashMap::new());

    // 주기적 통계 출력
    let registry_stats = registry.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            info!("Active connections: {}", registry_stats.len());
            for entry in registry_stats.iter() {
                info!(
                    "  [{}] {} window={} up {:.0}s | {}",
                    entry.key(),
                    entry.mode,
                    entry.window_size,
                    entry.connected_at.elapsed().as_secs_f64(),
                    entry.stats.read().summary()
                );
            }
        }
    });

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("Client connected: {}", addr);

        let config = config.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, addr, config, registry.clone()).await {
                warn!("[{}] 세션 오류: {}", addr, e);
            }
            registry.remove(&addr);
            info!("Client disconnected: {}", addr);
        });
    }
}

async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    config: Config,
    registry: Registry,
) -> rdt::Result<()> {
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();
    let mut reader = MessageReader::new(read_half);
    let mut writer = MessageWriter::new(write_half);

    let negotiated = server_handshake(&mut reader, &mut writer, &config).await?;
    let params = negotiated.session_params(&config);
    let fault = config
        .fault
        .is_active()
        .then(|| FaultInjector::new(config.fault.clone()));

    let mut handle = Session::spawn(reader, writer, params, negotiated.cipher, fault);

    registry.insert(
        addr,
        ConnectionInfo {
            connected_at: Instant::now(),
            mode: params.mode,
            window_size: params.window_size,
            stats: handle.shared_stats(),
        },
    );

    while let Some(event) = handle.next_event().await {
        match event {
            SessionEvent::Message(text) => {
                info!("[{}] 메시지 ({}자): {}", addr, text.chars().count(), text);
            }
            SessionEvent::Failed(reason) => warn!("[{}] 세션 실패: {}", addr, reason),
            SessionEvent::Closed => info!("[{}] 세션 정상 종료", addr),
        }
    }

    handle.join().await?;
    info!("[{}] {}", addr, handle.stats().summary());
    Ok(())
}
