//! RDT 클라이언트 - Reliable Data Transfer
//!
//! 서버와 핸드쉐이크 후 메시지를 보내고, 모두 확인되면 종료한다.
//! `--message`가 없으면 표준 입력의 각 줄을 메시지로 보낸다.
//!
//! 사용법:
//!   cargo run --release --bin rdt-client -- [OPTIONS]
//!
//! 예시:
//!   # Selective Repeat, 20% 손실
//!   cargo run --release --bin rdt-client -- --mode sr --loss 0.2 --seed 7 \
//!     -m "Esta é uma mensagem de teste com mais de trinta caracteres"
//!
//!   # 암호화 + 비트 반전 손상
//!   cargo run --release --bin rdt-client -- -e --corrupt 0.1 --error-type bit_flip

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rdt::framing::{MessageReader, MessageWriter};
use rdt::handshake::client_handshake;
use rdt::{
    Config, CorruptionKind, Error, FaultConfig, FaultInjector, OperationMode, Session,
    SessionEvent, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_RETRANSMITS, DEFAULT_TIMEOUT_MS,
};

#[derive(Parser, Debug)]
#[command(name = "rdt-client", version, about = "RDT 클라이언트 - Go-Back-N / Selective Repeat 신뢰성 전송")]
struct Args {
    /// 서버 주소
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    server: String,

    /// ARQ 모드 (GO_BACK_N | SELECTIVE_REPEAT, gbn | sr)
    #[arg(long, default_value = "GO_BACK_N")]
    mode: OperationMode,

    /// 암호화 활성화 (X25519 + ChaCha20-Poly1305)
    #[arg(short, long)]
    encrypt: bool,

    /// 최대 메시지 크기 (문자, 최소 30)
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    max_message_size: usize,

    /// 재전송 타임아웃 (밀리초)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// 패킷당 최대 재전송 횟수
    #[arg(long, default_value_t = DEFAULT_MAX_RETRANSMITS)]
    max_retransmits: u32,

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

    /// 보낼 메시지 (여러 번 지정 가능)
    #[arg(short, long)]
    message: Vec<String>,
}

impl Args {
    fn to_config(&self) -> Config {
        Config {
            operation_mode: self.mode,
            encryption_enabled: self.encrypt,
            max_message_size: self.max_message_size,
            timeout_ms: self.timeout_ms,
            max_retransmits: self.max_retransmits,
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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG, 기본 info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = args.to_config();
    config.validate()?;

    info!("RDT Client connecting to {}...", args.server);
    let stream = TcpStream::connect(&args.server).await?;
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();
    let mut reader = MessageReader::new(read_half);
    let mut writer = MessageWriter::new(write_half);

    let negotiated = client_handshake(&mut reader, &mut writer, &config).await?;
    let params = negotiated.session_params(&config);
    info!("Mode: {}, window: {}", params.mode, params.window_size);

    let fault = config
        .fault
        .is_active()
        .then(|| FaultInjector::new(config.fault.clone()));
    let mut handle = Session::spawn(reader, writer, params, negotiated.cipher, fault);

    let messages = if args.message.is_empty() {
        info!("표준 입력에서 메시지 읽는 중 (줄 단위, EOF로 종료)");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut messages = Vec::new();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim_end().to_string();
            if !line.is_empty() {
                messages.push(line);
            }
        }
        messages
    } else {
        args.message.clone()
    };

    for message in messages {
        match handle.send(message).await {
            Ok(()) => {}
            Err(e @ (Error::MessageTooShort { .. } | Error::MessageTooLong { .. })) => {
                warn!("메시지 건너뜀: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    handle.finish().await?;

    let mut failed = false;
    while let Some(event) = handle.next_event().await {
        match event {
            SessionEvent::Message(text) => println!("수신: {}", text),
            SessionEvent::Failed(reason) => {
                error!("전송 실패: {}", reason);
                failed = true;
            }
            SessionEvent::Closed => info!("모든 메시지 전달 완료"),
        }
    }
    handle.join().await?;

    println!("{}", handle.stats().summary());
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
