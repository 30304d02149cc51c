//! 프로토콜 설정

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fault::FaultConfig;
use crate::{
    Error, Result, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_RETRANSMITS,
    DEFAULT_TIMEOUT_MS, DEFAULT_WINDOW_SIZE, MAX_WINDOW_SIZE, MIN_MESSAGE_SIZE, MIN_WINDOW_SIZE,
};

/// ARQ 동작 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationMode {
    /// 누적 ACK, 손실 시 윈도우 전체 재전송
    GoBackN,
    /// 개별 ACK, 손실된 패킷만 재전송
    SelectiveRepeat,
}

impl OperationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMode::GoBackN => "GO_BACK_N",
            OperationMode::SelectiveRepeat => "SELECTIVE_REPEAT",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "GO_BACK_N" | "GBN" => Ok(OperationMode::GoBackN),
            "SELECTIVE_REPEAT" | "SR" => Ok(OperationMode::SelectiveRepeat),
            other => Err(Error::InvalidConfig(format!("알 수 없는 동작 모드: {}", other))),
        }
    }
}

/// RDT 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 슬라이딩 윈도우 크기 (1 ~ 5)
    pub window_size: usize,

    /// 요청할 ARQ 모드 (서버는 클라이언트 요청을 따름)
    pub operation_mode: OperationMode,

    /// 청크 크기 (문자 단위)
    pub chunk_size: usize,

    /// 재전송 타임아웃 (밀리초)
    pub timeout_ms: u64,

    /// 패킷당 최대 재전송 횟수
    pub max_retransmits: u32,

    /// 최소 메시지 크기 (문자)
    pub min_message_size: usize,

    /// 최대 메시지 크기 (문자)
    pub max_message_size: usize,

    /// 암호화 활성화 (선택)
    /// X25519 키 교환 + ChaCha20-Poly1305 사용
    pub encryption_enabled: bool,

    /// 핸드쉐이크 응답 대기 타임아웃 (밀리초)
    pub handshake_timeout_ms: u64,

    /// 세션 실패로 간주할 프로토콜 위반 횟수
    pub max_protocol_violations: u32,

    /// 손실/손상 시뮬레이션
    pub fault: FaultConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            operation_mode: OperationMode::GoBackN,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,       // 5초
            max_retransmits: DEFAULT_MAX_RETRANSMITS,
            min_message_size: MIN_MESSAGE_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            encryption_enabled: false,            // 암호화 비활성화 (기본)
            handshake_timeout_ms: 10_000,         // 10초
            max_protocol_violations: 16,
            fault: FaultConfig::default(),        // 시뮬레이션 없음
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 재전송 타임아웃
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 핸드쉐이크 타임아웃
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Selective Repeat 기본 설정
    pub fn selective_repeat() -> Self {
        Self {
            operation_mode: OperationMode::SelectiveRepeat,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            operation_mode: OperationMode::SelectiveRepeat,
            timeout_ms: 1500,
            max_retransmits: 8,
            max_protocol_violations: 64,
            ..Self::default()
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&self.window_size) {
            return Err(Error::InvalidConfig(format!(
                "window_size는 {}~{} 사이여야 함: {}",
                MIN_WINDOW_SIZE, MAX_WINDOW_SIZE, self.window_size
            )));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size는 0일 수 없음".into()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeout_ms는 0일 수 없음".into()));
        }
        if self.max_message_size < self.min_message_size {
            return Err(Error::InvalidConfig(format!(
                "max_message_size({}) < min_message_size({})",
                self.max_message_size, self.min_message_size
            )));
        }
        self.fault.validate()
    }
}

/// 세션 생성 시 고정되는 파라미터
///
/// 핸드쉐이크 이후 확정된 값으로 만들고, 세션 도중 바뀌지 않는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParams {
    pub mode: OperationMode,
    pub window_size: usize,
    pub chunk_size: usize,
    pub timeout: Duration,
    pub max_retransmits: u32,
    pub max_protocol_violations: u32,

    /// 애플리케이션 메시지 길이 제한 (평문 문자 수)
    pub min_message_size: usize,
    pub max_message_size: usize,
}

impl SessionParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.operation_mode,
            window_size: config.window_size,
            chunk_size: config.chunk_size,
            timeout: config.timeout(),
            max_retransmits: config.max_retransmits,
            max_protocol_violations: config.max_protocol_violations,
            min_message_size: config.min_message_size,
            max_message_size: config.max_message_size,
        }
    }

    pub fn with_mode(mut self, mode: OperationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retransmits(mut self, max_retransmits: u32) -> Self {
        self.max_retransmits = max_retransmits;
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }
}

impl Default for SessionParams {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
