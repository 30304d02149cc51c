//! 에러 타입 정의

use thiserror::Error;

use crate::crypto::CryptoError;

/// RDT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("암호화 에러: {0}")]
    Crypto(#[from] CryptoError),

    #[error("윈도우 가득 참: window_size={window_size}")]
    WindowFull { window_size: usize },

    #[error("링크 복구 불가: sequence={sequence}, attempts={attempts}")]
    LinkUnrecoverable { sequence: u16, attempts: u32 },

    #[error("프로토콜 위반: {0}")]
    ProtocolViolation(String),

    #[error("프로토콜 위반 누적 초과: {count}회")]
    TooManyViolations { count: u32 },

    #[error("핸드쉐이크 거부: {0}")]
    HandshakeRejected(String),

    #[error("핸드쉐이크 타임아웃")]
    HandshakeTimeout,

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("메시지가 너무 짧음: {len}자 (최소 {min}자)")]
    MessageTooShort { len: usize, min: usize },

    #[error("메시지가 너무 김: {len}자 (최대 {max}자)")]
    MessageTooLong { len: usize, max: usize },

    #[error("세션 실패 상태")]
    SessionFailed,

    #[error("연결 종료")]
    ConnectionClosed,

    #[error("채널 에러")]
    ChannelError,
}

impl Error {
    /// 세션을 종료시키는 에러인지 여부
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::LinkUnrecoverable { .. }
                | Error::TooManyViolations { .. }
                | Error::SessionFailed
                | Error::ConnectionClosed
                | Error::Io(_)
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
