//! # RDT (Reliable Data Transfer)
//!
//! 바이트 스트림 위 애플리케이션 계층 신뢰성 전송 프로토콜
//!
//! ## 핵심 특징
//! - **두 가지 ARQ 방식**: Go-Back-N / Selective Repeat, 연결마다 핸드쉐이크로 결정
//! - **체크섬 검증**: 손상된 패킷은 NACK 후 폐기
//! - **타이머 재전송**: 패킷별 타이머, 재전송 한도 초과 시 세션 실패
//! - **슬라이딩 윈도우**: 윈도우가 가득 차면 내부 큐로 백프레셔
//! - **암호화 (선택)**: X25519 키 교환 + ChaCha20-Poly1305

pub mod checksum;
pub mod chunk;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod fault;
pub mod framing;
pub mod handshake;
pub mod message;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod sequence;
pub mod session;
pub mod stats;
pub mod timer;

pub use chunk::{split_message, Reassembler};
pub use config::{Config, OperationMode, SessionParams};
pub use crypto::{CryptoError, EphemeralKeyPair, MessageCipher, Role};
pub use engine::{ArqEngine, EngineEvent, SessionState};
pub use error::{Error, Result};
pub use fault::{CorruptionKind, FaultConfig, FaultInjector};
pub use handshake::Negotiated;
pub use message::{Metadata, MessageType, ProtocolMessage};
pub use packet::{ErrorCode, Packet, PacketKind, PacketMetadata};
pub use receiver::{Delivered, ReceiveBuffer, ReceiveOutcome};
pub use sender::SendWindow;
pub use sequence::SeqNum;
pub use session::{Session, SessionEvent, SessionHandle};
pub use stats::TransportStats;
pub use timer::{Expiry, Timer};

/// 시퀀스 번호 공간 크기 (0..1000 순환)
pub const SEQUENCE_MODULUS: u16 = 1000;

/// 기본 청크 크기 (문자 단위)
pub const DEFAULT_CHUNK_SIZE: usize = 4;

/// 최소 메시지 크기 (문자)
pub const MIN_MESSAGE_SIZE: usize = 30;

/// 기본 최대 메시지 크기 (문자)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100;

/// 윈도우 크기 범위
pub const MIN_WINDOW_SIZE: usize = 1;
pub const MAX_WINDOW_SIZE: usize = 5;
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// 기본 재전송 타임아웃 (밀리초)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// 기본 최대 재전송 횟수
pub const DEFAULT_MAX_RETRANSMITS: u32 = 3;
