//! 패킷 정의
//!
//! 패킷은 생성 후 불변. 체크섬은 생성 시 페이로드 위에서 계산되고,
//! 수신측은 페이로드를 쓰기 전에 [`Packet::verify`]로 검증한다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checksum;
use crate::sequence::SeqNum;

/// 패킷 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketKind {
    Data,
    Ack,
    Nack,
}

/// NACK 에러 코드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// 체크섬 불일치
    ChecksumError,
    /// 시퀀스 번호 이상
    SequenceError,
    /// 수신 윈도우 초과
    WindowOverflow,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ChecksumError => "CHECKSUM_ERROR",
            ErrorCode::SequenceError => "SEQUENCE_ERROR",
            ErrorCode::WindowOverflow => "WINDOW_OVERFLOW",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 패킷 부가 정보
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketMetadata {
    /// 메시지의 마지막 청크
    pub is_final: bool,

    /// NACK 사유
    pub error_code: Option<ErrorCode>,
}

/// 전송 단위 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    sequence: SeqNum,
    payload: String,
    checksum: u32,
    kind: PacketKind,
    metadata: PacketMetadata,
}

impl Packet {
    /// 데이터 패킷 생성 (체크섬 계산)
    pub fn data(sequence: SeqNum, payload: impl Into<String>, is_final: bool) -> Self {
        let payload = payload.into();
        let checksum = checksum::compute(payload.as_bytes());
        Self {
            sequence,
            payload,
            checksum,
            kind: PacketKind::Data,
            metadata: PacketMetadata {
                is_final,
                error_code: None,
            },
        }
    }

    /// ACK 생성
    pub fn ack(sequence: SeqNum) -> Self {
        Self::control(sequence, PacketKind::Ack, None)
    }

    /// NACK 생성
    pub fn nack(sequence: SeqNum, error_code: ErrorCode) -> Self {
        Self::control(sequence, PacketKind::Nack, Some(error_code))
    }

    fn control(sequence: SeqNum, kind: PacketKind, error_code: Option<ErrorCode>) -> Self {
        Self {
            sequence,
            payload: String::new(),
            checksum: checksum::compute(&[]),
            kind,
            metadata: PacketMetadata {
                is_final: false,
                error_code,
            },
        }
    }

    /// 수신한 필드 그대로 복원 (체크섬 재계산 안 함)
    pub fn from_parts(
        sequence: SeqNum,
        payload: String,
        checksum: u32,
        kind: PacketKind,
        metadata: PacketMetadata,
    ) -> Self {
        Self {
            sequence,
            payload,
            checksum,
            kind,
            metadata,
        }
    }

    pub fn sequence(&self) -> SeqNum {
        self.sequence
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn metadata(&self) -> &PacketMetadata {
        &self.metadata
    }

    pub fn is_final(&self) -> bool {
        self.metadata.is_final
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.metadata.error_code
    }

    /// 체크섬 검증
    pub fn verify(&self) -> bool {
        checksum::verify(self.payload.as_bytes(), self.checksum)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PacketKind::Data => write!(
                f,
                "DATA Seq: {} | Payload: '{}' | Checksum: {:08X}{}",
                self.sequence,
                self.payload,
                self.checksum,
                if self.metadata.is_final { " | FINAL" } else { "" }
            ),
            PacketKind::Ack => write!(f, "ACK Seq: {}", self.sequence),
            PacketKind::Nack => write!(
                f,
                "NACK Seq: {} | Error: {}",
                self.sequence,
                self.metadata
                    .error_code
                    .map(|c| c.as_str())
                    .unwrap_or("UNKNOWN")
            ),
        }
    }
}
