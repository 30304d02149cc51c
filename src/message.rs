//! 프로토콜 메시지 정의
//!
//! 바이트 스트림 위에서 주고받는 레코드. JSON 한 줄이 메시지 하나이며,
//! 없는 메타데이터 키는 직렬화하지 않는다.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::checksum;
use crate::config::OperationMode;
use crate::packet::{ErrorCode, Packet, PacketKind, PacketMetadata};
use crate::sequence::SeqNum;
use crate::{Error, Result};

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// 데이터 청크
    Data,

    /// 확인 응답
    Ack,

    /// 부정 응답 (손상/범위 초과)
    Nack,

    /// 연결 초기화 요청 (클라이언트 → 서버)
    HandshakeReq,

    /// 연결 초기화 응답
    HandshakeResp,

    /// 윈도우 크기 알림 (세션 중에는 무시)
    WindowUpdate,

    /// 오류 보고
    Error,

    /// 송신 종료
    Finish,
}

/// 메시지 부가 정보
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_mode: Option<OperationMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_enabled: Option<bool>,

    /// X25519 공개키 (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// 와이어 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,

    /// 검증 전 원시 값 (범위 검사는 [`ProtocolMessage::into_packet`])
    pub sequence: u64,

    #[serde(default)]
    pub payload: String,

    pub checksum: u32,

    #[serde(default)]
    pub window_size: usize,

    #[serde(default)]
    pub metadata: Metadata,

    /// UNIX epoch 기준 초
    #[serde(default)]
    pub timestamp: f64,
}

impl ProtocolMessage {
    /// 빈 제어 메시지
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            sequence: 0,
            payload: String::new(),
            checksum: checksum::compute(&[]),
            window_size: 0,
            metadata: Metadata::default(),
            timestamp: now(),
        }
    }

    /// 전송 패킷을 레코드로
    pub fn from_packet(packet: &Packet, window_size: usize) -> Self {
        let msg_type = match packet.kind() {
            PacketKind::Data => MessageType::Data,
            PacketKind::Ack => MessageType::Ack,
            PacketKind::Nack => MessageType::Nack,
        };
        let metadata = Metadata {
            is_final: (packet.kind() == PacketKind::Data).then_some(packet.is_final()),
            error_code: packet.error_code(),
            ..Metadata::default()
        };

        Self {
            msg_type,
            sequence: u64::from(packet.sequence().value()),
            payload: packet.payload().to_string(),
            checksum: packet.checksum(),
            window_size,
            metadata,
            timestamp: now(),
        }
    }

    pub fn handshake_request(
        max_message_size: usize,
        operation_mode: OperationMode,
        public_key: Option<String>,
    ) -> Self {
        let mut msg = Self::new(MessageType::HandshakeReq);
        msg.metadata = Metadata {
            max_message_size: Some(max_message_size),
            operation_mode: Some(operation_mode),
            encryption_enabled: Some(public_key.is_some()),
            public_key,
            ..Metadata::default()
        };
        msg
    }

    pub fn handshake_accept(
        window_size: usize,
        operation_mode: OperationMode,
        public_key: Option<String>,
    ) -> Self {
        let mut msg = Self::new(MessageType::HandshakeResp);
        msg.window_size = window_size;
        msg.metadata = Metadata {
            accepted: Some(true),
            operation_mode: Some(operation_mode),
            encryption_enabled: Some(public_key.is_some()),
            public_key,
            ..Metadata::default()
        };
        msg
    }

    pub fn handshake_reject(reason: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::HandshakeResp);
        msg.metadata = Metadata {
            accepted: Some(false),
            error_message: Some(reason.into()),
            ..Metadata::default()
        };
        msg
    }

    pub fn finish() -> Self {
        Self::new(MessageType::Finish)
    }

    pub fn error(error_code: ErrorCode, message: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::Error);
        msg.metadata = Metadata {
            error_code: Some(error_code),
            error_message: Some(message.into()),
            ..Metadata::default()
        };
        msg
    }

    pub fn window_update(window_size: usize) -> Self {
        let mut msg = Self::new(MessageType::WindowUpdate);
        msg.window_size = window_size;
        msg
    }

    /// 전송 패킷으로 변환
    ///
    /// DATA/ACK/NACK만 가능하고, 시퀀스가 범위를 벗어나면 프로토콜 위반.
    pub fn into_packet(self) -> Result<Packet> {
        let kind = match self.msg_type {
            MessageType::Data => PacketKind::Data,
            MessageType::Ack => PacketKind::Ack,
            MessageType::Nack => PacketKind::Nack,
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "전송 패킷이 아님: {:?}",
                    other
                )))
            }
        };
        let sequence = SeqNum::checked(self.sequence).ok_or_else(|| {
            Error::ProtocolViolation(format!("시퀀스 범위 초과: {}", self.sequence))
        })?;

        Ok(Packet::from_parts(
            sequence,
            self.payload,
            self.checksum,
            kind,
            PacketMetadata {
                is_final: self.metadata.is_final.unwrap_or(false),
                error_code: self.metadata.error_code,
            },
        ))
    }

    /// 줄 단위 프레임 (JSON + '\n')
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = serde_json::to_vec(self)?;
        buf.push(b'\n');
        Ok(Bytes::from(buf))
    }

    /// 프레임 하나 파싱 (끝의 개행은 있어도 없어도 됨)
    pub fn from_slice(line: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(line)?)
    }
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
