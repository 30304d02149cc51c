//! 핸드쉐이크
//!
//! 1. 클라이언트 → `HANDSHAKE_REQ { max_message_size, operation_mode, encryption_enabled, public_key? }`
//! 2. 서버 검증 후 → `HANDSHAKE_RESP { accepted, window_size, operation_mode, public_key? }`
//!    또는 `accepted = false` + `error_message`
//!
//! 결과([`Negotiated`])는 세션 생성 시 한 번 고정되며 다시 협상하지 않는다.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::config::{Config, OperationMode, SessionParams};
use crate::crypto::{EphemeralKeyPair, MessageCipher, Role};
use crate::framing::{MessageReader, MessageWriter};
use crate::message::{MessageType, ProtocolMessage};
use crate::{Error, Result, MAX_WINDOW_SIZE, MIN_MESSAGE_SIZE, MIN_WINDOW_SIZE};

/// 협상 결과
#[derive(Debug)]
pub struct Negotiated {
    pub mode: OperationMode,
    pub window_size: usize,
    pub max_message_size: usize,
    pub cipher: Option<MessageCipher>,
}

impl Negotiated {
    /// 협상된 값으로 세션 파라미터 확정
    pub fn session_params(&self, config: &Config) -> SessionParams {
        SessionParams::from_config(config)
            .with_mode(self.mode)
            .with_window_size(self.window_size)
            .with_max_message_size(self.max_message_size)
    }
}

async fn read_with_timeout<R: AsyncRead + Unpin>(
    reader: &mut MessageReader<R>,
    config: &Config,
) -> Result<ProtocolMessage> {
    tokio::time::timeout(config.handshake_timeout(), reader.read_message())
        .await
        .map_err(|_| Error::HandshakeTimeout)??
        .ok_or(Error::ConnectionClosed)
}

/// 클라이언트측 핸드쉐이크
pub async fn client_handshake<R, W>(
    reader: &mut MessageReader<R>,
    writer: &mut MessageWriter<W>,
    config: &Config,
) -> Result<Negotiated>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let keypair = config.encryption_enabled.then(EphemeralKeyPair::generate);
    let request = ProtocolMessage::handshake_request(
        config.max_message_size,
        config.operation_mode,
        keypair.as_ref().map(|k| k.public_key_hex()),
    );
    writer.write_message(&request).await?;

    let response = read_with_timeout(reader, config).await?;
    if response.msg_type != MessageType::HandshakeResp {
        return Err(Error::ProtocolViolation(format!(
            "핸드쉐이크 응답이 아님: {:?}",
            response.msg_type
        )));
    }

    let metadata = response.metadata;
    if metadata.accepted != Some(true) {
        let reason = metadata
            .error_message
            .unwrap_or_else(|| "사유 없음".to_string());
        return Err(Error::HandshakeRejected(reason));
    }

    let window_size = response.window_size;
    if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&window_size) {
        return Err(Error::ProtocolViolation(format!(
            "잘못된 윈도우 크기: {}",
            window_size
        )));
    }
    let mode = metadata.operation_mode.unwrap_or(config.operation_mode);

    let cipher = match (keypair, metadata.public_key) {
        (Some(keypair), Some(peer)) => Some(keypair.into_cipher(&peer, Role::Initiator)?),
        (Some(_), None) => {
            return Err(Error::HandshakeRejected(
                "서버가 암호화를 수락하지 않음".into(),
            ))
        }
        (None, _) => None,
    };

    info!(
        "핸드쉐이크 완료: mode={} window={} encrypted={}",
        mode,
        window_size,
        cipher.is_some()
    );

    Ok(Negotiated {
        mode,
        window_size,
        max_message_size: config.max_message_size,
        cipher,
    })
}

/// 서버측 핸드쉐이크
pub async fn server_handshake<R, W>(
    reader: &mut MessageReader<R>,
    writer: &mut MessageWriter<W>,
    config: &Config,
) -> Result<Negotiated>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = match read_with_timeout(reader, config).await {
        Ok(request) => request,
        // 해석할 수 없는 요청에도 거부 응답은 보냄
        Err(e @ (Error::Serialization(_) | Error::ProtocolViolation(_))) => {
            return Err(reject(writer, format!("잘못된 핸드쉐이크 요청: {}", e)).await);
        }
        Err(e) => return Err(e),
    };
    if request.msg_type != MessageType::HandshakeReq {
        let reason = format!("핸드쉐이크 요청이 아님: {:?}", request.msg_type);
        return Err(reject(writer, reason).await);
    }

    let metadata = request.metadata;
    let max_message_size = metadata.max_message_size.unwrap_or(MIN_MESSAGE_SIZE);
    if max_message_size < config.min_message_size {
        let reason = format!(
            "max_message_size는 최소 {}자 이상이어야 함: {}",
            config.min_message_size, max_message_size
        );
        return Err(reject(writer, reason).await);
    }

    let mode = metadata.operation_mode.unwrap_or(config.operation_mode);

    let (cipher, public_key) = if metadata.encryption_enabled.unwrap_or(false) {
        let Some(peer) = metadata.public_key else {
            return Err(reject(writer, "암호화 요청에 공개키 없음".to_string()).await);
        };
        let keypair = EphemeralKeyPair::generate();
        let public_key = keypair.public_key_hex();
        match keypair.into_cipher(&peer, Role::Responder) {
            Ok(cipher) => (Some(cipher), Some(public_key)),
            Err(e) => return Err(reject(writer, format!("잘못된 공개키: {}", e)).await),
        }
    } else {
        (None, None)
    };

    writer
        .write_message(&ProtocolMessage::handshake_accept(
            config.window_size,
            mode,
            public_key,
        ))
        .await?;

    info!(
        "핸드쉐이크 수락: mode={} window={} max_message_size={} encrypted={}",
        mode,
        config.window_size,
        max_message_size,
        cipher.is_some()
    );

    Ok(Negotiated {
        mode,
        window_size: config.window_size,
        max_message_size,
        cipher,
    })
}

async fn reject<W: AsyncWrite + Unpin>(writer: &mut MessageWriter<W>, reason: String) -> Error {
    warn!("핸드쉐이크 거부: {}", reason);
    if let Err(e) = writer
        .write_message(&ProtocolMessage::handshake_reject(reason.clone()))
        .await
    {
        warn!("거부 응답 전송 실패: {}", e);
    }
    Error::HandshakeRejected(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    type Side = (
        MessageReader<tokio::io::ReadHalf<DuplexStream>>,
        MessageWriter<tokio::io::WriteHalf<DuplexStream>>,
    );

    fn pipe() -> (Side, Side) {
        let (a, b) = tokio::io::duplex(4096);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        (
            (MessageReader::new(ar), MessageWriter::new(aw)),
            (MessageReader::new(br), MessageWriter::new(bw)),
        )
    }

    #[tokio::test]
    async fn test_accepts_and_confirms_client_mode() {
        let ((mut cr, mut cw), (mut sr, mut sw)) = pipe();
        let client_config = Config::selective_repeat();
        let server_config = Config {
            window_size: 3,
            ..Config::default()
        };

        let (client, server) = tokio::join!(
            client_handshake(&mut cr, &mut cw, &client_config),
            server_handshake(&mut sr, &mut sw, &server_config),
        );
        let client = client.unwrap();
        let server = server.unwrap();

        assert_eq!(client.mode, OperationMode::SelectiveRepeat);
        assert_eq!(server.mode, OperationMode::SelectiveRepeat);
        assert_eq!(client.window_size, 3);
        assert_eq!(server.max_message_size, client_config.max_message_size);
        assert!(client.cipher.is_none() && server.cipher.is_none());
    }

    #[tokio::test]
    async fn test_rejects_small_max_message_size() {
        let ((mut cr, mut cw), (mut sr, mut sw)) = pipe();
        let client_config = Config {
            max_message_size: 20,
            ..Config::default()
        };

        let server_config = Config::default();
        let (client, server) = tokio::join!(
            client_handshake(&mut cr, &mut cw, &client_config),
            server_handshake(&mut sr, &mut sw, &server_config),
        );
        assert!(matches!(client, Err(Error::HandshakeRejected(_))));
        assert!(matches!(server, Err(Error::HandshakeRejected(_))));
    }

    #[tokio::test]
    async fn test_encrypted_handshake_yields_matching_ciphers() {
        let ((mut cr, mut cw), (mut sr, mut sw)) = pipe();
        let client_config = Config {
            encryption_enabled: true,
            ..Config::default()
        };

        let server_config = Config::default();
        let (client, server) = tokio::join!(
            client_handshake(&mut cr, &mut cw, &client_config),
            server_handshake(&mut sr, &mut sw, &server_config),
        );
        let mut client_cipher = client.unwrap().cipher.unwrap();
        let server_cipher = server.unwrap().cipher.unwrap();

        let encrypted = client_cipher.encrypt_message("olá servidor").unwrap();
        assert_eq!(server_cipher.decrypt_message(&encrypted).unwrap(), "olá servidor");
    }

    #[tokio::test]
    async fn test_unparseable_request_gets_rejection() {
        let ((mut cr, mut cw), (mut sr, mut sw)) = pipe();
        let raw = concat!(
            r#"{"type":"HANDSHAKE_REQ","sequence":0,"payload":"","checksum":0,"window_size":5,"#,
            r#""metadata":{"max_message_size":100,"operation_mode":"STOP_AND_WAIT"},"timestamp":0.0}"#,
            "\n"
        );
        cw.write_frame(bytes::Bytes::from_static(raw.as_bytes()))
            .await
            .unwrap();

        let server = server_handshake(&mut sr, &mut sw, &Config::default()).await;
        assert!(matches!(server, Err(Error::HandshakeRejected(_))));

        let response = tokio::time::timeout(Duration::from_secs(1), cr.read_message())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(response.msg_type, MessageType::HandshakeResp);
        assert_eq!(response.metadata.accepted, Some(false));
        assert!(response.metadata.error_message.is_some());
    }

    #[tokio::test]
    async fn test_missing_max_message_size_defaults_to_minimum() {
        let ((_cr, mut cw), (mut sr, mut sw)) = pipe();
        let mut request =
            ProtocolMessage::handshake_request(0, OperationMode::GoBackN, None);
        request.metadata.max_message_size = None;
        cw.write_message(&request).await.unwrap();

        let server = server_handshake(&mut sr, &mut sw, &Config::default())
            .await
            .unwrap();
        assert_eq!(server.max_message_size, MIN_MESSAGE_SIZE);
        assert_eq!(server.mode, OperationMode::GoBackN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_times_out_without_response() {
        let ((mut cr, mut cw), _server_side) = pipe();
        let config = Config {
            handshake_timeout_ms: 500,
            ..Config::default()
        };

        let started = tokio::time::Instant::now();
        let result = client_handshake(&mut cr, &mut cw, &config).await;
        assert!(matches!(result, Err(Error::HandshakeTimeout)));
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[test]
    fn test_session_params_use_negotiated_values() {
        let negotiated = Negotiated {
            mode: OperationMode::SelectiveRepeat,
            window_size: 2,
            max_message_size: 64,
            cipher: None,
        };
        let params = negotiated.session_params(&Config::default());
        assert_eq!(params.mode, OperationMode::SelectiveRepeat);
        assert_eq!(params.window_size, 2);
        assert_eq!(params.max_message_size, 64);
    }
}
