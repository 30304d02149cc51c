//! 핸드쉐이크부터 FINISH까지 세션 전체를 메모리 스트림 위에서 검증

use std::time::Duration;

use rdt::framing::{MessageReader, MessageWriter};
use rdt::handshake::{client_handshake, server_handshake};
use rdt::message::{MessageType, ProtocolMessage};
use rdt::{
    Config, ErrorCode, FaultConfig, FaultInjector, OperationMode, Packet, Session, SessionEvent,
    SessionHandle, SeqNum,
};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

type Reader = MessageReader<ReadHalf<DuplexStream>>;
type Writer = MessageWriter<WriteHalf<DuplexStream>>;

fn endpoint(stream: DuplexStream) -> (Reader, Writer) {
    let (r, w) = tokio::io::split(stream);
    (MessageReader::new(r), MessageWriter::new(w))
}

async fn collect_until_end(handle: &mut SessionHandle) -> (Vec<String>, Option<SessionEvent>) {
    let mut messages = Vec::new();
    let mut last = None;
    while let Some(event) = handle.next_event().await {
        match event {
            SessionEvent::Message(text) => messages.push(text),
            other => last = Some(other),
        }
    }
    (messages, last)
}

async fn run_pair(client_config: Config, server_config: Config, messages: Vec<String>) -> Vec<String> {
    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);

    let server = tokio::spawn(async move {
        let (mut reader, mut writer) = endpoint(server_stream);
        let negotiated = server_handshake(&mut reader, &mut writer, &server_config)
            .await
            .unwrap();
        let params = negotiated.session_params(&server_config);
        let mut handle = Session::spawn(reader, writer, params, negotiated.cipher, None);
        let (received, last) = collect_until_end(&mut handle).await;
        assert_eq!(last, Some(SessionEvent::Closed));
        received
    });

    let (mut reader, mut writer) = endpoint(client_stream);
    let negotiated = client_handshake(&mut reader, &mut writer, &client_config)
        .await
        .unwrap();
    assert_eq!(negotiated.mode, client_config.operation_mode);
    assert_eq!(negotiated.cipher.is_some(), client_config.encryption_enabled);

    let params = negotiated.session_params(&client_config);
    let fault = client_config
        .fault
        .is_active()
        .then(|| FaultInjector::new(client_config.fault.clone()));
    let mut handle = Session::spawn(reader, writer, params, negotiated.cipher, fault);

    for message in messages {
        handle.send(message).await.unwrap();
    }
    handle.finish().await.unwrap();

    let (_, last) = collect_until_end(&mut handle).await;
    assert_eq!(last, Some(SessionEvent::Closed));
    handle.join().await.unwrap();

    server.await.unwrap()
}

fn fast(mut config: Config) -> Config {
    config.timeout_ms = 50;
    config.max_retransmits = 12;
    config
}

fn messages() -> Vec<String> {
    vec![
        "Esta é uma mensagem de teste para o servidor.".to_string(),
        "Segunda mensagem, também com mais de trinta caracteres.".to_string(),
    ]
}

#[tokio::test]
async fn test_plain_session_delivers_messages() {
    let received = run_pair(fast(Config::default()), fast(Config::default()), messages()).await;
    assert_eq!(received, messages());
}

#[tokio::test]
async fn test_encrypted_selective_repeat_over_lossy_link() {
    let client = fast(Config {
        operation_mode: OperationMode::SelectiveRepeat,
        encryption_enabled: true,
        fault: FaultConfig::lossy(0.2, 42),
        ..Config::default()
    });
    let server = fast(Config {
        window_size: 3,
        ..Config::default()
    });

    let received = run_pair(client, server, messages()).await;
    assert_eq!(received, messages());
}

#[tokio::test]
async fn test_go_back_n_with_corruption() {
    let client = fast(Config {
        fault: FaultConfig {
            corruption_probability: 0.2,
            seed: Some(5),
            ..FaultConfig::default()
        },
        ..Config::default()
    });

    let received = run_pair(client, fast(Config::default()), messages()).await;
    assert_eq!(received, messages());
}

#[tokio::test]
async fn test_message_length_limits_checked_before_sending() {
    let (a, b) = tokio::io::duplex(4096);
    let (reader, writer) = endpoint(a);
    let _peer = b;

    let params = Config::default();
    let params = rdt::SessionParams::from_config(&params);
    let handle = Session::spawn(reader, writer, params, None, None);

    assert!(matches!(
        handle.send("curta").await,
        Err(rdt::Error::MessageTooShort { len: 5, min: 30 })
    ));
    assert!(matches!(
        handle.send("x".repeat(101)).await,
        Err(rdt::Error::MessageTooLong { len: 101, max: 100 })
    ));
}

/// 원시 피어가 잘못된 프레임을 섞어 보내도 세션은 계속 동작
#[tokio::test]
async fn test_protocol_violations_are_tolerated() {
    let (session_stream, peer_stream) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = endpoint(session_stream);
    let params = rdt::SessionParams::from_config(&Config::default());
    let mut handle = Session::spawn(reader, writer, params, None, None);

    let (mut peer_reader, mut peer_writer) = endpoint(peer_stream);

    peer_writer
        .write_frame(bytes::Bytes::from_static(b"not json at all\n"))
        .await
        .unwrap();

    let mut bad = ProtocolMessage::from_packet(&Packet::data(SeqNum::ZERO, "abcd", false), 5);
    bad.sequence = 1500;
    peer_writer.write_message(&bad).await.unwrap();

    let message = "Mensagem válida depois de lixo no fluxo.";
    let chunks = rdt::split_message(message, 4);
    let last = chunks.len() - 1;
    for (i, chunk) in chunks.into_iter().enumerate() {
        let packet = Packet::data(SeqNum::new(i as u16), chunk, i == last);
        peer_writer
            .write_message(&ProtocolMessage::from_packet(&packet, 5))
            .await
            .unwrap();
    }
    peer_writer.write_message(&ProtocolMessage::finish()).await.unwrap();

    let (received, last_event) = collect_until_end(&mut handle).await;
    assert_eq!(received, vec![message.to_string()]);
    assert_eq!(last_event, Some(SessionEvent::Closed));
    assert_eq!(handle.stats().protocol_violations, 2);

    // 범위 밖 시퀀스에는 ERROR(SEQUENCE_ERROR)로 응답
    let mut saw_sequence_error = false;
    let mut saw_finish = false;
    while let Ok(Ok(Some(record))) =
        tokio::time::timeout(Duration::from_secs(1), peer_reader.read_message()).await
    {
        match record.msg_type {
            MessageType::Error => {
                saw_sequence_error |= record.metadata.error_code == Some(ErrorCode::SequenceError)
            }
            MessageType::Finish => saw_finish = true,
            _ => {}
        }
    }
    assert!(saw_sequence_error);
    assert!(saw_finish);
}

/// 이벤트가 없어도 공유 통계는 처리마다 갱신
#[tokio::test]
async fn test_shared_stats_track_progress_mid_transfer() {
    let (session_stream, peer_stream) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = endpoint(session_stream);
    let params = rdt::SessionParams::from_config(&Config::default());
    let mut handle = Session::spawn(reader, writer, params, None, None);
    let shared = handle.shared_stats();

    let (_peer_reader, mut peer_writer) = endpoint(peer_stream);
    let packet = Packet::data(SeqNum::ZERO, "abcd", false);
    peer_writer
        .write_message(&ProtocolMessage::from_packet(&packet, 5))
        .await
        .unwrap();

    let updated = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if shared.read().packets_received == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(updated.is_ok());
    assert_eq!(shared.read().acks_sent, 1);
    assert_eq!(shared.read().messages_delivered, 0);

    // 메시지가 완성되지 않았으므로 이벤트 없음
    let no_event = tokio::time::timeout(Duration::from_millis(50), handle.next_event()).await;
    assert!(no_event.is_err());
}
