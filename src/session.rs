//! 연결 세션
//!
//! 연결 하나당 태스크 세 개:
//! - 읽기 태스크: 프레임을 읽어 명령 채널로 전달
//! - 메인 태스크: 명령/타이머 만료를 하나씩 처리 (엔진 상태는 이 태스크만 소유)
//! - 쓰기 태스크: 인코딩된 프레임을 스트림에 기록
//!
//! 엔진을 건드리는 모든 입력이 메인 태스크 한 곳으로 모이므로 별도 락이 필요 없다.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionParams;
use crate::crypto::MessageCipher;
use crate::engine::{ArqEngine, EngineEvent};
use crate::fault::FaultInjector;
use crate::framing::{MessageReader, MessageWriter};
use crate::message::{MessageType, ProtocolMessage};
use crate::packet::ErrorCode;
use crate::stats::TransportStats;
use crate::timer::ExpiryReceiver;
use crate::{Error, Result};

/// 명령 채널 크기
const CMD_CHANNEL_SIZE: usize = 1000;

/// 쓰기 채널 크기
const FRAME_CHANNEL_SIZE: usize = 256;

/// 애플리케이션 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// 수신 완료된 메시지 (복호화 후)
    Message(String),
    /// 세션 실패
    Failed(String),
    /// 정상 종료
    Closed,
}

/// 내부 명령
enum SessionCmd {
    Frame(Bytes),
    Violation(String),
    PeerClosed,
    Send {
        message: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Finish,
}

/// 세션 내부 상태 (메인 태스크에서만 접근)
pub struct Session {
    engine: ArqEngine,
    cipher: Option<MessageCipher>,
    fault: Option<FaultInjector>,
    frame_tx: mpsc::Sender<Bytes>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    /// 세션 시작
    pub fn spawn<R, W>(
        reader: MessageReader<R>,
        writer: MessageWriter<W>,
        params: SessionParams,
        cipher: Option<MessageCipher>,
        fault: Option<FaultInjector>,
    ) -> SessionHandle
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<SessionCmd>(CMD_CHANNEL_SIZE);
        let (frame_tx, frame_rx) = mpsc::channel::<Bytes>(FRAME_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (expiry_tx, mut expiry_rx): (_, ExpiryReceiver) = mpsc::unbounded_channel();

        let stats = Arc::new(RwLock::new(TransportStats::new()));

        let read_task = tokio::spawn(read_loop(reader, cmd_tx.clone()));
        tokio::spawn(write_loop(writer, frame_rx));

        let mut session = Session {
            engine: ArqEngine::new(params, expiry_tx),
            cipher,
            fault,
            frame_tx,
            event_tx,
        };

        info!(
            "세션 시작: mode={} window={} timeout={:?}",
            params.mode, params.window_size, params.timeout
        );

        // 메인 처리 태스크
        let stats_main = stats.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(cmd) => session.handle_cmd(cmd),
                        None => session.engine.abort("명령 채널 닫힘"),
                    },
                    Some(expiry) = expiry_rx.recv() => {
                        let result = session.engine.handle_expiry(expiry);
                        log_result(result);
                    }
                }

                session.flush().await;
                *stats_main.write() = session.engine.stats().clone();

                if session.engine.state().is_terminal() {
                    break;
                }
            }

            read_task.abort();
            debug!("세션 태스크 종료: {:?}", session.engine.state());
        });

        SessionHandle {
            cmd_tx,
            event_rx,
            stats,
            params,
            task: Some(task),
        }
    }

    fn handle_cmd(&mut self, cmd: SessionCmd) {
        match cmd {
            SessionCmd::Frame(frame) => self.handle_frame(&frame),
            SessionCmd::Violation(reason) => log_result(self.engine.handle_violation(reason)),
            SessionCmd::PeerClosed => self.engine.abort("상대가 FINISH 없이 연결 종료"),
            SessionCmd::Send { message, reply } => {
                let result = self.send_message(&message);
                let _ = reply.send(result);
            }
            SessionCmd::Finish => self.engine.finish(),
        }
    }

    fn send_message(&mut self, message: &str) -> Result<()> {
        match &mut self.cipher {
            Some(cipher) => {
                let encrypted = cipher.encrypt_message(message)?;
                self.engine.send_message(&encrypted)
            }
            None => self.engine.send_message(message),
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let message = match ProtocolMessage::from_slice(frame) {
            Ok(message) => message,
            Err(e) => {
                log_result(self.engine.handle_violation(format!("파싱 불가 프레임: {}", e)));
                return;
            }
        };

        match message.msg_type {
            MessageType::Data | MessageType::Ack | MessageType::Nack => {
                let is_data = message.msg_type == MessageType::Data;
                match message.into_packet() {
                    Ok(packet) => log_result(self.engine.handle_packet(packet)),
                    Err(e) => {
                        if is_data {
                            self.queue_record(ProtocolMessage::error(
                                ErrorCode::SequenceError,
                                e.to_string(),
                            ));
                        }
                        log_result(self.engine.handle_violation(e.to_string()));
                    }
                }
            }
            MessageType::Finish => self.engine.peer_finished(),
            MessageType::WindowUpdate => {
                debug!("WINDOW_UPDATE 무시: {}", message.window_size);
            }
            MessageType::Error => {
                warn!(
                    "상대 오류 보고: {:?} {}",
                    message.metadata.error_code,
                    message.metadata.error_message.unwrap_or_default()
                );
            }
            MessageType::HandshakeReq | MessageType::HandshakeResp => {
                log_result(self.engine.handle_violation("세션 중 핸드쉐이크 메시지"));
            }
        }
    }

    /// 엔진 출력 큐 비우기
    async fn flush(&mut self) {
        let window_size = self.engine.params().window_size;

        while let Some(packet) = self.engine.poll_transmit() {
            let packet = match self.fault.as_mut() {
                Some(fault) => match fault.apply(packet) {
                    Some(packet) => packet,
                    None => continue,
                },
                None => packet,
            };
            self.send_record(ProtocolMessage::from_packet(&packet, window_size))
                .await;
        }

        if let Some(fault) = &self.fault {
            let stats = self.engine.stats_mut();
            stats.injected_drops = fault.dropped();
            stats.injected_corruptions = fault.corrupted();
        }

        while let Some(event) = self.engine.poll_event() {
            match event {
                EngineEvent::MessageDelivered(text) => {
                    let text = match &self.cipher {
                        Some(cipher) => match cipher.decrypt_message(&text) {
                            Ok(plaintext) => plaintext,
                            Err(e) => {
                                log_result(
                                    self.engine.handle_violation(format!("복호화 실패: {}", e)),
                                );
                                continue;
                            }
                        },
                        None => text,
                    };
                    info!("메시지 수신: {}", text);
                    let _ = self.event_tx.send(SessionEvent::Message(text));
                }
                EngineEvent::Failed { reason } => {
                    let _ = self.event_tx.send(SessionEvent::Failed(reason));
                }
                EngineEvent::Closed => {
                    self.send_record(ProtocolMessage::finish()).await;
                    let _ = self.event_tx.send(SessionEvent::Closed);
                }
            }
        }
    }

    /// 동기 경로에서 레코드 전송 (채널이 가득 차면 버림)
    fn queue_record(&self, record: ProtocolMessage) {
        match record.to_bytes() {
            Ok(frame) => {
                if self.frame_tx.try_send(frame).is_err() {
                    warn!("쓰기 채널 가득 참, 레코드 폐기");
                }
            }
            Err(e) => warn!("인코딩 실패: {}", e),
        }
    }

    async fn send_record(&self, record: ProtocolMessage) {
        match record.to_bytes() {
            Ok(frame) => {
                if self.frame_tx.send(frame).await.is_err() {
                    debug!("쓰기 태스크 종료됨, 레코드 폐기");
                }
            }
            Err(e) => warn!("인코딩 실패: {}", e),
        }
    }
}

fn log_result(result: Result<()>) {
    if let Err(e) = result {
        debug!("처리 오류: {}", e);
    }
}

async fn read_loop<R>(mut reader: MessageReader<R>, cmd_tx: mpsc::Sender<SessionCmd>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let cmd = match reader.read_frame().await {
            Ok(Some(frame)) => SessionCmd::Frame(frame),
            Ok(None) => {
                let _ = cmd_tx.send(SessionCmd::PeerClosed).await;
                break;
            }
            Err(Error::ProtocolViolation(reason)) => SessionCmd::Violation(reason),
            Err(e) => {
                warn!("수신 에러: {}", e);
                let _ = cmd_tx.send(SessionCmd::PeerClosed).await;
                break;
            }
        };
        if cmd_tx.send(cmd).await.is_err() {
            break;
        }
    }
}

async fn write_loop<W>(mut writer: MessageWriter<W>, mut frame_rx: mpsc::Receiver<Bytes>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frame_rx.recv().await {
        if let Err(e) = writer.write_frame(frame).await {
            warn!("송신 에러: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// 세션 핸들 (외부에서 제어용)
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCmd>,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    stats: Arc<RwLock<TransportStats>>,
    params: SessionParams,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// 메시지 송신 요청
    ///
    /// 길이 제한은 평문 문자 수 기준.
    pub async fn send(&self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        let len = message.chars().count();
        if len < self.params.min_message_size {
            return Err(Error::MessageTooShort {
                len,
                min: self.params.min_message_size,
            });
        }
        if len > self.params.max_message_size {
            return Err(Error::MessageTooLong {
                len,
                max: self.params.max_message_size,
            });
        }

        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCmd::Send { message, reply })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// 송신 종료 (남은 패킷이 모두 확인되면 FINISH)
    pub async fn finish(&self) -> Result<()> {
        self.cmd_tx
            .send(SessionCmd::Finish)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// 다음 애플리케이션 이벤트
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> TransportStats {
        self.stats.read().clone()
    }

    /// 메인 태스크가 매 처리마다 갱신하는 공유 통계
    pub fn shared_stats(&self) -> Arc<RwLock<TransportStats>> {
        self.stats.clone()
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    /// 세션 태스크가 끝났는지
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// 세션 태스크 종료 대기
    pub async fn join(&mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => task.await.map_err(|_| Error::ChannelError),
            None => Ok(()),
        }
    }
}
