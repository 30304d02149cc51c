//! ARQ 엔진
//!
//! 연결 하나의 신뢰성 전송 상태(송신 윈도우, 수신 버퍼, 재조립기)를 묶는다.
//! 모든 입력(애플리케이션 송신, 수신 패킷, 타이머 만료)은 `&mut self`로 한 번에
//! 하나씩 처리되며, 출력은 두 개의 큐로 나간다.
//!
//! - [`ArqEngine::poll_transmit`]: 네트워크로 내보낼 패킷
//! - [`ArqEngine::poll_event`]: 애플리케이션에 알릴 이벤트
//!
//! ```text
//! Established ─▶ Sending ⇄ Idle ─▶ Draining ─▶ Closed
//!      └──────────────┴──────────────┴────────▶ Failed
//! ```
//!
//! I/O는 하지 않으므로 세션 없이도 두 엔진을 직접 연결해 테스트할 수 있다.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::chunk::{split_message, Reassembler};
use crate::config::SessionParams;
use crate::packet::{Packet, PacketKind};
use crate::receiver::ReceiveBuffer;
use crate::sender::SendWindow;
use crate::stats::TransportStats;
use crate::timer::{Expiry, ExpirySender};
use crate::{Error, Result};

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 핸드쉐이크 직후, 아직 아무것도 보내지 않음
    Established,
    /// 보낼 청크나 미확인 패킷이 있음
    Sending,
    /// 송신할 것이 없음
    Idle,
    /// 종료 요청됨, 남은 패킷 확인 대기
    Draining,
    Closed,
    /// 복구 불가 (흡수 상태)
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// 애플리케이션 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// 재조립 완료된 메시지
    MessageDelivered(String),
    /// 세션 실패
    Failed { reason: String },
    /// 정상 종료
    Closed,
}

/// 청크 대기 큐 항목
#[derive(Debug)]
struct PendingChunk {
    payload: String,
    is_final: bool,
}

/// ARQ 엔진
#[derive(Debug)]
pub struct ArqEngine {
    params: SessionParams,
    state: SessionState,

    window: SendWindow,
    receive: ReceiveBuffer,
    reassembler: Reassembler,

    /// 윈도우가 가득 차 대기 중인 청크
    pending: VecDeque<PendingChunk>,

    outbox: VecDeque<Packet>,
    events: VecDeque<EngineEvent>,

    stats: TransportStats,
    violations: u32,
}

impl ArqEngine {
    pub fn new(params: SessionParams, expiry_tx: ExpirySender) -> Self {
        Self {
            window: SendWindow::new(&params, expiry_tx),
            receive: ReceiveBuffer::new(&params),
            reassembler: Reassembler::new(),
            params,
            state: SessionState::Established,
            pending: VecDeque::new(),
            outbox: VecDeque::new(),
            events: VecDeque::new(),
            stats: TransportStats::new(),
            violations: 0,
        }
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut TransportStats {
        &mut self.stats
    }

    /// 송신 윈도우
    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    /// 윈도우에 들어가지 못하고 대기 중인 청크 수
    pub fn queued_chunks(&self) -> usize {
        self.pending.len()
    }

    /// 보낼 청크도 미확인 패킷도 없음
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.window.is_empty()
    }

    /// 애플리케이션 메시지 송신
    ///
    /// 청크로 분할해 큐에 넣고 윈도우가 허용하는 만큼 바로 전송한다.
    pub fn send_message(&mut self, message: &str) -> Result<()> {
        match self.state {
            SessionState::Failed => return Err(Error::SessionFailed),
            SessionState::Closed | SessionState::Draining => return Err(Error::ConnectionClosed),
            _ => {}
        }
        if message.is_empty() {
            return Err(Error::MessageTooShort { len: 0, min: 1 });
        }

        let chunks = split_message(message, self.params.chunk_size);
        let last = chunks.len() - 1;
        self.pending
            .extend(chunks.into_iter().enumerate().map(|(i, payload)| PendingChunk {
                payload,
                is_final: i == last,
            }));
        self.stats.messages_sent += 1;
        self.state = SessionState::Sending;

        debug!(
            "메시지 큐 추가: {} chunks (queued {})",
            last + 1,
            self.pending.len()
        );
        self.pump()
    }

    /// 수신 패킷 처리
    pub fn handle_packet(&mut self, packet: Packet) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }

        debug!("RECV {}", packet);
        self.stats.record_received(&packet);

        match packet.kind() {
            PacketKind::Data => self.on_data(packet),
            PacketKind::Ack => {
                if self.window.on_ack(packet.sequence()) > 0 {
                    self.pump()?;
                    self.settle();
                }
                Ok(())
            }
            PacketKind::Nack => {
                let Some(code) = packet.error_code() else {
                    return self.handle_violation(format!(
                        "에러 코드 없는 NACK: Seq: {}",
                        packet.sequence()
                    ));
                };
                let result = self.window.on_nack(packet.sequence(), code);
                let retransmits = self.check(result)?;
                self.queue_retransmits(retransmits);
                // GBN NACK는 앞쪽 패킷을 확인하므로 빈 자리가 생길 수 있음
                self.pump()?;
                self.settle();
                Ok(())
            }
        }
    }

    /// 타이머 만료 처리
    pub fn handle_expiry(&mut self, expiry: Expiry) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }

        let result = self.window.on_timeout(&expiry);
        let retransmits = self.check(result)?;
        if !retransmits.is_empty() {
            warn!(
                "타임아웃 재전송: Seq: {} ({} packets)",
                expiry.sequence,
                retransmits.len()
            );
        }
        self.queue_retransmits(retransmits);
        Ok(())
    }

    /// 프로토콜 위반 기록 (파싱 불가 프레임, 범위 밖 시퀀스 등)
    ///
    /// 위반 횟수가 한도를 넘으면 세션을 실패시킨다.
    pub fn handle_violation(&mut self, reason: impl Into<String>) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }

        let reason = reason.into();
        self.violations += 1;
        self.stats.protocol_violations += 1;
        warn!("프로토콜 위반 ({}): {}", self.violations, reason);

        if self.violations > self.params.max_protocol_violations {
            let err = Error::TooManyViolations {
                count: self.violations,
            };
            self.fail(&err);
            return Err(err);
        }
        Ok(())
    }

    /// 로컬 종료 요청. 남은 패킷이 모두 확인되면 `Closed`.
    pub fn finish(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = SessionState::Draining;
        self.settle();
    }

    /// 상대가 FINISH를 보냄
    pub fn peer_finished(&mut self) {
        info!("상대 종료 수신");
        self.finish();
    }

    /// 세션을 실패 상태로
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        let reason = reason.into();
        warn!("세션 중단: {}", reason);
        self.enter_failed(reason);
    }

    pub fn poll_transmit(&mut self) -> Option<Packet> {
        self.outbox.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<EngineEvent> {
        self.events.pop_front()
    }

    fn on_data(&mut self, packet: Packet) -> Result<()> {
        let outcome = self.receive.on_packet(packet);
        self.stats.checksum_errors = self.receive.checksum_errors();
        self.stats.duplicate_packets = self.receive.duplicates();

        if let Some(reply) = outcome.reply {
            self.transmit(reply, false);
        }

        for chunk in outcome.delivered {
            if let Some(message) = self.reassembler.push(&chunk.payload, chunk.is_final) {
                info!(
                    "메시지 재조립 완료: {} chars (last Seq: {})",
                    message.chars().count(),
                    chunk.sequence
                );
                self.stats.record_delivery(message.len());
                self.events.push_back(EngineEvent::MessageDelivered(message));
            }
        }
        Ok(())
    }

    /// 윈도우가 허용하는 만큼 대기 청크 전송
    fn pump(&mut self) -> Result<()> {
        while self.window.can_send() {
            let Some(chunk) = self.pending.pop_front() else {
                break;
            };
            let packet = self.window.send(chunk.payload, chunk.is_final)?;
            self.transmit(packet, false);
        }
        Ok(())
    }

    /// 송신할 것이 없어졌을 때 상태 전이
    fn settle(&mut self) {
        if !self.is_drained() {
            return;
        }
        match self.state {
            SessionState::Sending => self.state = SessionState::Idle,
            SessionState::Draining => {
                info!("세션 종료: {}", self.stats.summary());
                self.window.clear();
                self.state = SessionState::Closed;
                self.events.push_back(EngineEvent::Closed);
            }
            _ => {}
        }
    }

    fn transmit(&mut self, packet: Packet, retransmission: bool) {
        debug!("SEND {}", packet);
        self.stats.record_sent(&packet, retransmission);
        self.outbox.push_back(packet);
    }

    fn queue_retransmits(&mut self, packets: Vec<Packet>) {
        for packet in packets {
            self.transmit(packet, true);
        }
    }

    /// 치명적 오류면 세션 실패 처리 후 그대로 전파
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                self.fail(err);
            }
        }
        result
    }

    fn fail(&mut self, err: &Error) {
        warn!("세션 실패: {}", err);
        self.enter_failed(err.to_string());
    }

    fn enter_failed(&mut self, reason: String) {
        self.window.clear();
        self.pending.clear();
        self.state = SessionState::Failed;
        self.events.push_back(EngineEvent::Failed { reason });
    }
}
