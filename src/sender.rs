//! 송신 윈도우 (송신측)
//!
//! - 전송했지만 아직 확인받지 못한 패킷 추적
//! - 패킷별 타이머, 재전송 횟수 관리
//! - 모드별 ACK/NACK/타임아웃 처리
//!
//! ```text
//!  base                next_seq
//!   │                     │
//!   [ 0 ][ 1 ][ 2 ][ 3 ]  ·   ← window_size = 5
//!     ↑ SR에서는 중간이 먼저 확인될 수 있음 (구멍)
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{OperationMode, SessionParams};
use crate::packet::{ErrorCode, Packet};
use crate::sequence::SeqNum;
use crate::timer::{Expiry, ExpirySender, Timer};
use crate::{Error, Result};

/// 윈도우 슬롯 (전송된 패킷 하나)
#[derive(Debug)]
struct Slot {
    packet: Packet,
    timer: Timer,
    retransmit_count: u32,
    acked: bool,
}

/// 송신 윈도우
#[derive(Debug)]
pub struct SendWindow {
    mode: OperationMode,
    window_size: usize,
    timeout: Duration,
    max_retransmits: u32,

    /// 가장 오래된 미확인 시퀀스
    base: SeqNum,

    /// 다음에 할당할 시퀀스
    next_seq: SeqNum,

    /// base부터 순서대로 (index = base와의 거리)
    slots: VecDeque<Slot>,

    /// Go-Back-N 윈도우 공용 재전송 카운터
    batch_retransmits: u32,

    expiry_tx: ExpirySender,
}

impl SendWindow {
    pub fn new(params: &SessionParams, expiry_tx: ExpirySender) -> Self {
        Self {
            mode: params.mode,
            window_size: params.window_size.max(1),
            timeout: params.timeout,
            max_retransmits: params.max_retransmits,
            base: SeqNum::ZERO,
            next_seq: SeqNum::ZERO,
            slots: VecDeque::with_capacity(params.window_size),
            batch_retransmits: 0,
            expiry_tx,
        }
    }

    /// 시작 시퀀스 지정 (아무것도 보내기 전에만 의미 있음)
    pub fn with_initial_sequence(mut self, seq: SeqNum) -> Self {
        if self.slots.is_empty() {
            self.base = seq;
            self.next_seq = seq;
        }
        self
    }

    /// 새 패킷을 보낼 수 있는지
    ///
    /// SR에서 확인된 구멍도 base가 지나갈 때까지 자리를 차지하므로
    /// 모든 시퀀스가 `[base, base + window_size)` 안에 머문다.
    pub fn can_send(&self) -> bool {
        self.slots.len() < self.window_size
    }

    /// 미확인 패킷 수
    pub fn outstanding(&self) -> usize {
        self.slots.iter().filter(|s| !s.acked).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn base(&self) -> SeqNum {
        self.base
    }

    pub fn next_seq(&self) -> SeqNum {
        self.next_seq
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// 아직 확인되지 않은 시퀀스인지
    pub fn is_outstanding(&self, seq: SeqNum) -> bool {
        self.slot_index(seq)
            .map(|i| !self.slots[i].acked)
            .unwrap_or(false)
    }

    /// 미확인 시퀀스 목록 (오름차순)
    pub fn outstanding_sequences(&self) -> Vec<SeqNum> {
        self.slots
            .iter()
            .filter(|s| !s.acked)
            .map(|s| s.packet.sequence())
            .collect()
    }

    /// 해당 슬롯의 재전송 횟수
    pub fn retransmit_count(&self, seq: SeqNum) -> Option<u32> {
        self.slot_index(seq).map(|i| self.slots[i].retransmit_count)
    }

    /// 패킷 전송 준비
    ///
    /// 시퀀스를 할당하고 타이머를 무장한 뒤, 실제로 내보낼 패킷을 반환한다.
    pub fn send(&mut self, payload: String, is_final: bool) -> Result<Packet> {
        if !self.can_send() {
            return Err(Error::WindowFull {
                window_size: self.window_size,
            });
        }

        let seq = self.next_seq;
        let packet = Packet::data(seq, payload, is_final);

        let mut timer = Timer::new(seq);
        timer.start(self.timeout, &self.expiry_tx);

        self.slots.push_back(Slot {
            packet: packet.clone(),
            timer,
            retransmit_count: 0,
            acked: false,
        });
        self.next_seq = seq.next();

        Ok(packet)
    }

    /// ACK 처리. 새로 확인된 패킷 수를 반환한다.
    ///
    /// - Go-Back-N: 누적 ACK, base부터 seq까지 모두 제거
    /// - Selective Repeat: 해당 슬롯만 확인, base 슬롯이 확인되면 연속 구간만큼 전진
    pub fn on_ack(&mut self, seq: SeqNum) -> usize {
        let Some(index) = self.slot_index(seq) else {
            // 중복 ACK 또는 범위 밖
            return 0;
        };

        match self.mode {
            OperationMode::GoBackN => self.retire_through(index),
            OperationMode::SelectiveRepeat => {
                let slot = &mut self.slots[index];
                if slot.acked {
                    return 0;
                }
                slot.acked = true;
                slot.timer.cancel();
                self.slide();
                1
            }
        }
    }

    /// NACK 처리. 재전송할 패킷을 반환한다.
    pub fn on_nack(&mut self, seq: SeqNum, error_code: ErrorCode) -> Result<Vec<Packet>> {
        if error_code != ErrorCode::ChecksumError {
            // 재전송으로 해결되지 않음, 타이머에 맡김
            warn!("NACK 무시: Seq: {} | Error: {}", seq, error_code);
            return Ok(Vec::new());
        }

        let Some(index) = self.slot_index(seq) else {
            return Ok(Vec::new());
        };

        match self.mode {
            OperationMode::GoBackN => {
                // NACK(k)는 k 이전이 모두 도착했다는 뜻
                if index > 0 {
                    self.retire_through(index - 1);
                }
                self.retransmit_from(0)
            }
            OperationMode::SelectiveRepeat => self.retransmit_one(index),
        }
    }

    /// 타이머 만료 처리
    ///
    /// 이미 확인된 패킷이나 이전 세대 타이머의 만료는 무시한다.
    pub fn on_timeout(&mut self, expiry: &Expiry) -> Result<Vec<Packet>> {
        let Some(index) = self.slot_index(expiry.sequence) else {
            debug!("지난 타이머 만료 무시: Seq: {}", expiry.sequence);
            return Ok(Vec::new());
        };

        let slot = &mut self.slots[index];
        if slot.acked || !slot.timer.accepts(expiry) {
            debug!("지난 타이머 만료 무시: Seq: {}", expiry.sequence);
            return Ok(Vec::new());
        }
        slot.timer.mark_fired();

        match self.mode {
            OperationMode::GoBackN => self.retransmit_from(0),
            OperationMode::SelectiveRepeat => self.retransmit_one(index),
        }
    }

    /// 모든 타이머 취소 및 윈도우 비우기
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.timer.cancel();
        }
        self.slots.clear();
        self.base = self.next_seq;
        self.batch_retransmits = 0;
    }

    fn slot_index(&self, seq: SeqNum) -> Option<usize> {
        let index = self.base.distance_to(seq);
        (index < self.slots.len()).then_some(index)
    }

    /// base부터 index까지 제거
    fn retire_through(&mut self, index: usize) -> usize {
        let count = index + 1;
        for mut slot in self.slots.drain(..count) {
            slot.timer.cancel();
        }
        self.base = self.base.offset(count);
        self.batch_retransmits = 0;
        count
    }

    /// 확인된 연속 구간만큼 base 전진
    fn slide(&mut self) {
        while self.slots.front().map(|s| s.acked).unwrap_or(false) {
            self.slots.pop_front();
            self.base = self.base.next();
        }
    }

    /// Go-Back-N: start 슬롯부터 끝까지 재전송
    fn retransmit_from(&mut self, start: usize) -> Result<Vec<Packet>> {
        if start >= self.slots.len() {
            return Ok(Vec::new());
        }

        let attempts = self.batch_retransmits + 1;
        if attempts > self.max_retransmits {
            return Err(Error::LinkUnrecoverable {
                sequence: self.base.offset(start).value(),
                attempts: self.batch_retransmits,
            });
        }
        self.batch_retransmits = attempts;

        let mut packets = Vec::with_capacity(self.slots.len() - start);
        for slot in self.slots.iter_mut().skip(start) {
            slot.retransmit_count += 1;
            slot.timer.reset(self.timeout, &self.expiry_tx);
            packets.push(slot.packet.clone());
        }

        debug!(
            "GBN 재전송: Seq: {}~{} | Retry: {}",
            self.base.offset(start),
            self.next_seq.prev(),
            attempts
        );
        Ok(packets)
    }

    /// Selective Repeat: 슬롯 하나만 재전송
    fn retransmit_one(&mut self, index: usize) -> Result<Vec<Packet>> {
        let slot = &mut self.slots[index];
        if slot.acked {
            return Ok(Vec::new());
        }

        if slot.retransmit_count >= self.max_retransmits {
            return Err(Error::LinkUnrecoverable {
                sequence: slot.packet.sequence().value(),
                attempts: slot.retransmit_count,
            });
        }
        slot.retransmit_count += 1;
        slot.timer.reset(self.timeout, &self.expiry_tx);

        debug!(
            "SR 재전송: Seq: {} | Retry: {}",
            slot.packet.sequence(),
            slot.retransmit_count
        );
        Ok(vec![slot.packet.clone()])
    }
}
