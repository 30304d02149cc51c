//! 재전송 타이머
//!
//! 패킷 하나에 붙는 일회성 카운트다운. 만료되면 세션 메일박스로 [`Expiry`]를 보낸다.
//! 만료 처리는 세션 루프에서만 일어나므로 다른 상태 변경과 동시에 실행되지 않는다.
//!
//! 취소와 만료가 경합할 수 있으므로 수신측은 [`Timer::accepts`]로
//! 현재 무장된 세대의 만료인지 확인해야 한다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::sequence::SeqNum;

/// 전 프로세스 공통 세대 카운터 (시퀀스 번호 재사용 시에도 토큰이 겹치지 않음)
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// 만료 신호
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub sequence: SeqNum,
    pub generation: u64,
}

/// 만료 신호 송신측
pub type ExpirySender = mpsc::UnboundedSender<Expiry>;

/// 만료 신호 수신측
pub type ExpiryReceiver = mpsc::UnboundedReceiver<Expiry>;

/// 일회성 타이머
#[derive(Debug)]
pub struct Timer {
    sequence: SeqNum,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    /// 무장되지 않은 타이머
    pub fn new(sequence: SeqNum) -> Self {
        Self {
            sequence,
            generation: 0,
            handle: None,
        }
    }

    /// 카운트다운 시작 (이미 무장된 경우 이전 것은 취소)
    pub fn start(&mut self, duration: Duration, expiry_tx: &ExpirySender) {
        self.cancel();

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        self.generation = generation;

        let expiry = Expiry {
            sequence: self.sequence,
            generation,
        };
        let tx = expiry_tx.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // 세션이 이미 닫혔으면 보낼 곳이 없음
            let _ = tx.send(expiry);
        }));
    }

    /// 취소 (여러 번 호출해도 무방)
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// cancel + start
    pub fn reset(&mut self, duration: Duration, expiry_tx: &ExpirySender) {
        self.start(duration, expiry_tx);
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// 현재 무장된 세대의 만료인지 확인
    pub fn accepts(&self, expiry: &Expiry) -> bool {
        self.handle.is_some()
            && expiry.sequence == self.sequence
            && expiry.generation == self.generation
    }

    /// 만료 신호를 소비한 뒤 호출 (무장 해제)
    pub fn mark_fired(&mut self) {
        self.handle = None;
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}
