//! 두 엔진을 손실 링크로 직접 연결한 시나리오 테스트
//!
//! tokio 시간을 멈춘 상태로 돌리므로 타임아웃이 즉시, 결정적으로 처리된다.

use std::time::Duration;

use rdt::timer::ExpiryReceiver;
use rdt::{
    ArqEngine, EngineEvent, FaultConfig, FaultInjector, OperationMode, SessionParams,
    SessionState,
};
use tokio::sync::mpsc;

const MESSAGE: &str = "Esta é uma mensagem de teste para o protocolo de transporte confiável.";

struct Endpoint {
    engine: ArqEngine,
    expiry_rx: ExpiryReceiver,
    fault: FaultInjector,
    delivered: Vec<String>,
    failed: Option<String>,
}

impl Endpoint {
    fn new(params: SessionParams, fault: FaultConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            engine: ArqEngine::new(params, tx),
            expiry_rx: rx,
            fault: FaultInjector::new(fault),
            delivered: Vec::new(),
            failed: None,
        }
    }

    fn collect_events(&mut self) {
        while let Some(event) = self.engine.poll_event() {
            match event {
                EngineEvent::MessageDelivered(text) => self.delivered.push(text),
                EngineEvent::Failed { reason } => self.failed = Some(reason),
                EngineEvent::Closed => {}
            }
        }
    }
}

/// a의 출력을 b로 (a의 결함 주입기 통과). 옮긴 패킷이 있으면 true.
fn forward(from: &mut Endpoint, to: &mut Endpoint) -> bool {
    let mut moved = false;
    while let Some(packet) = from.engine.poll_transmit() {
        moved = true;
        if let Some(packet) = from.fault.apply(packet) {
            let _ = to.engine.handle_packet(packet);
        }
    }
    moved
}

/// 송신측이 종료(Closed/Failed)될 때까지 링크 구동
async fn run_link(sender: &mut Endpoint, receiver: &mut Endpoint) {
    loop {
        let a = forward(sender, receiver);
        let b = forward(receiver, sender);
        sender.collect_events();
        receiver.collect_events();

        if sender.engine.state().is_terminal() {
            break;
        }
        if a || b {
            continue;
        }

        tokio::select! {
            Some(expiry) = sender.expiry_rx.recv() => {
                let _ = sender.engine.handle_expiry(expiry);
            }
            Some(expiry) = receiver.expiry_rx.recv() => {
                let _ = receiver.engine.handle_expiry(expiry);
            }
        }
    }
}

fn params(mode: OperationMode, max_retransmits: u32) -> SessionParams {
    SessionParams::default()
        .with_mode(mode)
        .with_window_size(5)
        .with_timeout(Duration::from_millis(500))
        .with_max_retransmits(max_retransmits)
}

async fn lossy_transfer(mode: OperationMode) {
    let params = params(mode, 12);
    let mut sender = Endpoint::new(params, FaultConfig::lossy(0.2, 20240501));
    let mut receiver = Endpoint::new(params, FaultConfig::lossy(0.2, 7));

    sender.engine.send_message(MESSAGE).unwrap();
    sender.engine.finish();
    run_link(&mut sender, &mut receiver).await;

    assert_eq!(sender.failed, None);
    assert_eq!(sender.engine.state(), SessionState::Closed);
    assert_eq!(receiver.delivered, vec![MESSAGE.to_string()]);
    assert!(sender.fault.dropped() + receiver.fault.dropped() > 0);
    assert!(sender.engine.stats().retransmissions > 0);
}

#[tokio::test(start_paused = true)]
async fn test_selective_repeat_survives_twenty_percent_loss() {
    lossy_transfer(OperationMode::SelectiveRepeat).await;
}

#[tokio::test(start_paused = true)]
async fn test_go_back_n_survives_twenty_percent_loss() {
    lossy_transfer(OperationMode::GoBackN).await;
}

#[tokio::test(start_paused = true)]
async fn test_corruption_is_repaired() {
    for mode in [OperationMode::GoBackN, OperationMode::SelectiveRepeat] {
        let params = params(mode, 12);
        let corrupting = FaultConfig {
            corruption_probability: 0.3,
            seed: Some(99),
            ..FaultConfig::default()
        };
        let mut sender = Endpoint::new(params, corrupting);
        let mut receiver = Endpoint::new(params, FaultConfig::default());

        sender.engine.send_message(MESSAGE).unwrap();
        sender.engine.finish();
        run_link(&mut sender, &mut receiver).await;

        assert_eq!(receiver.delivered, vec![MESSAGE.to_string()]);
        assert!(receiver.engine.stats().checksum_errors > 0);
        assert!(sender.engine.stats().nacks_received > 0);
    }
}

async fn dead_link(mode: OperationMode) {
    let params = params(mode, 3);
    let mut sender = Endpoint::new(params, FaultConfig::lossy(1.0, 1));
    let mut receiver = Endpoint::new(params, FaultConfig::default());

    let started = tokio::time::Instant::now();
    sender.engine.send_message(MESSAGE).unwrap();
    sender.engine.finish();
    run_link(&mut sender, &mut receiver).await;

    assert_eq!(sender.engine.state(), SessionState::Failed);
    assert!(sender.failed.is_some());
    assert!(receiver.delivered.is_empty());
    // 최초 전송 + 3회 재전송 후 네 번째 만료에서 실패
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(500 * 4));
    assert!(elapsed < Duration::from_millis(500 * 5));
}

#[tokio::test(start_paused = true)]
async fn test_selective_repeat_dead_link_fails_after_retransmit_budget() {
    dead_link(OperationMode::SelectiveRepeat).await;
}

#[tokio::test(start_paused = true)]
async fn test_go_back_n_dead_link_fails_after_retransmit_budget() {
    dead_link(OperationMode::GoBackN).await;
}

#[tokio::test(start_paused = true)]
async fn test_multiple_messages_arrive_in_order() {
    let params = params(OperationMode::SelectiveRepeat, 12);
    let mut sender = Endpoint::new(params, FaultConfig::lossy(0.2, 3));
    let mut receiver = Endpoint::new(params, FaultConfig::lossy(0.2, 4));

    let messages: Vec<String> = (0..3)
        .map(|i| format!("Mensagem número {} com pelo menos trinta caracteres", i))
        .collect();
    for message in &messages {
        sender.engine.send_message(message).unwrap();
    }
    sender.engine.finish();
    run_link(&mut sender, &mut receiver).await;

    assert_eq!(receiver.delivered, messages);
}
