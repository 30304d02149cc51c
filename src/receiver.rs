//! 수신 버퍼 (수신측)
//!
//! - Go-Back-N: 기대 시퀀스 하나만 수락, 나머지는 버리고 중복 ACK
//! - Selective Repeat: 수신 윈도우 안의 패킷은 모두 ACK 후 버퍼링,
//!   base부터 연속된 구간이 채워지면 순서대로 전달

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::config::{OperationMode, SessionParams};
use crate::packet::{ErrorCode, Packet};
use crate::sequence::SeqNum;

/// 상위 계층으로 전달된 청크
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub sequence: SeqNum,
    pub payload: String,
    pub is_final: bool,
}

/// DATA 패킷 하나를 처리한 결과
#[derive(Debug, Default)]
pub struct ReceiveOutcome {
    /// 송신측으로 돌려보낼 ACK/NACK
    pub reply: Option<Packet>,

    /// 순서대로 전달할 청크
    pub delivered: Vec<Delivered>,
}

impl ReceiveOutcome {
    fn reply(packet: Packet) -> Self {
        Self {
            reply: Some(packet),
            delivered: Vec::new(),
        }
    }
}

/// 수신 버퍼
#[derive(Debug)]
pub struct ReceiveBuffer {
    mode: OperationMode,
    window_size: usize,

    /// Go-Back-N: 기대 시퀀스 / Selective Repeat: 수신 윈도우 base
    expected: SeqNum,

    /// Selective Repeat 버퍼 (index = base와의 거리, 길이 = window_size)
    slots: VecDeque<Option<Delivered>>,

    duplicates: u64,
    checksum_errors: u64,
}

impl ReceiveBuffer {
    pub fn new(params: &SessionParams) -> Self {
        let window_size = params.window_size.max(1);
        let slots = match params.mode {
            OperationMode::GoBackN => VecDeque::new(),
            OperationMode::SelectiveRepeat => (0..window_size).map(|_| None).collect(),
        };

        Self {
            mode: params.mode,
            window_size,
            expected: SeqNum::ZERO,
            slots,
            duplicates: 0,
            checksum_errors: 0,
        }
    }

    /// 시작 시퀀스 지정
    pub fn with_initial_sequence(mut self, seq: SeqNum) -> Self {
        self.expected = seq;
        self
    }

    /// 다음에 순서대로 전달될 시퀀스
    pub fn expected(&self) -> SeqNum {
        self.expected
    }

    /// 순서가 어긋나 보관 중인 청크 수 (Go-Back-N은 항상 0)
    pub fn buffered(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn checksum_errors(&self) -> u64 {
        self.checksum_errors
    }

    /// DATA 패킷 처리
    pub fn on_packet(&mut self, packet: Packet) -> ReceiveOutcome {
        match self.mode {
            OperationMode::GoBackN => self.on_packet_gbn(packet),
            OperationMode::SelectiveRepeat => self.on_packet_sr(packet),
        }
    }

    fn on_packet_gbn(&mut self, packet: Packet) -> ReceiveOutcome {
        let seq = packet.sequence();

        if !packet.verify() {
            self.checksum_errors += 1;
            warn!("체크섬 오류: Seq: {} (expected {})", seq, self.expected);
            return ReceiveOutcome::reply(Packet::nack(self.expected, ErrorCode::ChecksumError));
        }

        if seq != self.expected {
            // 순서가 어긋나거나 이미 받은 패킷, 마지막 정상 수신 시퀀스를 다시 ACK
            self.duplicates += 1;
            debug!("순서 불일치 폐기: Seq: {} (expected {})", seq, self.expected);
            return ReceiveOutcome::reply(Packet::ack(self.expected.prev()));
        }

        self.expected = seq.next();
        let is_final = packet.is_final();
        ReceiveOutcome {
            reply: Some(Packet::ack(seq)),
            delivered: vec![Delivered {
                sequence: seq,
                payload: packet.payload().to_string(),
                is_final,
            }],
        }
    }

    fn on_packet_sr(&mut self, packet: Packet) -> ReceiveOutcome {
        let seq = packet.sequence();

        if !packet.verify() {
            self.checksum_errors += 1;
            warn!("체크섬 오류: Seq: {}", seq);
            return ReceiveOutcome::reply(Packet::nack(seq, ErrorCode::ChecksumError));
        }

        let ahead = self.expected.distance_to(seq);
        if ahead < self.window_size {
            let slot = &mut self.slots[ahead];
            if slot.is_some() {
                self.duplicates += 1;
            } else {
                *slot = Some(Delivered {
                    sequence: seq,
                    payload: packet.payload().to_string(),
                    is_final: packet.is_final(),
                });
            }

            return ReceiveOutcome {
                reply: Some(Packet::ack(seq)),
                delivered: self.drain_contiguous(),
            };
        }

        let behind = seq.distance_to(self.expected);
        if (1..=self.window_size).contains(&behind) {
            // 이미 전달된 패킷, ACK가 유실됐을 수 있으므로 다시 ACK
            self.duplicates += 1;
            debug!("중복 수신: Seq: {} (base {})", seq, self.expected);
            return ReceiveOutcome::reply(Packet::ack(seq));
        }

        if self.expected.precedes(seq) {
            warn!("수신 윈도우 초과: Seq: {} (base {})", seq, self.expected);
            return ReceiveOutcome::reply(Packet::nack(seq, ErrorCode::WindowOverflow));
        }

        debug!("오래된 중복 폐기: Seq: {}", seq);
        ReceiveOutcome::default()
    }

    fn drain_contiguous(&mut self) -> Vec<Delivered> {
        let mut delivered = Vec::new();
        while let Some(Some(_)) = self.slots.front() {
            if let Some(Some(chunk)) = self.slots.pop_front() {
                delivered.push(chunk);
            }
            self.slots.push_back(None);
            self.expected = self.expected.next();
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketKind, PacketMetadata};

    fn buffer(mode: OperationMode, window_size: usize) -> ReceiveBuffer {
        let params = SessionParams::default()
            .with_mode(mode)
            .with_window_size(window_size);
        ReceiveBuffer::new(&params)
    }

    fn data(seq: u16, payload: &str) -> Packet {
        Packet::data(SeqNum::new(seq), payload, false)
    }

    fn corrupted(seq: u16) -> Packet {
        let good = data(seq, "abcd");
        Packet::from_parts(
            good.sequence(),
            "abce".into(),
            good.checksum(),
            PacketKind::Data,
            PacketMetadata::default(),
        )
    }

    fn payloads(outcome: &ReceiveOutcome) -> Vec<&str> {
        outcome.delivered.iter().map(|d| d.payload.as_str()).collect()
    }

    #[test]
    fn test_gbn_in_order_delivery() {
        let mut rx = buffer(OperationMode::GoBackN, 5);

        let outcome = rx.on_packet(data(0, "Esta"));
        assert_eq!(payloads(&outcome), vec!["Esta"]);
        assert_eq!(outcome.reply, Some(Packet::ack(SeqNum::new(0))));
        assert_eq!(rx.expected(), SeqNum::new(1));
    }

    #[test]
    fn test_gbn_out_of_order_sends_duplicate_ack() {
        let mut rx = buffer(OperationMode::GoBackN, 5);
        rx.on_packet(data(0, "a"));

        let outcome = rx.on_packet(data(2, "c"));
        assert!(outcome.delivered.is_empty());
        assert_eq!(outcome.reply, Some(Packet::ack(SeqNum::new(0))));
        assert_eq!(rx.buffered(), 0);
    }

    #[test]
    fn test_gbn_duplicate_is_not_redelivered() {
        let mut rx = buffer(OperationMode::GoBackN, 5);
        rx.on_packet(data(0, "a"));

        let outcome = rx.on_packet(data(0, "a"));
        assert!(outcome.delivered.is_empty());
        assert_eq!(outcome.reply.map(|p| p.kind()), Some(PacketKind::Ack));
        assert_eq!(rx.duplicates(), 1);
    }

    #[test]
    fn test_gbn_corruption_nacks_expected() {
        let mut rx = buffer(OperationMode::GoBackN, 5);
        rx.on_packet(data(0, "a"));

        let outcome = rx.on_packet(corrupted(1));
        assert_eq!(
            outcome.reply,
            Some(Packet::nack(SeqNum::new(1), ErrorCode::ChecksumError))
        );
        assert_eq!(rx.expected(), SeqNum::new(1));
        assert_eq!(rx.checksum_errors(), 1);
    }

    #[test]
    fn test_sr_gap_fill_in_order() {
        let mut rx = buffer(OperationMode::SelectiveRepeat, 4);

        let outcome = rx.on_packet(data(1, "1"));
        assert!(outcome.delivered.is_empty());
        assert_eq!(outcome.reply, Some(Packet::ack(SeqNum::new(1))));
        rx.on_packet(data(3, "3"));
        assert_eq!(rx.buffered(), 2);

        let outcome = rx.on_packet(data(0, "0"));
        assert_eq!(payloads(&outcome), vec!["0", "1"]);

        let outcome = rx.on_packet(data(2, "2"));
        assert_eq!(payloads(&outcome), vec!["2", "3"]);
        assert_eq!(rx.expected(), SeqNum::new(4));
        assert_eq!(rx.buffered(), 0);
    }

    #[test]
    fn test_sr_duplicate_buffered_is_noop() {
        let mut rx = buffer(OperationMode::SelectiveRepeat, 4);
        rx.on_packet(data(2, "x"));

        let outcome = rx.on_packet(data(2, "x"));
        assert!(outcome.delivered.is_empty());
        assert_eq!(outcome.reply, Some(Packet::ack(SeqNum::new(2))));
        assert_eq!(rx.buffered(), 1);
        assert_eq!(rx.duplicates(), 1);
    }

    #[test]
    fn test_sr_delivered_duplicate_is_reacked() {
        let mut rx = buffer(OperationMode::SelectiveRepeat, 4);
        rx.on_packet(data(0, "a"));

        let outcome = rx.on_packet(data(0, "a"));
        assert!(outcome.delivered.is_empty());
        assert_eq!(outcome.reply, Some(Packet::ack(SeqNum::new(0))));
    }

    #[test]
    fn test_sr_ahead_of_window_overflows() {
        let mut rx = buffer(OperationMode::SelectiveRepeat, 4);

        let outcome = rx.on_packet(data(4, "x"));
        assert_eq!(
            outcome.reply,
            Some(Packet::nack(SeqNum::new(4), ErrorCode::WindowOverflow))
        );
        assert_eq!(rx.buffered(), 0);
    }

    #[test]
    fn test_sr_stale_packet_silently_discarded() {
        let mut rx = buffer(OperationMode::SelectiveRepeat, 4)
            .with_initial_sequence(SeqNum::new(100));

        let outcome = rx.on_packet(data(10, "old"));
        assert!(outcome.reply.is_none());
        assert!(outcome.delivered.is_empty());
    }

    #[test]
    fn test_sr_corruption_nacks_received_sequence() {
        let mut rx = buffer(OperationMode::SelectiveRepeat, 4);
        let outcome = rx.on_packet(corrupted(2));
        assert_eq!(
            outcome.reply,
            Some(Packet::nack(SeqNum::new(2), ErrorCode::ChecksumError))
        );
    }

    #[test]
    fn test_sr_window_wraps() {
        let mut rx = buffer(OperationMode::SelectiveRepeat, 3)
            .with_initial_sequence(SeqNum::new(998));

        rx.on_packet(data(0, "c"));
        rx.on_packet(data(999, "b"));
        let outcome = rx.on_packet(data(998, "a"));
        assert_eq!(payloads(&outcome), vec!["a", "b", "c"]);
        assert_eq!(rx.expected(), SeqNum::new(1));
    }
}
