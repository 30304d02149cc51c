//! 전송 통계

use std::time::{Duration, Instant};

use crate::packet::{Packet, PacketKind};

/// 세션 전송 통계
#[derive(Debug, Clone)]
pub struct TransportStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 총 송신 패킷 수 (재전송 포함)
    pub packets_sent: u64,

    /// 총 수신 패킷 수
    pub packets_received: u64,

    /// 재전송 패킷 수
    pub retransmissions: u64,

    /// 체크섬 오류 수
    pub checksum_errors: u64,

    /// 중복 수신 패킷 수
    pub duplicate_packets: u64,

    pub acks_sent: u64,
    pub acks_received: u64,
    pub nacks_sent: u64,
    pub nacks_received: u64,

    /// 송신 요청된 메시지 수
    pub messages_sent: u64,

    /// 재조립 완료된 메시지 수
    pub messages_delivered: u64,

    /// 상위 계층으로 전달된 페이로드 바이트
    pub bytes_delivered: u64,

    /// 프로토콜 위반 수
    pub protocol_violations: u64,

    /// 시뮬레이션으로 버린 패킷 수
    pub injected_drops: u64,

    /// 시뮬레이션으로 손상시킨 패킷 수
    pub injected_corruptions: u64,
}

impl TransportStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            packets_sent: 0,
            packets_received: 0,
            retransmissions: 0,
            checksum_errors: 0,
            duplicate_packets: 0,
            acks_sent: 0,
            acks_received: 0,
            nacks_sent: 0,
            nacks_received: 0,
            messages_sent: 0,
            messages_delivered: 0,
            bytes_delivered: 0,
            protocol_violations: 0,
            injected_drops: 0,
            injected_corruptions: 0,
        }
    }

    /// 송신 기록
    pub fn record_sent(&mut self, packet: &Packet, retransmission: bool) {
        self.packets_sent += 1;
        if retransmission {
            self.retransmissions += 1;
        }
        match packet.kind() {
            PacketKind::Ack => self.acks_sent += 1,
            PacketKind::Nack => self.nacks_sent += 1,
            PacketKind::Data => {}
        }
    }

    /// 수신 기록
    pub fn record_received(&mut self, packet: &Packet) {
        self.packets_received += 1;
        match packet.kind() {
            PacketKind::Ack => self.acks_received += 1,
            PacketKind::Nack => self.nacks_received += 1,
            PacketKind::Data => {}
        }
    }

    /// 메시지 재조립 완료 기록
    pub fn record_delivery(&mut self, bytes: usize) {
        self.messages_delivered += 1;
        self.bytes_delivered += bytes as u64;
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 재전송 비율
    pub fn retransmission_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.packets_sent as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Sent: {} (retx {}, {:.1}%) | Received: {} | ACK {}/{} | NACK {}/{} | Checksum errors: {} | Duplicates: {} | Messages: {} sent, {} delivered ({} bytes)",
            self.elapsed().as_secs_f64(),
            self.packets_sent,
            self.retransmissions,
            self.retransmission_rate() * 100.0,
            self.packets_received,
            self.acks_sent,
            self.acks_received,
            self.nacks_sent,
            self.nacks_received,
            self.checksum_errors,
            self.duplicate_packets,
            self.messages_sent,
            self.messages_delivered,
            self.bytes_delivered,
        )
    }
}

impl Default for TransportStats {
    fn default() -> Self {
        Self::new()
    }
}
