//! 손실/손상 시뮬레이션
//!
//! 체크섬이 찍힌 뒤의 송신 패킷을 확률적으로 버리거나 페이로드를 변조한다.
//! 시드를 주면 결과가 재현 가능하다.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::packet::{Packet, PacketKind};
use crate::{Error, Result};

/// 손상 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionKind {
    /// 매번 아래 둘 중 하나를 무작위로 선택
    #[default]
    Random,
    /// 한 문자의 최하위 비트 반전
    BitFlip,
    /// 한 문자를 다른 알파벳으로 교체
    CharacterChange,
}

impl std::str::FromStr for CorruptionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "random" => Ok(CorruptionKind::Random),
            "bit_flip" => Ok(CorruptionKind::BitFlip),
            "character_change" | "char_change" => Ok(CorruptionKind::CharacterChange),
            other => Err(Error::InvalidConfig(format!("알 수 없는 손상 방식: {}", other))),
        }
    }
}

/// 시뮬레이션 설정
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FaultConfig {
    /// 패킷 손실 확률 (0.0 ~ 1.0)
    pub loss_probability: f64,

    /// 페이로드 손상 확률 (0.0 ~ 1.0)
    pub corruption_probability: f64,

    pub corruption: CorruptionKind,

    /// 고정 시드 (None이면 OS 엔트로피)
    pub seed: Option<u64>,
}

impl FaultConfig {
    pub fn lossy(loss_probability: f64, seed: u64) -> Self {
        Self {
            loss_probability,
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.loss_probability > 0.0 || self.corruption_probability > 0.0
    }

    pub fn validate(&self) -> Result<()> {
        for (name, p) in [
            ("loss_probability", self.loss_probability),
            ("corruption_probability", self.corruption_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::InvalidConfig(format!(
                    "{}는 0.0~1.0 사이여야 함: {}",
                    name, p
                )));
            }
        }
        Ok(())
    }
}

/// 송신 경로에 끼워 넣는 결함 주입기
#[derive(Debug)]
pub struct FaultInjector {
    config: FaultConfig,
    rng: StdRng,
    dropped: u64,
    corrupted: u64,
}

impl FaultInjector {
    pub fn new(config: FaultConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            dropped: 0,
            corrupted: 0,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn corrupted(&self) -> u64 {
        self.corrupted
    }

    /// 패킷 통과 여부 결정. `None`이면 손실.
    pub fn apply(&mut self, packet: Packet) -> Option<Packet> {
        if self.config.loss_probability > 0.0 && self.rng.gen_bool(self.config.loss_probability) {
            self.dropped += 1;
            debug!("[시뮬레이션] 패킷 손실: {}", packet);
            return None;
        }

        // 제어 패킷은 페이로드가 없으므로 손상 대상이 아님
        if packet.kind() != PacketKind::Data || packet.payload().is_empty() {
            return Some(packet);
        }

        if self.config.corruption_probability > 0.0
            && self.rng.gen_bool(self.config.corruption_probability)
        {
            let payload = self.corrupt(packet.payload());
            self.corrupted += 1;
            debug!(
                "[시뮬레이션] 페이로드 손상: Seq: {} | '{}' -> '{}'",
                packet.sequence(),
                packet.payload(),
                payload
            );
            return Some(Packet::from_parts(
                packet.sequence(),
                payload,
                packet.checksum(),
                packet.kind(),
                *packet.metadata(),
            ));
        }

        Some(packet)
    }

    fn corrupt(&mut self, payload: &str) -> String {
        let mut chars: Vec<char> = payload.chars().collect();
        let index = self.rng.gen_range(0..chars.len());

        let kind = match self.config.corruption {
            CorruptionKind::Random => {
                if self.rng.gen_bool(0.5) {
                    CorruptionKind::BitFlip
                } else {
                    CorruptionKind::CharacterChange
                }
            }
            other => other,
        };

        let original = chars[index];
        chars[index] = match kind {
            CorruptionKind::BitFlip => char::from_u32(original as u32 ^ 1).unwrap_or('?'),
            _ => {
                let mut replacement = original;
                while replacement == original {
                    replacement = char::from(self.rng.gen_range(b'a'..=b'z'));
                }
                replacement
            }
        };
        chars.into_iter().collect()
    }
}
