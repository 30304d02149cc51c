//! 시퀀스 번호 공간
//!
//! `0..SEQUENCE_MODULUS` 순환 정수. 비교는 항상 모듈러 거리로 한다.
//!
//! ```text
//!   base              base + window
//!    │                     │
//! ───┼─────────────────────┼────▶ 999 → 0 → 1 ...
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SEQUENCE_MODULUS;

/// 순환 시퀀스 번호
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqNum(u16);

impl SeqNum {
    pub const ZERO: SeqNum = SeqNum(0);

    /// 모듈러 축약 후 생성
    pub fn new(value: u16) -> Self {
        Self(value % SEQUENCE_MODULUS)
    }

    /// 범위 밖 값은 None
    pub fn checked(value: u64) -> Option<Self> {
        if value < SEQUENCE_MODULUS as u64 {
            Some(Self(value as u16))
        } else {
            None
        }
    }

    pub fn value(self) -> u16 {
        self.0
    }

    pub fn next(self) -> Self {
        self.offset(1)
    }

    pub fn prev(self) -> Self {
        Self((self.0 + SEQUENCE_MODULUS - 1) % SEQUENCE_MODULUS)
    }

    /// `n`만큼 앞의 번호
    pub fn offset(self, n: usize) -> Self {
        let n = (n % SEQUENCE_MODULUS as usize) as u16;
        Self((self.0 + n) % SEQUENCE_MODULUS)
    }

    /// self에서 other까지 앞으로 가는 거리 (0..N)
    pub fn distance_to(self, other: SeqNum) -> usize {
        ((other.0 + SEQUENCE_MODULUS - self.0) % SEQUENCE_MODULUS) as usize
    }

    /// self가 other보다 앞서는지 (거리 1..N/2)
    pub fn precedes(self, other: SeqNum) -> bool {
        let d = self.distance_to(other);
        d > 0 && d < (SEQUENCE_MODULUS / 2) as usize
    }

    /// `[base, base + len)` 안에 있는지
    pub fn is_within(self, base: SeqNum, len: usize) -> bool {
        base.distance_to(self) < len
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl From<SeqNum> for u16 {
    fn from(seq: SeqNum) -> u16 {
        seq.0
    }
}
