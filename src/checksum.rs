//! 페이로드 체크섬
//!
//! 송신측은 패킷 생성 시 찍고, 수신측은 페이로드를 신뢰하기 전에 검증한다.
//! `verify`가 false면 손상된 패킷이다.

/// 32비트 CRC 다이제스트 계산
pub fn compute(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// 체크섬 검증
pub fn verify(payload: &[u8], digest: u32) -> bool {
    compute(payload) == digest
}
