//! 암호화 모듈 - X25519 키 교환 + ChaCha20-Poly1305 대칭 암호화
//!
//! 흐름:
//! 1. 양측이 X25519 임시 키쌍 생성
//! 2. 핸드쉐이크 메타데이터로 공개키 교환 (hex)
//! 3. 공유 비밀(shared secret) 계산
//! 4. ChaCha20-Poly1305로 메시지 단위 암호화/복호화
//!
//! 전송 계층은 암호문을 불투명한 문자열로만 다룬다. 체크섬도 암호문 위에서 계산된다.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand_core::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey};

/// X25519 공개키 (32 bytes)
pub const PUBLIC_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce 크기 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// ChaCha20-Poly1305 태그 크기 (16 bytes)
pub const TAG_SIZE: usize = 16;

/// 암호화 오류
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("암호화 실패: {0}")]
    EncryptionFailed(String),
    #[error("복호화 실패: {0}")]
    DecryptionFailed(String),
    #[error("잘못된 키 크기")]
    InvalidKeySize,
    #[error("잘못된 nonce")]
    InvalidNonce,
    #[error("잘못된 hex 인코딩")]
    InvalidEncoding,
}

/// 연결에서의 역할 (nonce 공간 분리)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// 핸드쉐이크를 시작한 쪽 (클라이언트)
    Initiator,
    /// 응답한 쪽 (서버)
    Responder,
}

impl Role {
    fn nonce_prefix(&self) -> u8 {
        match self {
            Role::Initiator => 0x01,
            Role::Responder => 0x02,
        }
    }
}

/// 임시 키쌍 (일회성 세션용)
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// 새 임시 키쌍 생성
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// 공개키를 바이트로 변환
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// 공개키 hex 문자열 (핸드쉐이크 메타데이터용)
    pub fn public_key_hex(&self) -> String {
        to_hex(self.public.as_bytes())
    }

    /// 상대방 공개키로 공유 비밀 계산 (소비됨)
    pub fn compute_shared_secret(self, peer_public: &[u8; PUBLIC_KEY_SIZE]) -> [u8; 32] {
        let peer_public = PublicKey::from(*peer_public);
        let shared = self.secret.diffie_hellman(&peer_public);
        *shared.as_bytes()
    }

    /// 키 교환 완료 후 메시지 암호화기 생성
    pub fn into_cipher(self, peer_public_hex: &str, role: Role) -> Result<MessageCipher, CryptoError> {
        let peer_public = parse_public_key(peer_public_hex)?;
        let shared_secret = self.compute_shared_secret(&peer_public);
        MessageCipher::new(&shared_secret, role)
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// 메시지 암호화기
///
/// 양방향이 같은 키를 쓰므로 nonce 첫 바이트에 역할을 넣어 공간을 나눈다.
pub struct MessageCipher {
    cipher: ChaCha20Poly1305,
    role: Role,
    nonce_counter: u64,
}

impl MessageCipher {
    /// 공유 비밀로 암호화기 생성
    pub fn new(shared_secret: &[u8; 32], role: Role) -> Result<Self, CryptoError> {
        let cipher =
            ChaCha20Poly1305::new_from_slice(shared_secret).map_err(|_| CryptoError::InvalidKeySize)?;
        Ok(Self {
            cipher,
            role,
            nonce_counter: 0,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// 다음 nonce 생성: prefix(1) + 0(3) + counter(8)
    fn next_nonce(&mut self) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[0] = self.role.nonce_prefix();
        nonce[4..].copy_from_slice(&self.nonce_counter.to_le_bytes());
        self.nonce_counter += 1;
        nonce
    }

    /// 메시지 암호화
    /// 반환: hex(nonce(12) + ciphertext(원본 + 16바이트 태그))
    pub fn encrypt_message(&mut self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce_bytes = self.next_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(to_hex(&result))
    }

    /// 메시지 복호화
    /// 입력: hex(nonce + ciphertext), 상대 역할의 nonce만 허용
    pub fn decrypt_message(&self, encoded: &str) -> Result<String, CryptoError> {
        let encrypted = from_hex(encoded)?;
        if encrypted.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed("데이터가 너무 짧음".into()));
        }
        if encrypted[0] == self.role.nonce_prefix() {
            return Err(CryptoError::InvalidNonce);
        }

        let nonce = Nonce::from_slice(&encrypted[..NONCE_SIZE]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &encrypted[NONCE_SIZE..])
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCipher")
            .field("role", &self.role)
            .field("nonce_counter", &self.nonce_counter)
            .finish_non_exhaustive()
    }
}

/// hex 공개키 파싱
pub fn parse_public_key(hex: &str) -> Result<[u8; PUBLIC_KEY_SIZE], CryptoError> {
    let bytes = from_hex(hex)?;
    bytes.try_into().map_err(|_| CryptoError::InvalidKeySize)
}

/// 소문자 hex 인코딩
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// hex 디코딩 (대소문자 무관)
pub fn from_hex(hex: &str) -> Result<Vec<u8>, CryptoError> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return Err(CryptoError::InvalidEncoding);
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| CryptoError::InvalidEncoding))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (MessageCipher, MessageCipher) {
        let alice = EphemeralKeyPair::generate();
        let bob = EphemeralKeyPair::generate();
        let alice_public = alice.public_key_hex();
        let bob_public = bob.public_key_hex();

        (
            alice.into_cipher(&bob_public, Role::Initiator).unwrap(),
            bob.into_cipher(&alice_public, Role::Responder).unwrap(),
        )
    }

    #[test]
    fn test_key_exchange() {
        let alice = EphemeralKeyPair::generate();
        let bob = EphemeralKeyPair::generate();

        let alice_public = alice.public_key_bytes();
        let bob_public = bob.public_key_bytes();

        // 양측이 같은 값을 얻어야 함
        assert_eq!(
            alice.compute_shared_secret(&bob_public),
            bob.compute_shared_secret(&alice_public)
        );
    }

    #[test]
    fn test_encrypt_decrypt_both_directions() {
        let (mut alice, mut bob) = pair();

        let message = "Esta é uma mensagem de teste cifrada";
        let encrypted = alice.encrypt_message(message).unwrap();
        assert!(encrypted.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(bob.decrypt_message(&encrypted).unwrap(), message);

        let reply = bob.encrypt_message("ok").unwrap();
        assert_eq!(alice.decrypt_message(&reply).unwrap(), "ok");
    }

    #[test]
    fn test_nonce_never_repeats() {
        let (mut alice, _bob) = pair();
        let a = alice.encrypt_message("same").unwrap();
        let b = alice.encrypt_message("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_reflected_ciphertext_rejected() {
        let (mut alice, _bob) = pair();
        let encrypted = alice.encrypt_message("hello").unwrap();
        assert!(matches!(
            alice.decrypt_message(&encrypted),
            Err(CryptoError::InvalidNonce)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let (mut alice, bob) = pair();
        let mut encrypted = alice.encrypt_message("hello").unwrap();
        let last = if encrypted.ends_with('0') { "1" } else { "0" };
        encrypted.replace_range(encrypted.len() - 1.., last);
        assert!(bob.decrypt_message(&encrypted).is_err());
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(to_hex(&[0x00, 0xab, 0xff]), "00abff");
        assert_eq!(from_hex("00ABff").unwrap(), vec![0x00, 0xab, 0xff]);
        assert!(from_hex("abc").is_err());
        assert!(from_hex("zz").is_err());
        assert!(matches!(
            parse_public_key("00ff"),
            Err(CryptoError::InvalidKeySize)
        ));
    }
}
