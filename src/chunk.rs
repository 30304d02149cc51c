//! 메시지 분할과 재조립
//!
//! - 송신측: 메시지를 `chunk_size` 문자 단위 청크로 분할
//! - 수신측: 순서대로 전달된 청크를 이어 붙이고, 마지막 청크에서 완성 메시지 반환

/// 메시지를 청크로 분할
///
/// 문자(유니코드 스칼라) 단위로 자르므로 각 청크는 항상 유효한 UTF-8이다.
pub fn split_message(message: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(message.len() / chunk_size + 1);
    let mut current = String::new();
    let mut count = 0;

    for ch in message.chars() {
        current.push(ch);
        count += 1;
        if count == chunk_size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// 청크 재조립기 (수신측)
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: String,
    fragments: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 순서대로 전달된 청크 추가
    ///
    /// 마지막 청크면 완성된 메시지를 반환하고 버퍼를 비운다.
    pub fn push(&mut self, payload: &str, is_final: bool) -> Option<String> {
        self.buffer.push_str(payload);
        self.fragments += 1;

        if is_final {
            self.fragments = 0;
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// 조립 중인 청크 수
    pub fn pending_fragments(&self) -> usize {
        self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments == 0
    }
}
