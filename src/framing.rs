//! 줄 단위 JSON 프레이밍
//!
//! 레코드 하나 = JSON 한 줄 (`\n` 종료). tokio 바이트 스트림이면 무엇이든 사용 가능.

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::message::ProtocolMessage;
use crate::{Error, Result};

/// 프레임 최대 크기
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// 프레임 읽기
#[derive(Debug)]
pub struct MessageReader<R> {
    inner: BufReader<R>,
    line: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: Vec::with_capacity(256),
        }
    }

    /// 다음 프레임 원문 (개행 제외). 스트림이 끝나면 `None`.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            self.line.clear();
            let limit = (MAX_FRAME_SIZE + 1) as u64;
            let n = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.line)
                .await?;

            if n == 0 {
                return Ok(None);
            }
            if self.line.last() != Some(&b'\n') {
                if n as u64 == limit {
                    return Err(Error::ProtocolViolation(format!(
                        "프레임 크기 초과: > {} bytes",
                        MAX_FRAME_SIZE
                    )));
                }
                // 개행 없이 스트림 종료된 마지막 프레임
                return Ok(Some(Bytes::copy_from_slice(&self.line)));
            }

            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
            // 빈 줄은 건너뜀
            if !self.line.is_empty() {
                return Ok(Some(Bytes::copy_from_slice(&self.line)));
            }
        }
    }

    /// 다음 레코드
    pub async fn read_message(&mut self) -> Result<Option<ProtocolMessage>> {
        match self.read_frame().await? {
            Some(frame) => Ok(Some(ProtocolMessage::from_slice(&frame)?)),
            None => Ok(None),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

/// 프레임 쓰기
#[derive(Debug)]
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    pub async fn write_message(&mut self, message: &ProtocolMessage) -> Result<()> {
        let frame = message.to_bytes()?;
        self.write_frame(frame).await
    }

    /// 인코딩된 프레임 전송 (개행 포함이어야 함)
    pub async fn write_frame(&mut self, frame: Bytes) -> Result<()> {
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
