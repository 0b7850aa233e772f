/// Buffered reply reader
///
/// Reads from the underlying stream only when the internal buffer is
/// exhausted. Every read assumes the bytes it asks for are coming: end of
/// stream in the middle of a frame is a framing error, never a short result.

use super::reply::Reply;
use super::DEFAULT_BUFFER_SIZE;
use crate::error::{ProtocolError, ShardwireResult};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Cap on the up-front allocation for an array header; larger arrays grow.
const MAX_PREALLOCATED_ITEMS: usize = 1024;

/// Largest bulk payload a server may announce (512 MiB)
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Cap on the up-front allocation for a bulk payload; larger ones grow as
/// bytes arrive.
const MAX_PREALLOCATED_BULK: usize = 64 * 1024;

pub struct RespReader<R> {
    inner: R,
    buf: Box<[u8]>,
    pos: usize,
    limit: usize,
}

impl<R: AsyncRead + Unpin> RespReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, inner)
    }

    pub fn with_capacity(capacity: usize, inner: R) -> Self {
        Self {
            inner,
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            pos: 0,
            limit: 0,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Bytes already pulled from the stream but not consumed yet
    pub fn buffered(&self) -> usize {
        self.limit - self.pos
    }

    async fn ensure_fill(&mut self) -> ShardwireResult<()> {
        if self.pos >= self.limit {
            let n = self.inner.read(&mut self.buf).await?;
            if n == 0 {
                return Err(ProtocolError::UnexpectedEof.into());
            }
            self.pos = 0;
            self.limit = n;
        }
        Ok(())
    }

    pub async fn read_byte(&mut self) -> ShardwireResult<u8> {
        self.ensure_fill().await?;
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    async fn expect_byte(&mut self, expected: u8) -> ShardwireResult<()> {
        let found = self.read_byte().await?;
        if found != expected {
            return Err(ProtocolError::MissingTerminator { found }.into());
        }
        Ok(())
    }

    /// Read up to the next `\r\n`, returning the line without the terminator.
    pub async fn read_line(&mut self) -> ShardwireResult<Vec<u8>> {
        self.ensure_fill().await?;

        // Fast path: the whole line, terminator included, is already buffered.
        let window = &self.buf[self.pos..self.limit];
        if let Some(cr) = window.iter().position(|&b| b == b'\r') {
            if cr + 1 < window.len() {
                let found = window[cr + 1];
                if found != b'\n' {
                    return Err(ProtocolError::MissingTerminator { found }.into());
                }
                let line = window[..cr].to_vec();
                self.pos += cr + 2;
                return Ok(line);
            }
        }

        let mut line = Vec::with_capacity(window.len());
        loop {
            let b = self.read_byte().await?;
            if b == b'\r' {
                // The \r may have been the last buffered byte; read_byte refills.
                self.expect_byte(b'\n').await?;
                return Ok(line);
            }
            line.push(b);
        }
    }

    /// Read a signed decimal integer terminated by `\r\n`.
    pub async fn read_integer(&mut self) -> ShardwireResult<i64> {
        let mut b = self.read_byte().await?;
        let negative = b == b'-';
        if negative {
            b = self.read_byte().await?;
        }

        let mut value: i64 = 0;
        let mut digits = 0usize;
        loop {
            match b {
                b'\r' => {
                    self.expect_byte(b'\n').await?;
                    break;
                }
                b'0'..=b'9' => {
                    // Negative values accumulate downwards so i64::MIN fits.
                    let digit = i64::from(b - b'0');
                    value = value
                        .checked_mul(10)
                        .and_then(|v| if negative { v.checked_sub(digit) } else { v.checked_add(digit) })
                        .ok_or_else(|| ProtocolError::InvalidInteger("overflow".to_string()))?;
                    digits += 1;
                }
                other => {
                    return Err(ProtocolError::InvalidInteger(format!(
                        "unexpected byte 0x{:02x}",
                        other
                    ))
                    .into());
                }
            }
            b = self.read_byte().await?;
        }

        if digits == 0 {
            return Err(ProtocolError::InvalidInteger("no digits".to_string()).into());
        }
        Ok(value)
    }

    /// Read exactly `len` payload bytes followed by `\r\n`.
    pub async fn read_bulk_bytes(&mut self, len: usize) -> ShardwireResult<Bytes> {
        if len > MAX_BULK_LEN {
            return Err(ProtocolError::BulkTooLarge(len).into());
        }
        let mut out = BytesMut::with_capacity(len.min(MAX_PREALLOCATED_BULK));
        while out.len() < len {
            self.ensure_fill().await?;
            let take = (len - out.len()).min(self.limit - self.pos);
            out.extend_from_slice(&self.buf[self.pos..self.pos + take]);
            self.pos += take;
        }
        self.expect_byte(b'\r').await?;
        self.expect_byte(b'\n').await?;
        Ok(out.freeze())
    }

    async fn read_length(&mut self) -> ShardwireResult<Option<usize>> {
        match self.read_integer().await? {
            -1 => Ok(None),
            n if n < 0 => Err(ProtocolError::InvalidLength(n).into()),
            n => Ok(Some(n as usize)),
        }
    }

    /// Read one complete reply, nested arrays included.
    pub async fn read_reply(&mut self) -> ShardwireResult<Reply> {
        // Arrays under construction: (items so far, expected item count)
        let mut open: Vec<(Vec<Reply>, usize)> = Vec::new();

        loop {
            let mut reply = match self.read_byte().await? {
                b'+' => Reply::Status(String::from_utf8_lossy(&self.read_line().await?).into_owned()),
                b'-' => Reply::Error(String::from_utf8_lossy(&self.read_line().await?).into_owned()),
                b':' => Reply::Integer(self.read_integer().await?),
                b'$' => match self.read_length().await? {
                    None => Reply::Nil,
                    Some(len) => Reply::Bulk(self.read_bulk_bytes(len).await?),
                },
                b'*' => match self.read_length().await? {
                    None => Reply::Nil,
                    Some(0) => Reply::Array(Vec::new()),
                    Some(len) => {
                        open.push((Vec::with_capacity(len.min(MAX_PREALLOCATED_ITEMS)), len));
                        continue;
                    }
                },
                other => return Err(ProtocolError::UnknownReplyType(other).into()),
            };

            loop {
                let Some((mut items, expected)) = open.pop() else {
                    return Ok(reply);
                };
                items.push(reply);
                if items.len() < expected {
                    open.push((items, expected));
                    break;
                }
                reply = Reply::Array(items);
            }
        }
    }
}
