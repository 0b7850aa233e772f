/// Buffered command writer

use super::DEFAULT_BUFFER_SIZE;
use crate::error::ShardwireResult;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Smallest buffer that still holds any `i64` plus its terminator.
const MIN_BUFFER_SIZE: usize = 32;

const fn digit_tens() -> [u8; 100] {
    let mut table = [0u8; 100];
    let mut i = 0;
    while i < 100 {
        table[i] = b'0' + (i / 10) as u8;
        i += 1;
    }
    table
}

const fn digit_ones() -> [u8; 100] {
    let mut table = [0u8; 100];
    let mut i = 0;
    while i < 100 {
        table[i] = b'0' + (i % 10) as u8;
        i += 1;
    }
    table
}

static DIGIT_TENS: [u8; 100] = digit_tens();
static DIGIT_ONES: [u8; 100] = digit_ones();

fn decimal_len(mut n: u64) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

/// Frames commands into an output buffer and writes it out when full or on
/// [`RespWriter::flush`].
pub struct RespWriter<W> {
    inner: W,
    buf: Box<[u8]>,
    count: usize,
}

impl<W: AsyncWrite + Unpin> RespWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, inner)
    }

    pub fn with_capacity(capacity: usize, inner: W) -> Self {
        Self {
            inner,
            buf: vec![0u8; capacity.max(MIN_BUFFER_SIZE)].into_boxed_slice(),
            count: 0,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Bytes framed but not yet written to the stream
    pub fn pending(&self) -> usize {
        self.count
    }

    async fn flush_buffer(&mut self) -> ShardwireResult<()> {
        if self.count > 0 {
            self.inner.write_all(&self.buf[..self.count]).await?;
            self.count = 0;
        }
        Ok(())
    }

    pub async fn write_byte(&mut self, b: u8) -> ShardwireResult<()> {
        if self.count == self.buf.len() {
            self.flush_buffer().await?;
        }
        self.buf[self.count] = b;
        self.count += 1;
        Ok(())
    }

    pub async fn write_bytes(&mut self, data: &[u8]) -> ShardwireResult<()> {
        if data.len() >= self.buf.len() {
            // Larger than the whole buffer: write it straight through.
            self.flush_buffer().await?;
            self.inner.write_all(data).await?;
            return Ok(());
        }
        if data.len() > self.buf.len() - self.count {
            self.flush_buffer().await?;
        }
        self.buf[self.count..self.count + data.len()].copy_from_slice(data);
        self.count += data.len();
        Ok(())
    }

    pub async fn write_crlf(&mut self) -> ShardwireResult<()> {
        if self.buf.len() - self.count < 2 {
            self.flush_buffer().await?;
        }
        self.buf[self.count] = b'\r';
        self.buf[self.count + 1] = b'\n';
        self.count += 2;
        Ok(())
    }

    /// Write a decimal integer followed by `\r\n`, digits emitted two at a
    /// time straight into the buffer.
    pub async fn write_int_crlf(&mut self, value: i64) -> ShardwireResult<()> {
        let negative = value < 0;
        let mut n = value.unsigned_abs();
        let digits = decimal_len(n);
        let needed = digits + usize::from(negative) + 2;
        if self.buf.len() - self.count < needed {
            self.flush_buffer().await?;
        }

        if negative {
            self.buf[self.count] = b'-';
            self.count += 1;
        }

        let mut pos = self.count + digits;
        while n >= 100 {
            let pair = (n % 100) as usize;
            n /= 100;
            self.buf[pos - 1] = DIGIT_ONES[pair];
            self.buf[pos - 2] = DIGIT_TENS[pair];
            pos -= 2;
        }
        let rest = n as usize;
        self.buf[pos - 1] = DIGIT_ONES[rest];
        if rest >= 10 {
            self.buf[pos - 2] = DIGIT_TENS[rest];
        }

        self.count += digits;
        self.buf[self.count] = b'\r';
        self.buf[self.count + 1] = b'\n';
        self.count += 2;
        Ok(())
    }

    /// Frame one command: `*<argc>\r\n` then `$<len>\r\n<arg>\r\n` per argument.
    pub async fn write_bulk_array<A: AsRef<[u8]>>(&mut self, args: &[A]) -> ShardwireResult<()> {
        self.write_byte(b'*').await?;
        self.write_int_crlf(args.len() as i64).await?;
        for arg in args {
            let arg = arg.as_ref();
            self.write_byte(b'$').await?;
            self.write_int_crlf(arg.len() as i64).await?;
            self.write_bytes(arg).await?;
            self.write_crlf().await?;
        }
        Ok(())
    }

    /// Write out everything buffered and flush the stream.
    pub async fn flush(&mut self) -> ShardwireResult<()> {
        self.flush_buffer().await?;
        self.inner.flush().await?;
        Ok(())
    }
}
