/// Decoded server replies

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// A single decoded reply frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple status (+OK\r\n)
    Status(String),
    /// Error (-ERR message\r\n)
    Error(String),
    /// Integer (:123\r\n)
    Integer(i64),
    /// Bulk bytes ($5\r\nhello\r\n)
    Bulk(Bytes),
    /// Null bulk or null array ($-1\r\n, *-1\r\n)
    Nil,
    /// Array of replies (*2\r\n...)
    Array(Vec<Reply>),
}

impl Reply {
    /// Check for a `+<expected>` status reply
    pub fn is_status(&self, expected: &str) -> bool {
        matches!(self, Reply::Status(s) if s.eq_ignore_ascii_case(expected))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Error message, if this is an error reply
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Reply::Error(message) => Some(message),
            _ => None,
        }
    }

    /// A demoted master rejects writes with `-READONLY ...`
    pub fn is_read_only_error(&self) -> bool {
        self.error_message()
            .map(|message| message.starts_with("READONLY"))
            .unwrap_or(false)
    }

    /// Payload of a bulk reply, or the text of a status reply
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(data) => Some(data),
            Reply::Status(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Encode this reply into wire format
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode this reply into an existing buffer
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::Status(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Error(s) => {
                buf.put_u8(b'-');
                buf.put_slice(s.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Integer(n) => {
                buf.put_u8(b':');
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Bulk(data) => {
                buf.put_u8(b'$');
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            Reply::Nil => buf.put_slice(b"$-1\r\n"),
            Reply::Array(items) => {
                buf.put_u8(b'*');
                buf.put_slice(items.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                for item in items {
                    item.encode_into(buf);
                }
            }
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "+{}", s),
            Reply::Error(s) => write!(f, "-{}", s),
            Reply::Integer(n) => write!(f, ":{}", n),
            Reply::Bulk(data) => write!(f, "${}", String::from_utf8_lossy(data)),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Array(items) => write!(f, "*{}", items.len()),
        }
    }
}
