/// Wire codec for the line/length-prefixed request-reply protocol
///
/// `RespReader` decodes replies and `RespWriter` frames commands, each over
/// its own fixed-size buffer on top of a tokio byte stream. Neither side
/// applies timeouts; those belong to the transport.

pub mod reader;
pub mod reply;
pub mod writer;

pub use reader::RespReader;
pub use reply::Reply;
pub use writer::RespWriter;

/// Default size of the read and write buffers
pub const DEFAULT_BUFFER_SIZE: usize = 8192;
