//! Wire protocol shared by the compute server, the proxy and the client.
//!
//! TCP, newline-delimited JSON, UTF-8, no length prefix.

pub mod framing;
pub mod message;

pub use framing::{encode_frame, FramedConnection, FramingError, LineCodec, DEFAULT_MAX_FRAME_BYTES};
pub use message::{
    cache_disabled, cache_key, elapsed_ms, rewrite_provenance, Meta, Mode, Request, Response,
    ValidationError,
};
