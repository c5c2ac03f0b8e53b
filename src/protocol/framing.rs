//! Newline-delimited framing for the wire protocol.
//!
//! A frame is everything up to the first `\n`. The codec never looks at the
//! payload: JSON validity is a request-level concern handled by the caller.
//! Residue that is still unterminated when the peer closes is dropped.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, Framed};

/// Default upper bound for a single frame (1 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A byte stream wrapped in the line codec.
pub type FramedConnection<T> = Framed<T, LineCodec>;

/// Splits a byte stream on `\n` and writes frames back with one trailing `\n`.
///
/// Framing state lives in the codec instance, so each connection must own its
/// own codec.
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Index up to which the buffer is known to contain no newline.
    next_index: usize,
    max_frame_bytes: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            next_index: 0,
            max_frame_bytes: max_frame_bytes.max(1),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = FramingError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        loop {
            let newline = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            let Some(newline) = newline else {
                if buf.len() > self.max_frame_bytes {
                    return Err(FramingError::FrameTooLarge {
                        size: buf.len(),
                        max: self.max_frame_bytes,
                    });
                }
                self.next_index = buf.len();
                return Ok(None);
            };

            self.next_index = 0;
            let line = buf.split_to(newline + 1);
            if newline > self.max_frame_bytes {
                return Err(FramingError::FrameTooLarge {
                    size: newline,
                    max: self.max_frame_bytes,
                });
            }

            let payload = line[..newline].trim_ascii();
            if payload.is_empty() {
                continue;
            }
            return Ok(Some(Bytes::copy_from_slice(payload)));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if !buf.is_empty() {
            tracing::debug!(residue = buf.len(), "discarding unterminated frame at end of stream");
            buf.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = FramingError;

    fn encode(&mut self, frame: Bytes, dst: &mut BytesMut) -> Result<(), FramingError> {
        dst.reserve(frame.len() + 1);
        dst.put_slice(&frame);
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// Serialize a message as compact JSON. Non-ASCII text is written as UTF-8.
pub fn encode_frame(message: &Value) -> Bytes {
    Bytes::from(serde_json::to_vec(message).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_single_frame() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"{\"a\":1}\n"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), vec![Bytes::from_static(b"{\"a\":1}")]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_is_buffered() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"{\"mode\":\"calc\""[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b",\"data\":{}}\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"{\"mode\":\"calc\",\"data\":{}}");
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"one\ntwo\nthr"[..]);
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        assert_eq!(&buf[..], b"thr");
    }

    #[test]
    fn test_blank_lines_and_crlf_are_trimmed() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"\n  \r\n{}\r\n"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), vec![Bytes::from_static(b"{}")]);
    }

    #[test]
    fn test_eof_discards_residue() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"done\nhalf"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(Bytes::from_static(b"done")));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_residue_rejected() {
        let mut codec = LineCodec::with_max_frame_bytes(8);
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FramingError::FrameTooLarge { size: 10, max: 8 })
        ));
    }

    #[test]
    fn test_encode_appends_single_newline() {
        let mut codec = LineCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(encode_frame(&serde_json::json!({"ok": true})), &mut dst).unwrap();
        assert_eq!(&dst[..], b"{\"ok\":true}\n");
    }

    #[test]
    fn test_encode_keeps_non_ascii() {
        let frame = encode_frame(&serde_json::json!({"result": "שלום"}));
        assert_eq!(std::str::from_utf8(&frame).unwrap(), "{\"result\":\"שלום\"}");
    }
}
