//! Fuzz target for newline framing and request validation.
//!
//! The input is fed to the codec in two chunks, split at the first byte's
//! offset, so partial reads are exercised as well.

#![no_main]

use bytes::BytesMut;
use calc_relay::protocol::{LineCodec, Request};
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let split = data.first().map(|b| *b as usize % (data.len() + 1)).unwrap_or(0);
    let mut codec = LineCodec::with_max_frame_bytes(4096);
    let mut buf = BytesMut::new();

    for chunk in [&data[..split], &data[split..]] {
        buf.extend_from_slice(chunk);
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(frame)) => {
                    assert!(!frame.contains(&b'\n'));
                    if let Ok(value) = serde_json::from_slice(&frame) {
                        let _ = Request::from_value(value);
                    }
                }
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
    let _ = codec.decode_eof(&mut buf);
});
