//! Line framing over scripted partial reads and writes.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_test::io::Builder;
use tokio_util::codec::{Framed, FramedRead};

use calc_relay::protocol::{encode_frame, LineCodec, Mode, Request, Response};

#[tokio::test]
async fn test_request_split_across_reads() {
    let mock = Builder::new()
        .read(br#"{"mode":"calc""#)
        .wait(Duration::from_millis(10))
        .read(b",\"data\":{\"expr\":\"1+1\"},\"options\":{}}\n")
        .build();
    let mut frames = FramedRead::new(mock, LineCodec::new());

    let frame = frames.next().await.unwrap().unwrap();
    let request = Request::from_value(serde_json::from_slice(&frame).unwrap()).unwrap();
    assert_eq!(request.mode(), Mode::Calc);
    assert_eq!(request.payload(), "1+1");
    assert!(request.use_cache());

    assert!(frames.next().await.is_none());
}

#[tokio::test]
async fn test_many_frames_in_one_read() {
    let mock = Builder::new().read(b"{\"a\":1}\n\n{\"b\":2}\r\n{\"c\"").build();
    let mut frames = FramedRead::new(mock, LineCodec::new());

    assert_eq!(&frames.next().await.unwrap().unwrap()[..], b"{\"a\":1}");
    assert_eq!(&frames.next().await.unwrap().unwrap()[..], b"{\"b\":2}");
    // The unterminated tail is dropped at end of stream.
    assert!(frames.next().await.is_none());
}

#[tokio::test]
async fn test_byte_at_a_time() {
    let line = b"{\"mode\":\"gpt\",\"data\":{\"prompt\":\"hi\"}}\n";
    let mut builder = Builder::new();
    for byte in line.iter() {
        builder.read(std::slice::from_ref(byte));
    }
    let mut frames = FramedRead::new(builder.build(), LineCodec::new());

    let frame = frames.next().await.unwrap().unwrap();
    assert_eq!(&frame[..], &line[..line.len() - 1]);
}

#[tokio::test]
async fn test_response_written_with_single_newline() {
    let response = Response::success(json!("héllo"), false, 3).to_value();
    let expected = b"{\"meta\":{\"from_cache\":false,\"took_ms\":3},\"ok\":true,\"result\":\"h\xc3\xa9llo\"}\n";

    let mock = Builder::new().write(expected).build();
    let mut framed = Framed::new(mock, LineCodec::new());
    framed.send(encode_frame(&response)).await.unwrap();
}

#[tokio::test]
async fn test_failure_frame_has_no_meta() {
    let mock = Builder::new()
        .write(b"{\"error\":\"Bad request: unknown mode\",\"ok\":false}\n")
        .build();
    let mut framed = Framed::new(mock, LineCodec::new());
    let failure = Response::failure("Bad request: unknown mode").to_value();
    framed.send(encode_frame(&failure)).await.unwrap();
}
