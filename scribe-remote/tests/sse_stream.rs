//! Streamed completions decoded from arbitrarily split SSE bodies.

use futures::{stream, StreamExt};
use scribe_core::LlmError;
use scribe_remote::openai::sse_chunks;

fn body() -> String {
    [
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo \u{1F980}\"}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"after done\"}}]}\n\n",
    ]
    .concat()
}

async fn collect(parts: Vec<Result<Vec<u8>, String>>) -> Vec<Result<String, LlmError>> {
    sse_chunks(stream::iter(parts)).collect().await
}

#[tokio::test]
async fn every_split_point_yields_the_same_text() {
    let bytes = body().into_bytes();
    for split in 0..=bytes.len() {
        let parts = vec![Ok(bytes[..split].to_vec()), Ok(bytes[split..].to_vec())];
        let chunks = collect(parts).await;
        let text: String = chunks.into_iter().map(Result::unwrap).collect();
        assert_eq!(text, "Hello \u{1F980}", "split at {split}");
    }
}

#[tokio::test]
async fn byte_at_a_time() {
    let parts = body().into_bytes().into_iter().map(|b| Ok(vec![b])).collect();
    let chunks: Vec<String> = collect(parts).await.into_iter().map(Result::unwrap).collect();
    assert_eq!(chunks, ["Hel", "lo \u{1F980}"]);
}

#[tokio::test]
async fn transport_error_ends_the_stream_after_one_err() {
    let parts = vec![
        Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n".to_vec()),
        Err("connection reset".to_owned()),
        Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"tial\"}}]}\n".to_vec()),
    ];
    let chunks = collect(parts).await;
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], Ok("par".to_owned()));
    assert!(matches!(&chunks[1], Err(LlmError::Transport { message, .. }) if message.contains("connection reset")));
}

#[tokio::test]
async fn body_ending_without_done_still_finishes() {
    let parts = vec![Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}".to_vec())];
    let chunks = collect(parts).await;
    assert_eq!(chunks, [Ok("end".to_owned())]);
}
