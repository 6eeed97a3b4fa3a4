//! Streaming path against scripted transports: failures, deadlines, cancellation.

use bytes::Bytes;
use chat_relay::protocol::UpstreamPayload;
use chat_relay::transport::{Transport, TransportError};
use chat_relay::types::STREAM_TIMEOUT;
use chat_relay::{BoxStream, CompletionClient, CompletionRequest, RequestBuilder};
use futures::{stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HELLO: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n";

/// Flips a flag when the upstream body is dropped, i.e. the connection released.
struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Hands out one prepared body per `open_stream` call.
struct Scripted {
    body: Mutex<Option<chat_relay::Result<BoxStream<'static, Bytes>>>>,
}

impl Scripted {
    fn new(body: chat_relay::Result<BoxStream<'static, Bytes>>) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(Some(body)),
        })
    }
}

#[async_trait::async_trait]
impl Transport for Scripted {
    async fn send(&self, _payload: &UpstreamPayload) -> chat_relay::Result<String> {
        Ok(String::new())
    }

    async fn open_stream(
        &self,
        _payload: &UpstreamPayload,
    ) -> chat_relay::Result<BoxStream<'static, Bytes>> {
        self.body
            .lock()
            .unwrap()
            .take()
            .expect("open_stream called once")
    }
}

fn tracked(
    body: impl futures::Stream<Item = chat_relay::Result<Bytes>> + Send + 'static,
) -> (BoxStream<'static, Bytes>, Arc<AtomicBool>) {
    let released = Arc::new(AtomicBool::new(false));
    let guard = ReleaseFlag(Arc::clone(&released));
    let body = body.map(move |item| {
        let _held = &guard;
        item
    });
    (Box::pin(body), released)
}

fn client(transport: Arc<Scripted>) -> CompletionClient {
    CompletionClient::new(transport, Duration::from_secs(60), Duration::from_secs(120))
}

fn payload() -> UpstreamPayload {
    RequestBuilder::new("gpt-4.1-mini", 0.2, 1500)
        .build(&CompletionRequest::from_prompt("stream please"), true)
        .unwrap()
}

fn reset() -> chat_relay::Error {
    TransportError::Other("connection reset by peer".into()).into()
}

#[tokio::test]
async fn test_failure_before_any_token_is_exactly_one_sentinel() {
    let body = stream::iter(vec![Err(reset())]);
    let (body, _) = tracked(body);
    let tokens: Vec<String> = client(Scripted::new(Ok(body)))
        .send_stream(payload())
        .collect()
        .await;

    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].starts_with("[[ERROR: "), "{}", tokens[0]);
    assert!(tokens[0].contains("connection reset by peer"));
}

#[tokio::test]
async fn test_failure_after_tokens_ends_with_sentinel() {
    let body = stream::iter(vec![
        Ok(Bytes::from_static(HELLO.as_bytes())),
        Err(reset()),
        Ok(Bytes::from_static(HELLO.as_bytes())),
    ]);
    let (body, _) = tracked(body);
    let tokens: Vec<String> = client(Scripted::new(Ok(body)))
        .send_stream(payload())
        .collect()
        .await;

    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0], "Hello");
    assert!(tokens[1].starts_with("[[ERROR: "));
}

#[tokio::test]
async fn test_setup_failure_is_one_sentinel() {
    let tokens: Vec<String> = client(Scripted::new(Err(reset())))
        .send_stream(payload())
        .collect()
        .await;
    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].starts_with("[[ERROR: "));
}

#[tokio::test(start_paused = true)]
async fn test_silent_stream_times_out_and_releases_connection() {
    let (body, released) = tracked(stream::pending());
    let tokens: Vec<String> = client(Scripted::new(Ok(body)))
        .send_stream(payload())
        .collect()
        .await;

    assert_eq!(tokens, vec![STREAM_TIMEOUT]);
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_is_not_renewed_per_chunk() {
    // A token every 50s keeps the stream alive forever; the 120s bound must still end it.
    let body = stream::unfold((), |_| async {
        tokio::time::sleep(Duration::from_secs(50)).await;
        Some((Ok(Bytes::from_static(HELLO.as_bytes())), ()))
    });
    let (body, released) = tracked(body);
    let tokens: Vec<String> = client(Scripted::new(Ok(body)))
        .send_stream(payload())
        .collect()
        .await;

    assert_eq!(tokens, vec!["Hello", "Hello", STREAM_TIMEOUT]);
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dropping_consumer_releases_connection() {
    let body = stream::iter(vec![Ok(Bytes::from_static(HELLO.as_bytes()))])
        .chain(stream::pending());
    let (body, released) = tracked(body);
    let mut tokens = client(Scripted::new(Ok(body))).send_stream(payload());

    assert_eq!(tokens.next().await.as_deref(), Some("Hello"));
    assert!(!released.load(Ordering::SeqCst));

    drop(tokens);
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_tokens_preserve_upstream_order() {
    let chunks: Vec<chat_relay::Result<Bytes>> = (0..50)
        .map(|i| {
            Ok(Bytes::from(format!(
                "data: {{\"choices\":[{{\"delta\":{{\"content\":\"t{}\"}}}}]}}\n\n",
                i
            )))
        })
        .collect();
    let (body, _) = tracked(stream::iter(chunks));
    let tokens: Vec<String> = client(Scripted::new(Ok(body)))
        .send_stream(payload())
        .collect()
        .await;

    let expected: Vec<String> = (0..50).map(|i| format!("t{}", i)).collect();
    assert_eq!(tokens, expected);
}
