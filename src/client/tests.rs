//! Tests for the API client over a scripted transport.

#![cfg(test)]

use super::*;
use crate::stream::{ChannelHandler, PREMATURE_CLOSE, SessionEvent, SessionState};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Transport that replays canned responses and records every request.
#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, ClientError>>>,
    streams: Mutex<VecDeque<Result<Vec<&'static str>, ClientError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    fn respond(self, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::copy_from_slice(body.as_bytes()),
        }));
        self
    }

    fn fail(self, err: ClientError) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    fn stream(self, chunks: Vec<&'static str>) -> Self {
        self.streams.lock().unwrap().push_back(Ok(chunks));
        self
    }

    fn stream_error(self, err: ClientError) -> Self {
        self.streams.lock().unwrap().push_back(Err(err));
        self
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted response left")
    }

    async fn open_stream(&self, request: &HttpRequest) -> Result<ByteStream, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted stream left")?;
        Ok(Box::pin(futures::stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))),
        )))
    }
}

fn status(code: u16, body: &str) -> ClientError {
    ClientError::Status {
        status: code,
        body: body.into(),
        retry_after: None,
    }
}

fn client(transport: &Arc<ScriptedTransport>) -> ApiClient {
    ApiClient::new(transport.clone())
        .with_policy(BackoffPolicy::new(Duration::from_millis(200), Duration::from_secs(5), 3))
}

#[tokio::test(start_paused = true)]
async fn test_get_retries_503_then_succeeds() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .respond(503, "busy")
            .respond(503, "busy")
            .respond(200, r#"{"items":["flour","yeast"]}"#),
    );
    let retries = Arc::new(AtomicU32::new(0));
    let counter = retries.clone();
    let options = client(&transport).default_options().with_on_retry(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let list: Value = client(&transport)
        .send_with(
            HttpRequest::new(Method::Get, "/api/grocery-lists/1"),
            &options,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(list, json!({"items": ["flour", "yeast"]}));
    assert_eq!(retries.load(Ordering::SeqCst), 2);
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_404_fails_without_retry() {
    let transport = Arc::new(
        ScriptedTransport::default().respond(404, r#"{"error":"Recipe not found"}"#),
    );

    let err = client(&transport)
        .get::<Value>("/api/recipes/99")
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(format_api_error(&err.to_string()), "HTTP 404: Recipe not found");
}

#[tokio::test(start_paused = true)]
async fn test_network_errors_retry_until_limit() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .fail(ClientError::Stream("connection reset".into()))
            .fail(ClientError::Stream("connection reset".into()))
            .fail(ClientError::Stream("connection reset".into()))
            .fail(ClientError::Stream("still down".into())),
    );

    let err = client(&transport).get::<Value>("/api/pantry").await.unwrap_err();

    assert!(matches!(err, ClientError::Stream(ref msg) if msg == "still down"));
    assert_eq!(transport.requests().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_retried() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .respond(429, "slow down")
            .respond(200, "[]"),
    );

    let recipes: Vec<Value> = client(&transport).get("/api/recipes").await.unwrap();

    assert!(recipes.is_empty());
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_for_single_call() {
    let transport = Arc::new(ScriptedTransport::default().respond(503, "busy"));

    let err = client(&transport)
        .send_with::<Value>(
            HttpRequest::new(Method::Post, "/api/meal-plans").with_body(json!({"week": 12})),
            &RetryOptions::none(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_post_put_delete_bodies() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .respond(201, r#"{"id":7,"name":"Shakshuka"}"#)
            .respond(200, r#"{"id":7,"name":"Green shakshuka"}"#)
            .respond(204, ""),
    );
    let api = client(&transport);

    let created: Value = api
        .post("/api/recipes", &json!({"name": "Shakshuka"}))
        .await
        .unwrap();
    let updated: Value = api
        .put("/api/recipes/7", &json!({"name": "Green shakshuka"}))
        .await
        .unwrap();
    api.delete::<()>("/api/recipes/7").await.unwrap();

    assert_eq!(created["id"], 7);
    assert_eq!(updated["name"], "Green shakshuka");

    let requests = transport.requests();
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].body, Some(json!({"name": "Shakshuka"})));
    assert_eq!(requests[1].method, Method::Put);
    assert_eq!(requests[2].method, Method::Delete);
    assert_eq!(requests[2].body, None);
}

#[tokio::test]
async fn test_decode_failure_not_retried() {
    let transport = Arc::new(ScriptedTransport::default().respond(200, "<html>oops</html>"));

    let err = client(&transport).get::<Value>("/api/pantry").await.unwrap_err();

    assert!(matches!(err, ClientError::Decode(_)));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_chat_streams_turn() {
    let transport = Arc::new(ScriptedTransport::default().stream(vec![
        "event: stream\ndata: {\"tok",
        "en\":\"Hi\"}\n\nevent: complete\n",
        "data: {}\n\n",
    ]));
    let (handler, mut rx) = ChannelHandler::channel();

    let outcome = client(&transport)
        .chat(&ChatRequest::new("hello"), handler, &CancellationToken::new())
        .await;

    assert_eq!(outcome.state, SessionState::Completed);
    assert_eq!(outcome.output.content, "Hi");
    assert_eq!(rx.recv().await, Some(SessionEvent::Token("Hi".into())));
    assert!(matches!(rx.recv().await, Some(SessionEvent::Complete(_))));

    let requests = transport.requests();
    assert_eq!(requests[0].path, DEFAULT_CHAT_PATH);
    assert_eq!(requests[0].body, Some(json!({"message": "hello"})));
}

#[tokio::test(start_paused = true)]
async fn test_chat_handshake_retried() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .stream_error(status(502, "bad gateway"))
            .stream(vec!["event: complete\ndata: {}\n\n"]),
    );
    let (handler, _rx) = ChannelHandler::channel();

    let outcome = client(&transport)
        .with_chat_path("/api/assistant/chat")
        .chat(&ChatRequest::new("hi"), handler, &CancellationToken::new())
        .await;

    assert_eq!(outcome.state, SessionState::Completed);
    assert_eq!(transport.requests().len(), 2);
    assert_eq!(transport.requests()[1].path, "/api/assistant/chat");
}

#[tokio::test]
async fn test_chat_handshake_rejected() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .stream_error(status(401, r#"{"error":{"message":"Session expired"}}"#)),
    );
    let (handler, mut rx) = ChannelHandler::channel();

    let outcome = client(&transport)
        .chat(&ChatRequest::new("hi"), handler, &CancellationToken::new())
        .await;

    assert_eq!(outcome.state, SessionState::Failed);
    assert_eq!(outcome.error.as_deref(), Some("HTTP 401: Session expired"));
    assert_eq!(
        rx.recv().await,
        Some(SessionEvent::Error("HTTP 401: Session expired".into()))
    );
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_chat_cancelled_before_start_is_silent() {
    let transport = Arc::new(ScriptedTransport::default());
    let (handler, mut rx) = ChannelHandler::channel();
    let token = CancellationToken::new();
    token.cancel();

    let outcome = client(&transport)
        .chat(&ChatRequest::new("hi"), handler, &token)
        .await;

    assert_eq!(outcome.state, SessionState::Cancelled);
    assert_eq!(outcome.error, None);
    assert!(rx.try_recv().is_err());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_chat_stream_ends_early() {
    let transport = Arc::new(
        ScriptedTransport::default().stream(vec!["event: stream\ndata: {\"token\":\"Half\"}\n\n"]),
    );
    let (handler, _rx) = ChannelHandler::channel();

    let outcome = client(&transport)
        .chat(&ChatRequest::new("hi"), handler, &CancellationToken::new())
        .await;

    assert_eq!(outcome.state, SessionState::Failed);
    assert_eq!(outcome.output.content, "Half");
    assert_eq!(outcome.error.as_deref(), Some(PREMATURE_CLOSE));
}
