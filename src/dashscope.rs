//! Thin HTTP plumbing shared by the DashScope chat and speech clients.
//!
//! Streaming calls are answered with server-sent events; `SseDecoder` turns the
//! raw body into events regardless of how the bytes were split on the wire.

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, TtsError};

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    pub fn describe(&self) -> String {
        format!(
            "{} - {}",
            self.code.as_deref().unwrap_or("unknown"),
            self.message.as_deref().unwrap_or("no message")
        )
    }
}

#[derive(Clone)]
pub struct DashScopeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DashScopeClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// POST `body` to `path`, optionally asking for an SSE response.
    ///
    /// A non-success status is turned into an error through `fail`, carrying the
    /// provider's `code - message` when the body has one.
    pub async fn post(
        &self,
        path: &str,
        body: &Value,
        stream: bool,
        fail: fn(String) -> TtsError,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {} (stream = {})", url, stream);

        let mut request = self.http.post(&url).bearer_auth(&self.api_key).json(body);
        if stream {
            request = request.header("X-DashScope-SSE", "enable");
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ApiErrorBody>(&text) {
            Ok(body) => body.describe(),
            Err(_) => text,
        };
        Err(fail(format!("Error: {} ({})", detail, status)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn is_error(&self) -> bool {
        self.event.as_deref() == Some("error")
    }
}

/// Incremental server-sent-events parser.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed raw body bytes and collect every event they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.take_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush an event left without its terminating blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.take_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn take_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Events of an SSE response body, in arrival order.
///
/// A body that breaks off mid-stream is reported through `fail`.
pub fn sse_events(
    response: reqwest::Response,
    fail: fn(String) -> TtsError,
) -> impl Stream<Item = Result<SseEvent>> + Send {
    try_stream! {
        let mut decoder = SseDecoder::default();
        let mut body = response.bytes_stream();
        while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(|e| fail(format!("stream interrupted: {}", e)))?;
            for event in decoder.push(&bytes) {
                yield event;
            }
        }
        if let Some(event) = decoder.finish() {
            yield event;
        }
    }
}

/// Decode the `data` of an SSE event, surfacing provider error events through `fail`.
pub fn event_json<T>(event: &SseEvent, fail: fn(String) -> TtsError) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    if event.is_error() {
        let detail = serde_json::from_str::<ApiErrorBody>(&event.data)
            .map(|body| body.describe())
            .unwrap_or_else(|_| event.data.clone());
        return Err(fail(format!("Error: {}", detail)));
    }
    serde_json::from_str(&event.data).map_err(|e| fail(format!("malformed stream event: {}", e)))
}
