use std::pin::Pin;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::dashscope::{DashScopeClient, event_json, sse_events};
use crate::error::{Result, TtsError};

/// Incremental text deltas from a chat model.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, messages: &[Message]) -> Result<String>;

    async fn complete_stream(&self, messages: &[Message]) -> Result<TextStream>;
}

const GENERATION_PATH: &str = "/services/aigc/text-generation/generation";

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    output: Option<GenerationOutput>,
}

#[derive(Debug, Deserialize)]
struct GenerationOutput {
    #[serde(default)]
    choices: Vec<GenerationChoice>,
}

#[derive(Debug, Deserialize)]
struct GenerationChoice {
    message: Message,
}

impl GenerationResponse {
    fn content(self) -> Result<String> {
        self.output
            .and_then(|o| o.choices.into_iter().next())
            .map(|c| c.message.content)
            .ok_or_else(|| TtsError::generation("response has no choices"))
    }
}

/// qwen-plus (or any DashScope text model) in `message` result format.
pub struct DashScopeChat {
    client: DashScopeClient,
    model: String,
}

impl DashScopeChat {
    pub fn new(client: DashScopeClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn request_body(&self, messages: &[Message], stream: bool) -> serde_json::Value {
        let mut parameters = json!({ "result_format": "message" });
        if stream {
            parameters["incremental_output"] = json!(true);
        }
        json!({
            "model": self.model,
            "input": { "messages": messages },
            "parameters": parameters,
        })
    }
}

#[async_trait]
impl ChatModel for DashScopeChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let body = self.request_body(messages, false);
        let response: GenerationResponse = self
            .client
            .post(GENERATION_PATH, &body, false, TtsError::generation)
            .await?
            .json()
            .await
            .map_err(|e| TtsError::generation(format!("malformed response: {}", e)))?;
        response.content()
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TextStream> {
        let body = self.request_body(messages, true);
        let response = self
            .client
            .post(GENERATION_PATH, &body, true, TtsError::generation)
            .await?;

        let stream = try_stream! {
            let mut events = Box::pin(sse_events(response, TtsError::generation));
            while let Some(event) = events.next().await {
                let event = event?;
                let delta = event_json::<GenerationResponse>(&event, TtsError::generation)?.content()?;
                debug!("Received {} chars", delta.len());
                yield delta;
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_first_choice() {
        let raw = r#"{"output":{"choices":[{"finish_reason":"stop","message":{"role":"assistant","content":"Recipe name: Toast"}}]},"usage":{"total_tokens":9},"request_id":"r1"}"#;
        let response: GenerationResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.content().unwrap(), "Recipe name: Toast");
    }

    #[test]
    fn missing_choices_is_an_error() {
        let response: GenerationResponse = serde_json::from_str(r#"{"output":{}}"#).unwrap();
        assert!(matches!(
            response.content(),
            Err(TtsError::Generation { .. })
        ));
    }

    #[test]
    fn streaming_body_requests_incremental_output() {
        let chat = DashScopeChat::new(DashScopeClient::new("k", "http://localhost"), "qwen-plus");
        let messages = [Message::system("be brief"), Message::user("hi")];

        let body = chat.request_body(&messages, true);
        assert_eq!(body["model"], "qwen-plus");
        assert_eq!(body["input"]["messages"][1]["role"], "user");
        assert_eq!(body["parameters"]["result_format"], "message");
        assert_eq!(body["parameters"]["incremental_output"], true);

        let body = chat.request_body(&messages, false);
        assert!(body["parameters"].get("incremental_output").is_none());
    }
}
