use std::pin::Pin;

use async_stream::try_stream;
use async_trait::async_trait;
use base64::Engine;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::dashscope::{DashScopeClient, event_json, sse_events};
use crate::error::{Result, TtsError};

pub const DEFAULT_VOICE: &str = "Ethan";

/// Lazy sequence of raw PCM chunks for one piece of text.
pub type AudioChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// A hosted text-to-speech engine.
#[async_trait]
pub trait SpeechClient: Send + Sync {
    /// Model identifier, recorded in the call log.
    fn model(&self) -> &str;

    /// Synthesize `text` and return a URL for the finished audio.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<String>;

    /// Synthesize `text`, returning PCM chunks as the provider produces them.
    async fn synthesize_stream(&self, text: &str, voice: &str) -> Result<AudioChunkStream>;

    /// Fetch the audio behind a URL returned by [`SpeechClient::synthesize`].
    async fn download(&self, locator: &str) -> Result<Vec<u8>>;
}

const SPEECH_PATH: &str = "/services/aigc/multimodal-generation/generation";

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    #[serde(default)]
    output: Option<SpeechOutput>,
}

#[derive(Debug, Deserialize)]
struct SpeechOutput {
    #[serde(default)]
    audio: Option<SpeechAudio>,
}

#[derive(Debug, Deserialize)]
struct SpeechAudio {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

impl SpeechResponse {
    fn audio(self) -> Option<SpeechAudio> {
        self.output.and_then(|o| o.audio)
    }
}

/// Decode the base64 PCM carried by one streamed speech event.
fn decode_chunk(response: SpeechResponse) -> Result<Vec<u8>> {
    let data = response
        .audio()
        .and_then(|a| a.data)
        .ok_or_else(|| TtsError::speech("Failed to generate speech chunk: no audio data"))?;
    base64::engine::general_purpose::STANDARD
        .decode(data.as_bytes())
        .map_err(|e| TtsError::speech(format!("Failed to decode speech chunk: {}", e)))
}

/// qwen-tts through the DashScope multimodal generation endpoint.
pub struct DashScopeSpeech {
    client: DashScopeClient,
    model: String,
}

impl DashScopeSpeech {
    pub fn new(client: DashScopeClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn request_body(&self, text: &str, voice: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "input": {
                "text": text,
                "voice": voice,
            },
        })
    }
}

#[async_trait]
impl SpeechClient for DashScopeSpeech {
    fn model(&self) -> &str {
        &self.model
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<String> {
        let body = self.request_body(text, voice);
        let response: SpeechResponse = self
            .client
            .post(SPEECH_PATH, &body, false, TtsError::speech)
            .await?
            .json()
            .await
            .map_err(|e| TtsError::speech(format!("malformed speech response: {}", e)))?;

        match response.audio().and_then(|a| a.url) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => {
                error!("Speech response carried no audio url");
                Err(TtsError::speech("Failed to generate speech: no audio url"))
            }
        }
    }

    async fn synthesize_stream(&self, text: &str, voice: &str) -> Result<AudioChunkStream> {
        let body = self.request_body(text, voice);
        let response = self
            .client
            .post(SPEECH_PATH, &body, true, TtsError::speech)
            .await?;

        let stream = try_stream! {
            let mut events = Box::pin(sse_events(response, TtsError::speech));
            while let Some(event) = events.next().await {
                let event = event?;
                let chunk = decode_chunk(event_json(&event, TtsError::speech)?)?;
                // The closing event carries the url and no samples.
                if !chunk.is_empty() {
                    yield chunk;
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn download(&self, locator: &str) -> Result<Vec<u8>> {
        debug!("Downloading audio from {}", locator);
        let response = self
            .client
            .http()
            .get(locator)
            .send()
            .await
            .map_err(|e| TtsError::download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TtsError::download(format!("{} returned {}", locator, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::download(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashscope::tests::serve_locally;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode, header},
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::Value;

    const STREAM_BODY: &str = concat!(
        "id:1\nevent:result\n:HTTP_STATUS/200\n",
        "data:{\"output\":{\"audio\":{\"data\":\"AAE=\",\"url\":\"\"}}}\n\n",
        "id:2\nevent:result\n:HTTP_STATUS/200\n",
        "data:{\"output\":{\"audio\":{\"data\":\"AgM=\",\"url\":\"\"}}}\n\n",
        "id:3\nevent:result\n:HTTP_STATUS/200\n",
        "data:{\"output\":{\"finish_reason\":\"stop\",\"audio\":{\"data\":\"\",\"url\":\"http://audio/final.wav\"}}}\n\n",
    );

    /// Local stand-in for the speech endpoint and its audio host.
    async fn speech_server() -> (DashScopeSpeech, String) {
        let router = Router::new()
            .route(
                SPEECH_PATH,
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    if body["input"]["text"] == "reject me" {
                        let error = json!({
                            "code": "InvalidParameter",
                            "message": "Input text is invalid.",
                        });
                        return (StatusCode::BAD_REQUEST, Json(error)).into_response();
                    }
                    if headers.contains_key("x-dashscope-sse") {
                        return ([(header::CONTENT_TYPE, "text/event-stream")], STREAM_BODY)
                            .into_response();
                    }
                    Json(json!({
                        "output": {"audio": {"url": "http://audio/seg.wav", "id": "a-1"}},
                        "request_id": "r-1",
                    }))
                    .into_response()
                }),
            )
            .route("/audio/seg.wav", get(|| async { vec![1u8, 2, 3] }));
        let base = serve_locally(router).await;
        let client = DashScopeClient::new("sk-test", base.clone());
        (DashScopeSpeech::new(client, "qwen-tts"), base)
    }

    #[tokio::test]
    async fn synthesize_returns_audio_url() {
        let (speech, _) = speech_server().await;
        let url = speech.synthesize("hello", "Ethan").await.unwrap();
        assert_eq!(url, "http://audio/seg.wav");
    }

    #[tokio::test]
    async fn provider_rejection_is_a_speech_error() {
        let (speech, _) = speech_server().await;
        let err = speech.synthesize("reject me", "Ethan").await.unwrap_err();
        assert!(matches!(err, TtsError::SpeechClient { .. }));
        assert_eq!(
            err.to_string(),
            "Speech synthesis failed: Error: InvalidParameter - Input text is invalid. (400 Bad Request)"
        );

        let err = speech.synthesize_stream("reject me", "Ethan").await.err().unwrap();
        assert!(matches!(err, TtsError::SpeechClient { .. }));
    }

    #[tokio::test]
    async fn streamed_chunks_are_decoded_and_closing_event_is_skipped() {
        let (speech, _) = speech_server().await;
        let chunks: Vec<Vec<u8>> = speech
            .synthesize_stream("hello", "Ethan")
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec![vec![0u8, 1], vec![2u8, 3]]);
    }

    #[tokio::test]
    async fn download_fetches_audio_bytes() {
        let (speech, base) = speech_server().await;
        let audio = speech.download(&format!("{}/audio/seg.wav", base)).await.unwrap();
        assert_eq!(audio, vec![1u8, 2, 3]);
    }

    #[tokio::test]
    async fn missing_audio_is_a_download_error() {
        let (speech, base) = speech_server().await;
        let err = speech
            .download(&format!("{}/audio/missing.wav", base))
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Download { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn unreachable_audio_host_is_a_download_error() {
        let (speech, _) = speech_server().await;
        let err = speech.download("http://127.0.0.1:1/seg.wav").await.unwrap_err();
        assert!(matches!(err, TtsError::Download { .. }));
    }

    fn parse(raw: &str) -> SpeechResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn chunk_is_base64_decoded() {
        let response = parse(r#"{"output":{"audio":{"data":"AAECAw==","url":""}}}"#);
        assert_eq!(decode_chunk(response).unwrap(), vec![0u8, 1, 2, 3]);
    }

    #[test]
    fn missing_audio_data_is_a_chunk_failure() {
        let response = parse(r#"{"output":{"finish_reason":"stop"}}"#);
        let err = decode_chunk(response).unwrap_err();
        assert!(matches!(err, TtsError::SpeechClient { .. }));
    }

    #[test]
    fn invalid_base64_is_a_chunk_failure() {
        let response = parse(r#"{"output":{"audio":{"data":"not base64!"}}}"#);
        assert!(decode_chunk(response).is_err());
    }

    #[test]
    fn empty_data_decodes_to_empty_chunk() {
        let response = parse(r#"{"output":{"audio":{"data":"","url":"https://x/a.wav"}}}"#);
        assert!(decode_chunk(response).unwrap().is_empty());
    }

    #[test]
    fn request_body_names_model_and_voice() {
        let client = DashScopeClient::new("key", "http://localhost");
        let speech = DashScopeSpeech::new(client, "qwen-tts");
        let body = speech.request_body("hello", "Cherry");
        assert_eq!(body["model"], "qwen-tts");
        assert_eq!(body["input"]["text"], "hello");
        assert_eq!(body["input"]["voice"], "Cherry");
        assert_eq!(speech.model(), "qwen-tts");
    }
}
