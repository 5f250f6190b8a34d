use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;
use tracing::{error, info};

use crate::audio::combine_wav_payloads;
use crate::call_log::{CallLog, TtsOutcome};
use crate::error::{Result, TtsError};
use crate::tts::{AudioChunkStream, SpeechClient};
use crate::utils::segment_text;

/// Runs long text through a [`SpeechClient`] one segment at a time.
///
/// Segments are synthesized strictly in order and never concurrently; the first
/// failing segment aborts the whole request.
#[derive(Clone)]
pub struct TtsService {
    client: Arc<dyn SpeechClient>,
    log: Arc<CallLog>,
    max_segment_chars: usize,
}

impl TtsService {
    pub fn new(client: Arc<dyn SpeechClient>, log: Arc<CallLog>, max_segment_chars: usize) -> Self {
        Self {
            client,
            log,
            max_segment_chars,
        }
    }

    fn segments(&self, text: &str) -> Vec<String> {
        let segments = segment_text(text, self.max_segment_chars);
        info!(
            "Split {} chars into {} segments (max {} chars)",
            text.chars().count(),
            segments.len(),
            self.max_segment_chars
        );
        segments
    }

    /// One audio URL per non-blank segment, in segment order.
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<String>> {
        let segments = self.segments(text);
        let total = segments.len();
        let mut urls = Vec::with_capacity(total);

        for (i, segment) in segments.iter().enumerate() {
            if segment.trim().is_empty() {
                continue;
            }
            info!(
                "Synthesizing segment {}/{} ({} chars)",
                i + 1,
                total,
                segment.chars().count()
            );
            match self.client.synthesize(segment, voice).await {
                Ok(url) => {
                    self.log
                        .log_tts(segment, voice, self.client.model(), TtsOutcome::Url(&url))
                        .await;
                    urls.push(url);
                }
                Err(e) => {
                    error!("Segment {}/{} failed: {}", i + 1, total, e);
                    self.log.log_tts(
                        segment,
                        voice,
                        self.client.model(),
                        TtsOutcome::Failed(&e.to_string()),
                    )
                    .await;
                    return Err(e);
                }
            }
        }

        Ok(urls)
    }

    /// PCM chunks of every non-blank segment, concatenated in segment order.
    ///
    /// Nothing is requested until the stream is polled. An error ends the stream;
    /// chunks yielded before it stand.
    pub fn synthesize_stream(&self, text: &str, voice: &str) -> AudioChunkStream {
        let segments = self.segments(text);
        let client = Arc::clone(&self.client);
        let log = Arc::clone(&self.log);
        let voice = voice.to_string();

        Box::pin(try_stream! {
            let total = segments.len();
            for (i, segment) in segments.into_iter().enumerate() {
                if segment.trim().is_empty() {
                    continue;
                }
                info!(
                    "Streaming segment {}/{} ({} chars)",
                    i + 1,
                    total,
                    segment.chars().count()
                );

                let mut chunks = match client.synthesize_stream(&segment, &voice).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        error!("Segment {}/{} failed to open: {}", i + 1, total, e);
                        let reason = e.to_string();
                        log.log_tts(&segment, &voice, client.model(), TtsOutcome::Failed(&reason))
                            .await;
                        Err(e)?
                    }
                };

                let mut bytes = 0usize;
                while let Some(chunk) = chunks.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            error!("Segment {}/{} failed mid-stream: {}", i + 1, total, e);
                            let reason = e.to_string();
                            log.log_tts(&segment, &voice, client.model(), TtsOutcome::Failed(&reason))
                                .await;
                            Err(e)?
                        }
                    };
                    bytes += chunk.len();
                    yield chunk;
                }
                log.log_tts(&segment, &voice, client.model(), TtsOutcome::Streamed { bytes })
                    .await;
            }
        })
    }

    /// Synthesize `text` into a single WAV file at `output_path`.
    pub async fn synthesize_to_file(
        &self,
        text: &str,
        voice: &str,
        output_path: &Path,
    ) -> Result<PathBuf> {
        let urls = self.synthesize(text, voice).await?;
        if urls.is_empty() {
            return Err(TtsError::combine("text produced no audio"));
        }

        let mut payloads = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            let payload = self.client.download(url).await?;
            info!("Downloaded segment {} audio ({} bytes)", i + 1, payload.len());
            payloads.push(payload);
        }

        let output = output_path.to_path_buf();
        tokio::task::spawn_blocking(move || combine_wav_payloads(&payloads, &output))
            .await
            .map_err(|e| TtsError::combine(format!("combine task failed: {}", e)))?
    }
}
