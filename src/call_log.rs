//! Per-day JSON journal of provider calls.
//!
//! Every call appends one record to `<dir>/<kind>_YYYYMMDD.json`, a pretty-printed
//! JSON array. Journal failures are logged and never reach the caller. File
//! access runs on the blocking pool so async callers are never stalled by it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

/// What happened to one speech synthesis attempt.
#[derive(Debug, Clone, Copy)]
pub enum TtsOutcome<'a> {
    Url(&'a str),
    Streamed { bytes: usize },
    Failed(&'a str),
}

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

pub struct CallLog {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl CallLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("Cannot create call log directory {}: {}", dir.display(), e);
        }
        Self {
            dir,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn log_tts(&self, input: &str, voice: &str, model: &str, outcome: TtsOutcome<'_>) {
        let now = Local::now();
        let mut entry = LogEntry {
            timestamp: now.to_rfc3339(),
            kind: "tts",
            model,
            voice: Some(voice),
            input: Value::String(input.to_string()),
            output_url: None,
            output_size: None,
            output: None,
            error: None,
        };
        match outcome {
            TtsOutcome::Url(url) => entry.output_url = Some(url),
            TtsOutcome::Streamed { bytes } => entry.output_size = Some(bytes),
            TtsOutcome::Failed(reason) => entry.error = Some(reason),
        }

        self.append("tts", &now, &entry).await;
        info!("TTS API Call - Model: {}, Voice: {}", model, voice);
    }

    pub async fn log_text_generation(&self, input: Value, output: &str, model: &str) {
        let now = Local::now();
        let entry = LogEntry {
            timestamp: now.to_rfc3339(),
            kind: "text_generation",
            model,
            voice: None,
            input,
            output_url: None,
            output_size: None,
            output: Some(output),
            error: None,
        };

        self.append("text_generation", &now, &entry).await;
        info!("Text Generation API Call - Model: {}", model);
    }

    fn log_path(&self, kind: &str, at: &DateTime<Local>) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", kind, at.format("%Y%m%d")))
    }

    async fn append(&self, kind: &str, at: &DateTime<Local>, entry: &LogEntry<'_>) {
        let value = match serde_json::to_value(entry) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cannot serialize call log entry: {}", e);
                return;
            }
        };
        let path = self.log_path(kind, at);
        let lock = Arc::clone(&self.lock);

        let task = tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut entries = load_entries(&path);
            entries.push(value);

            let written = serde_json::to_string_pretty(&entries)
                .map_err(anyhow::Error::from)
                .and_then(|data| fs::write(&path, data).map_err(anyhow::Error::from));
            if let Err(e) = written {
                warn!("Cannot write call log {}: {}", path.display(), e);
            }
        });
        if let Err(e) = task.await {
            warn!("Call log write did not complete: {}", e);
        }
    }
}

/// Existing records, or none when the file is missing or unreadable.
fn load_entries(path: &Path) -> Vec<Value> {
    if !path.exists() {
        return Vec::new();
    }
    match fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data).unwrap_or_else(|_| {
            warn!("Call log {} is corrupted; starting a new one", path.display());
            Vec::new()
        }),
        Err(e) => {
            warn!("Cannot read call log {}: {}", path.display(), e);
            Vec::new()
        }
    }
}
