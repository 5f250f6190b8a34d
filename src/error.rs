//! Error types for the synthesis and generation pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TtsError {
    /// The speech provider rejected a request or sent a chunk we could not use.
    #[error("Speech synthesis failed: {message}")]
    SpeechClient { message: String },

    #[error("Failed to download audio file: {message}")]
    Download { message: String },

    #[error("Failed to combine audio: {message}")]
    Combine { message: String },

    #[error("Text generation failed: {message}")]
    Generation { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TtsError {
    pub fn speech(message: impl Into<String>) -> Self {
        TtsError::SpeechClient {
            message: message.into(),
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        TtsError::Download {
            message: message.into(),
        }
    }

    pub fn combine(message: impl Into<String>) -> Self {
        TtsError::Combine {
            message: message.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        TtsError::Generation {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TtsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn speech_error_display() {
        let error = TtsError::speech("missing audio url");
        assert_eq!(error.to_string(), "Speech synthesis failed: missing audio url");
    }

    #[test]
    fn download_error_display() {
        let error = TtsError::download("404 Not Found");
        assert_eq!(
            error.to_string(),
            "Failed to download audio file: 404 Not Found"
        );
    }

    #[test]
    fn io_error_converts() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "gone");
        let error: TtsError = io_error.into();
        assert!(matches!(error, TtsError::Io(_)));
        assert!(error.to_string().contains("gone"));
    }
}
