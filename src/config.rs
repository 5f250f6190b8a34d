use std::path::PathBuf;

use crate::args::Args;

/// Provider and pipeline settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub tts_model: String,
    pub max_segment_chars: usize,
    pub log_dir: PathBuf,
}

impl Settings {
    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let api_key = args
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "API key is required. Pass --api-key or set the DASHSCOPE_API_KEY environment variable."
                )
            })?
            .to_string();

        if args.max_segment_chars == 0 {
            anyhow::bail!("--max-segment-chars must be greater than zero");
        }

        Ok(Self {
            api_key,
            base_url: args.base_url.clone(),
            chat_model: args.chat_model.clone(),
            tts_model: args.tts_model.clone(),
            max_segment_chars: args.max_segment_chars,
            log_dir: args.log_dir.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["recipe-voice"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["chat", "hi"]);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let mut args = parse(&[]);
        args.api_key = None;
        let err = Settings::from_args(&args).unwrap_err();
        assert!(err.to_string().contains("API key is required"));
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let args = parse(&["--api-key", "   "]);
        assert!(Settings::from_args(&args).is_err());
    }

    #[test]
    fn zero_segment_length_is_rejected() {
        let args = parse(&["--api-key", "k", "--max-segment-chars", "0"]);
        assert!(Settings::from_args(&args).is_err());
    }

    #[test]
    fn settings_copy_arguments() {
        let args = parse(&["--api-key", "sk-1", "--tts-model", "qwen-tts-latest"]);
        let settings = Settings::from_args(&args).unwrap();
        assert_eq!(settings.api_key, "sk-1");
        assert_eq!(settings.tts_model, "qwen-tts-latest");
        assert_eq!(settings.chat_model, "qwen-plus");
        assert_eq!(settings.log_dir, PathBuf::from("logs"));
    }
}
