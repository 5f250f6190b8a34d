use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::dashscope::DEFAULT_BASE_URL;
use crate::tts::DEFAULT_VOICE;

#[derive(Parser, Debug)]
#[clap(name = "recipe-voice", version, about = "Recipe generation and text-to-speech over DashScope")]
pub struct Args {
    #[clap(long, env = "DASHSCOPE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[clap(long, env = "DASHSCOPE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[clap(long, default_value = "qwen-plus")]
    pub chat_model: String,

    #[clap(long, default_value = "qwen-tts")]
    pub tts_model: String,

    #[clap(long, default_value_t = 500)]
    pub max_segment_chars: usize,

    #[clap(long, default_value = "logs")]
    pub log_dir: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        #[clap(long, default_value = "0.0.0.0")]
        host: String,

        #[clap(long, default_value_t = 5000)]
        port: u16,
    },

    /// Synthesize text into a WAV file
    Speak {
        text: String,

        #[clap(long, default_value = DEFAULT_VOICE)]
        voice: String,

        #[clap(long, default_value = "downloaded_audio.wav")]
        out: PathBuf,
    },

    /// Stream synthesized PCM into a file as it arrives
    StreamSpeak {
        text: String,

        #[clap(long, default_value = DEFAULT_VOICE)]
        voice: String,

        #[clap(long, default_value = "stream.pcm")]
        out: PathBuf,
    },

    /// Stream a chat completion to stdout
    Chat {
        prompt: String,

        #[clap(long, default_value = "you are a helpful assistant")]
        system: String,
    },

    /// Generate a recipe from ingredients
    Recipe {
        #[clap(required = true)]
        ingredients: Vec<String>,

        #[clap(long)]
        diet: Option<String>,

        #[clap(long)]
        goal: Option<String>,

        #[clap(long)]
        stream: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn recipe_collects_ingredients() {
        let args = Args::try_parse_from([
            "recipe-voice",
            "--api-key",
            "k",
            "recipe",
            "eggs",
            "spinach",
            "--diet",
            "vegetarian",
        ])
        .unwrap();
        match args.command {
            Command::Recipe {
                ingredients, diet, stream, ..
            } => {
                assert_eq!(ingredients, vec!["eggs", "spinach"]);
                assert_eq!(diet.as_deref(), Some("vegetarian"));
                assert!(!stream);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn defaults_apply() {
        let args = Args::try_parse_from(["recipe-voice", "--api-key", "k", "speak", "hi"]).unwrap();
        assert_eq!(args.max_segment_chars, 500);
        assert_eq!(args.tts_model, "qwen-tts");
        match args.command {
            Command::Speak { voice, out, .. } => {
                assert_eq!(voice, "Ethan");
                assert_eq!(out, PathBuf::from("downloaded_audio.wav"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
