mod args;
mod audio;
mod call_log;
mod config;
mod dashscope;
mod error;
mod generation;
mod pipeline;
mod recipe;
mod server;
mod tts;
mod utils;

use std::io::Write;
use std::path::Path;

use clap::Parser;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::args::{Args, Command};
use crate::audio::wav_duration_seconds;
use crate::config::Settings;
use crate::dashscope::DashScopeClient;
use crate::generation::{ChatModel, DashScopeChat, Message};
use crate::recipe::{RecipeEvent, RecipeRequest};
use crate::server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::from_args(&args)?;
    info!(
        "Using {} (chat: {}, tts: {})",
        settings.base_url, settings.chat_model, settings.tts_model
    );

    match args.command {
        Command::Serve { host, port } => {
            let state = AppState::from_settings(&settings);
            server::serve(state, &host, port).await?;
        }
        Command::Speak { text, voice, out } => {
            speak(&settings, &text, &voice, &out).await?;
        }
        Command::StreamSpeak { text, voice, out } => {
            stream_speak(&settings, &text, &voice, &out).await?;
        }
        Command::Chat { prompt, system } => {
            chat(&settings, &system, &prompt).await?;
        }
        Command::Recipe {
            ingredients,
            diet,
            goal,
            stream,
        } => {
            let request = RecipeRequest {
                ingredients,
                dietary_preference: diet,
                goal,
            };
            recipe(&settings, &request, stream).await?;
        }
    }

    Ok(())
}

async fn speak(settings: &Settings, text: &str, voice: &str, out: &Path) -> anyhow::Result<()> {
    let state = AppState::from_settings(settings);
    match state.tts.synthesize_to_file(text, voice, out).await {
        Ok(path) => {
            let secs = wav_duration_seconds(&path)?;
            info!("Audio saved to {} ({:.2} seconds)", path.display(), secs);
            Ok(())
        }
        Err(e) => {
            error!("Speech synthesis failed: {}", e);
            Err(e.into())
        }
    }
}

async fn stream_speak(
    settings: &Settings,
    text: &str,
    voice: &str,
    out: &Path,
) -> anyhow::Result<()> {
    let state = AppState::from_settings(settings);
    let mut file = tokio::fs::File::create(out).await?;
    let mut chunks = state.tts.synthesize_stream(text, voice);

    let mut total = 0usize;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        total += chunk.len();
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    info!(
        "Wrote {} bytes of 16-bit mono PCM to {}",
        total,
        out.display()
    );
    Ok(())
}

async fn chat(settings: &Settings, system: &str, prompt: &str) -> anyhow::Result<()> {
    let client = DashScopeClient::new(&settings.api_key, &settings.base_url);
    let model = DashScopeChat::new(client, &settings.chat_model);
    let messages = [Message::system(system), Message::user(prompt)];

    let mut deltas = model.complete_stream(&messages).await?;
    let mut stdout = std::io::stdout();
    let mut full = String::new();
    while let Some(delta) = deltas.next().await {
        let delta = delta?;
        full.push_str(&delta);
        write!(stdout, "{}", delta)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    info!("Received {} chars", full.chars().count());
    Ok(())
}

async fn recipe(settings: &Settings, request: &RecipeRequest, stream: bool) -> anyhow::Result<()> {
    let state = AppState::from_settings(settings);

    let recipe = if stream {
        let mut events = state.recipes.generate_stream(request);
        let mut parsed = None;
        let mut stdout = std::io::stdout();
        while let Some(event) = events.next().await {
            match event? {
                RecipeEvent::Chunk(chunk) => {
                    write!(stdout, "{}", chunk)?;
                    stdout.flush()?;
                }
                RecipeEvent::Done(recipe) => parsed = Some(recipe),
            }
        }
        writeln!(stdout)?;
        parsed.ok_or_else(|| anyhow::anyhow!("recipe stream ended without a result"))?
    } else {
        state.recipes.generate(request).await?
    };

    println!("{}", serde_json::to_string_pretty(&recipe)?);
    Ok(())
}
