use std::{
    io::{self, IsTerminal},
    sync::Arc,
};

use anyhow::Context;
use tokio::io::BufReader;
use tracing::{info, warn};

use server::{
    config::{OutputMode, ServerConfig},
    sink::OutputSink,
    Dispatcher,
};
use tts_core::{EncoderSettings, OggEncoder, PiperEngine, VoiceCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // stdout carries response frames, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = ServerConfig::from_env()?;
    let engine = Arc::new(PiperEngine::new(&config.espeak_data_path)?);

    let cache = Arc::new(match config.max_cached_voices {
        Some(limit) => {
            info!("Keeping at most {} voice(s) loaded", limit);
            VoiceCache::with_capacity_limit(engine, limit)
        }
        None => VoiceCache::new(engine),
    });

    let encoder = OggEncoder::new(EncoderSettings {
        quality: config.vorbis_quality,
        ..EncoderSettings::default()
    });

    let sink = match config.output_mode.resolve(io::stdout().is_terminal()) {
        OutputMode::Files => {
            std::fs::create_dir_all(&config.output_dir).with_context(|| {
                format!("Failed to create output directory {}", config.output_dir.display())
            })?;
            info!("Writing Ogg files to {}", config.output_dir.display());
            OutputSink::files(&config.output_dir)
        }
        _ => OutputSink::framed(io::stdout()),
    };

    let dispatcher = Dispatcher::new(cache, encoder, sink, config.encode_workers);
    dispatcher.run(BufReader::new(tokio::io::stdin())).await;

    let summary = dispatcher.metrics().snapshot();
    match serde_json::to_string(&summary) {
        Ok(json) => info!(dropped = summary.dropped(), "done: {json}"),
        Err(e) => warn!("done (summary unavailable: {e})"),
    }
    Ok(())
}
