use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use hearo_ai::config::Config;
use hearo_ai::moderation::{download, ModerationService};
use hearo_ai::transcription::TranscriptionService;
use hearo_ai::web;

/// Hearo AI: Korean toxic-speech moderation and speech-to-text server.
///
/// Wraps the UnSmile toxicity classifier and a whisper speech recognizer
/// behind a small HTTP API, plus one-shot commands for local use.
#[derive(Parser)]
#[command(name = "hearo-ai", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Port to listen on
        #[arg(long, default_value = "8000")]
        port: u16,
    },

    /// Moderate a piece of text and print the verdict
    Moderate {
        /// The text to classify
        text: String,
    },

    /// Transcribe an audio file and print the transcript
    Transcribe {
        /// Path to the audio file
        file: PathBuf,
    },

    /// Download the moderation and speech models
    DownloadModels,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hearo_ai=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, port } => {
            let config = Config::load()?;
            require_models(&config)?;

            // Both models load before the listener binds: the process
            // never serves traffic it cannot handle.
            info!("Loading models from {}", config.model_dir.display());
            let moderation = Arc::new(ModerationService::load(&config)?);
            let transcription = Arc::new(TranscriptionService::load(&config)?);

            web::run_server(
                moderation,
                transcription,
                &config.cors_allow_origins,
                &bind,
                port,
            )
            .await?;
        }

        Commands::Moderate { text } => {
            let config = Config::load()?;
            let moderation = ModerationService::load(&config)?;
            let result = moderation.moderate(&text).await?;

            let verdict = if result.toxic {
                format!("TOXIC ({})", result.top_label).red().bold()
            } else {
                "CLEAN".green().bold()
            };
            println!("\n  {verdict}  risk {:.3}", result.risk_max);
            for (label, score) in &result.scores {
                println!("    {score:.3}  {label}");
            }
        }

        Commands::Transcribe { file } => {
            let config = Config::load()?;
            let transcription = TranscriptionService::load(&config)?;

            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("audio")
                .to_string();

            let result = transcription.transcribe(bytes, &filename).await?;

            println!("\n{}", result.text.bold());
            println!();
            for segment in &result.segments {
                println!(
                    "  [{:>7.2} - {:>7.2}] {}",
                    segment.start, segment.end, segment.text
                );
            }
            match result.duration {
                Some(duration) => println!(
                    "\n  language: {}  duration: {duration:.1}s",
                    result.language
                ),
                None => println!("\n  language: {}", result.language),
            }
        }

        Commands::DownloadModels => {
            let config = Config::load()?;
            download::download_models(&config.model_dir, &config.whisper_model).await?;
            println!("\nAll models ready under {}", config.model_dir.display());
        }
    }

    Ok(())
}

/// Check that all model files are present before loading anything heavy,
/// so the operator gets one actionable message instead of a partial load.
fn require_models(config: &Config) -> Result<()> {
    let unsmile = download::unsmile_files_present(&config.model_dir);
    let whisper = download::whisper_file_present(&config.model_dir, &config.whisper_model);
    if !unsmile || !whisper {
        anyhow::bail!(
            "Model files not found in {}\nRun `hearo-ai download-models` first.",
            config.model_dir.display()
        );
    }
    Ok(())
}
