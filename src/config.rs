use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Default CORS allow-list: the Vite dev server on localhost, both spellings.
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

/// Central configuration loaded from environment variables.
///
/// Everything is read once at startup; services receive their settings
/// through constructors and never touch the environment mid-request.
/// The .env file is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Origins allowed by the CORS layer (CORS_ALLOW_ORIGINS, comma-separated).
    pub cors_allow_origins: Vec<String>,
    /// Root directory containing model files (HEARO_MODEL_DIR).
    pub model_dir: PathBuf,
    /// Moderation decision threshold in [0,1] (UNSMILE_THRESHOLD).
    pub moderation_threshold: f64,
    /// Label names excluded from the toxicity decision (UNSMILE_SAFETY_LABELS).
    pub safety_labels: Vec<String>,
    /// Whisper ggml model size name, e.g. "base" or "small-q5_1" (WHISPER_MODEL).
    pub whisper_model: String,
    /// Transcription language code (WHISPER_LANGUAGE).
    pub whisper_language: String,
    /// Whether the voice-activity-detection filter runs before decoding (WHISPER_VAD).
    pub whisper_vad: bool,
    /// Inference thread count; None lets whisper.cpp pick (WHISPER_THREADS).
    pub whisper_threads: Option<usize>,
    /// Offload whisper inference to the GPU when the build supports it (WHISPER_USE_GPU).
    pub whisper_use_gpu: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable has a default; a set-but-unparseable value is an
    /// error rather than a silent fallback.
    pub fn load() -> Result<Self> {
        let cors_allow_origins = parse_origins(
            &env::var("CORS_ALLOW_ORIGINS").unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string()),
        );

        let model_dir = env::var("HEARO_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| crate::moderation::download::default_model_dir());

        let moderation_threshold = match env::var("UNSMILE_THRESHOLD") {
            Ok(raw) => raw
                .trim()
                .parse::<f64>()
                .with_context(|| format!("UNSMILE_THRESHOLD is not a number: {raw:?}"))?,
            Err(_) => 0.75,
        };

        let safety_labels = parse_list(
            &env::var("UNSMILE_SAFETY_LABELS").unwrap_or_else(|_| "clean,neutral".to_string()),
        );

        let whisper_threads = match env::var("WHISPER_THREADS") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<usize>()
                    .with_context(|| format!("WHISPER_THREADS is not a number: {raw:?}"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            cors_allow_origins,
            model_dir,
            moderation_threshold,
            safety_labels,
            whisper_model: env::var("WHISPER_MODEL").unwrap_or_else(|_| "base".to_string()),
            whisper_language: env::var("WHISPER_LANGUAGE").unwrap_or_else(|_| "ko".to_string()),
            whisper_vad: parse_bool(env::var("WHISPER_VAD").ok().as_deref(), true),
            whisper_threads,
            whisper_use_gpu: parse_bool(env::var("WHISPER_USE_GPU").ok().as_deref(), false),
        })
    }

    /// Directory holding the moderation model files (model.onnx + tokenizer.json).
    pub fn unsmile_model_dir(&self) -> PathBuf {
        crate::moderation::download::unsmile_model_dir(&self.model_dir)
    }

    /// Path to the whisper ggml model file for the configured size.
    pub fn whisper_model_path(&self) -> PathBuf {
        self.model_dir.join(format!("ggml-{}.bin", self.whisper_model))
    }
}

/// Split a comma-separated origin list, trimming whitespace and dropping
/// empty entries (a trailing comma is not an origin).
fn parse_origins(raw: &str) -> Vec<String> {
    parse_list(raw)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lenient boolean parse for env toggles: 1/true/yes/on (any case) are true,
/// 0/false/no/off are false, anything else falls back to the default.
fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    match raw.map(|s| s.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins_trims_and_drops_empty() {
        let origins = parse_origins(" http://localhost:5173 , http://127.0.0.1:5173 ,, ");
        assert_eq!(
            origins,
            vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string()
            ]
        );
    }

    #[test]
    fn test_parse_origins_single_entry() {
        assert_eq!(parse_origins("https://app.example.com"), vec!["https://app.example.com"]);
    }

    #[test]
    fn test_parse_origins_all_empty() {
        assert!(parse_origins(" , ,").is_empty());
    }

    #[test]
    fn test_parse_bool_truthy_and_falsy() {
        assert!(parse_bool(Some("1"), false));
        assert!(parse_bool(Some("TRUE"), false));
        assert!(parse_bool(Some("yes"), false));
        assert!(!parse_bool(Some("0"), true));
        assert!(!parse_bool(Some("off"), true));
    }

    #[test]
    fn test_parse_bool_falls_back_on_garbage() {
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(Some("maybe"), false));
        assert!(parse_bool(None, true));
    }

    #[test]
    fn test_default_safety_labels_parse() {
        assert_eq!(parse_list("clean,neutral"), vec!["clean", "neutral"]);
    }
}
