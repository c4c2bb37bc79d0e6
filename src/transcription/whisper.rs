// Whisper-based speech recognition via whisper-rs (whisper.cpp bindings).
//
// The context is loaded once and shared for the process lifetime; each
// request gets its own decoding state. Decoding parameters are fixed and
// chosen to suppress hallucination: greedy sampling, temperature 0, no
// conditioning on previously decoded text, conservative no-speech and
// log-probability thresholds.

use std::path::Path;
use std::sync::{Mutex, Once};

use anyhow::{Context, Result};
use tracing::debug;
use whisper_rs::{
    install_logging_hooks, FullParams, SamplingStrategy, WhisperContext,
    WhisperContextParameters,
};

use super::traits::{RawSegment, RawTranscript, SpeechRecognizer};

static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Segments whose no-speech probability exceeds this are treated as
/// non-speech by the decoder.
const NO_SPEECH_THRESHOLD: f32 = 0.6;

/// Segments whose token log-probability falls below this are treated as
/// low-confidence by the decoder.
const LOGPROB_THRESHOLD: f32 = -1.0;

/// whisper.cpp's repetition/low-information heuristic (its analog of a
/// compression-ratio threshold).
const ENTROPY_THRESHOLD: f32 = 2.4;

pub struct WhisperRecognizer {
    // ggml state creation needs &WhisperContext; the Mutex serializes
    // context access across concurrent requests.
    context: Mutex<WhisperContext>,
    threads: Option<usize>,
}

impl WhisperRecognizer {
    /// Load the ggml model at `model_path`. Fails when the file is
    /// missing; the process must not serve without it.
    pub fn load(model_path: &Path, use_gpu: bool, threads: Option<usize>) -> Result<Self> {
        // Route whisper.cpp's own logging through the `log` hooks instead
        // of stderr (only once per process).
        LOGGING_HOOKS_INSTALLED.call_once(install_logging_hooks);

        if !model_path.exists() {
            anyhow::bail!(
                "Whisper model not found: {}\nRun `hearo-ai download-models` to fetch it.",
                model_path.display()
            );
        }

        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu(use_gpu);

        let context = WhisperContext::new_with_params(
            model_path
                .to_str()
                .context("Invalid UTF-8 in whisper model path")?,
            context_params,
        )
        .map_err(|e| anyhow::anyhow!("Failed to load whisper model: {}", e))?;

        debug!("Loaded whisper model from {}", model_path.display());

        Ok(Self {
            context: Mutex::new(context),
            threads,
        })
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    fn recognize(&self, samples: &[f32], language: &str) -> Result<RawTranscript> {
        let context = self
            .context
            .lock()
            .map_err(|e| anyhow::anyhow!("Whisper context lock poisoned: {}", e))?;

        let mut state = context
            .create_state()
            .map_err(|e| anyhow::anyhow!("Failed to create whisper state: {}", e))?;

        // Beam width 1 (greedy): wider beams produce plausible-sounding
        // text with no grounding in the audio.
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language));
        params.set_translate(false);
        params.set_temperature(0.0);
        // Decode each segment independently of prior output; trades
        // cross-segment coherence for less runaway repetition.
        params.set_no_context(true);
        params.set_no_speech_thold(NO_SPEECH_THRESHOLD);
        params.set_logprob_thold(LOGPROB_THRESHOLD);
        params.set_entropy_thold(ENTROPY_THRESHOLD);
        if let Some(threads) = self.threads {
            params.set_n_threads(threads as i32);
        }
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| anyhow::anyhow!("Whisper inference failed: {}", e))?;

        let lang_id = state.full_lang_id_from_state();
        let detected = whisper_rs::get_lang_str(lang_id)
            .unwrap_or(language)
            .to_string();

        // Timestamps arrive in centiseconds.
        let segments: Vec<RawSegment> = state
            .as_iter()
            .map(|segment| RawSegment {
                start: segment.start_timestamp() as f64 / 100.0,
                end: segment.end_timestamp() as f64 / 100.0,
                text: segment.to_string(),
                avg_logprob: None,
                no_speech_prob: Some(segment.no_speech_probability() as f64),
            })
            .collect();

        debug!(segments = segments.len(), language = %detected, "whisper decoded audio");

        Ok(RawTranscript {
            segments,
            language: detected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_load_fails_for_missing_model() {
        let err = WhisperRecognizer::load(
            &PathBuf::from("/nonexistent/ggml-base.bin"),
            false,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("download-models"));
    }
}
