// Speech recognizer trait: the seam between transcript assembly and the
// model runtime, mirroring the classifier seam on the moderation side.

use anyhow::Result;

/// One decoded segment as the recognizer produced it, in seconds on the
/// timeline of the audio it was given.
#[derive(Debug, Clone)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Mean log-probability of the segment's tokens, when the backend
    /// exposes one.
    pub avg_logprob: Option<f64>,
    pub no_speech_prob: Option<f64>,
}

/// Recognizer output before assembly: chronological segments plus the
/// language the backend settled on.
#[derive(Debug, Clone)]
pub struct RawTranscript {
    pub segments: Vec<RawSegment>,
    pub language: String,
}

/// Speech-to-text backend over a 16 kHz mono f32 waveform.
///
/// Implementations are blocking; the service offloads calls to the
/// blocking thread pool.
pub trait SpeechRecognizer: Send + Sync {
    fn recognize(&self, samples: &[f32], language: &str) -> Result<RawTranscript>;
}
