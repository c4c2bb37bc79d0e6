// Speech-to-text transcription.
//
// Pipeline per request: normalize the upload to a 16 kHz mono waveform,
// optionally drop non-speech spans, decode with deterministic parameters,
// and assemble the segment list into a transcript.

pub mod audio;
pub mod traits;
pub mod vad;
pub mod whisper;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use audio::AudioNormalizer;
use traits::{RawTranscript, SpeechRecognizer};

/// One decoded segment with timing on the original upload's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub avg_logprob: Option<f64>,
    pub no_speech_prob: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// Space-joined non-empty segment texts.
    pub text: String,
    /// Every segment the recognizer produced, empty-text ones included.
    pub segments: Vec<TranscriptSegment>,
    pub language: String,
    /// Upload length in seconds, when the container reveals it.
    pub duration: Option<f64>,
}

/// Transcription service: one recognizer, one normalizer, language and VAD
/// behavior fixed at construction.
pub struct TranscriptionService {
    recognizer: Arc<dyn SpeechRecognizer>,
    normalizer: AudioNormalizer,
    language: String,
    vad_filter: bool,
}

impl TranscriptionService {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        normalizer: AudioNormalizer,
        language: impl Into<String>,
        vad_filter: bool,
    ) -> Self {
        Self {
            recognizer,
            normalizer,
            language: language.into(),
            vad_filter,
        }
    }

    /// Construct the production service. Fails when the whisper model is
    /// missing; the process must not serve without it.
    pub fn load(config: &Config) -> Result<Self> {
        let recognizer = whisper::WhisperRecognizer::load(
            &config.whisper_model_path(),
            config.whisper_use_gpu,
            config.whisper_threads,
        )?;
        let normalizer = AudioNormalizer::from_build();
        if normalizer.is_passthrough() {
            warn!(
                "audio decoding not compiled in (`decode` feature off); \
                 uploads are assumed to already be 16 kHz mono WAV"
            );
        }
        Ok(Self::new(
            Arc::new(recognizer),
            normalizer,
            config.whisper_language.clone(),
            config.whisper_vad,
        ))
    }

    /// Transcribe an uploaded recording. The filename is only a format
    /// hint for the normalizer.
    ///
    /// Failures (unsupported audio, recognizer errors) propagate; no
    /// partial transcript is synthesized.
    pub async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<TranscriptResult> {
        let recognizer = Arc::clone(&self.recognizer);
        let normalizer = self.normalizer;
        let language = self.language.clone();
        let vad_filter = self.vad_filter;
        let filename = filename.to_string();

        // Decode + inference are CPU-bound; run the whole pipeline on the
        // blocking pool.
        tokio::task::spawn_blocking(move || {
            let decoded = normalizer.normalize(&audio, &filename)?;
            let duration = decoded.duration_secs;

            let filtered = vad_filter.then(|| vad::filter_speech(&decoded.samples));
            let samples = match &filtered {
                Some(filtered) => &filtered.samples,
                None => &decoded.samples,
            };

            // Nothing survived the speech filter (or the upload was
            // empty): skip decoding entirely.
            if samples.is_empty() {
                debug!("no speech in upload, skipping decode");
                return Ok(assemble(
                    RawTranscript {
                        segments: Vec::new(),
                        language,
                    },
                    Some(duration),
                    None,
                ));
            }

            let raw = recognizer.recognize(samples, &language)?;
            Ok(assemble(raw, Some(duration), filtered.as_ref()))
        })
        .await
        .context("transcription task panicked")?
    }
}

/// Assemble recognizer output into the transcript contract: texts are
/// trimmed, non-empty ones joined with single spaces, and every segment is
/// kept (empty text included) with timing mapped back to the original
/// timeline when a VAD filter ran.
fn assemble(
    raw: RawTranscript,
    duration: Option<f64>,
    remap: Option<&vad::FilteredAudio>,
) -> TranscriptResult {
    let mut texts: Vec<&str> = Vec::new();
    let mut segments = Vec::with_capacity(raw.segments.len());

    for segment in &raw.segments {
        let trimmed = segment.text.trim();
        let (start, end) = match remap {
            Some(filtered) => (
                filtered.to_original_secs(segment.start),
                filtered.to_original_secs(segment.end),
            ),
            None => (segment.start, segment.end),
        };
        segments.push(TranscriptSegment {
            start,
            end,
            text: trimmed.to_string(),
            avg_logprob: segment.avg_logprob,
            no_speech_prob: segment.no_speech_prob,
        });
        if !trimmed.is_empty() {
            texts.push(trimmed);
        }
    }

    TranscriptResult {
        text: texts.join(" "),
        segments,
        language: raw.language,
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traits::RawSegment;

    fn raw_segment(start: f64, end: f64, text: &str) -> RawSegment {
        RawSegment {
            start,
            end,
            text: text.to_string(),
            avg_logprob: None,
            no_speech_prob: Some(0.1),
        }
    }

    /// Recognizer returning a fixed transcript.
    struct FixedRecognizer(Vec<RawSegment>);

    impl SpeechRecognizer for FixedRecognizer {
        fn recognize(&self, samples: &[f32], language: &str) -> Result<RawTranscript> {
            assert!(!samples.is_empty(), "recognizer fed no samples");
            Ok(RawTranscript {
                segments: self.0.clone(),
                language: language.to_string(),
            })
        }
    }

    /// Recognizer that must never be reached.
    struct PanicRecognizer;

    impl SpeechRecognizer for PanicRecognizer {
        fn recognize(&self, _samples: &[f32], _language: &str) -> Result<RawTranscript> {
            panic!("recognizer invoked");
        }
    }

    fn wav_16k_mono(samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    /// A second of alternating loud samples, comfortably above the VAD
    /// energy threshold.
    fn loud_second() -> Vec<i16> {
        (0..16000)
            .map(|i| if i % 2 == 0 { 12000 } else { -12000 })
            .collect()
    }

    #[test]
    fn test_assemble_joins_nonempty_trimmed_texts() {
        let raw = RawTranscript {
            segments: vec![
                raw_segment(0.0, 1.0, "  안녕하세요 "),
                raw_segment(1.0, 2.0, "   "),
                raw_segment(2.0, 3.0, "반갑습니다"),
            ],
            language: "ko".to_string(),
        };
        let result = assemble(raw, Some(3.0), None);
        assert_eq!(result.text, "안녕하세요 반갑습니다");
        // The empty segment keeps its slot.
        assert_eq!(result.segments.len(), 3);
        assert_eq!(result.segments[1].text, "");
        assert_eq!(result.duration, Some(3.0));
    }

    #[test]
    fn test_assemble_preserves_order_and_timing() {
        let raw = RawTranscript {
            segments: vec![raw_segment(0.5, 1.5, "하나"), raw_segment(1.5, 2.5, "둘")],
            language: "ko".to_string(),
        };
        let result = assemble(raw, None, None);
        assert_eq!(result.text, "하나 둘");
        assert_eq!(result.segments[0].start, 0.5);
        assert_eq!(result.segments[1].end, 2.5);
        assert_eq!(result.segments[0].no_speech_prob, Some(0.1));
    }

    #[tokio::test]
    async fn test_transcribe_assembles_stub_output() {
        let svc = TranscriptionService::new(
            Arc::new(FixedRecognizer(vec![
                raw_segment(0.0, 0.6, " 여보세요"),
                raw_segment(0.6, 1.0, ""),
            ])),
            AudioNormalizer::Passthrough,
            "ko",
            false,
        );
        let result = svc
            .transcribe(wav_16k_mono(&loud_second()), "call.wav")
            .await
            .unwrap();
        assert_eq!(result.text, "여보세요");
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.language, "ko");
        assert!((result.duration.unwrap() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_silent_upload_skips_recognizer_when_vad_on() {
        let svc = TranscriptionService::new(
            Arc::new(PanicRecognizer),
            AudioNormalizer::Passthrough,
            "ko",
            true,
        );
        let result = svc
            .transcribe(wav_16k_mono(&vec![0i16; 16000]), "silence.wav")
            .await
            .unwrap();
        assert_eq!(result.text, "");
        assert!(result.segments.is_empty());
        assert_eq!(result.language, "ko");
    }

    #[tokio::test]
    async fn test_vad_remaps_segment_times_to_original_timeline() {
        // 4 s of silence, then 1 s of speech: with VAD on, the recognizer
        // sees only the tail, but reported timestamps land near 4 s.
        let mut samples = vec![0i16; 4 * 16000];
        samples.extend(loud_second());

        let svc = TranscriptionService::new(
            Arc::new(FixedRecognizer(vec![raw_segment(0.0, 0.5, "늦은 인사")])),
            AudioNormalizer::Passthrough,
            "ko",
            true,
        );
        let result = svc
            .transcribe(wav_16k_mono(&samples), "call.wav")
            .await
            .unwrap();
        assert_eq!(result.segments.len(), 1);
        assert!(
            result.segments[0].start > 3.0,
            "expected remapped start near 4 s, got {}",
            result.segments[0].start
        );
        assert!((result.duration.unwrap() - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unparseable_upload_is_an_error() {
        let svc = TranscriptionService::new(
            Arc::new(PanicRecognizer),
            AudioNormalizer::Passthrough,
            "ko",
            true,
        );
        assert!(svc
            .transcribe(vec![1, 2, 3, 4], "not-audio.xyz")
            .await
            .is_err());
    }
}
