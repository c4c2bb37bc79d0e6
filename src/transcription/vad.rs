// Voice activity detection over a whole recording.
//
// RMS-windowed speech detection: the recording is cut into 30 ms windows,
// windows above an energy threshold are speech, nearby speech windows are
// merged into padded regions, and everything else is dropped before
// decoding. A region table maps timestamps on the filtered timeline back
// to the original recording.

use crate::transcription::audio::TARGET_SAMPLE_RATE;

/// RMS level above which a window counts as speech.
const RMS_THRESHOLD: f32 = 0.02;

/// Analysis window length.
const WINDOW_MS: usize = 30;

/// Silences shorter than this stay inside a speech region.
const MAX_MERGE_GAP_MS: usize = 500;

/// Context kept on both sides of each speech region.
const PAD_MS: usize = 200;

/// One kept span of the original recording, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechRegion {
    /// Start offset in the original recording.
    pub original_start: usize,
    /// Start offset in the concatenated filtered output.
    pub filtered_start: usize,
    pub len: usize,
}

/// The concatenated speech-only waveform plus the table needed to map
/// filtered-timeline timestamps back to the original recording.
#[derive(Debug, Clone)]
pub struct FilteredAudio {
    pub samples: Vec<f32>,
    regions: Vec<SpeechRegion>,
}

impl FilteredAudio {
    /// Map a timestamp on the filtered timeline back to the original one.
    ///
    /// Timestamps landing past the end of a region (the recognizer rounds
    /// to its own frame grid) clamp to that region's end.
    pub fn to_original_secs(&self, filtered_secs: f64) -> f64 {
        let idx = (filtered_secs * TARGET_SAMPLE_RATE as f64) as usize;
        let region = match self
            .regions
            .iter()
            .rev()
            .find(|r| r.filtered_start <= idx)
        {
            Some(r) => r,
            None => return filtered_secs,
        };
        let offset = (idx - region.filtered_start).min(region.len);
        (region.original_start + offset) as f64 / TARGET_SAMPLE_RATE as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Drop non-speech spans from a 16 kHz mono recording.
///
/// Returns an empty result when no window clears the energy threshold;
/// the caller then skips decoding entirely.
pub fn filter_speech(samples: &[f32]) -> FilteredAudio {
    let window = TARGET_SAMPLE_RATE as usize * WINDOW_MS / 1000;
    if samples.is_empty() {
        return FilteredAudio {
            samples: Vec::new(),
            regions: Vec::new(),
        };
    }

    let n_windows = samples.len().div_ceil(window);
    let speech: Vec<bool> = (0..n_windows)
        .map(|w| {
            let start = w * window;
            let end = (start + window).min(samples.len());
            rms(&samples[start..end]) > RMS_THRESHOLD
        })
        .collect();

    let merge_gap = MAX_MERGE_GAP_MS / WINDOW_MS;
    let pad = PAD_MS / WINDOW_MS;

    // Merge speech windows into [start, end) window ranges, bridging short
    // silences, then pad each range with context windows.
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    for (w, &is_speech) in speech.iter().enumerate() {
        if !is_speech {
            continue;
        }
        current = match current {
            Some((start, end)) if w - end <= merge_gap => Some((start, w + 1)),
            Some(range) => {
                ranges.push(range);
                Some((w, w + 1))
            }
            None => Some((w, w + 1)),
        };
    }
    if let Some(range) = current {
        ranges.push(range);
    }

    let mut padded: Vec<(usize, usize)> = Vec::new();
    for (start, end) in ranges {
        let start = start.saturating_sub(pad);
        let end = (end + pad).min(n_windows);
        match padded.last_mut() {
            Some(last) if start <= last.1 => last.1 = end.max(last.1),
            _ => padded.push((start, end)),
        }
    }

    let mut out = Vec::new();
    let mut regions = Vec::new();
    for (start_w, end_w) in padded {
        let start = start_w * window;
        let end = (end_w * window).min(samples.len());
        regions.push(SpeechRegion {
            original_start: start,
            filtered_start: out.len(),
            len: end - start,
        });
        out.extend_from_slice(&samples[start..end]);
    }

    FilteredAudio {
        samples: out,
        regions,
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: usize = TARGET_SAMPLE_RATE as usize;

    fn silence(secs: f64) -> Vec<f32> {
        vec![0.0; (secs * RATE as f64) as usize]
    }

    /// A 440 Hz tone well above the energy threshold.
    fn tone(secs: f64) -> Vec<f32> {
        (0..(secs * RATE as f64) as usize)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / RATE as f32).sin())
            .collect()
    }

    #[test]
    fn test_rms_of_silence_is_zero() {
        assert_eq!(rms(&silence(0.1)), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_pure_silence_filters_to_nothing() {
        let filtered = filter_speech(&silence(3.0));
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_pure_speech_is_kept_whole() {
        let audio = tone(2.0);
        let filtered = filter_speech(&audio);
        assert_eq!(filtered.samples.len(), audio.len());
        // Identity timeline.
        assert!((filtered.to_original_secs(1.0) - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_leading_silence_is_dropped_and_remapped() {
        // 5 s silence, then 2 s speech.
        let mut audio = silence(5.0);
        audio.extend(tone(2.0));
        let filtered = filter_speech(&audio);

        // Far less audio survives than went in, but more than the bare
        // speech (padding).
        assert!(filtered.samples.len() < audio.len() / 2);
        assert!(filtered.samples.len() >= 2 * RATE);

        // t=0.5 s on the filtered timeline lands inside the speech region
        // of the original recording.
        let original = filtered.to_original_secs(0.5);
        assert!(
            (4.5..6.0).contains(&original),
            "expected remap near 5 s, got {original}"
        );
    }

    #[test]
    fn test_short_gaps_are_bridged() {
        // speech - 0.2 s gap - speech should come out as one region.
        let mut audio = tone(1.0);
        audio.extend(silence(0.2));
        audio.extend(tone(1.0));
        let filtered = filter_speech(&audio);
        assert_eq!(filtered.regions.len(), 1);
        assert_eq!(filtered.samples.len(), audio.len());
    }

    #[test]
    fn test_long_gap_splits_regions() {
        let mut audio = tone(1.0);
        audio.extend(silence(4.0));
        audio.extend(tone(1.0));
        let filtered = filter_speech(&audio);
        assert_eq!(filtered.regions.len(), 2);

        // A timestamp in the second filtered region maps past the gap.
        let second_start_secs =
            filtered.regions[1].filtered_start as f64 / RATE as f64;
        let original = filtered.to_original_secs(second_start_secs + 0.1);
        assert!(original > 4.0, "expected remap past the gap, got {original}");
    }

    #[test]
    fn test_empty_input() {
        assert!(filter_speech(&[]).is_empty());
    }
}
