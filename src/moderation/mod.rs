// Toxic-language moderation for Korean text.
//
// The service wraps a multi-label classifier (UnSmile via ONNX) and turns
// its per-label probabilities into a binary verdict: safety labels such as
// "clean" are reported but never drive the decision, and the verdict is a
// straight threshold comparison on the highest remaining score.

pub mod download;
pub mod onnx;
pub mod traits;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use traits::{LabelScore, TextClassifier};

/// Moderation verdict for one piece of text.
///
/// `scores` carries every label the classifier defines, safety labels
/// included; `risk_max` and `top_label` only ever reflect non-safety labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationResult {
    pub toxic: bool,
    pub top_label: String,
    pub risk_max: f64,
    pub scores: BTreeMap<String, f64>,
}

impl ModerationResult {
    /// The fixed verdict for empty input: nothing to score.
    fn clean() -> Self {
        Self {
            toxic: false,
            top_label: "clean".to_string(),
            risk_max: 0.0,
            scores: BTreeMap::new(),
        }
    }
}

/// Moderation service: one classifier, one threshold, one safety-label set,
/// all fixed for the process lifetime.
pub struct ModerationService {
    classifier: Arc<dyn TextClassifier>,
    threshold: f64,
    /// Lowercased safety label names, compared case-insensitively.
    safety_labels: Vec<String>,
}

impl ModerationService {
    pub fn new(
        classifier: Arc<dyn TextClassifier>,
        threshold: f64,
        safety_labels: &[String],
    ) -> Self {
        Self {
            classifier,
            threshold,
            safety_labels: safety_labels.iter().map(|l| l.to_lowercase()).collect(),
        }
    }

    /// Construct the production service: UnSmile ONNX classifier plus the
    /// configured threshold and safety labels. Fails when the model files
    /// are missing; the process must not serve without them.
    pub fn load(config: &Config) -> Result<Self> {
        let classifier = onnx::OnnxClassifier::load(&config.unsmile_model_dir())?;
        Ok(Self::new(
            Arc::new(classifier),
            config.moderation_threshold,
            &config.safety_labels,
        ))
    }

    /// Moderate one piece of text.
    ///
    /// Input is trimmed first; empty or whitespace-only text short-circuits
    /// to the clean verdict without invoking the classifier. Classifier
    /// failures propagate; no retries, no fallback verdict.
    pub async fn moderate(&self, text: &str) -> Result<ModerationResult> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(ModerationResult::clean());
        }

        // Classification is CPU-bound; run it on the blocking pool so the
        // async runtime stays responsive.
        let classifier = Arc::clone(&self.classifier);
        let owned = text.to_string();
        let scores =
            tokio::task::spawn_blocking(move || classifier.classify(&owned))
                .await
                .context("classification task panicked")??;

        let result = self.decide(&scores);
        debug!(
            toxic = result.toxic,
            top_label = %result.top_label,
            risk_max = result.risk_max,
            "moderated text"
        );
        Ok(result)
    }

    /// Turn ordered label scores into a verdict.
    ///
    /// Safety labels are excluded from the risk scan but kept in `scores`.
    /// Tie-break: the first label reaching the maximum score in the
    /// classifier's output order wins (strict `>` during one ordered scan).
    fn decide(&self, scores: &[LabelScore]) -> ModerationResult {
        let mut risk_label: Option<&str> = None;
        let mut risk_max = 0.0f64;

        for entry in scores {
            if self.is_safety_label(&entry.label) {
                continue;
            }
            if risk_label.is_none() || entry.score > risk_max {
                risk_label = Some(&entry.label);
                risk_max = entry.score;
            }
        }

        // No non-safety labels at all: nothing can be risky.
        let (risk_label, risk_max) = match risk_label {
            Some(label) => (label, risk_max),
            None => ("clean", 0.0),
        };

        let toxic = risk_max >= self.threshold;
        ModerationResult {
            toxic,
            top_label: if toxic { risk_label.to_string() } else { "clean".to_string() },
            risk_max,
            scores: scores
                .iter()
                .map(|s| (s.label.clone(), s.score))
                .collect(),
        }
    }

    fn is_safety_label(&self, label: &str) -> bool {
        let lower = label.to_lowercase();
        self.safety_labels.iter().any(|s| *s == lower)
    }
}
