// Text classifier trait: the seam between the moderation decision logic
// and the model runtime.
//
// The production implementation runs the UnSmile ONNX model; tests drive
// the decision logic through hand-built score vectors instead.

use anyhow::Result;

/// One classifier output: a label name and its independent sigmoid
/// probability in [0,1].
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Multi-label text classifier. `classify` must return every label the
/// model defines, in the model's output order; the caller relies on that
/// order for deterministic tie-breaking.
///
/// Implementations are blocking; the service offloads calls to the
/// blocking thread pool.
pub trait TextClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Vec<LabelScore>>;
}
