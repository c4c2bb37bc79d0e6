// Local ONNX classifier for the smilegate-ai UnSmile Korean toxicity model.
//
// Runs entirely on the local CPU; no API calls, no network dependency.
// The model is multi-label: each output logit is an independent judgement,
// so scores go through a sigmoid rather than a softmax.
//
// Expects `model.onnx` and `tokenizer.json` in the model directory; run
// `hearo-ai download-models` to fetch them.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::debug;

use super::traits::{LabelScore, TextClassifier};

/// Labels output by kor_unsmile, in the order the model returns them.
/// The final label, "clean", is the model's own non-toxic category.
const LABEL_ORDER: [&str; 10] = [
    "여성/가족",
    "남성",
    "성소수자",
    "인종/국적",
    "연령",
    "지역",
    "종교",
    "기타 혐오",
    "악플/욕설",
    "clean",
];

/// Token truncation limit for classifier input.
const MAX_TOKENS: usize = 256;

/// ONNX-backed classifier. The session needs `&mut self` to run, so it
/// lives behind a Mutex; inference is serialized through it for the one
/// forward pass a request needs.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    /// BERT-family exports declare a token_type_ids input; feed it only
    /// when the graph asks for it.
    wants_token_type_ids: bool,
}

impl OnnxClassifier {
    /// Load the ONNX model and tokenizer from the given directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() || !tokenizer_path.exists() {
            anyhow::bail!(
                "Moderation model files not found in {}\nRun `hearo-ai download-models` to fetch them.",
                model_dir.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;

        let wants_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        debug!("Loaded UnSmile ONNX model from {}", model_dir.display());

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            wants_token_type_ids,
        })
    }
}

impl TextClassifier for OnnxClassifier {
    /// Tokenize, run one forward pass, and sigmoid each logit into an
    /// independent probability, in the model's label order.
    fn classify(&self, text: &str) -> Result<Vec<LabelScore>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding
            .get_type_ids()
            .iter()
            .map(|&t| t as i64)
            .collect();

        let shape = [1i64, input_ids.len() as i64];
        let input_ids_tensor =
            Tensor::from_array((shape, input_ids)).context("Failed to create input_ids tensor")?;
        let attention_mask_tensor = Tensor::from_array((shape, attention_mask))
            .context("Failed to create attention_mask tensor")?;

        let logits = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

            let outputs = if self.wants_token_type_ids {
                let token_type_tensor = Tensor::from_array((shape, token_type_ids))
                    .context("Failed to create token_type_ids tensor")?;
                session
                    .run(ort::inputs! {
                        "input_ids" => input_ids_tensor,
                        "attention_mask" => attention_mask_tensor,
                        "token_type_ids" => token_type_tensor
                    })
                    .context("ONNX inference failed")?
            } else {
                session
                    .run(ort::inputs! {
                        "input_ids" => input_ids_tensor,
                        "attention_mask" => attention_mask_tensor
                    })
                    .context("ONNX inference failed")?
            };

            // Output shape: [1, n_labels], raw logits (pre-sigmoid).
            let (_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .context("Failed to extract output tensor")?;
            data.to_vec()
        };

        if logits.len() != LABEL_ORDER.len() {
            anyhow::bail!(
                "Classifier returned {} logits, expected {}",
                logits.len(),
                LABEL_ORDER.len()
            );
        }

        Ok(LABEL_ORDER
            .iter()
            .zip(logits.iter())
            .map(|(&label, &logit)| LabelScore::new(label, sigmoid(logit as f64)))
            .collect())
    }
}

/// Sigmoid activation: maps any real number to (0, 1).
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_zero_is_half() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_sigmoid_saturates() {
        assert!(sigmoid(12.0) > 0.999);
        assert!(sigmoid(-12.0) < 0.001);
    }

    #[test]
    fn test_sigmoid_symmetry() {
        for x in [0.5, 1.0, 2.0, 5.0] {
            let sum = sigmoid(x) + sigmoid(-x);
            assert!((sum - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_label_order_ends_with_clean() {
        // The decision layer depends on the safety label being present in
        // the reported set.
        assert_eq!(LABEL_ORDER.len(), 10);
        assert_eq!(*LABEL_ORDER.last().unwrap(), "clean");
    }

    #[test]
    fn test_load_fails_without_model_files() {
        let dir = std::env::temp_dir().join("hearo-onnx-test-nonexistent");
        let err = OnnxClassifier::load(&dir).unwrap_err();
        assert!(err.to_string().contains("download-models"));
    }
}
