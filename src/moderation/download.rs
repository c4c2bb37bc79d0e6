// Model download helper.
//
// Fetches two models from HuggingFace:
// 1. smilegate-ai kor_unsmile (ONNX export): Korean toxicity classifier
// 2. ggml whisper model: speech recognition (size from WHISPER_MODEL)
//
// Files are stored in a platform-appropriate directory
// (~/.local/share/hearo/models/ on Linux) so they persist across runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// HuggingFace repo for the UnSmile ONNX export.
const UNSMILE_HF_URL: &str = "https://huggingface.co/smilegate-ai/kor_unsmile/resolve/main";

/// HuggingFace repo hosting ggml whisper model files.
const WHISPER_HF_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

const UNSMILE_MODEL_FILE: &str = "onnx/model.onnx";
const UNSMILE_TOKENIZER_FILE: &str = "tokenizer.json";

/// Returns the default directory for storing model files.
/// Uses the platform data directory: ~/.local/share/hearo/models/ on Linux.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hearo")
        .join("models")
}

/// Subdirectory within the model dir for the moderation model.
pub fn unsmile_model_dir(base: &Path) -> PathBuf {
    base.join("kor-unsmile")
}

/// Check whether both moderation model files exist.
pub fn unsmile_files_present(base: &Path) -> bool {
    let dir = unsmile_model_dir(base);
    dir.join("model.onnx").exists() && dir.join("tokenizer.json").exists()
}

/// Check whether the whisper model file for the given size exists.
pub fn whisper_file_present(base: &Path, model: &str) -> bool {
    base.join(format!("ggml-{model}.bin")).exists()
}

/// Download all model files, skipping ones that already exist.
pub async fn download_models(base: &Path, whisper_model: &str) -> Result<()> {
    let unsmile_dir = unsmile_model_dir(base);
    std::fs::create_dir_all(&unsmile_dir)
        .with_context(|| format!("Failed to create model directory: {}", unsmile_dir.display()))?;

    println!("\nModeration model (kor_unsmile):");

    let tokenizer_path = unsmile_dir.join("tokenizer.json");
    if tokenizer_path.exists() {
        info!("UnSmile tokenizer already exists, skipping");
        println!("  tokenizer.json (already exists)");
    } else {
        println!("  Downloading tokenizer.json...");
        download_file(
            &format!("{UNSMILE_HF_URL}/{UNSMILE_TOKENIZER_FILE}"),
            &tokenizer_path,
            false,
        )
        .await?;
    }

    let model_path = unsmile_dir.join("model.onnx");
    if model_path.exists() {
        info!("UnSmile model already exists, skipping");
        println!("  model.onnx (already exists)");
    } else {
        println!("  Downloading model.onnx (~420 MB)...");
        download_file(
            &format!("{UNSMILE_HF_URL}/{UNSMILE_MODEL_FILE}"),
            &model_path,
            true,
        )
        .await?;
    }

    println!("\nSpeech model (whisper {whisper_model}):");

    let whisper_path = base.join(format!("ggml-{whisper_model}.bin"));
    if whisper_path.exists() {
        info!("Whisper model already exists, skipping");
        println!("  ggml-{whisper_model}.bin (already exists)");
    } else {
        println!("  Downloading ggml-{whisper_model}.bin...");
        download_file(
            &format!("{WHISPER_HF_URL}/ggml-{whisper_model}.bin"),
            &whisper_path,
            true,
        )
        .await?;
    }

    Ok(())
}

/// Download a single file from a URL to a local path.
/// If `show_progress` is true, display a progress bar.
async fn download_file(url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let total_size = response.content_length();

    let pb = if show_progress {
        let pb = if let Some(size) = total_size {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .expect("valid template")
                    .progress_chars("=> "),
            );
            pb
        } else {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("    {spinner} {bytes}")
                    .expect("valid template"),
            );
            pb
        };
        Some(pb)
    } else {
        None
    };

    let bytes = response
        .bytes()
        .await
        .context("Failed to read response body")?;

    if let Some(ref pb) = pb {
        pb.set_position(bytes.len() as u64);
    }

    std::fs::write(dest, &bytes).with_context(|| format!("Failed to write {}", dest.display()))?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_dir_is_under_hearo() {
        let dir = default_model_dir();
        let path_str = dir.to_string_lossy();
        assert!(
            path_str.contains("hearo") && path_str.contains("models"),
            "Expected path containing hearo/models, got: {path_str}"
        );
    }

    #[test]
    fn test_unsmile_model_dir_is_subdirectory() {
        let base = PathBuf::from("/tmp/test-models");
        assert_eq!(unsmile_model_dir(&base), base.join("kor-unsmile"));
    }

    #[test]
    fn test_files_present_false_when_empty() {
        let dir = std::env::temp_dir().join("hearo-test-nonexistent");
        assert!(!unsmile_files_present(&dir));
        assert!(!whisper_file_present(&dir, "base"));
    }

    #[test]
    fn test_files_present_true_when_files_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path();

        let unsmile = unsmile_model_dir(base);
        std::fs::create_dir_all(&unsmile).unwrap();
        std::fs::write(unsmile.join("model.onnx"), b"fake").unwrap();
        std::fs::write(unsmile.join("tokenizer.json"), b"fake").unwrap();
        std::fs::write(base.join("ggml-base.bin"), b"fake").unwrap();

        assert!(unsmile_files_present(base));
        assert!(whisper_file_present(base, "base"));
        assert!(!whisper_file_present(base, "small"));
    }
}
