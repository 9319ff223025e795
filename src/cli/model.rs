use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;

use smartscan::config::ModelsConfig;
use smartscan::embedding::lookup_model;

/// Download the configured text and image models to the cache directory.
pub async fn model_download(config: &ModelsConfig) -> Result<()> {
    let cache_dir = smartscan::config::expand_tilde(&config.cache_dir);

    for name in [&config.text_model, &config.image_model] {
        let spec = lookup_model(name)?;
        let dir = spec.model_dir(&cache_dir);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create cache dir: {}", dir.display()))?;

        let model_path = dir.join("model.onnx");
        if model_path.exists() {
            println!("{} already exists at {}", spec.name, model_path.display());
        } else {
            println!("Downloading {} model.onnx...", spec.name);
            download_file(spec.model_url, &model_path).await?;
            println!("Model saved to {}", model_path.display());
        }

        if let Some(url) = spec.tokenizer_url {
            let tokenizer_path = dir.join("tokenizer.json");
            if tokenizer_path.exists() {
                println!("Tokenizer already exists at {}", tokenizer_path.display());
            } else {
                println!("Downloading {} tokenizer.json...", spec.name);
                download_file(url, &tokenizer_path).await?;
                println!("Tokenizer saved to {}", tokenizer_path.display());
            }
        }
    }

    println!("Model download complete. Ready for use.");
    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (tmp + rename).
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .context("invalid progress template")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    let bytes = response.bytes().await.context("error reading response")?;
    pb.inc(bytes.len() as u64);
    file.write_all(&bytes)
        .await
        .context("error writing to file")?;

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
