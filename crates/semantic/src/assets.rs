use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{SemanticConfig, SemanticError};

#[derive(Debug, Clone)]
pub(crate) struct ModelAssets {
    pub(crate) model_path: PathBuf,
    pub(crate) tokenizer_path: PathBuf,
}

/// Ensures that the local model and tokenizer exist on disk, downloading them when URLs are
/// provided.
pub(crate) async fn resolve_model_assets(
    cfg: &SemanticConfig,
) -> Result<ModelAssets, SemanticError> {
    let model_path = ensure_local_file(&cfg.model_path, cfg.model_url.as_deref(), || {
        SemanticError::ModelNotFound(cfg.model_path.display().to_string())
    })
    .await?;

    let tokenizer_target = tokenizer_storage_path(cfg);
    let tokenizer_path = ensure_local_file(&tokenizer_target, cfg.tokenizer_url.as_deref(), || {
        SemanticError::TokenizerMissing(tokenizer_target.display().to_string())
    })
    .await?;

    Ok(ModelAssets {
        model_path,
        tokenizer_path,
    })
}

/// Explicit path wins; otherwise the tokenizer sits next to the model (one level up from an
/// `onnx/` subdirectory, matching the Hugging Face export layout).
fn tokenizer_storage_path(cfg: &SemanticConfig) -> PathBuf {
    if let Some(path) = &cfg.tokenizer_path {
        return path.clone();
    }

    let file_name = cfg
        .tokenizer_url
        .as_deref()
        .and_then(infer_filename_from_url)
        .unwrap_or_else(|| "tokenizer.json".into());

    let mut base_dir = cfg
        .model_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if base_dir.file_name().is_some_and(|name| name == "onnx") {
        if let Some(parent) = base_dir.parent() {
            base_dir = parent.to_path_buf();
        }
    }
    base_dir.join(file_name)
}

async fn ensure_local_file<F>(
    target: &Path,
    remote_url: Option<&str>,
    on_missing: F,
) -> Result<PathBuf, SemanticError>
where
    F: FnOnce() -> SemanticError,
{
    if target.exists() {
        return Ok(target.to_path_buf());
    }

    if let Some(url) = remote_url {
        tracing::info!(url, target = %target.display(), "downloading local model asset");
        download_to_path(target, url).await?;
        return Ok(target.to_path_buf());
    }

    Err(on_missing())
}

async fn download_to_path(target: &Path, url: &str) -> Result<(), SemanticError> {
    if let Some(parent) = target.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let response = reqwest::get(url)
        .await
        .map_err(|e| SemanticError::Download(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SemanticError::Download(format!(
            "unexpected status {status} while fetching {url}"
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SemanticError::Download(e.to_string()))?;

    fs::write(target, &bytes)?;
    Ok(())
}

/// Last path segment of `url`, without query or fragment.
fn infer_filename_from_url(url: &str) -> Option<String> {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.split('/').rev().find(|segment| !segment.is_empty()))
        .map(str::to_string)
}
