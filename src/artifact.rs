// src/artifact.rs

use crate::aggregate::CategorySummary;
use crate::error::PipelineError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What was published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMeta {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
    pub categories: usize,
}

/// Serialize `summaries` and atomically replace the artifact at `path`.
pub fn write_artifact(
    path: &Path,
    summaries: &[CategorySummary],
) -> Result<ArtifactMeta, PipelineError> {
    let mut content = serde_json::to_string_pretty(summaries)?;
    content.push('\n');

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| PipelineError::artifact_io(&dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pricing.json".to_string());
    let temp = dir.join(format!(".{file_name}.tmp"));

    // write to temp first, then rename over the published file
    fs::write(&temp, &content).map_err(|e| PipelineError::artifact_io(&temp, e))?;
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(PipelineError::artifact_io(path, e));
    }

    let hash = format!("{:x}", Sha256::digest(content.as_bytes()));
    debug!(path = %path.display(), sha256 = %hash, "Renamed temp artifact into place");

    Ok(ArtifactMeta {
        path: path.to_path_buf(),
        sha256: hash,
        size_bytes: content.len(),
        categories: summaries.len(),
    })
}

/// Load the most recently published summaries. A missing file reads as an
/// empty list, as does an empty array.
pub fn load_summaries(path: &Path) -> Result<Vec<CategorySummary>, PipelineError> {
    if !path.exists() {
        debug!(path = %path.display(), "No pricing artifact published yet");
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).map_err(|e| PipelineError::artifact_io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// One line per category, for feeding the pricing advisor.
pub fn render_context(summaries: &[CategorySummary]) -> String {
    summaries
        .iter()
        .map(|s| {
            format!(
                "{}: avg ${} (range ${} - ${}, {} samples)",
                s.category, s.average_usd, s.min_usd, s.max_usd, s.sample_count
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
