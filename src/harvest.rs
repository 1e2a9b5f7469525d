// src/harvest.rs

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// How a document's content is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DocumentFormat {
    /// Free text, e.g. a PDF invoice.
    Narrative,
    /// Row/column costing sheet.
    Tabular,
}

/// A file selected for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestedFile {
    pub path: PathBuf,
    pub format: DocumentFormat,
}

/// Enumerates candidate invoice files under a root directory.
pub struct DocumentHarvester<'a> {
    config: &'a HarvestConfig,
}

impl<'a> DocumentHarvester<'a> {
    pub fn new(config: &'a HarvestConfig) -> Self {
        Self { config }
    }

    /// Walk `root` recursively and return every narrative or tabular file,
    /// sorted by path. An empty result is not an error.
    pub fn harvest(&self, root: &Path) -> Result<Vec<HarvestedFile>, HarvestError> {
        if !root.exists() {
            return Err(HarvestError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(HarvestError::NotADirectory(root.to_path_buf()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || self.is_lock_file(&entry) {
                continue;
            }
            if let Some(format) = self.classify(entry.path()) {
                files.push(HarvestedFile {
                    path: entry.into_path(),
                    format,
                });
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        info!(root = %root.display(), files = files.len(), "Harvest complete");
        Ok(files)
    }

    /// Pick the format from the file extension, case-insensitively.
    pub fn classify(&self, path: &Path) -> Option<DocumentFormat> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        let matches = |list: &Vec<String>| list.iter().any(|e| e.eq_ignore_ascii_case(&ext));

        if matches(&self.config.narrative_extensions) {
            Some(DocumentFormat::Narrative)
        } else if matches(&self.config.tabular_extensions) {
            Some(DocumentFormat::Tabular)
        } else {
            None
        }
    }

    fn is_lock_file(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        let locked = self
            .config
            .lock_prefixes
            .iter()
            .any(|p| name.starts_with(p.as_str()));
        if locked {
            debug!(path = %entry.path().display(), "Skipping lock file");
        }
        locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_missing_root_is_error() {
        let cfg = HarvestConfig::default();
        let err = DocumentHarvester::new(&cfg)
            .harvest(Path::new("/definitely/not/here"))
            .unwrap_err();
        assert!(matches!(err, HarvestError::RootNotFound(_)));
    }

    #[test]
    fn test_empty_root_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = HarvestConfig::default();
        let files = DocumentHarvester::new(&cfg).harvest(dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_filters_extensions_and_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("2024/invoice-a.PDF"));
        touch(&root.join("2024/notes.txt"));
        touch(&root.join("Self Drive/costing.xlsx"));
        touch(&root.join("Self Drive/~$costing.xlsx"));
        touch(&root.join("Self Drive/.~lock.costing.xlsx#"));
        touch(&root.join("photo.jpg"));

        let cfg = HarvestConfig::default();
        let files = DocumentHarvester::new(&cfg).harvest(root).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| (f.path.file_name().unwrap().to_string_lossy().to_string(), f.format))
            .collect();

        assert_eq!(
            names,
            vec![
                ("invoice-a.PDF".to_string(), DocumentFormat::Narrative),
                ("notes.txt".to_string(), DocumentFormat::Narrative),
                ("costing.xlsx".to_string(), DocumentFormat::Tabular),
            ]
        );
    }
}
