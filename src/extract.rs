// src/extract.rs

use crate::error::ExtractionError;
use crate::harvest::{DocumentFormat, HarvestedFile};
use calamine::{Data, Reader, open_workbook_auto};
use lopdf::Document;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold we treat it as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// One typed spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Flat representation of a document.
#[derive(Debug, Clone)]
pub enum DocumentContent {
    Text(String),
    Cells(Vec<Vec<Cell>>),
}

/// A harvested file together with its decoded content.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub format: DocumentFormat,
    pub content: DocumentContent,
}

impl SourceDocument {
    /// `"{parent folder} {file name}"`, used for keyword classification.
    pub fn context(&self) -> String {
        let folder = self
            .path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{folder} {file}")
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Decode a harvested file with the strategy its format calls for.
pub fn load_document(file: &HarvestedFile) -> Result<SourceDocument, ExtractionError> {
    let content = match file.format {
        DocumentFormat::Narrative => DocumentContent::Text(extract_narrative(&file.path)?),
        DocumentFormat::Tabular => DocumentContent::Cells(extract_first_sheet(&file.path)?),
    };
    Ok(SourceDocument {
        path: file.path.clone(),
        format: file.format,
        content,
    })
}

/// Narrative documents are either PDFs or text already converted from one.
pub fn extract_narrative(path: &Path) -> Result<String, ExtractionError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => {
            let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            extract_text_from_pdf(&bytes)
        }
        "txt" => {
            let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Err(ExtractionError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Takes raw PDF bytes and returns the text layer.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
    // structural check with lopdf first
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractionError::Pdf(format!("Failed to parse PDF: {e}")))?;

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return Err(ExtractionError::ScannedImage);
    }

    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful < MIN_TEXT_CHARS {
                info!(chars = meaningful, "Extracted text too short, treating as scanned");
                Err(ExtractionError::ScannedImage)
            } else {
                debug!(chars = meaningful, "Text extracted successfully");
                Ok(text)
            }
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed");
            Err(ExtractionError::Pdf(e.to_string()))
        }
    }
}

/// Inspect the PDF object tree for signs that every page is just a single
/// image with no text operators.
///
/// A page with XObject images but **no** Font resources is almost
/// certainly a scanned page.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // can't tell, let text extraction try
    }

    let mut image_only_pages = 0;

    for object_id in pages.values() {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Ok(page_dict) = page_obj.as_dict() else {
            continue;
        };

        let resources = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok());

        let non_empty = |key: &[u8]| {
            resources
                .and_then(|res| res.get(key).ok())
                .and_then(|o| doc.dereference(o).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
                .is_some_and(|d| !d.is_empty())
        };

        if non_empty(b"XObject".as_slice()) && !non_empty(b"Font".as_slice()) {
            image_only_pages += 1;
        }
    }

    let ratio = image_only_pages as f64 / pages.len() as f64;
    debug!(
        total_pages = pages.len(),
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= 0.8
}

/// Decode the first sheet of a workbook into a cell matrix. Column indices
/// are absolute: leading empty columns are padded so column K is always 10.
pub fn extract_first_sheet(path: &Path) -> Result<Vec<Vec<Cell>>, ExtractionError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ExtractionError::Workbook(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ExtractionError::EmptyWorkbook)?
        .map_err(|e| ExtractionError::Workbook(e.to_string()))?;

    let col_offset = range.start().map(|(_, col)| col as usize).unwrap_or(0);
    let rows = range
        .rows()
        .map(|row| {
            std::iter::repeat_n(Cell::Empty, col_offset)
                .chain(row.iter().map(cell_from_data))
                .collect()
        })
        .collect::<Vec<Vec<Cell>>>();

    debug!(path = %path.display(), rows = rows.len(), "Decoded first sheet");
    Ok(rows)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}
