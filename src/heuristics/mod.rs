// src/heuristics/mod.rs

mod narrative;
mod tabular;

pub use narrative::NarrativeStrategy;
pub use tabular::TabularStrategy;

use crate::config::Config;
use crate::error::SkipReason;
use crate::extract::SourceDocument;
use crate::harvest::DocumentFormat;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*Day").expect("duration pattern is valid"));

/// Currency a rate was quoted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Nad,
    Usd,
    /// No marker found; treated as NAD downstream.
    Unknown,
}

/// Canonical grouping key shared by both document formats.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TourCategory(String);

impl TourCategory {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TourCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the heuristics could infer from one document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedFields {
    pub currency: Currency,
    pub tour_name: String,
    /// 0 when no duration was found.
    pub duration_days: u32,
    pub category: TourCategory,
    /// Deduplicated, largest first.
    pub numeric_candidates: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateConfidence {
    /// A heuristic positively identified the per-person rate.
    Accepted,
    /// No per-person rate found; the document total stands in for it.
    Fallback,
}

/// The per-person rate chosen for one document, in its source currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedRate {
    pub amount: f64,
    pub currency: Currency,
    pub confidence: RateConfidence,
}

/// Format-specific field inference and rate resolution.
pub trait DocumentParsingStrategy {
    fn extract_fields(&self, doc: &SourceDocument) -> Result<ExtractedFields, SkipReason>;

    fn resolve_rate(
        &self,
        doc: &SourceDocument,
        fields: &ExtractedFields,
    ) -> Result<ResolvedRate, SkipReason>;
}

/// Pick the strategy for a document format.
pub fn strategy_for<'a>(
    format: DocumentFormat,
    config: &'a Config,
) -> Box<dyn DocumentParsingStrategy + 'a> {
    match format {
        DocumentFormat::Narrative => Box::new(NarrativeStrategy::new(
            &config.inference,
            &config.resolver,
        )),
        DocumentFormat::Tabular => Box::new(TabularStrategy::new(
            &config.inference,
            &config.resolver,
        )),
    }
}

/// Run field inference and rate resolution for one document.
pub fn analyze(
    doc: &SourceDocument,
    config: &Config,
) -> Result<(ExtractedFields, ResolvedRate), SkipReason> {
    let strategy = strategy_for(doc.format, config);
    let fields = strategy.extract_fields(doc)?;
    let rate = strategy.resolve_rate(doc, &fields)?;
    Ok((fields, rate))
}

/// First integer followed by "Day", case-insensitive. 0 when absent.
pub fn parse_duration(text: &str) -> u32 {
    DURATION_RE
        .captures(text)
        .and_then(|c| c[1].parse::<u32>().ok())
        .unwrap_or(0)
}

/// Case-insensitive substring test against a list of keywords.
fn contains_any(haystack_lower: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| haystack_lower.contains(&k.to_lowercase()))
}
