use super::{
    Currency, DocumentParsingStrategy, ExtractedFields, RateConfidence, ResolvedRate,
    TourCategory, contains_any, parse_duration,
};
use crate::config::{InferenceConfig, ResolverConfig};
use crate::error::{ExtractionError, SkipReason};
use crate::extract::{Cell, DocumentContent, SourceDocument};
use tracing::debug;

/// Costing sheets: everything but the price comes from the folder and file
/// name; the price sits on the TOTAL row.
pub struct TabularStrategy<'a> {
    inference: &'a InferenceConfig,
    resolver: &'a ResolverConfig,
}

impl<'a> TabularStrategy<'a> {
    pub fn new(inference: &'a InferenceConfig, resolver: &'a ResolverConfig) -> Self {
        Self {
            inference,
            resolver,
        }
    }

    /// First vocabulary entry found in the lower-cased context, else the default.
    pub fn classify(&self, context: &str) -> TourCategory {
        let lower = context.to_lowercase();
        self.inference
            .categories
            .iter()
            .find(|c| lower.contains(&c.to_lowercase()))
            .map(TourCategory::new)
            .unwrap_or_else(|| TourCategory::new(self.inference.default_category.clone()))
    }

    pub fn detect_currency(&self, context: &str) -> Currency {
        if contains_any(&context.to_lowercase(), &self.inference.usd_destinations) {
            Currency::Usd
        } else {
            Currency::Nad
        }
    }

    /// Value of the first TOTAL row that carries a number.
    pub fn find_total(&self, rows: &[Vec<Cell>]) -> Option<f64> {
        let label = self.resolver.total_label.to_uppercase();
        let value_col = self.resolver.label_column + self.resolver.value_offset;

        rows.iter().find_map(|row| {
            let cell = row.get(self.resolver.label_column)?.as_text()?;
            if !cell.to_uppercase().contains(&label) {
                return None;
            }
            row.get(value_col)?.as_number()
        })
    }
}

impl DocumentParsingStrategy for TabularStrategy<'_> {
    fn extract_fields(&self, doc: &SourceDocument) -> Result<ExtractedFields, SkipReason> {
        if !matches!(doc.content, DocumentContent::Cells(_)) {
            return Err(ExtractionError::UnsupportedFormat(doc.path.clone()).into());
        }

        let context = doc.context();
        let tour_name = doc
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| doc.file_name());

        Ok(ExtractedFields {
            currency: self.detect_currency(&context),
            tour_name,
            duration_days: parse_duration(&context),
            category: self.classify(&context),
            numeric_candidates: Vec::new(),
        })
    }

    fn resolve_rate(
        &self,
        doc: &SourceDocument,
        fields: &ExtractedFields,
    ) -> Result<ResolvedRate, SkipReason> {
        let DocumentContent::Cells(rows) = &doc.content else {
            return Err(ExtractionError::UnsupportedFormat(doc.path.clone()).into());
        };

        match self.find_total(rows) {
            Some(amount) if amount != 0.0 => {
                debug!(path = %doc.path.display(), amount, "TOTAL row found");
                Ok(ResolvedRate {
                    amount,
                    currency: fields.currency,
                    confidence: RateConfidence::Accepted,
                })
            }
            _ => Err(SkipReason::NoTotalRowFound),
        }
    }
}
