use super::{
    Currency, DocumentParsingStrategy, ExtractedFields, RateConfidence, ResolvedRate,
    TourCategory, contains_any, parse_duration,
};
use crate::config::{FallbackPolicy, InferenceConfig, ResolverConfig};
use crate::error::{ExtractionError, SkipReason};
use crate::extract::{DocumentContent, SourceDocument};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Optional currency marker, comma-grouped thousands, optional two-digit
/// fraction. An ungrouped digit run yields groups of at most three digits.
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:US\$|N\$|USD|NAD|\$)?\s?(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)")
        .expect("amount pattern is valid")
});

/// Free-text invoices: names are synthesized, the per-person rate is found
/// by looking for a candidate that divides the largest amount.
pub struct NarrativeStrategy<'a> {
    inference: &'a InferenceConfig,
    resolver: &'a ResolverConfig,
}

impl<'a> NarrativeStrategy<'a> {
    pub fn new(inference: &'a InferenceConfig, resolver: &'a ResolverConfig) -> Self {
        Self {
            inference,
            resolver,
        }
    }

    /// `"{days} Day Namibia Safari"` plus the first matching suffix. Source
    /// text is often garbled by column extraction, so it is never copied.
    pub fn synthesize_name(&self, text: &str, duration_days: u32) -> String {
        let mut name = if duration_days > 0 {
            format!("{duration_days} Day Namibia Safari")
        } else {
            "Custom Safari".to_string()
        };

        let lower = text.to_lowercase();
        if let Some(rule) = self
            .inference
            .suffix_rules
            .iter()
            .find(|r| contains_any(&lower, &r.keywords))
        {
            name.push_str(&format!(" ({})", rule.suffix));
        }
        name
    }

    /// Pick the per-person rate from candidates sorted largest first.
    pub fn resolve_candidates(
        &self,
        candidates: &[f64],
        currency: Currency,
    ) -> Result<ResolvedRate, SkipReason> {
        let Some((&total, rest)) = candidates.split_first() else {
            return Err(SkipReason::NoNumericCandidates);
        };
        let cfg = self.resolver;

        for &v in rest {
            if v <= cfg.min_candidate {
                continue;
            }
            let ratio = total / v;
            if (ratio - ratio.round()).abs() < cfg.ratio_tolerance && ratio < cfg.max_party_size {
                debug!(total, rate = v, party = ratio.round(), "Per-person divisor found");
                return Ok(ResolvedRate {
                    amount: v,
                    currency,
                    confidence: RateConfidence::Accepted,
                });
            }
        }

        warn!(
            total,
            candidates = ?candidates,
            policy = ?cfg.fallback_policy,
            "No per-person divisor of the total"
        );
        match cfg.fallback_policy {
            FallbackPolicy::Skip => Err(SkipReason::AmbiguousRate {
                total,
                candidates: candidates.to_vec(),
            }),
            FallbackPolicy::UseTotal => Ok(ResolvedRate {
                amount: total,
                currency,
                confidence: RateConfidence::Fallback,
            }),
        }
    }
}

impl DocumentParsingStrategy for NarrativeStrategy<'_> {
    fn extract_fields(&self, doc: &SourceDocument) -> Result<ExtractedFields, SkipReason> {
        let DocumentContent::Text(text) = &doc.content else {
            return Err(ExtractionError::UnsupportedFormat(doc.path.clone()).into());
        };

        let duration_days = parse_duration(text);
        if duration_days == 0 {
            debug!(path = %doc.path.display(), "No duration found, using placeholder name");
        }
        let tour_name = self.synthesize_name(text, duration_days);

        Ok(ExtractedFields {
            currency: detect_currency(text),
            category: TourCategory::new(tour_name.clone()),
            tour_name,
            duration_days,
            numeric_candidates: numeric_candidates(text),
        })
    }

    fn resolve_rate(
        &self,
        _doc: &SourceDocument,
        fields: &ExtractedFields,
    ) -> Result<ResolvedRate, SkipReason> {
        self.resolve_candidates(&fields.numeric_candidates, fields.currency)
    }
}

pub fn detect_currency(text: &str) -> Currency {
    if text.contains("USD") || text.contains("US$") {
        Currency::Usd
    } else if text.contains("NAD") || text.contains("N$") {
        Currency::Nad
    } else {
        Currency::Unknown
    }
}

/// Every monetary-looking number in `text`, deduplicated, largest first.
pub fn numeric_candidates(text: &str) -> Vec<f64> {
    let mut values: Vec<f64> = AMOUNT_RE
        .captures_iter(text)
        .filter_map(|c| c[1].replace(',', "").parse::<f64>().ok())
        .collect();
    values.sort_by(|a, b| b.total_cmp(a));
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::DocumentFormat;
    use std::path::PathBuf;

    fn strategy_with(policy: FallbackPolicy) -> (InferenceConfig, ResolverConfig) {
        let resolver = ResolverConfig {
            fallback_policy: policy,
            ..ResolverConfig::default()
        };
        (InferenceConfig::default(), resolver)
    }

    fn text_doc(text: &str) -> SourceDocument {
        SourceDocument {
            path: PathBuf::from("invoices/quote.txt"),
            format: DocumentFormat::Narrative,
            content: DocumentContent::Text(text.to_string()),
        }
    }

    #[test]
    fn test_candidates_parse_grouped_numbers() {
        let text = "Rate $284,350.00 Pax 2 Total $568,700.00";
        assert_eq!(numeric_candidates(text), vec![568700.0, 284350.0, 2.0]);
    }

    #[test]
    fn test_ungrouped_runs_split_into_small_groups() {
        let text = "Ref 20250311";
        assert_eq!(numeric_candidates(text), vec![503.0, 202.0, 11.0]);
    }

    #[test]
    fn test_candidates_are_deduplicated() {
        let text = "N$ 12,500.00 and again 12,500.00 and 12,500";
        assert_eq!(numeric_candidates(text), vec![12500.0]);
    }

    #[test]
    fn test_invoice_and_phone_numbers_do_not_become_the_total() {
        let (inf, res) = strategy_with(FallbackPolicy::Skip);
        let s = NarrativeStrategy::new(&inf, &res);
        let doc = text_doc(
            "TAX INVOICE No. 20250311\nTel +264 81 1234567\n\
             11 Day Namibia Safari\nRate USD 5,000.00 2 USD 10,000.00",
        );

        let fields = s.extract_fields(&doc).unwrap();
        assert_eq!(fields.numeric_candidates[0], 10000.0);
        assert!(fields.numeric_candidates.iter().all(|&v| v <= 10000.0));

        let rate = s.resolve_rate(&doc, &fields).unwrap();
        assert_eq!(rate.amount, 5000.0);
        assert_eq!(rate.currency, Currency::Usd);
        assert_eq!(rate.confidence, RateConfidence::Accepted);
    }

    #[test]
    fn test_divisor_resolution() {
        let (inf, res) = strategy_with(FallbackPolicy::Skip);
        let s = NarrativeStrategy::new(&inf, &res);
        let rate = s
            .resolve_candidates(&[568700.0, 284350.0, 2.0], Currency::Nad)
            .unwrap();
        assert_eq!(rate.amount, 284350.0);
        assert_eq!(rate.confidence, RateConfidence::Accepted);
        assert_eq!(rate.currency, Currency::Nad);
    }

    #[test]
    fn test_closest_divisor_to_total_wins() {
        let (inf, res) = strategy_with(FallbackPolicy::Skip);
        let s = NarrativeStrategy::new(&inf, &res);
        // 30000 / 15000 = 2 and 30000 / 10000 = 3; the larger candidate wins
        let rate = s
            .resolve_candidates(&[30000.0, 15000.0, 10000.0], Currency::Usd)
            .unwrap();
        assert_eq!(rate.amount, 15000.0);
    }

    #[test]
    fn test_party_size_limit() {
        let (inf, res) = strategy_with(FallbackPolicy::Skip);
        let s = NarrativeStrategy::new(&inf, &res);
        // ratio 25 is not a plausible party size
        let err = s
            .resolve_candidates(&[50000.0, 2000.0], Currency::Usd)
            .unwrap_err();
        assert!(matches!(err, SkipReason::AmbiguousRate { total, .. } if total == 50000.0));
    }

    #[test]
    fn test_no_divisor_skip_policy() {
        let (inf, res) = strategy_with(FallbackPolicy::Skip);
        let s = NarrativeStrategy::new(&inf, &res);
        let err = s
            .resolve_candidates(&[101.0, 100.0, 99.0], Currency::Nad)
            .unwrap_err();
        match err {
            SkipReason::AmbiguousRate { total, candidates } => {
                assert_eq!(total, 101.0);
                assert_eq!(candidates, vec![101.0, 100.0, 99.0]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_no_divisor_use_total_policy() {
        let (inf, res) = strategy_with(FallbackPolicy::UseTotal);
        let s = NarrativeStrategy::new(&inf, &res);
        let rate = s
            .resolve_candidates(&[101.0, 100.0, 99.0], Currency::Nad)
            .unwrap();
        assert_eq!(rate.amount, 101.0);
        assert_eq!(rate.confidence, RateConfidence::Fallback);
    }

    #[test]
    fn test_empty_candidates() {
        let (inf, res) = strategy_with(FallbackPolicy::UseTotal);
        let s = NarrativeStrategy::new(&inf, &res);
        assert!(matches!(
            s.resolve_candidates(&[], Currency::Usd),
            Err(SkipReason::NoNumericCandidates)
        ));
    }

    #[test]
    fn test_name_synthesis_suffix_priority() {
        let (inf, res) = strategy_with(FallbackPolicy::Skip);
        let s = NarrativeStrategy::new(&inf, &res);
        assert_eq!(
            s.synthesize_name("Guided tour with a FLY IN leg", 9),
            "9 Day Namibia Safari (Fly-In)"
        );
        assert_eq!(
            s.synthesize_name("self drive, partly guided", 14),
            "14 Day Namibia Safari (Self-Drive)"
        );
        assert_eq!(s.synthesize_name("nothing special", 0), "Custom Safari");
        assert_eq!(
            s.synthesize_name("a guided trip", 0),
            "Custom Safari (Guided)"
        );
    }

    #[test]
    fn test_currency_detection() {
        assert_eq!(detect_currency("Total US$ 5,000"), Currency::Usd);
        assert_eq!(detect_currency("Amount due USD"), Currency::Usd);
        assert_eq!(detect_currency("N$ 120,000.00"), Currency::Nad);
        assert_eq!(detect_currency("just numbers 120,000.00"), Currency::Unknown);
    }

    #[test]
    fn test_extract_and_resolve_invoice_text() {
        let (inf, res) = strategy_with(FallbackPolicy::Skip);
        let s = NarrativeStrategy::new(&inf, &res);
        let doc = text_doc(
            "INVOICE\n16 Da16 Day Namibia Safy Namibia Safariari\n\
             Self Drive\nRate $284,350.00 2 $568,700.00\nN$ payable",
        );

        let fields = s.extract_fields(&doc).unwrap();
        assert_eq!(fields.duration_days, 16);
        assert_eq!(fields.tour_name, "16 Day Namibia Safari (Self-Drive)");
        assert_eq!(fields.category.as_str(), fields.tour_name);
        assert_eq!(fields.currency, Currency::Nad);

        let rate = s.resolve_rate(&doc, &fields).unwrap();
        assert_eq!(rate.amount, 284350.0);
    }

    #[test]
    fn test_cells_are_rejected() {
        let (inf, res) = strategy_with(FallbackPolicy::Skip);
        let s = NarrativeStrategy::new(&inf, &res);
        let doc = SourceDocument {
            content: DocumentContent::Cells(Vec::new()),
            ..text_doc("")
        };
        assert!(matches!(
            s.extract_fields(&doc),
            Err(SkipReason::Extraction(_))
        ));
    }
}
