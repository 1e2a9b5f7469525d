// src/normalize.rs

use crate::config::{FallbackPolicy, NormalizeConfig};
use crate::error::SkipReason;
use crate::heuristics::{Currency, RateConfidence, ResolvedRate, TourCategory};
use serde::Serialize;
use tracing::{debug, warn};

/// A rate converted to USD that passed the plausibility band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPrice {
    pub usd_amount: f64,
    pub category: TourCategory,
    pub source_file: String,
    pub confidence: RateConfidence,
}

/// Converts resolved rates into the reporting currency and rejects
/// implausible values.
pub struct CurrencyNormalizer<'a> {
    config: &'a NormalizeConfig,
    fallback_policy: FallbackPolicy,
}

impl<'a> CurrencyNormalizer<'a> {
    pub fn new(config: &'a NormalizeConfig, fallback_policy: FallbackPolicy) -> Self {
        Self {
            config,
            fallback_policy,
        }
    }

    /// Amount in USD. Unknown currency is treated as NAD.
    pub fn to_usd(&self, rate: &ResolvedRate) -> f64 {
        match rate.currency {
            Currency::Usd => rate.amount,
            Currency::Nad => rate.amount * self.config.nad_to_usd,
            Currency::Unknown => {
                warn!(amount = rate.amount, "Currency unknown, assuming NAD");
                rate.amount * self.config.nad_to_usd
            }
        }
    }

    pub fn in_band(&self, usd: f64) -> bool {
        usd >= self.config.min_usd && usd <= self.config.max_usd
    }

    pub fn normalize(
        &self,
        rate: &ResolvedRate,
        category: TourCategory,
        source_file: impl Into<String>,
    ) -> Result<NormalizedPrice, SkipReason> {
        let source_file = source_file.into();
        if rate.confidence == RateConfidence::Fallback
            && self.fallback_policy != FallbackPolicy::UseTotal
        {
            // only reachable if a resolver ignored the policy
            return Err(SkipReason::AmbiguousRate {
                total: rate.amount,
                candidates: vec![rate.amount],
            });
        }

        let usd = self.to_usd(rate);
        if !self.in_band(usd) {
            warn!(
                file = %source_file,
                raw = rate.amount,
                currency = ?rate.currency,
                usd,
                min = self.config.min_usd,
                max = self.config.max_usd,
                "Price outside plausibility band"
            );
            return Err(SkipReason::OutOfPlausibilityRange {
                raw: rate.amount,
                usd,
            });
        }

        debug!(file = %source_file, raw = rate.amount, usd, "Normalized price");
        Ok(NormalizedPrice {
            usd_amount: usd,
            category,
            source_file,
            confidence: rate.confidence,
        })
    }
}
