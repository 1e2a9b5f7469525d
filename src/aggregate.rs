// src/aggregate.rs

use crate::heuristics::{RateConfidence, TourCategory};
use crate::normalize::NormalizedPrice;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// One record of the published pricing artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category: String,
    pub currency: String,
    pub average_usd: i64,
    pub min_usd: i64,
    pub max_usd: i64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Group {
    samples: Vec<f64>,
    fallback: usize,
}

/// Accumulates accepted prices per category. Merging is commutative and
/// associative; summaries do not depend on the order prices arrived in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregator {
    groups: BTreeMap<TourCategory, Group>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, price: NormalizedPrice) {
        let group = self.groups.entry(price.category).or_default();
        group.samples.push(price.usd_amount);
        if price.confidence == RateConfidence::Fallback {
            group.fallback += 1;
        }
    }

    /// Fold another accumulator into this one. Commutative and associative:
    /// summaries never depend on how samples were partitioned. The pipeline
    /// feeds a single accumulator through [`Aggregator::add`]; this is the
    /// contract for combining partial accumulators built elsewhere.
    pub fn merge(&mut self, other: Aggregator) {
        for (key, group) in other.groups {
            let mine = self.groups.entry(key).or_default();
            mine.samples.extend(group.samples);
            mine.fallback += group.fallback;
        }
    }

    /// Per-category summaries sorted ascending by category.
    pub fn summarize(&self) -> Vec<CategorySummary> {
        self.groups
            .iter()
            .map(|(key, group)| {
                let mut samples = group.samples.clone();
                samples.sort_by(|a, b| a.total_cmp(b));

                let count = samples.len();
                let sum: f64 = samples.iter().sum();
                let min = samples.first().copied().unwrap_or(0.0);
                let max = samples.last().copied().unwrap_or(0.0);

                if group.fallback > 0 {
                    info!(
                        category = %key,
                        fallback = group.fallback,
                        samples = count,
                        "Category includes fallback-confidence rates"
                    );
                }

                CategorySummary {
                    category: key.to_string(),
                    currency: "USD".to_string(),
                    average_usd: (sum / count as f64).round() as i64,
                    min_usd: min.round() as i64,
                    max_usd: max.round() as i64,
                    sample_count: count,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(category: &str, usd: f64) -> NormalizedPrice {
        NormalizedPrice {
            usd_amount: usd,
            category: TourCategory::new(category),
            source_file: format!("{category}-{usd}.pdf"),
            confidence: RateConfidence::Accepted,
        }
    }

    fn sample_prices() -> Vec<NormalizedPrice> {
        vec![
            price("Self Drive", 3180.4),
            price("11 Day Namibia Safari", 5000.0),
            price("Self Drive", 2650.1),
            price("11 Day Namibia Safari", 5400.0),
            price("Fly In", 12000.0),
            price("11 Day Namibia Safari", 5200.0),
            price("Self Drive", 4020.7),
        ]
    }

    #[test]
    fn test_summary_values() {
        let mut agg = Aggregator::new();
        for p in sample_prices() {
            agg.add(p);
        }
        let out = agg.summarize();

        assert_eq!(
            out[0],
            CategorySummary {
                category: "11 Day Namibia Safari".to_string(),
                currency: "USD".to_string(),
                average_usd: 5200,
                min_usd: 5000,
                max_usd: 5400,
                sample_count: 3,
            }
        );
        let keys: Vec<_> = out.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(keys, vec!["11 Day Namibia Safari", "Fly In", "Self Drive"]);

        let self_drive = &out[2];
        assert_eq!(self_drive.sample_count, 3);
        assert_eq!(self_drive.min_usd, 2650);
        assert_eq!(self_drive.max_usd, 4021);
        assert_eq!(self_drive.average_usd, 3284);
        for s in &out {
            assert!(s.min_usd <= s.average_usd && s.average_usd <= s.max_usd);
        }
    }

    #[test]
    fn test_order_independence() {
        let prices = sample_prices();
        let mut forward = Aggregator::new();
        for p in prices.iter().cloned() {
            forward.add(p);
        }
        let mut backward = Aggregator::new();
        for p in prices.iter().rev().cloned() {
            backward.add(p);
        }
        let mut rotated = Aggregator::new();
        for p in prices.iter().cycle().skip(3).take(prices.len()).cloned() {
            rotated.add(p);
        }

        assert_eq!(forward.summarize(), backward.summarize());
        assert_eq!(forward.summarize(), rotated.summarize());
    }

    #[test]
    fn test_merge_matches_single_accumulator() {
        let prices = sample_prices();
        let mut whole = Aggregator::new();
        for p in prices.iter().cloned() {
            whole.add(p);
        }

        let (left, right) = prices.split_at(4);
        let mut a = Aggregator::new();
        left.iter().cloned().for_each(|p| a.add(p));
        let mut b = Aggregator::new();
        right.iter().cloned().for_each(|p| b.add(p));

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);

        assert_eq!(ab.summarize(), whole.summarize());
        assert_eq!(ba.summarize(), whole.summarize());
    }

    #[test]
    fn test_empty_aggregator() {
        assert!(Aggregator::new().summarize().is_empty());
    }
}
