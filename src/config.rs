use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

use crate::error::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("data/invoice_pricing.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            harvest: HarvestConfig::default(),
            inference: InferenceConfig::default(),
            resolver: ResolverConfig::default(),
            normalize: NormalizeConfig::default(),
            pipeline: PipelineConfig::default(),
            output_path: default_output_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_narrative_extensions")]
    pub narrative_extensions: Vec<String>,
    #[serde(default = "default_tabular_extensions")]
    pub tabular_extensions: Vec<String>,
    /// File name prefixes left behind by office suites while a file is open.
    #[serde(default = "default_lock_prefixes")]
    pub lock_prefixes: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from("past invoices")
}

fn default_narrative_extensions() -> Vec<String> {
    vec!["pdf".to_string(), "txt".to_string()]
}

fn default_tabular_extensions() -> Vec<String> {
    ["xlsx", "xls", "xlsm", "ods"].map(String::from).to_vec()
}

fn default_lock_prefixes() -> Vec<String> {
    vec!["~$".to_string(), ".~lock.".to_string()]
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            narrative_extensions: default_narrative_extensions(),
            tabular_extensions: default_tabular_extensions(),
            lock_prefixes: default_lock_prefixes(),
        }
    }
}

/// A tour-name suffix and the keywords that select it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuffixRule {
    pub suffix: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Ordered tabular category vocabulary; first match wins.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_category")]
    pub default_category: String,
    /// Narrative name suffixes in priority order.
    #[serde(default = "default_suffix_rules")]
    pub suffix_rules: Vec<SuffixRule>,
    /// Destinations whose costing sheets are quoted in USD.
    #[serde(default = "default_usd_destinations")]
    pub usd_destinations: Vec<String>,
}

fn default_categories() -> Vec<String> {
    [
        "Self Drive",
        "Fly In",
        "Private Guided",
        "Guided",
        "Family",
        "Honeymoon",
        "Camping",
    ]
    .map(String::from)
    .to_vec()
}

fn default_category() -> String {
    "Classic Safari".to_string()
}

fn default_suffix_rules() -> Vec<SuffixRule> {
    let rule = |suffix: &str, keywords: &[&str]| SuffixRule {
        suffix: suffix.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    };
    vec![
        rule("Fly-In", &["fly-in", "fly in"]),
        rule("Self-Drive", &["self drive", "self-drive"]),
        rule("Guided", &["guided"]),
    ]
}

fn default_usd_destinations() -> Vec<String> {
    ["bots", "botswana", "vic falls", "victoria falls", "zimbabwe"]
        .map(String::from)
        .to_vec()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            default_category: default_category(),
            suffix_rules: default_suffix_rules(),
            usd_destinations: default_usd_destinations(),
        }
    }
}

/// What to do with a narrative document whose candidates contain no
/// per-person divisor of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Drop the document.
    #[default]
    Skip,
    /// Report the total itself as the rate, flagged as fallback.
    UseTotal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Candidates at or below this are party sizes, days or dates.
    #[serde(default = "default_min_candidate")]
    pub min_candidate: f64,
    #[serde(default = "default_ratio_tolerance")]
    pub ratio_tolerance: f64,
    #[serde(default = "default_max_party_size")]
    pub max_party_size: f64,
    /// Zero-based column holding the TOTAL label on costing sheets.
    #[serde(default = "default_label_column")]
    pub label_column: usize,
    /// Offset from the label column to the value column.
    #[serde(default = "default_value_offset")]
    pub value_offset: usize,
    #[serde(default = "default_total_label")]
    pub total_label: String,
    #[serde(default)]
    pub fallback_policy: FallbackPolicy,
}

fn default_min_candidate() -> f64 {
    1000.0
}
fn default_ratio_tolerance() -> f64 {
    0.05
}
fn default_max_party_size() -> f64 {
    20.0
}
fn default_label_column() -> usize {
    10
}
fn default_value_offset() -> usize {
    3
}
fn default_total_label() -> String {
    "TOTAL".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_candidate: default_min_candidate(),
            ratio_tolerance: default_ratio_tolerance(),
            max_party_size: default_max_party_size(),
            label_column: default_label_column(),
            value_offset: default_value_offset(),
            total_label: default_total_label(),
            fallback_policy: FallbackPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// USD per 1 NAD.
    #[serde(default = "default_nad_to_usd")]
    pub nad_to_usd: f64,
    #[serde(default = "default_min_usd")]
    pub min_usd: f64,
    #[serde(default = "default_max_usd")]
    pub max_usd: f64,
}

fn default_nad_to_usd() -> f64 {
    0.053
}
fn default_min_usd() -> f64 {
    1000.0
}
fn default_max_usd() -> f64 {
    60000.0
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            nad_to_usd: default_nad_to_usd(),
            min_usd: default_min_usd(),
            max_usd: default_max_usd(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_document_timeout_secs")]
    pub document_timeout_secs: u64,
}

fn default_workers() -> usize {
    4
}
fn default_document_timeout_secs() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            document_timeout_secs: default_document_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        let cfg: Config = toml::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `path` when given, otherwise fall back to the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, PipelineError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let n = &self.normalize;
        if n.nad_to_usd.is_nan() || n.nad_to_usd <= 0.0 {
            return Err(PipelineError::Config(format!(
                "normalize.nad_to_usd must be positive, got {}",
                n.nad_to_usd
            )));
        }
        if n.min_usd > n.max_usd {
            return Err(PipelineError::Config(format!(
                "plausibility band is inverted: [{}, {}]",
                n.min_usd, n.max_usd
            )));
        }
        if self.pipeline.workers == 0 {
            return Err(PipelineError::Config(
                "pipeline.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.normalize.nad_to_usd, 0.053);
        assert_eq!(cfg.output_path, Config::default().output_path);
        assert_eq!(cfg.resolver.label_column, 10);
        assert_eq!(cfg.resolver.fallback_policy, FallbackPolicy::Skip);
        assert_eq!(cfg.inference.categories[0], "Self Drive");
        assert_eq!(cfg.inference.suffix_rules[0].suffix, "Fly-In");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let cfg: Config = toml::from_str(
            r#"
            output_path = "out/pricing.json"

            [normalize]
            nad_to_usd = 0.0526

            [resolver]
            fallback_policy = "use_total"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.output_path, PathBuf::from("out/pricing.json"));
        assert_eq!(cfg.normalize.nad_to_usd, 0.0526);
        assert_eq!(cfg.normalize.max_usd, 60000.0);
        assert_eq!(cfg.resolver.fallback_policy, FallbackPolicy::UseTotal);
    }

    #[test]
    fn test_example_config_parses() {
        let cfg: Config =
            toml::from_str(include_str!("../config/tour_pricing.example.toml")).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.inference.suffix_rules.len(), 3);
        assert_eq!(cfg.harvest.root, PathBuf::from("past invoices"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.normalize.min_usd = 5000.0;
        cfg.normalize.max_usd = 100.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.normalize.nad_to_usd = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.pipeline.workers = 0;
        assert!(cfg.validate().is_err());
    }
}
