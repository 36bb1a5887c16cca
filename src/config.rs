//! TOML configuration parsing and validation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::predict::PredictionParams;
use crate::search::SearchParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_dims() -> usize {
    768
}
fn default_acquire_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: None,
            model: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_display_threshold")]
    pub min_similarity: f64,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    #[serde(default = "default_similarity_weight")]
    pub similarity_weight: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_section_weight")]
    pub section_weight: f64,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            min_similarity: default_display_threshold(),
            candidate_multiplier: default_candidate_multiplier(),
            similarity_weight: default_similarity_weight(),
            recency_weight: default_recency_weight(),
            section_weight: default_section_weight(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_display_threshold() -> f64 {
    0.6
}
fn default_candidate_multiplier() -> usize {
    3
}
fn default_similarity_weight() -> f64 {
    1.0
}
fn default_recency_weight() -> f64 {
    0.02
}
fn default_section_weight() -> f64 {
    0.05
}
fn default_snippet_chars() -> usize {
    500
}

impl SearchConfig {
    /// Ranking parameters with recency normalized over `recency_years`.
    pub fn params(&self, recency_years: (i32, i32)) -> SearchParams {
        SearchParams {
            candidate_multiplier: self.candidate_multiplier,
            similarity_weight: self.similarity_weight,
            recency_weight: self.recency_weight,
            section_weight: self.section_weight,
            recency_years,
            snippet_chars: self.snippet_chars,
            display_threshold: self.min_similarity,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictionConfig {
    #[serde(default = "default_prediction_top_k")]
    pub top_k: usize,
    #[serde(default = "default_internal_threshold")]
    pub min_similarity: f64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_max_supporting")]
    pub max_supporting: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            top_k: default_prediction_top_k(),
            min_similarity: default_internal_threshold(),
            confidence_threshold: default_confidence_threshold(),
            max_supporting: default_max_supporting(),
        }
    }
}

fn default_prediction_top_k() -> usize {
    20
}
fn default_internal_threshold() -> f64 {
    0.3
}
fn default_confidence_threshold() -> f64 {
    0.6
}
fn default_max_supporting() -> usize {
    5
}

impl PredictionConfig {
    pub fn params(&self) -> PredictionParams {
        PredictionParams {
            top_k: self.top_k,
            min_similarity: self.min_similarity,
            confidence_threshold: self.confidence_threshold,
            max_supporting: self.max_supporting,
        }
    }
}

impl Config {
    /// Search parameters, with recency spanning the indexable years.
    pub fn search_params(&self) -> SearchParams {
        self.search
            .params((self.indexing.min_year, self.indexing.max_year))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_min_year")]
    pub min_year: i32,
    #[serde(default = "default_max_year")]
    pub max_year: i32,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            min_year: default_min_year(),
            max_year: default_max_year(),
        }
    }
}

fn default_min_year() -> i32 {
    1789
}
fn default_max_year() -> i32 {
    2100
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.store.dims == 0 {
        bail!("store.dims must be > 0");
    }

    // Search
    let search = &config.search;
    if search.default_top_k == 0 {
        bail!("search.default_top_k must be >= 1");
    }
    if search.candidate_multiplier == 0 {
        bail!("search.candidate_multiplier must be >= 1");
    }
    if !(-1.0..=1.0).contains(&search.min_similarity) {
        bail!("search.min_similarity must be in [-1.0, 1.0]");
    }
    for (name, w) in [
        ("similarity_weight", search.similarity_weight),
        ("recency_weight", search.recency_weight),
        ("section_weight", search.section_weight),
    ] {
        if !(w.is_finite() && w >= 0.0) {
            bail!("search.{} must be a non-negative number", name);
        }
    }
    if search.snippet_chars < 4 {
        bail!("search.snippet_chars must be >= 4");
    }

    // Prediction
    let prediction = &config.prediction;
    if prediction.top_k == 0 {
        bail!("prediction.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&prediction.min_similarity) {
        bail!("prediction.min_similarity must be in [-1.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&prediction.confidence_threshold) {
        bail!("prediction.confidence_threshold must be in [0.0, 1.0]");
    }

    if config.indexing.min_year > config.indexing.max_year {
        bail!("indexing.min_year must be <= indexing.max_year");
    }

    match config.embedding.provider.as_str() {
        "disabled" => {}
        "http" => {
            if config.embedding.url.is_none() {
                bail!("embedding.url must be specified when provider is 'http'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = parse("[store]\npath = \"./data/precedent.sqlite\"\n").unwrap();
        assert_eq!(config.store.dims, 768);
        assert_eq!(config.search.default_top_k, 10);
        assert!((config.search.min_similarity - 0.6).abs() < 1e-9);
        assert!((config.prediction.min_similarity - 0.3).abs() < 1e-9);
        assert_eq!(config.prediction.top_k, 20);
        assert_eq!(config.search_params().recency_years, (1789, 2100));
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_thresholds_are_independent() {
        let config = parse(
            r#"
[store]
path = "x.sqlite"

[search]
min_similarity = 0.75

[prediction]
min_similarity = 0.2
"#,
        )
        .unwrap();
        assert!((config.search_params().display_threshold - 0.75).abs() < 1e-9);
        assert!((config.prediction.params().min_similarity - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_http_provider_requires_url() {
        let err = parse(
            r#"
[store]
path = "x.sqlite"

[embedding]
provider = "http"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.url"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(parse("[store]\npath = \"x\"\ndims = 0\n").is_err());
        assert!(parse("[store]\npath = \"x\"\n[search]\nmin_similarity = 1.5\n").is_err());
        assert!(parse("[store]\npath = \"x\"\n[search]\nrecency_weight = -0.1\n").is_err());
        assert!(parse("[store]\npath = \"x\"\n[indexing]\nmin_year = 2024\nmax_year = 2020\n").is_err());
        assert!(parse("[store]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse(include_str!("../config/precedent.example.toml")).unwrap();
        assert!(config.embedding.is_enabled());
        assert_eq!(config.prediction.max_supporting, 5);
    }
}
