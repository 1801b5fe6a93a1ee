use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// The single table of additive ranking weights and matching thresholds.
///
/// Every field has a default, so a YAML override only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub same_brand_bonus: f64,
    pub original_store_bonus: f64,
    /// Applied at most once per candidate.
    pub preferred_store_bonus: f64,
    pub size_match_bonus: f64,
    pub cheaper_bonus: f64,
    /// Relative package-size difference still counted as "same size".
    pub size_tolerance: f64,
    /// Multiplier (< 1.0) applied to loose-pass raw scores.
    pub loose_pass_penalty: f64,
    /// Maximum hits requested from the search adapter per pass.
    pub pass_limit: usize,
    /// The loose pass runs only when the strong pass yields fewer hits.
    pub min_strong_candidates: usize,
    /// Suggestions shown per item.
    pub top_k: usize,
    /// Hits scoring below this (after penalty) are discarded.
    pub min_similarity: f64,
    /// Extra items a second store must cover to be worth a second trip.
    pub second_store_min_items: usize,
    /// Savings a second store must bring to be worth a second trip.
    pub second_store_min_savings: Decimal,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            same_brand_bonus: 3.0,
            original_store_bonus: 2.0,
            preferred_store_bonus: 2.0,
            size_match_bonus: 1.0,
            cheaper_bonus: 1.0,
            size_tolerance: 0.20,
            loose_pass_penalty: 0.8,
            pass_limit: 10,
            min_strong_candidates: 3,
            top_k: 5,
            min_similarity: 0.2,
            second_store_min_items: 2,
            second_store_min_savings: Decimal::new(500, 2),
        }
    }
}

/// Load and validate a scoring table from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_scoring(path: &Path) -> Result<ScoringConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ScoringFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_scoring(&content)
}

/// Parse and validate a scoring table from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_scoring(content: &str) -> Result<ScoringConfig, ConfigError> {
    let scoring: ScoringConfig = serde_yaml::from_str(content)?;
    validate_scoring(&scoring)?;
    Ok(scoring)
}

fn validate_scoring(scoring: &ScoringConfig) -> Result<(), ConfigError> {
    let weights = [
        ("same_brand_bonus", scoring.same_brand_bonus),
        ("original_store_bonus", scoring.original_store_bonus),
        ("preferred_store_bonus", scoring.preferred_store_bonus),
        ("size_match_bonus", scoring.size_match_bonus),
        ("cheaper_bonus", scoring.cheaper_bonus),
    ];
    for (name, value) in weights {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{name} must be a finite, non-negative number (got {value})"
            )));
        }
    }

    if !(scoring.loose_pass_penalty > 0.0 && scoring.loose_pass_penalty < 1.0) {
        return Err(ConfigError::Validation(format!(
            "loose_pass_penalty must be in (0, 1) (got {})",
            scoring.loose_pass_penalty
        )));
    }

    if !(0.0..=1.0).contains(&scoring.size_tolerance) {
        return Err(ConfigError::Validation(format!(
            "size_tolerance must be in [0, 1] (got {})",
            scoring.size_tolerance
        )));
    }

    if !(0.0..=1.0).contains(&scoring.min_similarity) {
        return Err(ConfigError::Validation(format!(
            "min_similarity must be in [0, 1] (got {})",
            scoring.min_similarity
        )));
    }

    if scoring.pass_limit == 0 || scoring.top_k == 0 {
        return Err(ConfigError::Validation(
            "pass_limit and top_k must be greater than zero".to_string(),
        ));
    }

    if scoring.second_store_min_savings.is_sign_negative() {
        return Err(ConfigError::Validation(
            "second_store_min_savings must not be negative".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(validate_scoring(&ScoringConfig::default()).is_ok());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let scoring = parse_scoring("same_brand_bonus: 4.5\ntop_k: 3\n").unwrap();
        assert!((scoring.same_brand_bonus - 4.5).abs() < f64::EPSILON);
        assert_eq!(scoring.top_k, 3);
        assert!((scoring.original_store_bonus - 2.0).abs() < f64::EPSILON);
        assert_eq!(scoring.second_store_min_savings, Decimal::new(500, 2));
    }

    #[test]
    fn empty_mapping_is_all_defaults() {
        let scoring = parse_scoring("{}").unwrap();
        assert_eq!(scoring, ScoringConfig::default());
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = parse_scoring("brand_bonus: 1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ScoringFileParse(_)));
    }

    #[test]
    fn rejects_negative_weight() {
        let err = parse_scoring("cheaper_bonus: -1.0\n").unwrap_err();
        assert!(err.to_string().contains("cheaper_bonus"));
    }

    #[test]
    fn rejects_penalty_outside_unit_interval() {
        let err = parse_scoring("loose_pass_penalty: 1.0\n").unwrap_err();
        assert!(err.to_string().contains("loose_pass_penalty"));
    }

    #[test]
    fn rejects_zero_top_k() {
        let err = parse_scoring("top_k: 0\n").unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn load_scoring_from_repo_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
            .join("scoring.yaml");
        let result = load_scoring(&path);
        assert!(result.is_ok(), "failed to load scoring.yaml: {result:?}");
    }

    #[test]
    fn load_scoring_reports_missing_file() {
        let err = load_scoring(Path::new("/nonexistent/scoring.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ScoringFileIo { .. }));
    }
}
