use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

/// Tunables shared by parsing and verification.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Largest absolute difference at which two numbers still match
    pub tolerance: f64,
    /// Decimal digits both numbers are rounded to before comparing
    pub round_digits: u32,
    /// Drop presentational commands (`\mathbf`, `\left`, `\quad`, ...) before parsing
    pub strip_cosmetic: bool,
    /// Wall-clock budget of a bounded call
    pub timeout_ms: u64,
    /// Upper bound on the terms a `\sum` or `\prod` may expand to
    pub max_expansion_terms: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            round_digits: 10,
            strip_cosmetic: true,
            timeout_ms: 5000,
            max_expansion_terms: 10_000,
        }
    }
}

impl Config {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, VerifyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VerifyError::Validation(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            VerifyError::Validation(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VerifyError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(VerifyError::Validation(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.round_digits > 15 {
            return Err(VerifyError::Validation(format!(
                "round_digits must be at most 15, got {}",
                self.round_digits
            )));
        }
        if self.timeout_ms == 0 {
            return Err(VerifyError::Validation(
                "timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.tolerance, 1e-10);
        assert_eq!(config.round_digits, 10);
        assert!(config.strip_cosmetic);
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.max_expansion_terms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"tolerance": 0.001}"#).unwrap();
        assert_eq!(config.tolerance, 0.001);
        assert_eq!(config.round_digits, 10);
    }

    #[test]
    fn rejects_bad_values() {
        let negative = Config {
            tolerance: -1.0,
            ..Config::default()
        };
        assert!(negative.validate().is_err());
        let digits = Config {
            round_digits: 16,
            ..Config::default()
        };
        assert!(digits.validate().is_err());
        let timeout = Config {
            timeout_ms: 0,
            ..Config::default()
        };
        assert!(timeout.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("mathcheck-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"strip_cosmetic": false, "timeout_ms": 250}"#).unwrap();
        let config = Config::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(!config.strip_cosmetic);
        assert_eq!(config.timeout_ms, 250);
    }

    #[test]
    fn missing_file_is_a_validation_error() {
        let err = Config::from_path("/nonexistent/mathcheck.json").unwrap_err();
        assert!(err.is_client_error());
    }
}
