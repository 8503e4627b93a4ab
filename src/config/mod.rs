//! Configuration for tandem
//!
//! Two knobs are consumed by the core: whether internal correctness checks run
//! on runner deactivation, and the size above which output buffers are swapped to
//! temporary files. Both are read from the environment once per process, or loaded
//! explicitly from a YAML/JSON file.

use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Enables internal correctness checks when set to anything other than `0`
pub const CORRECTNESS_CHECKS_ENV: &str = "TANDEM_INTERNAL_CORRECTNESS_CHECKS";

/// Swap threshold in megabytes; negative disables swapping
pub const SWAP_THRESHOLD_ENV: &str = "TANDEM_ARRAY_SWAP_THRESHOLD_MB";

const BYTES_PER_MB: f64 = (1024 * 1024) as f64;

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Assert that runners return to their pre-activation state on deactivation
    #[serde(default)]
    pub internal_correctness_checks: bool,

    /// Output buffers at least this large (in MB) are swapped to disk.
    /// Negative disables swapping, zero swaps every buffer.
    #[serde(default = "default_swap_threshold_mb")]
    pub array_swap_threshold_mb: f64,
}

fn default_swap_threshold_mb() -> f64 {
    -1.0
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            internal_correctness_checks: false,
            array_swap_threshold_mb: default_swap_threshold_mb(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(CORRECTNESS_CHECKS_ENV) {
            config.internal_correctness_checks = value.trim() != "0";
        }

        if let Some(value) = lookup(SWAP_THRESHOLD_ENV) {
            config.array_swap_threshold_mb = value.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{SWAP_THRESHOLD_ENV} must be a number of megabytes, got '{value}'"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds that have no byte size
    pub fn validate(&self) -> Result<()> {
        if !self.array_swap_threshold_mb.is_finite() {
            return Err(Error::Config(format!(
                "swap threshold must be a finite number of megabytes, got {}",
                self.array_swap_threshold_mb
            )));
        }
        Ok(())
    }

    /// Process-wide configuration, read from the environment on first use.
    ///
    /// An unreadable environment falls back to the defaults with a warning.
    pub fn global() -> &'static HarnessConfig {
        static GLOBAL: OnceLock<HarnessConfig> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            Self::from_env().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring invalid environment configuration");
                Self::default()
            })
        })
    }

    /// Enable or disable internal correctness checks
    pub fn with_correctness_checks(mut self, enabled: bool) -> Self {
        self.internal_correctness_checks = enabled;
        self
    }

    /// Set the swap threshold in megabytes
    pub fn with_swap_threshold_mb(mut self, threshold_mb: f64) -> Self {
        self.array_swap_threshold_mb = threshold_mb;
        self
    }

    /// Swap threshold in bytes. Negative means never swap.
    pub fn swap_threshold_bytes(&self) -> i64 {
        if self.array_swap_threshold_mb < 0.0 {
            return -1;
        }
        (self.array_swap_threshold_mb * BYTES_PER_MB) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::from_lookup(lookup(&[])).unwrap();
        assert!(!config.internal_correctness_checks);
        assert_eq!(config.swap_threshold_bytes(), -1);
    }

    #[test]
    fn test_environment_values() {
        let config = HarnessConfig::from_lookup(lookup(&[
            (CORRECTNESS_CHECKS_ENV, "1"),
            (SWAP_THRESHOLD_ENV, "8"),
        ]))
        .unwrap();
        assert!(config.internal_correctness_checks);
        assert_eq!(config.swap_threshold_bytes(), 8 * 1024 * 1024);

        let config = HarnessConfig::from_lookup(lookup(&[(CORRECTNESS_CHECKS_ENV, "0")])).unwrap();
        assert!(!config.internal_correctness_checks);

        let config =
            HarnessConfig::from_lookup(lookup(&[(CORRECTNESS_CHECKS_ENV, "yes")])).unwrap();
        assert!(config.internal_correctness_checks);
    }

    #[test]
    fn test_invalid_threshold() {
        let err = HarnessConfig::from_lookup(lookup(&[(SWAP_THRESHOLD_ENV, "lots")])).unwrap_err();
        assert!(err.to_string().contains(SWAP_THRESHOLD_ENV));
    }

    #[test]
    fn test_non_finite_threshold_is_rejected() {
        for value in ["nan", "inf", "-inf", "NaN"] {
            let err =
                HarnessConfig::from_lookup(lookup(&[(SWAP_THRESHOLD_ENV, value)])).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{value} was accepted");
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tandem.yaml");
        std::fs::write(&path, "array_swap_threshold_mb: .nan\n").unwrap();
        assert!(matches!(HarnessConfig::from_yaml(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_and_fractional_thresholds() {
        assert_eq!(HarnessConfig::default().with_swap_threshold_mb(0.0).swap_threshold_bytes(), 0);
        assert_eq!(
            HarnessConfig::default().with_swap_threshold_mb(0.5).swap_threshold_bytes(),
            512 * 1024
        );
    }

    #[test]
    fn test_harness_config_yaml() {
        let yaml = r#"
internal_correctness_checks: true
array_swap_threshold_mb: 16
"#;
        let config: HarnessConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.internal_correctness_checks);
        assert_eq!(config.array_swap_threshold_mb, 16.0);

        let config: HarnessConfig =
            serde_yaml::from_str("internal_correctness_checks: false").unwrap();
        assert_eq!(config.array_swap_threshold_mb, -1.0);
    }

    #[test]
    fn test_harness_config_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tandem.json");
        std::fs::write(&path, r#"{"array_swap_threshold_mb": 0}"#).unwrap();
        let config = HarnessConfig::from_json(&path).unwrap();
        assert_eq!(config.swap_threshold_bytes(), 0);
        assert!(!config.internal_correctness_checks);
    }
}
