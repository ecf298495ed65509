// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Governance Configuration - Kubernetes-style manifest
//
// Tunables for the adaptation loop:
// - Event publisher buffering
// - Notification channel capacity
// - Pattern detection thresholds
// - Suggestion generation thresholds and budget scaling

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "GovernanceConfig";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "AEGIS_GOVERNANCE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "./governance.yaml";

/// Top-level governance configuration manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GovernanceConfig")
    pub kind: String,

    #[serde(default)]
    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: GovernanceSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            version: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceSpec {
    #[serde(default)]
    pub publisher: PublisherConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Events held before an automatic flush. 0 appends every event immediately.
    #[serde(default)]
    pub buffer_size: usize,

    /// Upper bound on events retained after failed flushes.
    #[serde(default = "default_max_buffered")]
    pub max_buffered: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            buffer_size: 0,
            max_buffered: default_max_buffered(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Broadcast capacity; slow subscribers lag past this many events.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    #[serde(default = "default_min_frequency")]
    pub min_frequency: u64,

    /// Window length of the tool sequence detector.
    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,

    #[serde(default = "default_affinity_min_co_occurrence")]
    pub affinity_min_co_occurrence: u64,

    #[serde(default = "default_long_run_threshold")]
    pub long_run_threshold_seconds: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            min_frequency: default_min_frequency(),
            sequence_length: default_sequence_length(),
            affinity_min_co_occurrence: default_affinity_min_co_occurrence(),
            long_run_threshold_seconds: default_long_run_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_min_confidence")]
    pub eligibility_min_confidence: f64,

    #[serde(default = "default_min_confidence")]
    pub budget_min_confidence: f64,

    /// Fractional increase applied to an exhausted budget (0.25 = +25%).
    #[serde(default = "default_budget_increase_rate")]
    pub budget_increase_rate: f64,

    /// Budget raised when runs keep exceeding the long-run threshold.
    #[serde(default = "default_timeout_budget_name")]
    pub timeout_budget_name: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            eligibility_min_confidence: default_min_confidence(),
            budget_min_confidence: default_min_confidence(),
            budget_increase_rate: default_budget_increase_rate(),
            timeout_budget_name: default_timeout_budget_name(),
        }
    }
}

fn default_max_buffered() -> usize {
    10_000
}

fn default_channel_capacity() -> usize {
    1000
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_min_frequency() -> u64 {
    2
}

fn default_sequence_length() -> usize {
    3
}

fn default_affinity_min_co_occurrence() -> u64 {
    3
}

fn default_long_run_threshold() -> u64 {
    300
}

fn default_budget_increase_rate() -> f64 {
    0.25
}

fn default_timeout_budget_name() -> String {
    "run_timeout_seconds".to_string()
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata::default(),
            spec: GovernanceSpec::default(),
        }
    }
}

impl GovernanceConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AEGIS_GOVERNANCE_CONFIG environment variable
    /// 2. ./governance.yaml (working directory)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from(DEFAULT_CONFIG_FILE);
        if cwd.exists() {
            return Some(cwd);
        }

        None
    }

    /// Load configuration with discovery, fallback to default.
    /// An explicit path must exist and parse.
    pub fn load_or_default(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = path {
            tracing::info!("Loading governance configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load governance config at {:?}: {}", path, e)
            })?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading governance configuration from discovered path: {:?}", path);
            Self::from_yaml_file(path)?
        } else {
            tracing::debug!("No governance configuration file found. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("AEGIS_PUBLISHER_BUFFER_SIZE") {
            match val.trim().parse::<usize>() {
                Ok(size) => {
                    tracing::info!("Environment override: AEGIS_PUBLISHER_BUFFER_SIZE={}", size);
                    self.spec.publisher.buffer_size = size;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AEGIS_PUBLISHER_BUFFER_SIZE: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("AEGIS_BUDGET_INCREASE_RATE") {
            match val.trim().parse::<f64>() {
                Ok(rate) => {
                    tracing::info!("Environment override: AEGIS_BUDGET_INCREASE_RATE={}", rate);
                    self.spec.generation.budget_increase_rate = rate;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AEGIS_BUDGET_INCREASE_RATE: '{}'. Expected a number. Ignoring.",
                    val
                ),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        let detection = &self.spec.detection;
        let generation = &self.spec.generation;
        for (name, value) in [
            ("detection.min_confidence", detection.min_confidence),
            ("generation.eligibility_min_confidence", generation.eligibility_min_confidence),
            ("generation.budget_min_confidence", generation.budget_min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("spec.{} must be within [0, 1], got {}", name, value);
            }
        }

        if detection.sequence_length < 2 {
            anyhow::bail!(
                "spec.detection.sequence_length must be at least 2, got {}",
                detection.sequence_length
            );
        }

        if generation.budget_increase_rate.is_nan() || generation.budget_increase_rate <= 0.0 {
            anyhow::bail!(
                "spec.generation.budget_increase_rate must be positive, got {}",
                generation.budget_increase_rate
            );
        }

        if generation.timeout_budget_name.trim().is_empty() {
            anyhow::bail!("spec.generation.timeout_budget_name cannot be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_manifest() {
        let config = GovernanceConfig::default();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.kind, KIND);
        assert_eq!(config.spec.publisher.buffer_size, 0);
        assert_eq!(config.spec.publisher.max_buffered, 10_000);
        assert_eq!(config.spec.notifications.channel_capacity, 1000);
        assert_eq!(config.spec.detection.sequence_length, 3);
        assert_eq!(config.spec.generation.budget_increase_rate, 0.25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: GovernanceConfig
metadata:
  name: staging
spec:
  publisher:
    buffer_size: 16
  detection:
    min_frequency: 4
"#;
        let config = GovernanceConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.metadata.name, "staging");
        assert_eq!(config.spec.publisher.buffer_size, 16);
        assert_eq!(config.spec.detection.min_frequency, 4);
        assert_eq!(config.spec.detection.min_confidence, 0.5);
        assert_eq!(config.spec.generation.timeout_budget_name, "run_timeout_seconds");
    }

    #[test]
    fn test_validation() {
        let mut config = GovernanceConfig::default();

        config.api_version = "wrong/v1".to_string();
        assert!(config.validate().is_err());
        config.api_version = API_VERSION.to_string();

        config.kind = "NodeConfig".to_string();
        assert!(config.validate().is_err());
        config.kind = KIND.to_string();

        config.spec.detection.min_confidence = 1.5;
        assert!(config.validate().is_err());
        config.spec.detection.min_confidence = 0.5;

        config.spec.detection.sequence_length = 1;
        assert!(config.validate().is_err());
        config.spec.detection.sequence_length = 3;

        config.spec.generation.budget_increase_rate = 0.0;
        assert!(config.validate().is_err());
        config.spec.generation.budget_increase_rate = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars = HashMap::from([
            ("AEGIS_PUBLISHER_BUFFER_SIZE", "32"),
            ("AEGIS_BUDGET_INCREASE_RATE", "not-a-number"),
        ]);
        let mut config = GovernanceConfig::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.spec.publisher.buffer_size, 32);
        assert_eq!(config.spec.generation.budget_increase_rate, 0.25);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let result = GovernanceConfig::load_or_default(Some(PathBuf::from(
            "/nonexistent/governance.yaml",
        )));
        assert!(result.is_err());
    }
}
