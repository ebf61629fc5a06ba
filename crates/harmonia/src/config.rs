// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::emotion::{FusionWeights, Modality};
use crate::error::{EngineError, EngineResult};
use crate::safety::{CrisisLevel, OVERRIDE_LEVEL};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PROFILE_DIR: &str = "HARMONIA_PROFILE_DIR";
pub const ENV_SEED: &str = "HARMONIA_SEED";
pub const ENV_INITIAL_EXPLORATION: &str = "HARMONIA_INITIAL_EXPLORATION";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub learning: LearningConfig,
    pub fusion: FusionConfig,
    pub crisis: CrisisConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub initial_exploration_rate: f64,
    pub exploration_decay: f64,
    pub min_exploration_rate: f64,
    /// Fixed seed for the exploration RNG; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.95,
            initial_exploration_rate: 0.3,
            exploration_decay: 0.995,
            min_exploration_rate: 0.05,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub reliability: ModalityReliability,
    pub fallback_weights: FusionWeights,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            reliability: ModalityReliability::default(),
            fallback_weights: FusionWeights {
                face: 0.35,
                voice: 0.30,
                text: 0.20,
                heart_rate: 0.15,
            },
        }
    }
}

/// Fixed per-modality trust coefficients. These are assumed, not learned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalityReliability {
    pub face: f64,
    pub voice: f64,
    pub text: f64,
    pub heart_rate: f64,
}

impl Default for ModalityReliability {
    fn default() -> Self {
        Self {
            face: 1.2,
            voice: 1.0,
            text: 0.8,
            heart_rate: 0.7,
        }
    }
}

impl ModalityReliability {
    pub fn coefficient(&self, modality: Modality) -> f64 {
        match modality {
            Modality::Face => self.face,
            Modality::Voice => self.voice,
            Modality::Text => self.text,
            Modality::HeartRate => self.heart_rate,
        }
    }
}

/// The music override level is fixed at HIGH and is not configurable.
/// Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrisisConfig {
    pub audit_capacity: usize,
    pub referral_window_days: i64,
    pub referral_medium_threshold: usize,
    /// Lowest level whose result lists emergency resources. At most HIGH.
    pub resource_threshold: CrisisLevel,
}

impl Default for CrisisConfig {
    fn default() -> Self {
        Self {
            audit_capacity: 100,
            referral_window_days: 7,
            referral_medium_threshold: 3,
            resource_threshold: CrisisLevel::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub monitor_interval_secs: u64,
    pub tick_timeout_ms: u64,
    pub classifier_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: 30,
            tick_timeout_ms: 5_000,
            classifier_timeout_ms: 3_000,
        }
    }
}

impl SessionConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_millis(self.tick_timeout_ms)
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub profile_dir: Option<String>,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reads the optional TOML file, then layers `.env` and process
    /// environment overrides on top.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let _ = dotenvy::dotenv();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> EngineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_PROFILE_DIR) {
            self.storage.profile_dir = Some(dir);
        }
        if let Some(seed) = lookup(ENV_SEED) {
            let seed = seed.trim().parse::<u64>().map_err(|e| {
                EngineError::Configuration(format!("{ENV_SEED} is not a valid u64: {e}"))
            })?;
            self.learning.seed = Some(seed);
        }
        if let Some(rate) = lookup(ENV_INITIAL_EXPLORATION) {
            let rate = rate.trim().parse::<f64>().map_err(|e| {
                EngineError::Configuration(format!(
                    "{ENV_INITIAL_EXPLORATION} is not a valid number: {e}"
                ))
            })?;
            self.learning.initial_exploration_rate = rate;
        }
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        let learning = &self.learning;
        let unit_interval = [
            ("learning_rate", learning.learning_rate),
            ("discount_factor", learning.discount_factor),
            ("exploration_decay", learning.exploration_decay),
        ];
        for (name, value) in unit_interval {
            if !(value > 0.0 && value <= 1.0) {
                return Err(EngineError::Configuration(format!(
                    "learning.{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&learning.initial_exploration_rate) {
            return Err(EngineError::Configuration(format!(
                "learning.initial_exploration_rate must be in [0, 1], got {}",
                learning.initial_exploration_rate
            )));
        }
        if !(0.0..=learning.initial_exploration_rate.max(0.0)).contains(&learning.min_exploration_rate)
        {
            return Err(EngineError::Configuration(format!(
                "learning.min_exploration_rate {} must lie between 0 and the initial rate {}",
                learning.min_exploration_rate, learning.initial_exploration_rate
            )));
        }
        let reliability = &self.fusion.reliability;
        for modality in Modality::ALL {
            if reliability.coefficient(modality) <= 0.0 {
                return Err(EngineError::Configuration(format!(
                    "fusion.reliability.{modality} must be positive"
                )));
            }
        }
        if self.fusion.fallback_weights.sum() <= 0.0 {
            return Err(EngineError::Configuration(
                "fusion.fallback_weights must not all be zero".to_string(),
            ));
        }
        if self.crisis.audit_capacity == 0 {
            return Err(EngineError::Configuration(
                "crisis.audit_capacity must be at least 1".to_string(),
            ));
        }
        if self.crisis.resource_threshold > OVERRIDE_LEVEL {
            return Err(EngineError::Configuration(format!(
                "crisis.resource_threshold must be {OVERRIDE_LEVEL} or lower, got {}",
                self.crisis.resource_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_reference_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.learning.learning_rate, 0.1);
        assert_eq!(config.learning.discount_factor, 0.95);
        assert_eq!(config.learning.initial_exploration_rate, 0.3);
        assert_eq!(config.learning.min_exploration_rate, 0.05);
        assert_eq!(config.fusion.reliability.face, 1.2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [learning]
            initial_exploration_rate = 0.5
            seed = 42

            [crisis]
            resource_threshold = "HIGH"
            "#,
        )
        .unwrap();
        assert_eq!(config.learning.initial_exploration_rate, 0.5);
        assert_eq!(config.learning.seed, Some(42));
        assert_eq!(config.learning.discount_factor, 0.95);
        assert_eq!(config.crisis.resource_threshold, CrisisLevel::High);
        assert_eq!(config.session.monitor_interval_secs, 30);
    }

    #[test]
    fn test_invalid_learning_rate_rejected() {
        let result = EngineConfig::from_toml_str("[learning]\nlearning_rate = 1.5\n");
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_override_level_cannot_be_configured() {
        let result = EngineConfig::from_toml_str("[crisis]\noverride_threshold = \"CRITICAL\"\n");
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_resources_must_cover_the_override_level() {
        let result = EngineConfig::from_toml_str("[crisis]\nresource_threshold = \"CRITICAL\"\n");
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_PROFILE_DIR, "/tmp/profiles"),
            (ENV_SEED, "7"),
            (ENV_INITIAL_EXPLORATION, "0.2"),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.storage.profile_dir.as_deref(), Some("/tmp/profiles"));
        assert_eq!(config.learning.seed, Some(7));
        assert_eq!(config.learning.initial_exploration_rate, 0.2);
    }

    #[test]
    fn test_bad_seed_override_is_configuration_error() {
        let mut config = EngineConfig::default();
        let result = config.apply_overrides(|key| (key == ENV_SEED).then(|| "abc".to_string()));
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }
}
