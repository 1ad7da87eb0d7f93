// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration
//
// YAML-backed configuration for an orchestrator instance:
// - Host app identity (for the "host reinstall runs last" rule and the
//   deactivation-candidate exclusion)
// - Active-app cap policy and the free-team App ID limit
// - Scheduler pool size
// - Anisette plugin timeout and certificate naming
// - Logging

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::app::BundleId;
use crate::domain::capacity::SlotPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Bundle identifier of the app hosting this orchestrator
    #[serde(default = "default_host_bundle_id")]
    pub host_bundle_id: String,

    /// Maximum simultaneously active apps for free teams (None = unlimited)
    #[serde(default = "default_active_app_limit")]
    pub active_app_limit: Option<usize>,

    /// Count each app extension as its own active slot
    #[serde(default)]
    pub active_limit_includes_extensions: bool,

    /// App IDs a free team may have registered at once
    #[serde(default = "default_free_app_id_limit")]
    pub free_app_id_limit: usize,

    /// Size of the bounded-concurrency pool
    #[serde(default = "default_max_concurrent_operations")]
    pub max_concurrent_operations: usize,

    /// How long to wait for the anisette plugin fallback
    #[serde(default = "default_anisette_plugin_timeout_secs")]
    pub anisette_plugin_timeout_secs: u64,

    /// Prefix of the signing certificate's machine name
    #[serde(default = "default_certificate_machine_name")]
    pub certificate_machine_name: String,

    /// Buffered events before slow subscribers start lagging
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn default_host_bundle_id() -> String {
    "com.sideload.orchestrator".to_string()
}

fn default_active_app_limit() -> Option<usize> {
    Some(3)
}

fn default_free_app_id_limit() -> usize {
    10
}

fn default_max_concurrent_operations() -> usize {
    4
}

fn default_anisette_plugin_timeout_secs() -> u64 {
    5
}

fn default_certificate_machine_name() -> String {
    "Sideload Orchestrator".to_string()
}

fn default_event_bus_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            host_bundle_id: default_host_bundle_id(),
            active_app_limit: default_active_app_limit(),
            active_limit_includes_extensions: false,
            free_app_id_limit: default_free_app_id_limit(),
            max_concurrent_operations: default_max_concurrent_operations(),
            anisette_plugin_timeout_secs: default_anisette_plugin_timeout_secs(),
            certificate_machine_name: default_certificate_machine_name(),
            event_bus_capacity: default_event_bus_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn host_bundle_id(&self) -> BundleId {
        BundleId::new(self.host_bundle_id.clone())
    }

    pub fn slot_policy(&self) -> SlotPolicy {
        SlotPolicy {
            max_active: self.active_app_limit,
            extensions_count: self.active_limit_includes_extensions,
        }
    }

    pub fn anisette_plugin_timeout(&self) -> Duration {
        Duration::from_secs(self.anisette_plugin_timeout_secs)
    }

    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file location
    ///
    /// Search order:
    /// 1. SIDELOAD_CONFIG_PATH environment variable
    /// 2. ./sideload-config.yaml (working directory)
    /// 3. ~/.sideload/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SIDELOAD_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./sideload-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".sideload").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?
        } else if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SIDELOAD_ACTIVE_APP_LIMIT") {
            match val.to_lowercase().as_str() {
                "none" | "unlimited" => {
                    tracing::info!("Environment override: SIDELOAD_ACTIVE_APP_LIMIT=unlimited");
                    self.active_app_limit = None;
                }
                other => match other.parse::<usize>() {
                    Ok(limit) => {
                        tracing::info!("Environment override: SIDELOAD_ACTIVE_APP_LIMIT={}", limit);
                        self.active_app_limit = Some(limit);
                    }
                    Err(_) => tracing::warn!(
                        "Invalid value for SIDELOAD_ACTIVE_APP_LIMIT: '{}'. Ignoring.",
                        val
                    ),
                },
            }
        }

        if let Ok(val) = std::env::var("SIDELOAD_MAX_CONCURRENT_OPERATIONS") {
            match val.parse::<usize>() {
                Ok(n) => {
                    tracing::info!("Environment override: SIDELOAD_MAX_CONCURRENT_OPERATIONS={}", n);
                    self.max_concurrent_operations = n;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for SIDELOAD_MAX_CONCURRENT_OPERATIONS: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("SIDELOAD_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host_bundle_id.trim().is_empty() {
            anyhow::bail!("host_bundle_id cannot be empty");
        }

        if self.max_concurrent_operations == 0 {
            anyhow::bail!("max_concurrent_operations must be at least 1");
        }

        if self.active_app_limit == Some(0) {
            anyhow::bail!("active_app_limit must be at least 1 (use null for unlimited)");
        }

        if self.free_app_id_limit == 0 {
            anyhow::bail!("free_app_id_limit must be at least 1");
        }

        if self.event_bus_capacity == 0 {
            anyhow::bail!("event_bus_capacity must be at least 1");
        }

        if self.certificate_machine_name.trim().is_empty() {
            anyhow::bail!("certificate_machine_name cannot be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.active_app_limit, Some(3));
        assert_eq!(config.free_app_id_limit, 10);
        assert_eq!(config.anisette_plugin_timeout(), Duration::from_secs(5));
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = OrchestratorConfig::from_yaml_str(
            r#"
host_bundle_id: com.example.store
active_app_limit: 10
logging:
  format: json
"#,
        )
        .unwrap();

        assert_eq!(config.host_bundle_id, "com.example.store");
        assert_eq!(config.active_app_limit, Some(10));
        assert_eq!(config.max_concurrent_operations, 4);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_null_limit_means_unlimited() {
        let config = OrchestratorConfig::from_yaml_str("active_app_limit: null\n").unwrap();
        assert_eq!(config.slot_policy().max_active, None);
    }

    #[test]
    fn test_validate_rejects_zero_pool() {
        let config = OrchestratorConfig {
            max_concurrent_operations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let config = OrchestratorConfig {
            host_bundle_id: "com.example.store".to_string(),
            active_app_limit: None,
            ..Default::default()
        };
        config.to_yaml_file(&path).unwrap();

        let loaded = OrchestratorConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.host_bundle_id, "com.example.store");
        assert_eq!(loaded.active_app_limit, None);
    }

    #[test]
    fn test_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = OrchestratorConfig::load_or_default(Some(dir.path().join("missing.yaml")));
        assert!(result.is_err());
    }
}
