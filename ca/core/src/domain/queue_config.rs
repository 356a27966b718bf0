// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Request Queue Configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) for a CA request
// queue node:
// - Queue identity and lifecycle switches
// - Crash recovery behaviour
// - Admission control limits
// - Logging settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::request::REQUEST_SCHEMA_VERSION;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "RequestQueueConfig";

/// Top-level request queue configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestQueueConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "RequestQueueConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: RequestQueueConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestQueueConfigSpec {
    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Queue name, used in log fields
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Schema version stamped on new requests
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Whether `mark_request_pending` runs the drive loop, and with it the
    /// pending notifier. Disabling it leaves the request parked silently.
    #[serde(default = "default_true")]
    pub notify_on_mark_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Spawn the recovery task as part of queue startup
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on concurrent `process_request` calls. Unbounded if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_requests: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (e.g., "info", "debug", "trace"), overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_queue_name() -> String {
    "ca".to_string()
}

fn default_schema_version() -> String {
    REQUEST_SCHEMA_VERSION.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            schema_version: default_schema_version(),
            notify_on_mark_pending: true,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_on_startup: true,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Compact,
        }
    }
}

impl Default for RequestQueueConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "aegis-ca".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: RequestQueueConfigSpec::default(),
        }
    }
}

impl RequestQueueConfigManifest {
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

    /// Discover configuration file using precedence order
    /// 1. AEGIS_CA_CONFIG_PATH environment variable
    /// 2. ./aegis-ca-config.yaml (working directory)
    /// 3. ~/.aegis/ca-config.yaml (user home)
    /// 4. /etc/aegis/ca-config.yaml (system, Unix) or C:\ProgramData\Aegis\ca-config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AEGIS_CA_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-ca-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("ca-config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/aegis/ca-config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Aegis\\ca-config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = explicit_path {
            tracing::info!("Loading request queue configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load request queue config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading request queue configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No request queue configuration found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Some(val) = env_flag("AEGIS_CA_NOTIFY_ON_MARK_PENDING") {
            self.spec.queue.notify_on_mark_pending = val;
        }

        if let Some(val) = env_flag("AEGIS_CA_RECOVERY_ENABLED") {
            self.spec.recovery.enabled = val;
        }

        if let Ok(level) = std::env::var("AEGIS_CA_LOG_LEVEL") {
            if !level.trim().is_empty() {
                tracing::info!("Environment override: AEGIS_CA_LOG_LEVEL={}", level);
                self.spec.observability.log_level = level;
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

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.queue.name.is_empty() {
            anyhow::bail!("spec.queue.name cannot be empty");
        }

        if self.spec.queue.schema_version.is_empty() {
            anyhow::bail!("spec.queue.schema_version cannot be empty");
        }

        if self.spec.scheduler.max_concurrent_requests == Some(0) {
            anyhow::bail!("spec.scheduler.max_concurrent_requests must be greater than zero");
        }

        if self.spec.observability.log_level.is_empty() {
            anyhow::bail!("spec.observability.log_level cannot be empty");
        }

        Ok(())
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    match parse_flag(&val) {
        Some(flag) => {
            tracing::info!("Environment override: {}={}", name, flag);
            Some(flag)
        }
        None => {
            tracing::warn!(
                "Invalid value for {}: '{}'. Expected true/false. Ignoring.",
                name,
                val
            );
            None
        }
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = RequestQueueConfigManifest::default();
        assert_eq!(manifest.api_version, "100monkeys.ai/v1");
        assert_eq!(manifest.kind, "RequestQueueConfig");
        assert!(manifest.spec.queue.notify_on_mark_pending);
        assert!(manifest.spec.recovery.enabled);
        assert!(manifest.spec.recovery.run_on_startup);
        assert_eq!(manifest.spec.scheduler.max_concurrent_requests, None);
        assert_eq!(manifest.spec.observability.log_format, LogFormat::Compact);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: RequestQueueConfig
metadata:
  name: ca-primary
spec:
  queue:
    name: ca
    notify_on_mark_pending: false
  scheduler:
    max_concurrent_requests: 8
  observability:
    log_format: json
"#;
        let manifest = RequestQueueConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "ca-primary");
        assert!(!manifest.spec.queue.notify_on_mark_pending);
        assert_eq!(manifest.spec.queue.schema_version, REQUEST_SCHEMA_VERSION);
        assert!(manifest.spec.recovery.enabled);
        assert_eq!(manifest.spec.scheduler.max_concurrent_requests, Some(8));
        assert_eq!(manifest.spec.observability.log_format, LogFormat::Json);
        assert_eq!(manifest.spec.observability.log_level, "info");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca-config.yaml");

        let mut manifest = RequestQueueConfigManifest::default();
        manifest.metadata.name = "ca-secondary".to_string();
        manifest.spec.recovery.run_on_startup = false;
        manifest.to_yaml_file(&path).unwrap();

        let parsed = RequestQueueConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(parsed.metadata.name, "ca-secondary");
        assert!(!parsed.spec.recovery.run_on_startup);
        assert_eq!(parsed.spec.queue, manifest.spec.queue);
    }

    #[test]
    fn test_load_or_default_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(RequestQueueConfigManifest::load_or_default(Some(missing)).is_err());
    }

    #[test]
    fn test_validation() {
        let mut manifest = RequestQueueConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.queue.name = String::new();
        assert!(manifest.validate().is_err());
        manifest.spec.queue.name = "ca".to_string();

        manifest.spec.scheduler.max_concurrent_requests = Some(0);
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("YES"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
