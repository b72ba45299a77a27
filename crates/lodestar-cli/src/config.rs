//! CLI configuration
//!
//! Loaded from TOML. A missing file means defaults; every section is
//! optional.

use anyhow::{Context, Result};
use lodestar_core::{LodestarError, SchemaRegistry, ServiceSchema};
use lodestar_reconcile::{DriftConfig, ReconcileConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where revisions are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local; gone when the command exits
    Memory,
    /// Content-addressed files under `root`
    Filesystem,
}

/// `[store]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend kind
    pub backend: StoreBackend,
    /// Filesystem backend root
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Filesystem,
            root: PathBuf::from(".lodestar/store"),
        }
    }
}

/// `[devices]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Directory holding `<device>.json` running configurations
    pub root: PathBuf,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".lodestar/devices"),
        }
    }
}

/// Complete CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodestarConfig {
    /// Versioned store
    pub store: StoreConfig,
    /// Reconciliation engine and pass retry
    pub reconcile: ReconcileConfig,
    /// Watch mode
    pub drift: DriftConfig,
    /// File-backed devices
    pub devices: DevicesConfig,
    /// Schemas beyond the built-in ones
    pub schemas: Vec<ServiceSchema>,
}

impl LodestarConfig {
    /// Read `path`, falling back to defaults when it does not exist
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse and validate TOML text
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject unusable settings
    pub fn validate(&self) -> Result<(), LodestarError> {
        self.reconcile.validate()?;
        self.drift.validate()?;
        self.schema_registry().map(|_| ())
    }

    /// Built-in schemas plus the configured ones
    pub fn schema_registry(&self) -> Result<SchemaRegistry, LodestarError> {
        let mut registry = SchemaRegistry::with_builtins();
        for schema in &self.schemas {
            registry.register(schema.clone()).map_err(|e| {
                LodestarError::configuration(format!("schema {}: {e}", schema.name))
            })?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = LodestarConfig::parse("").unwrap();
        assert_eq!(config, LodestarConfig::default());
        assert_eq!(config.reconcile.max_concurrent_pushes, 8);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = LodestarConfig::parse(
            r#"
            [store]
            backend = "memory"

            [reconcile]
            max_concurrent_pushes = 2
            refresh_actual_after_push = false

            [reconcile.retry]
            max_attempts = 5

            [drift]
            interval_secs = 10

            [[schemas]]
            name = "vlans"
            namespace = "openconfig-vlan:vlans"
            list = "vlan"
            key = "vlan-id"
            enable_leaf = "config/status"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.reconcile.max_concurrent_pushes, 2);
        assert!(!config.reconcile.refresh_actual_after_push);
        assert_eq!(config.reconcile.retry.max_attempts, 5);
        assert_eq!(config.reconcile.retry.initial_delay_ms, 200);
        assert_eq!(config.drift.interval_secs, 10);
        assert!(config.schema_registry().unwrap().contains("vlans"));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let err = LodestarConfig::parse("[reconcile]\nmax_concurrent_pushes = 0\n");
        assert!(err.is_err());
        assert!(LodestarConfig::parse("[drift]\ninterval_secs = 0\n").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LodestarConfig::load(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Filesystem);
    }
}
