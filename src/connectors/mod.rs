//! Collaborator interfaces: identity, secrets, data sources and plugins
//!
//! The orchestrator only talks to these traits. Concrete backends:
//! - `InventoryConnector` serves identity, secrets and data sources from a
//!   JSON inventory file.
//! - `HttpPluginConnector` calls a running billing plugin over HTTP.
//! - `DirectoryPluginConnector` replays plugin responses stored on disk.
//! - `MemoryPluginConnector` returns programmed responses (tests, benches).

mod inventory;
mod memory;
mod plugin;

pub use inventory::{
    DataSourceRecord, Inventory, InventoryConnector, ProjectGroupRecord, ProjectRecord,
    SecretRecord, ServiceAccountRecord,
};
pub use memory::MemoryPluginConnector;
pub use plugin::{DirectoryPluginConnector, HttpPluginConnector};

use crate::parsers::PluginResponse;
use crate::types::{CostrollError, QueryWindow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Credential blob handed to plugins as-is
pub type SecretData = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountInfo {
    pub service_account_id: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretInfo {
    pub secret_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSourceState {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpgradeMode {
    #[default]
    Auto,
    Manual,
}

/// Plugin configuration attached to a data source
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PluginInfo {
    pub plugin_id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub upgrade_mode: UpgradeMode,
    /// Base URL of a running plugin (required by the HTTP runtime)
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl PluginInfo {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for PluginInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.version, self.upgrade_mode) {
            (Some(v), UpgradeMode::Manual) => write!(f, "{}@{}", self.plugin_id, v),
            _ => f.write_str(&self.plugin_id),
        }
    }
}

/// Registered billing data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub data_source_id: String,
    pub provider: String,
    #[serde(default)]
    pub state: DataSourceState,
    #[serde(default)]
    pub plugin_info: Option<PluginInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataSourceFilter {
    pub domain_id: String,
    pub state: Option<DataSourceState>,
}

/// Query forwarded to a plugin alongside the credentials
#[derive(Debug, Clone, PartialEq)]
pub struct PluginQuery {
    pub schema: Option<String>,
    pub filter: serde_json::Map<String, serde_json::Value>,
    pub aggregation: Vec<String>,
    pub window: QueryWindow,
}

/// Project and service account directory
#[async_trait]
pub trait IdentityConnector: Send + Sync {
    /// Projects of a group and of all its descendant groups
    async fn list_projects_by_group(
        &self,
        project_group_id: &str,
        domain_id: &str,
    ) -> Result<Vec<String>>;

    async fn list_all_projects(&self, domain_id: &str) -> Result<Vec<String>>;

    async fn list_service_accounts_by_provider(
        &self,
        provider: &str,
        domain_id: &str,
    ) -> Result<Vec<ServiceAccountInfo>>;
}

/// Credential store
#[async_trait]
pub trait SecretConnector: Send + Sync {
    async fn list_secrets_by_service_account(
        &self,
        service_account_id: &str,
        domain_id: &str,
    ) -> Result<Vec<SecretInfo>>;

    async fn get_secret_data(&self, secret_id: &str, domain_id: &str) -> Result<SecretData>;
}

/// Data source registry
#[async_trait]
pub trait DataSourceConnector: Send + Sync {
    async fn list_data_sources(&self, filter: &DataSourceFilter) -> Result<Vec<DataSourceInfo>>;
}

/// Billing plugin runtime
#[async_trait]
pub trait PluginConnector: Send + Sync {
    /// Reject plugin configuration this runtime cannot use
    fn validate(&self, plugin_info: &PluginInfo) -> Result<()> {
        if plugin_info.plugin_id.is_empty() {
            return Err(CostrollError::Configuration(
                "plugin_info.plugin_id is empty".into(),
            ));
        }
        Ok(())
    }

    async fn fetch_cost_data(
        &self,
        plugin_info: &PluginInfo,
        secret_data: &SecretData,
        query: &PluginQuery,
    ) -> Result<PluginResponse>;
}

/// Shared handles to every collaborator a request needs
#[derive(Clone)]
pub struct Connectors {
    pub identity: Arc<dyn IdentityConnector>,
    pub secret: Arc<dyn SecretConnector>,
    pub data_source: Arc<dyn DataSourceConnector>,
    pub plugin: Arc<dyn PluginConnector>,
}

impl Connectors {
    /// Serve identity, secrets and data sources from one inventory
    pub fn with_inventory(
        inventory: Arc<InventoryConnector>,
        plugin: Arc<dyn PluginConnector>,
    ) -> Self {
        Self {
            identity: inventory.clone(),
            secret: inventory.clone(),
            data_source: inventory,
            plugin,
        }
    }
}
