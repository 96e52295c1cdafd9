//! File-backed identity, secret and data source registry

use super::{
    DataSourceConnector, DataSourceFilter, DataSourceInfo, DataSourceState, IdentityConnector,
    PluginInfo, SecretConnector, SecretData, SecretInfo, ServiceAccountInfo,
};
use crate::types::{CostrollError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectGroupRecord {
    pub project_group_id: String,
    #[serde(default)]
    pub parent_group_id: Option<String>,
    pub domain_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: String,
    #[serde(default)]
    pub project_group_id: Option<String>,
    pub domain_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccountRecord {
    pub service_account_id: String,
    pub provider: String,
    pub project_id: String,
    pub domain_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub secret_id: String,
    pub service_account_id: String,
    pub domain_id: String,
    #[serde(default)]
    pub data: SecretData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceRecord {
    pub data_source_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub provider: String,
    #[serde(default)]
    pub state: DataSourceState,
    #[serde(default)]
    pub plugin_info: Option<PluginInfo>,
    pub domain_id: String,
}

/// Everything the inventory connector serves
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub project_groups: Vec<ProjectGroupRecord>,
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
    #[serde(default)]
    pub service_accounts: Vec<ServiceAccountRecord>,
    #[serde(default)]
    pub secrets: Vec<SecretRecord>,
    #[serde(default)]
    pub data_sources: Vec<DataSourceRecord>,
}

pub struct InventoryConnector {
    inventory: Inventory,
}

impl InventoryConnector {
    pub fn new(inventory: Inventory) -> Self {
        Self { inventory }
    }

    /// Load an inventory JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let inventory: Inventory = serde_json::from_str(&content).map_err(|e| {
            CostrollError::Parse(format!("invalid inventory {}: {}", path.display(), e))
        })?;
        Ok(Self::new(inventory))
    }

    /// The group plus every group nested beneath it
    fn descendant_groups(&self, root: &str, domain_id: &str) -> HashSet<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        seen.insert(root.to_string());
        queue.push_back(root.to_string());

        while let Some(current) = queue.pop_front() {
            for group in &self.inventory.project_groups {
                if group.domain_id == domain_id
                    && group.parent_group_id.as_deref() == Some(current.as_str())
                    && seen.insert(group.project_group_id.clone())
                {
                    queue.push_back(group.project_group_id.clone());
                }
            }
        }
        seen
    }
}

#[async_trait]
impl IdentityConnector for InventoryConnector {
    async fn list_projects_by_group(
        &self,
        project_group_id: &str,
        domain_id: &str,
    ) -> Result<Vec<String>> {
        let exists = self
            .inventory
            .project_groups
            .iter()
            .any(|g| g.project_group_id == project_group_id && g.domain_id == domain_id);
        if !exists {
            return Err(CostrollError::IdentityLookup(format!(
                "project group '{}' not found in domain '{}'",
                project_group_id, domain_id
            )));
        }

        let groups = self.descendant_groups(project_group_id, domain_id);
        Ok(self
            .inventory
            .projects
            .iter()
            .filter(|p| {
                p.domain_id == domain_id
                    && p.project_group_id
                        .as_ref()
                        .is_some_and(|g| groups.contains(g))
            })
            .map(|p| p.project_id.clone())
            .collect())
    }

    async fn list_all_projects(&self, domain_id: &str) -> Result<Vec<String>> {
        Ok(self
            .inventory
            .projects
            .iter()
            .filter(|p| p.domain_id == domain_id)
            .map(|p| p.project_id.clone())
            .collect())
    }

    async fn list_service_accounts_by_provider(
        &self,
        provider: &str,
        domain_id: &str,
    ) -> Result<Vec<ServiceAccountInfo>> {
        Ok(self
            .inventory
            .service_accounts
            .iter()
            .filter(|sa| sa.provider == provider && sa.domain_id == domain_id)
            .map(|sa| ServiceAccountInfo {
                service_account_id: sa.service_account_id.clone(),
                project_id: sa.project_id.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl SecretConnector for InventoryConnector {
    async fn list_secrets_by_service_account(
        &self,
        service_account_id: &str,
        domain_id: &str,
    ) -> Result<Vec<SecretInfo>> {
        Ok(self
            .inventory
            .secrets
            .iter()
            .filter(|s| s.service_account_id == service_account_id && s.domain_id == domain_id)
            .map(|s| SecretInfo {
                secret_id: s.secret_id.clone(),
            })
            .collect())
    }

    async fn get_secret_data(&self, secret_id: &str, domain_id: &str) -> Result<SecretData> {
        self.inventory
            .secrets
            .iter()
            .find(|s| s.secret_id == secret_id && s.domain_id == domain_id)
            .map(|s| s.data.clone())
            .ok_or_else(|| {
                CostrollError::SecretFetch(format!(
                    "secret '{}' not found in domain '{}'",
                    secret_id, domain_id
                ))
            })
    }
}

#[async_trait]
impl DataSourceConnector for InventoryConnector {
    async fn list_data_sources(&self, filter: &DataSourceFilter) -> Result<Vec<DataSourceInfo>> {
        Ok(self
            .inventory
            .data_sources
            .iter()
            .filter(|ds| ds.domain_id == filter.domain_id)
            .filter(|ds| filter.state.map_or(true, |state| ds.state == state))
            .map(|ds| DataSourceInfo {
                data_source_id: ds.data_source_id.clone(),
                provider: ds.provider.clone(),
                state: ds.state,
                plugin_info: ds.plugin_info.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INVENTORY: &str = r#"{
        "project_groups": [
            {"project_group_id": "pg-root", "domain_id": "d1"},
            {"project_group_id": "pg-child", "parent_group_id": "pg-root", "domain_id": "d1"},
            {"project_group_id": "pg-grandchild", "parent_group_id": "pg-child", "domain_id": "d1"},
            {"project_group_id": "pg-other", "domain_id": "d1"}
        ],
        "projects": [
            {"project_id": "p-root", "project_group_id": "pg-root", "domain_id": "d1"},
            {"project_id": "p-child", "project_group_id": "pg-child", "domain_id": "d1"},
            {"project_id": "p-deep", "project_group_id": "pg-grandchild", "domain_id": "d1"},
            {"project_id": "p-other", "project_group_id": "pg-other", "domain_id": "d1"},
            {"project_id": "p-foreign", "domain_id": "d2"}
        ],
        "service_accounts": [
            {"service_account_id": "sa-aws", "provider": "aws", "project_id": "p-root", "domain_id": "d1"},
            {"service_account_id": "sa-gcp", "provider": "google_cloud", "project_id": "p-child", "domain_id": "d1"}
        ],
        "secrets": [
            {"secret_id": "secret-1", "service_account_id": "sa-aws", "domain_id": "d1", "data": {"key": "AKIA"}}
        ],
        "data_sources": [
            {"data_source_id": "ds-aws", "provider": "aws", "domain_id": "d1", "plugin_info": {"plugin_id": "plugin-aws"}},
            {"data_source_id": "ds-off", "provider": "azure", "state": "DISABLED", "domain_id": "d1"}
        ]
    }"#;

    fn connector() -> InventoryConnector {
        InventoryConnector::new(serde_json::from_str(INVENTORY).unwrap())
    }

    #[tokio::test]
    async fn test_list_projects_by_group_is_recursive() {
        let mut projects = connector().list_projects_by_group("pg-root", "d1").await.unwrap();
        projects.sort();
        assert_eq!(projects, vec!["p-child", "p-deep", "p-root"]);
    }

    #[tokio::test]
    async fn test_list_projects_by_unknown_group() {
        let err = connector()
            .list_projects_by_group("pg-missing", "d1")
            .await
            .unwrap_err();
        assert!(matches!(err, CostrollError::IdentityLookup(_)));
    }

    #[tokio::test]
    async fn test_list_all_projects_scoped_to_domain() {
        let projects = connector().list_all_projects("d1").await.unwrap();
        assert_eq!(projects.len(), 4);
        assert!(!projects.contains(&"p-foreign".to_string()));
    }

    #[tokio::test]
    async fn test_list_service_accounts_by_provider() {
        let accounts = connector()
            .list_service_accounts_by_provider("aws", "d1")
            .await
            .unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].project_id, "p-root");
    }

    #[tokio::test]
    async fn test_secrets() {
        let c = connector();
        let secrets = c.list_secrets_by_service_account("sa-aws", "d1").await.unwrap();
        assert_eq!(secrets, vec![SecretInfo { secret_id: "secret-1".into() }]);

        let data = c.get_secret_data("secret-1", "d1").await.unwrap();
        assert_eq!(data.get("key").and_then(|v| v.as_str()), Some("AKIA"));

        let err = c.get_secret_data("secret-1", "d2").await.unwrap_err();
        assert!(matches!(err, CostrollError::SecretFetch(_)));
    }

    #[tokio::test]
    async fn test_list_data_sources_filters_state() {
        let c = connector();
        let all = c
            .list_data_sources(&DataSourceFilter {
                domain_id: "d1".into(),
                state: None,
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let enabled = c
            .list_data_sources(&DataSourceFilter {
                domain_id: "d1".into(),
                state: Some(DataSourceState::Enabled),
            })
            .await
            .unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].data_source_id, "ds-aws");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(&path, INVENTORY).unwrap();

        let c = InventoryConnector::load(&path).unwrap();
        let data_sources = c
            .list_data_sources(&DataSourceFilter {
                domain_id: "d1".into(),
                state: None,
            })
            .await
            .unwrap();
        assert_eq!(data_sources.len(), 2);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(&path, "{ nope").unwrap();

        assert!(matches!(
            InventoryConnector::load(&path),
            Err(CostrollError::Parse(_))
        ));
    }
}
