//! Billing types for cost aggregation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency assumed when a plugin omits one
pub const DEFAULT_CURRENCY: &str = "USD";

/// Resource type plus its ordered dimensional attributes.
///
/// Dimension order is significant and duplicates are kept positionally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionalKey {
    pub base_type: String,
    pub dimensions: Vec<(String, String)>,
}

impl DimensionalKey {
    pub fn new(base_type: impl Into<String>) -> Self {
        Self {
            base_type: base_type.into(),
            dimensions: Vec::new(),
        }
    }

    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.push((name.into(), value.into()));
        self
    }

    /// First value recorded under `name`
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// One decoded billing entry: a key, a period label and its cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub key: DimensionalKey,
    pub date: String,
    pub cost: Decimal,
    pub currency: String,
}

/// Projection of a record onto the caller's selector.
///
/// Field order drives the derived ordering: base type, then selector values
/// in selector order, then date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub base_type: String,
    pub dimensions: Vec<(String, String)>,
    pub date: String,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            crate::parsers::encode(&self.base_type, &self.dimensions),
            self.date
        )
    }
}

/// Summed cost of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedGroup {
    pub group_key: GroupKey,
    pub cost: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingData {
    pub date: String,
    pub cost: Decimal,
    pub currency: String,
}

/// Caller-facing record: one re-encoded resource type with its time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub resource_type: String,
    pub billing_data: Vec<BillingData>,
    pub domain_id: String,
}

/// External call that failed while collecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Identity,
    Secret,
    Plugin,
    Timeout,
    /// The task running the call panicked or was aborted
    Task,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Identity => "identity",
            FailureKind::Secret => "secret",
            FailureKind::Plugin => "plugin",
            FailureKind::Timeout => "timeout",
            FailureKind::Task => "task",
        };
        f.write_str(s)
    }
}

/// A binding-level failure absorbed during collection.
///
/// Service account lookups fail per data source, so `service_account_id`
/// is `None` for those.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FetchFailure {
    pub data_source_id: String,
    pub service_account_id: Option<String>,
    pub secret_id: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}", self.kind, self.data_source_id)?;
        if let Some(sa) = &self.service_account_id {
            write!(f, "/{}", sa)?;
        }
        if let Some(secret) = &self.secret_id {
            write!(f, "/{}", secret)?;
        }
        write!(f, "]: {}", self.message)
    }
}

/// A record dropped because its key could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MalformedKeyReport {
    pub key: String,
    pub reason: String,
}

/// Per-request summary of absorbed record- and binding-level errors
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub bindings_resolved: u64,
    pub bindings_failed: u64,
    pub records_collected: u64,
    pub failures: Vec<FetchFailure>,
    pub malformed_keys: Vec<MalformedKeyReport>,
}

impl Diagnostics {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.malformed_keys.is_empty()
    }

    /// Sort reports so identical inputs serialize identically
    pub fn normalize(&mut self) {
        self.failures.sort();
        self.malformed_keys.sort();
    }
}

/// Response of one `get_data` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetDataResponse {
    pub results: Vec<OutputRecord>,
    pub total_count: u64,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_returns_first_occurrence() {
        let key = DimensionalKey::new("inv.CloudService")
            .with_dimension("region_code", "ap-ne-2")
            .with_dimension("region_code", "us-e-2");
        assert_eq!(key.dimension("region_code"), Some("ap-ne-2"));
        assert_eq!(key.dimension("provider"), None);
    }

    #[test]
    fn test_group_key_orders_by_base_then_dimensions_then_date() {
        let a = GroupKey {
            base_type: "a".into(),
            dimensions: vec![("region_code".into(), "z".into())],
            date: "2020-01".into(),
        };
        let b = GroupKey {
            base_type: "b".into(),
            dimensions: vec![("region_code".into(), "a".into())],
            date: "2019-01".into(),
        };
        let c = GroupKey {
            base_type: "a".into(),
            dimensions: vec![("region_code".into(), "z".into())],
            date: "2020-02".into(),
        };
        let mut keys = vec![b.clone(), c.clone(), a.clone()];
        keys.sort();
        assert_eq!(keys, vec![a, c, b]);
    }

    #[test]
    fn test_group_key_display() {
        let key = GroupKey {
            base_type: "inv.CloudService".into(),
            dimensions: vec![("region_code".into(), "ap-ne-2".into())],
            date: "2020-10".into(),
        };
        assert_eq!(key.to_string(), "inv.CloudService?region_code=ap-ne-2@2020-10");
    }

    #[test]
    fn test_fetch_failure_display() {
        let failure = FetchFailure {
            data_source_id: "ds-aws".into(),
            service_account_id: Some("sa-1".into()),
            secret_id: Some("secret-1".into()),
            kind: FailureKind::Plugin,
            message: "503".into(),
        };
        assert_eq!(failure.to_string(), "plugin [ds-aws/sa-1/secret-1]: 503");
    }

    #[test]
    fn test_diagnostics_normalize_sorts_failures() {
        let mut diag = Diagnostics::default();
        for sa in ["sa-b", "sa-a"] {
            diag.failures.push(FetchFailure {
                data_source_id: "ds-1".into(),
                service_account_id: Some(sa.into()),
                secret_id: None,
                kind: FailureKind::Plugin,
                message: "down".into(),
            });
        }
        diag.normalize();
        assert_eq!(diag.failures[0].service_account_id.as_deref(), Some("sa-a"));
        assert!(!diag.is_clean());
    }
}
