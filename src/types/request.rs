//! Request types: scope, query window and aggregation selector

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::{CostrollError, Result};

/// Which accounts a request covers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scope {
    pub domain_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub project_group_id: Option<String>,
    /// Explicit service accounts; non-empty skips project resolution
    #[serde(default)]
    pub service_accounts: Vec<String>,
}

impl Scope {
    pub fn domain(domain_id: impl Into<String>) -> Self {
        Self {
            domain_id: domain_id.into(),
            ..Default::default()
        }
    }
}

/// Period bucketing requested from plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    Daily,
    Monthly,
    Yearly,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Granularity::Daily => "DAILY",
            Granularity::Monthly => "MONTHLY",
            Granularity::Yearly => "YEARLY",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,
}

impl QueryWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, granularity: Granularity) -> Result<Self> {
        if start > end {
            return Err(CostrollError::Configuration(format!(
                "window start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self {
            start,
            end,
            granularity,
        })
    }

    /// Parse `start`/`end` as RFC 3339 timestamps or plain `YYYY-MM-DD` dates
    pub fn parse(start: &str, end: &str, granularity: Granularity) -> Result<Self> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?, granularity)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CostrollError::Configuration(format!("invalid timestamp '{}'", value)))
}

/// Dimensions a caller may keep as distinct groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Dimension {
    Region,
    ResourceType,
}

impl Dimension {
    /// Physical dimension name inside resource keys
    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Region => "region_code",
            Dimension::ResourceType => "service_code",
        }
    }
}

/// Symbolic name used in requests
impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Region => f.write_str("REGION"),
            Dimension::ResourceType => f.write_str("RESOURCE_TYPE"),
        }
    }
}

impl FromStr for Dimension {
    type Err = CostrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "REGION" => Ok(Dimension::Region),
            "RESOURCE_TYPE" => Ok(Dimension::ResourceType),
            other => Err(CostrollError::Configuration(format!(
                "unknown aggregation symbol '{}'",
                other
            ))),
        }
    }
}

/// Ordered list of dimensions preserved during aggregation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AggregationSelector {
    dimensions: Vec<Dimension>,
}

impl AggregationSelector {
    pub fn new(dimensions: Vec<Dimension>) -> Self {
        Self { dimensions }
    }

    /// Validate symbolic names; any unknown symbol rejects the whole selector
    pub fn parse<S: AsRef<str>>(symbols: &[S]) -> Result<Self> {
        let dimensions = symbols
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<Dimension>>>()?;
        Ok(Self { dimensions })
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }
}

/// Full request accepted by the billing service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetDataRequest {
    pub scope: Scope,
    pub window: QueryWindow,
    /// Symbolic selector names, validated before any collection starts
    #[serde(default)]
    pub aggregation: Vec<String>,
}

impl GetDataRequest {
    /// Deterministic digest of scope, window and selector.
    ///
    /// Explicit service accounts are sorted and deduplicated because their
    /// order does not affect the result; selector order does.
    pub fn cache_key(&self) -> String {
        let mut accounts = self.scope.service_accounts.clone();
        accounts.sort();
        accounts.dedup();

        let canonical = format!(
            "domain={}\nproject={}\nproject_group={}\nservice_accounts={}\nstart={}\nend={}\ngranularity={}\naggregation={}",
            self.scope.domain_id,
            self.scope.project_id.as_deref().unwrap_or(""),
            self.scope.project_group_id.as_deref().unwrap_or(""),
            accounts.join(","),
            self.window.start.to_rfc3339(),
            self.window.end.to_rfc3339(),
            self.window.granularity,
            self.aggregation.join(","),
        );
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}
