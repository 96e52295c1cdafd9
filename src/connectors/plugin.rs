//! Billing plugin runtimes: HTTP and on-disk replay

use super::{PluginConnector, PluginInfo, PluginQuery, SecretData};
use crate::parsers::{parse_response, PluginResponse};
use crate::types::{CostrollError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Request body sent to a plugin's data endpoint
#[derive(Serialize)]
struct PluginRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    options: &'a serde_json::Map<String, serde_json::Value>,
    secret_data: &'a SecretData,
    filter: &'a serde_json::Map<String, serde_json::Value>,
    aggregation: &'a [String],
    start: String,
    end: String,
    granularity: String,
}

/// Plugin runtime that POSTs queries to `{endpoint}/billing/data`
pub struct HttpPluginConnector {
    client: reqwest::Client,
}

impl HttpPluginConnector {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CostrollError::Configuration(format!("HTTP client error: {}", e)))?;
        Ok(Self { client })
    }

    fn data_url(endpoint: &str) -> String {
        format!("{}/billing/data", endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl PluginConnector for HttpPluginConnector {
    fn validate(&self, plugin_info: &PluginInfo) -> Result<()> {
        if plugin_info.plugin_id.is_empty() {
            return Err(CostrollError::Configuration(
                "plugin_info.plugin_id is empty".into(),
            ));
        }
        match plugin_info.endpoint.as_deref() {
            Some(e) if !e.is_empty() => Ok(()),
            _ => Err(CostrollError::Configuration(format!(
                "plugin '{}' has no endpoint",
                plugin_info.plugin_id
            ))),
        }
    }

    async fn fetch_cost_data(
        &self,
        plugin_info: &PluginInfo,
        secret_data: &SecretData,
        query: &PluginQuery,
    ) -> Result<PluginResponse> {
        self.validate(plugin_info)?;
        let url = Self::data_url(plugin_info.endpoint.as_deref().unwrap_or_default());

        let body = PluginRequest {
            schema: query.schema.as_deref(),
            options: &plugin_info.options,
            secret_data,
            filter: &query.filter,
            aggregation: &query.aggregation,
            start: query.window.start.to_rfc3339(),
            end: query.window.end.to_rfc3339(),
            granularity: query.window.granularity.to_string(),
        };

        debug!(plugin = %plugin_info, %url, "requesting billing data");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CostrollError::PluginFetch(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CostrollError::PluginFetch(format!(
                "{} returned {}",
                url, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CostrollError::PluginFetch(format!("{}: {}", url, e)))?;
        let mut body = bytes.to_vec();
        parse_response(&mut body)
    }
}

/// Plugin runtime that replays stored responses.
///
/// Responses live at `<root>/<plugin_id>/<secret_id>.json`, with extra pages
/// as `<secret_id>.<n>.json` where `n` is a decimal page number; the secret
/// data must carry a `secret_id` string naming the files to read. The
/// unnumbered file comes first, then pages in numeric order.
pub struct DirectoryPluginConnector {
    root: PathBuf,
}

impl DirectoryPluginConnector {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn collect_files(&self, plugin_id: &str, secret_id: &str) -> Vec<PathBuf> {
        let dir = self.root.join(plugin_id);
        let mut files = Vec::new();

        let first = dir.join(format!("{}.json", secret_id));
        if first.is_file() {
            files.push(first);
        }

        let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy()))
            .join(format!("{}.*.json", glob::Pattern::escape(secret_id)));
        let mut pages: Vec<(u64, PathBuf)> = glob::glob(&pattern.to_string_lossy())
            .map(|paths| {
                paths
                    .filter_map(|e| e.ok())
                    .filter_map(|path| Some((page_number(&path, secret_id)?, path)))
                    .collect()
            })
            .unwrap_or_default();
        pages.sort();
        files.extend(pages.into_iter().map(|(_, path)| path));
        files
    }
}

/// `n` from `<secret_id>.<n>.json`; anything else is not a page
fn page_number(path: &Path, secret_id: &str) -> Option<u64> {
    let page = path
        .file_name()?
        .to_str()?
        .strip_prefix(secret_id)?
        .strip_prefix('.')?
        .strip_suffix(".json")?;
    if page.is_empty() || !page.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    page.parse().ok()
}

#[async_trait]
impl PluginConnector for DirectoryPluginConnector {
    async fn fetch_cost_data(
        &self,
        plugin_info: &PluginInfo,
        secret_data: &SecretData,
        _query: &PluginQuery,
    ) -> Result<PluginResponse> {
        self.validate(plugin_info)?;
        let secret_id = secret_data
            .get("secret_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                CostrollError::PluginFetch("secret data has no 'secret_id' field".into())
            })?;

        let files = self.collect_files(&plugin_info.plugin_id, secret_id);
        if files.is_empty() {
            return Err(CostrollError::PluginFetch(format!(
                "no stored responses for {}/{}",
                plugin_info.plugin_id, secret_id
            )));
        }

        let mut merged = PluginResponse::default();
        for file in files {
            let mut body = tokio::fs::read(&file).await?;
            let response = parse_response(&mut body).map_err(|e| {
                CostrollError::PluginFetch(format!("{}: {}", file.display(), e))
            })?;
            merged.results.extend(response.results);
        }
        Ok(merged)
    }
}
