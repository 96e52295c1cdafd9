//! In-memory plugin runtime.
//!
//! Returns programmed responses per `(plugin_id, secret_id)` and can
//! simulate failures and slow plugins, so collection can be exercised
//! without a running plugin.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{PluginConnector, PluginInfo, PluginQuery, SecretData};
use crate::parsers::PluginResponse;
use crate::types::{CostrollError, Result};

/// Programmed outcome of one fetch
#[derive(Debug, Clone)]
enum MockOutcome {
    Respond(PluginResponse),
    Fail(String),
}

#[derive(Clone, Default)]
pub struct MemoryPluginConnector {
    outcomes: Arc<RwLock<HashMap<(String, String), MockOutcome>>>,
    delays: Arc<RwLock<HashMap<(String, String), Duration>>>,
    captured: Arc<RwLock<Vec<PluginQuery>>>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MemoryPluginConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `response` for this plugin and secret
    pub fn respond(self, plugin_id: &str, secret_id: &str, response: PluginResponse) -> Self {
        self.outcomes.write().insert(
            (plugin_id.to_string(), secret_id.to_string()),
            MockOutcome::Respond(response),
        );
        self
    }

    /// Fail every fetch for this plugin and secret
    pub fn fail(self, plugin_id: &str, secret_id: &str, message: impl Into<String>) -> Self {
        self.outcomes.write().insert(
            (plugin_id.to_string(), secret_id.to_string()),
            MockOutcome::Fail(message.into()),
        );
        self
    }

    /// Sleep before answering for this plugin and secret
    pub fn delay(self, plugin_id: &str, secret_id: &str, delay: Duration) -> Self {
        self.delays
            .write()
            .insert((plugin_id.to_string(), secret_id.to_string()), delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn captured_queries(&self) -> Vec<PluginQuery> {
        self.captured.read().clone()
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PluginConnector for MemoryPluginConnector {
    async fn fetch_cost_data(
        &self,
        plugin_info: &PluginInfo,
        secret_data: &SecretData,
        query: &PluginQuery,
    ) -> Result<PluginResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.captured.write().push(query.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let secret_id = secret_data
            .get("secret_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let key = (plugin_info.plugin_id.clone(), secret_id);

        let delay = self.delays.read().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.outcomes.read().get(&key).cloned();
        match outcome {
            Some(MockOutcome::Respond(response)) => Ok(response),
            Some(MockOutcome::Fail(message)) => Err(CostrollError::PluginFetch(message)),
            None => Ok(PluginResponse::default()),
        }
    }
}
