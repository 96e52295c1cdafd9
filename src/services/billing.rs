//! Billing service: the `get_data` request pipeline
//!
//! Validates the selector, collects records through the orchestrator under
//! the request deadline, then aggregates and assembles the response.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::connectors::Connectors;
use crate::services::{Aggregator, Assembler, ResponseCacheService, SourceOrchestrator};
use crate::types::{AggregationSelector, CostrollError, GetDataRequest, GetDataResponse, Result};

pub struct BillingService {
    orchestrator: SourceOrchestrator,
    request_timeout: Duration,
    cache: Option<ResponseCacheService>,
}

impl BillingService {
    pub fn new(connectors: Connectors, settings: &Settings) -> Self {
        Self {
            orchestrator: SourceOrchestrator::new(connectors, settings),
            request_timeout: settings.request_timeout(),
            cache: None,
        }
    }

    /// Serve repeated requests from `cache` while entries are fresh
    pub fn with_cache(mut self, cache: ResponseCacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub async fn get_data(
        &self,
        request: &GetDataRequest,
        cancel: &CancellationToken,
    ) -> Result<GetDataResponse> {
        // Reject unknown selector symbols before touching any collaborator
        let selector = AggregationSelector::parse(&request.aggregation)?;
        let cache_key = request.cache_key();

        if let Some(cache) = &self.cache {
            let (cached, warning) = cache.load(&cache_key);
            if let Some(warning) = warning {
                warn!(?warning, "ignoring response cache");
            }
            if let Some(response) = cached {
                debug!(%cache_key, "serving cached response");
                return Ok(response);
            }
        }

        let collection = tokio::time::timeout(
            self.request_timeout,
            self.orchestrator.collect(
                &request.scope,
                &request.window,
                &request.aggregation,
                cancel,
            ),
        )
        .await
        .map_err(|_| CostrollError::Timeout {
            secs: self.request_timeout.as_secs(),
        })??;

        let groups = Aggregator::aggregate(&collection.records, &selector)?;
        let results = Assembler::assemble(&groups, &request.scope.domain_id);
        let response = GetDataResponse {
            total_count: results.len() as u64,
            results,
            diagnostics: collection.diagnostics,
        };
        info!(
            records = response.diagnostics.records_collected,
            groups = groups.len(),
            results = response.total_count,
            "assembled billing data"
        );

        // Only clean responses are cached
        if let Some(cache) = &self.cache {
            if response.diagnostics.is_clean() {
                if let Err(e) = cache.save(&cache_key, &response) {
                    warn!(error = %e, "failed to write response cache");
                }
            }
        }

        Ok(response)
    }
}
