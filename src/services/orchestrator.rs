//! Source orchestrator: resolves billing accounts and collects their costs
//!
//! Collection runs in three phases:
//! - scope resolution (projects, enabled data sources); any failure is fatal
//! - binding resolution, one service account lookup per data source
//! - fan-out over bindings: secrets then plugin data, bounded by a semaphore
//!
//! Per-call failures and timeouts are absorbed into `Diagnostics`. The
//! collected entries are decoded only after every fetch has settled.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::connectors::{
    Connectors, DataSourceFilter, DataSourceInfo, DataSourceState, PluginInfo, PluginQuery,
    ServiceAccountInfo,
};
use crate::parsers::{decode_entries, RawCostEntry};
use crate::types::{
    CostRecord, CostrollError, Diagnostics, FailureKind, FetchFailure, QueryWindow, Result, Scope,
};

/// Which service accounts a request may bind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Caller named the service accounts explicitly
    ServiceAccounts(HashSet<String>),
    /// Service accounts whose project is in the set
    Projects(HashSet<String>),
}

impl Eligibility {
    fn admits(&self, account: &ServiceAccountInfo) -> bool {
        match self {
            Eligibility::ServiceAccounts(ids) => ids.contains(&account.service_account_id),
            Eligibility::Projects(ids) => ids.contains(&account.project_id),
        }
    }
}

/// A service account bound to the plugin of the data source it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAccountBinding {
    pub service_account_id: String,
    pub project_id: String,
    pub data_source_id: String,
    pub plugin_info: PluginInfo,
}

impl ServiceAccountBinding {
    fn failure(&self, secret_id: Option<&str>, kind: FailureKind, message: String) -> FetchFailure {
        FetchFailure {
            data_source_id: self.data_source_id.clone(),
            service_account_id: Some(self.service_account_id.clone()),
            secret_id: secret_id.map(String::from),
            kind,
            message,
        }
    }
}

/// Bindings plus the data source lookups that failed while resolving them
#[derive(Debug, Default)]
pub struct ResolvedBindings {
    pub bindings: Vec<ServiceAccountBinding>,
    pub failures: Vec<FetchFailure>,
}

/// Records collected for one request
#[derive(Debug, Default)]
pub struct Collection {
    pub records: Vec<CostRecord>,
    pub diagnostics: Diagnostics,
}

/// What one binding produced
#[derive(Debug, Default)]
struct BindingOutcome {
    entries: Vec<RawCostEntry>,
    failures: Vec<FetchFailure>,
    failed: bool,
}

pub struct SourceOrchestrator {
    connectors: Connectors,
    max_in_flight: usize,
    fetch_timeout: Duration,
    plugin_schema: Option<String>,
}

impl SourceOrchestrator {
    pub fn new(connectors: Connectors, settings: &Settings) -> Self {
        Self {
            connectors,
            max_in_flight: settings.max_in_flight.max(1),
            fetch_timeout: settings.fetch_timeout(),
            plugin_schema: settings.plugin_schema.clone(),
        }
    }

    /// Override the per-call timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Collect cost records for every eligible binding in scope
    pub async fn collect(
        &self,
        scope: &Scope,
        window: &QueryWindow,
        aggregation: &[String],
        cancel: &CancellationToken,
    ) -> Result<Collection> {
        if cancel.is_cancelled() {
            return Err(CostrollError::Cancelled);
        }

        let eligibility = guarded(cancel, self.resolve_scope(scope)).await?;
        let data_sources = guarded(cancel, self.resolve_data_sources(&scope.domain_id)).await?;

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let resolved = self
            .resolve_bindings(&scope.domain_id, &data_sources, &eligibility, &semaphore, cancel)
            .await?;
        info!(
            data_sources = data_sources.len(),
            bindings = resolved.bindings.len(),
            "resolved service account bindings"
        );

        let query = Arc::new(PluginQuery {
            schema: self.plugin_schema.clone(),
            filter: serde_json::Map::new(),
            aggregation: aggregation.to_vec(),
            window: *window,
        });

        let mut diagnostics = Diagnostics {
            bindings_resolved: resolved.bindings.len() as u64,
            failures: resolved.failures,
            ..Default::default()
        };

        let mut set = JoinSet::new();
        for (index, binding) in resolved.bindings.iter().cloned().enumerate() {
            let connectors = self.connectors.clone();
            let semaphore = semaphore.clone();
            let domain_id = scope.domain_id.clone();
            let query = query.clone();
            let limit = self.fetch_timeout;
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = fetch_binding(&connectors, &binding, &domain_id, &query, limit).await;
                (index, outcome)
            });
        }

        let mut settled = vec![false; resolved.bindings.len()];
        let mut entries: Vec<RawCostEntry> = Vec::new();
        for joined in join_all(set, cancel).await? {
            match joined {
                Ok((index, outcome)) => {
                    settled[index] = true;
                    if outcome.failed {
                        diagnostics.bindings_failed += 1;
                    }
                    diagnostics.failures.extend(outcome.failures);
                    entries.extend(outcome.entries);
                }
                Err(e) => warn!(error = %e, "binding task did not complete"),
            }
        }

        // A task that never reported back still fails its binding
        for (binding, _) in resolved.bindings.iter().zip(&settled).filter(|(_, done)| !**done) {
            diagnostics.bindings_failed += 1;
            diagnostics.failures.push(binding.failure(
                None,
                FailureKind::Task,
                "binding task did not complete".to_string(),
            ));
        }

        for failure in &diagnostics.failures {
            warn!(%failure, "billing fetch failed");
        }

        let nothing_succeeded = diagnostics.bindings_failed == diagnostics.bindings_resolved;
        if nothing_succeeded && !diagnostics.failures.is_empty() {
            diagnostics.normalize();
            return Err(CostrollError::AllBindingsFailed {
                bindings: diagnostics.bindings_resolved,
                failures: diagnostics.failures,
            });
        }

        let batch = tokio::task::spawn_blocking(move || decode_entries(&entries))
            .await
            .map_err(|e| CostrollError::Parse(format!("decode task failed: {}", e)))?;

        diagnostics.records_collected = batch.records.len() as u64;
        diagnostics.malformed_keys = batch.malformed;
        diagnostics.normalize();
        for report in &diagnostics.malformed_keys {
            warn!(key = %report.key, reason = %report.reason, "dropped malformed resource key");
        }

        Ok(Collection {
            records: batch.records,
            diagnostics,
        })
    }

    /// Resolve the project scope.
    ///
    /// Explicit service accounts skip project lookup entirely; otherwise a
    /// single project, a project group (recursive), or the whole domain.
    pub async fn resolve_scope(&self, scope: &Scope) -> Result<Eligibility> {
        if !scope.service_accounts.is_empty() {
            return Ok(Eligibility::ServiceAccounts(
                scope.service_accounts.iter().cloned().collect(),
            ));
        }

        let projects = if let Some(project_id) = &scope.project_id {
            vec![project_id.clone()]
        } else if let Some(group_id) = &scope.project_group_id {
            self.connectors
                .identity
                .list_projects_by_group(group_id, &scope.domain_id)
                .await?
        } else {
            self.connectors
                .identity
                .list_all_projects(&scope.domain_id)
                .await?
        };
        debug!(projects = projects.len(), "resolved project scope");

        Ok(Eligibility::Projects(projects.into_iter().collect()))
    }

    /// Enabled data sources with usable plugin configuration
    pub async fn resolve_data_sources(&self, domain_id: &str) -> Result<Vec<DataSourceInfo>> {
        let filter = DataSourceFilter {
            domain_id: domain_id.to_string(),
            state: Some(DataSourceState::Enabled),
        };
        let data_sources = self.connectors.data_source.list_data_sources(&filter).await?;

        for ds in &data_sources {
            let plugin_info = ds.plugin_info.as_ref().ok_or_else(|| {
                CostrollError::Configuration(format!(
                    "data source '{}' has no plugin_info",
                    ds.data_source_id
                ))
            })?;
            self.connectors.plugin.validate(plugin_info).map_err(|e| {
                CostrollError::Configuration(format!("data source '{}': {}", ds.data_source_id, e))
            })?;
        }
        Ok(data_sources)
    }

    /// Bind eligible service accounts to their data source's plugin.
    ///
    /// One binding per service account: the first data source in registry
    /// order wins. A failed lookup is recorded against its data source.
    pub async fn resolve_bindings(
        &self,
        domain_id: &str,
        data_sources: &[DataSourceInfo],
        eligibility: &Eligibility,
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
    ) -> Result<ResolvedBindings> {
        let mut set = JoinSet::new();
        for (index, ds) in data_sources.iter().cloned().enumerate() {
            let identity = self.connectors.identity.clone();
            let semaphore = semaphore.clone();
            let domain_id = domain_id.to_string();
            let limit = self.fetch_timeout;
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let accounts = timed(
                    limit,
                    "service account lookup",
                    FailureKind::Identity,
                    identity.list_service_accounts_by_provider(&ds.provider, &domain_id),
                )
                .await;
                (index, ds, accounts)
            });
        }

        let mut lookups = Vec::with_capacity(data_sources.len());
        for joined in join_all(set, cancel).await? {
            match joined {
                Ok(lookup) => lookups.push(lookup),
                Err(e) => warn!(error = %e, "service account lookup task did not complete"),
            }
        }
        lookups.sort_by_key(|(index, _, _)| *index);

        let mut resolved = ResolvedBindings::default();
        let mut settled = vec![false; data_sources.len()];
        for (index, _, _) in &lookups {
            settled[*index] = true;
        }
        for (ds, _) in data_sources.iter().zip(&settled).filter(|(_, done)| !**done) {
            resolved.failures.push(FetchFailure {
                data_source_id: ds.data_source_id.clone(),
                service_account_id: None,
                secret_id: None,
                kind: FailureKind::Task,
                message: "service account lookup task did not complete".to_string(),
            });
        }
        let mut bound: HashSet<String> = HashSet::new();
        for (_, ds, accounts) in lookups {
            let accounts = match accounts {
                Ok(accounts) => accounts,
                Err((kind, message)) => {
                    resolved.failures.push(FetchFailure {
                        data_source_id: ds.data_source_id.clone(),
                        service_account_id: None,
                        secret_id: None,
                        kind,
                        message,
                    });
                    continue;
                }
            };
            let Some(plugin_info) = ds.plugin_info.as_ref() else {
                continue;
            };

            for account in accounts {
                if !eligibility.admits(&account) || !bound.insert(account.service_account_id.clone())
                {
                    continue;
                }
                resolved.bindings.push(ServiceAccountBinding {
                    service_account_id: account.service_account_id,
                    project_id: account.project_id,
                    data_source_id: ds.data_source_id.clone(),
                    plugin_info: plugin_info.clone(),
                });
            }
        }
        Ok(resolved)
    }
}

/// Secrets then plugin data for one binding; failures are recorded, not raised
async fn fetch_binding(
    connectors: &Connectors,
    binding: &ServiceAccountBinding,
    domain_id: &str,
    query: &PluginQuery,
    limit: Duration,
) -> BindingOutcome {
    let mut outcome = BindingOutcome::default();

    let secrets = match timed(
        limit,
        "secret listing",
        FailureKind::Secret,
        connectors
            .secret
            .list_secrets_by_service_account(&binding.service_account_id, domain_id),
    )
    .await
    {
        Ok(secrets) => secrets,
        Err((kind, message)) => {
            outcome.failures.push(binding.failure(None, kind, message));
            outcome.failed = true;
            return outcome;
        }
    };

    let mut succeeded = 0usize;
    for secret in &secrets {
        let secret_data = match timed(
            limit,
            "secret data",
            FailureKind::Secret,
            connectors.secret.get_secret_data(&secret.secret_id, domain_id),
        )
        .await
        {
            Ok(data) => data,
            Err((kind, message)) => {
                outcome
                    .failures
                    .push(binding.failure(Some(&secret.secret_id), kind, message));
                continue;
            }
        };

        match timed(
            limit,
            "plugin fetch",
            FailureKind::Plugin,
            connectors
                .plugin
                .fetch_cost_data(&binding.plugin_info, &secret_data, query),
        )
        .await
        {
            Ok(response) => {
                debug!(
                    service_account_id = %binding.service_account_id,
                    secret_id = %secret.secret_id,
                    entries = response.results.len(),
                    "fetched billing data"
                );
                succeeded += 1;
                outcome.entries.extend(response.results);
            }
            Err((kind, message)) => {
                outcome
                    .failures
                    .push(binding.failure(Some(&secret.secret_id), kind, message));
            }
        }
    }

    outcome.failed = !secrets.is_empty() && succeeded == 0;
    outcome
}

/// Run one external call under the per-call timeout
async fn timed<T, F>(
    limit: Duration,
    call: &str,
    kind: FailureKind,
    fut: F,
) -> std::result::Result<T, (FailureKind, String)>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err((kind, e.to_string())),
        Err(_) => Err((
            FailureKind::Timeout,
            format!("{} timed out after {:?}", call, limit),
        )),
    }
}

/// Abort `fut` when the request is cancelled
async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(CostrollError::Cancelled),
        result = fut => result,
    }
}

/// Wait for every task; cancellation aborts whatever is still running
async fn join_all<T: 'static>(
    mut set: JoinSet<T>,
    cancel: &CancellationToken,
) -> Result<Vec<std::result::Result<T, JoinError>>> {
    let mut results = Vec::with_capacity(set.len());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                set.abort_all();
                return Err(CostrollError::Cancelled);
            }
            joined = set.join_next() => match joined {
                Some(result) => results.push(result),
                None => return Ok(results),
            },
        }
    }
}
