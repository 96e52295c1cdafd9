//! `costroll get-data` subcommand: collect and roll up billing data

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Settings;
use crate::connectors::{
    Connectors, DirectoryPluginConnector, HttpPluginConnector, InventoryConnector,
    PluginConnector,
};
use crate::services::{BillingService, ResponseCacheService};
use crate::types::{
    CostrollError, Diagnostics, GetDataRequest, GetDataResponse, Granularity, QueryWindow, Result,
    Scope,
};

/// Aggregate billing data for a domain, project or project group
#[derive(Args, Debug)]
pub struct GetDataArgs {
    /// Inventory JSON with projects, service accounts, secrets and data sources
    #[arg(long, value_name = "FILE")]
    pub inventory: PathBuf,

    /// Replay stored plugin responses from this directory instead of calling plugins
    #[arg(long, value_name = "DIR")]
    pub plugin_dir: Option<PathBuf>,

    #[arg(long)]
    pub domain_id: String,

    #[arg(long, conflicts_with = "project_group_id")]
    pub project_id: Option<String>,

    #[arg(long)]
    pub project_group_id: Option<String>,

    /// Restrict to these service accounts (repeatable)
    #[arg(long = "service-account", value_name = "ID")]
    pub service_accounts: Vec<String>,

    /// Window start (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub start: String,

    /// Window end (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub end: String,

    #[arg(long, value_enum, default_value = "MONTHLY")]
    pub granularity: Granularity,

    /// Dimensions to keep (REGION, RESOURCE_TYPE); repeatable, order matters
    #[arg(long = "aggregation", value_name = "DIMENSION")]
    pub aggregation: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Skip the response cache
    #[arg(long)]
    pub no_cache: bool,

    #[arg(long, value_name = "N")]
    pub max_in_flight: Option<usize>,

    /// Per-call timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub fetch_timeout: Option<u64>,
}

impl GetDataArgs {
    /// Apply flag overrides on top of loaded settings
    pub fn settings(&self, mut settings: Settings) -> Result<Settings> {
        if let Some(n) = self.max_in_flight {
            settings.max_in_flight = n;
        }
        if let Some(secs) = self.fetch_timeout {
            settings.fetch_timeout_secs = secs;
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn request(&self) -> Result<GetDataRequest> {
        Ok(GetDataRequest {
            scope: Scope {
                domain_id: self.domain_id.clone(),
                project_id: self.project_id.clone(),
                project_group_id: self.project_group_id.clone(),
                service_accounts: self.service_accounts.clone(),
            },
            window: QueryWindow::parse(&self.start, &self.end, self.granularity)?,
            aggregation: self.aggregation.clone(),
        })
    }

    fn connectors(&self) -> Result<Connectors> {
        let inventory = Arc::new(InventoryConnector::load(&self.inventory)?);
        let plugin: Arc<dyn PluginConnector> = match &self.plugin_dir {
            Some(dir) => Arc::new(DirectoryPluginConnector::new(dir.clone())),
            None => Arc::new(HttpPluginConnector::new()?),
        };
        Ok(Connectors::with_inventory(inventory, plugin))
    }

    /// Identifies the inventory revision and plugin runtime a cached
    /// response was collected from
    pub fn cache_namespace(&self) -> Result<String> {
        let inventory = fs::canonicalize(&self.inventory)?;
        let modified = fs::metadata(&inventory)?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        let plugins = match &self.plugin_dir {
            Some(dir) => format!("dir:{}", fs::canonicalize(dir)?.display()),
            None => "http".to_string(),
        };
        Ok(format!(
            "inventory={}@{}\nplugins={}",
            inventory.display(),
            modified,
            plugins
        ))
    }

    pub fn run(self) -> Result<()> {
        let settings = self.settings(Settings::load()?)?;
        let request = self.request()?;

        let mut service = BillingService::new(self.connectors()?, &settings);
        if !self.no_cache {
            match ResponseCacheService::new(&settings) {
                Ok(cache) => {
                    service = service.with_cache(cache.with_namespace(self.cache_namespace()?))
                }
                Err(e) => warn!(error = %e, "response cache unavailable"),
            }
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let response = runtime.block_on(async {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });
            service.get_data(&request, &cancel).await
        })?;

        if self.json {
            let json = serde_json::to_string_pretty(&response)
                .map_err(|e| CostrollError::Parse(e.to_string()))?;
            println!("{}", json);
        } else {
            print!("{}", render_table(&response));
        }

        if !response.diagnostics.is_clean() {
            eprint!("{}", render_diagnostics(&response.diagnostics));
        }
        Ok(())
    }
}

/// One row per (resource type, date)
pub fn render_table(response: &GetDataResponse) -> String {
    let rows: Vec<[String; 4]> = response
        .results
        .iter()
        .flat_map(|record| {
            record.billing_data.iter().map(move |b| {
                [
                    record.resource_type.clone(),
                    b.date.clone(),
                    b.cost.to_string(),
                    b.currency.clone(),
                ]
            })
        })
        .collect();

    let headers = ["RESOURCE TYPE", "DATE", "COST", "CURRENCY"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let line = |cells: [&str; 4]| {
        format!(
            "{:<w0$}  {:<w1$}  {:>w2$}  {}\n",
            cells[0],
            cells[1],
            cells[2],
            cells[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
        )
    };
    out.push_str(&line(headers));
    for row in &rows {
        out.push_str(&line([&row[0], &row[1], &row[2], &row[3]]));
    }
    out.push_str(&format!("{} resource types\n", response.total_count));
    out
}

pub fn render_diagnostics(diagnostics: &Diagnostics) -> String {
    let mut out = format!(
        "warning: {} of {} bindings failed, {} malformed keys dropped\n",
        diagnostics.bindings_failed,
        diagnostics.bindings_resolved,
        diagnostics.malformed_keys.len()
    );
    for failure in &diagnostics.failures {
        out.push_str(&format!("  {}\n", failure));
    }
    for report in &diagnostics.malformed_keys {
        out.push_str(&format!("  malformed key {:?}: {}\n", report.key, report.reason));
    }
    out
}
