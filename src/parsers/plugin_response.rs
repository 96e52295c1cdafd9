//! Billing plugin response decoding

use crate::types::{
    CostRecord, CostrollError, MalformedKeyReport, Result, DEFAULT_CURRENCY,
};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::resource_key;

/// Plugin `get_data` response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginResponse {
    #[serde(default)]
    pub results: Vec<RawCostEntry>,
}

/// One resource type with its per-period costs, as sent by a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCostEntry {
    pub resource_type: String,
    #[serde(default)]
    pub billing_data: Vec<RawBillingData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBillingData {
    pub date: String,
    #[serde(default)]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Records decoded from raw entries plus the entries that were dropped
#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub records: Vec<CostRecord>,
    pub malformed: Vec<MalformedKeyReport>,
}

/// Parse a response body in place
pub fn parse_response(body: &mut [u8]) -> Result<PluginResponse> {
    simd_json::from_slice(body).map_err(|e| CostrollError::Parse(e.to_string()))
}

/// Decode raw entries in parallel.
///
/// A malformed key drops only its own entry; the failure is reported in
/// `DecodedBatch::malformed`.
pub fn decode_entries(entries: &[RawCostEntry]) -> DecodedBatch {
    let decoded: Vec<std::result::Result<Vec<CostRecord>, MalformedKeyReport>> = entries
        .par_iter()
        .map(|entry| match resource_key::decode(&entry.resource_type) {
            Ok(key) => Ok(entry
                .billing_data
                .iter()
                .map(|data| CostRecord {
                    key: key.clone(),
                    date: data.date.clone(),
                    cost: data.cost.unwrap_or(Decimal::ZERO),
                    currency: data
                        .currency
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                })
                .collect()),
            Err(CostrollError::MalformedKey { key, reason }) => {
                Err(MalformedKeyReport { key, reason })
            }
            Err(e) => Err(MalformedKeyReport {
                key: entry.resource_type.clone(),
                reason: e.to_string(),
            }),
        })
        .collect();

    let mut batch = DecodedBatch::default();
    for item in decoded {
        match item {
            Ok(records) => batch.records.extend(records),
            Err(report) => batch.malformed.push(report),
        }
    }
    batch
}
