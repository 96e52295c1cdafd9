//! Aggregator service for dimension-aware cost roll-up

use crate::types::{
    AggregatedGroup, AggregationSelector, CostRecord, CostrollError, GroupKey, Result,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Aggregator for collapsing unselected dimensions and summing cost
pub struct Aggregator;

impl Aggregator {
    /// Project a record onto its group.
    ///
    /// A selected dimension the record lacks groups under the empty string.
    pub fn project(record: &CostRecord, selector: &AggregationSelector) -> GroupKey {
        let dimensions = selector
            .dimensions()
            .iter()
            .map(|d| {
                let value = record.key.dimension(d.column()).unwrap_or("");
                (d.column().to_string(), value.to_string())
            })
            .collect();

        GroupKey {
            base_type: record.key.base_type.clone(),
            dimensions,
            date: record.date.clone(),
        }
    }

    /// Sum cost per group (sorted by base type, selector values, then date)
    pub fn aggregate(
        records: &[CostRecord],
        selector: &AggregationSelector,
    ) -> Result<Vec<AggregatedGroup>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut group_map: HashMap<GroupKey, (Decimal, &str)> = HashMap::new();

        for record in records {
            let key = Self::project(record, selector);

            match group_map.get_mut(&key) {
                Some((cost, currency)) => {
                    if *currency != record.currency {
                        return Err(CostrollError::CurrencyMismatch {
                            group: key.to_string(),
                            expected: currency.to_string(),
                            found: record.currency.clone(),
                        });
                    }
                    *cost += record.cost;
                }
                None => {
                    group_map.insert(key, (record.cost, record.currency.as_str()));
                }
            }
        }

        let mut result: Vec<AggregatedGroup> = group_map
            .into_iter()
            .map(|(group_key, (cost, currency))| AggregatedGroup {
                group_key,
                cost,
                currency: currency.to_string(),
            })
            .collect();
        result.sort_by(|a, b| a.group_key.cmp(&b.group_key));
        Ok(result)
    }
}
