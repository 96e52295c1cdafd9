//! Assembler service for building caller-facing output records

use crate::parsers::encode;
use crate::types::{AggregatedGroup, BillingData, OutputRecord};
use std::collections::HashMap;

/// Assembler for turning grouped sums back into resource-type time series
pub struct Assembler;

impl Assembler {
    /// Merge groups sharing a re-encoded resource type into one record.
    ///
    /// Records keep the order in which their resource type first appears;
    /// billing data within a record is sorted by date ascending.
    pub fn assemble(groups: &[AggregatedGroup], domain_id: &str) -> Vec<OutputRecord> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut output: Vec<OutputRecord> = Vec::new();

        for group in groups {
            let resource_type = encode(&group.group_key.base_type, &group.group_key.dimensions);
            let data = BillingData {
                date: group.group_key.date.clone(),
                cost: group.cost,
                currency: group.currency.clone(),
            };

            match index.get(&resource_type) {
                Some(&i) => output[i].billing_data.push(data),
                None => {
                    index.insert(resource_type.clone(), output.len());
                    output.push(OutputRecord {
                        resource_type,
                        billing_data: vec![data],
                        domain_id: domain_id.to_string(),
                    });
                }
            }
        }

        for record in &mut output {
            record.billing_data.sort_by(|a, b| a.date.cmp(&b.date));
        }
        output
    }
}
