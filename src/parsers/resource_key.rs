//! Resource-type key codec
//!
//! A key is `base_type` optionally followed by `?name=value&name=value...`.
//! Dimension order is preserved in both directions; nothing is sorted or
//! deduplicated.

use crate::types::{CostrollError, DimensionalKey, Result};
use std::fmt;
use std::str::FromStr;

const QUERY_SEPARATOR: char = '?';
const PAIR_SEPARATOR: char = '&';
const VALUE_SEPARATOR: char = '=';

/// Encode a base type and ordered dimensions into a single key string
pub fn encode(base_type: &str, dimensions: &[(String, String)]) -> String {
    if dimensions.is_empty() {
        return base_type.to_string();
    }

    let mut key = String::with_capacity(
        base_type.len()
            + dimensions
                .iter()
                .map(|(n, v)| n.len() + v.len() + 2)
                .sum::<usize>(),
    );
    key.push_str(base_type);
    key.push(QUERY_SEPARATOR);
    for (i, (name, value)) in dimensions.iter().enumerate() {
        if i > 0 {
            key.push(PAIR_SEPARATOR);
        }
        key.push_str(name);
        key.push(VALUE_SEPARATOR);
        key.push_str(value);
    }
    key
}

/// Decode a key string, splitting on the first `?`
pub fn decode(key: &str) -> Result<DimensionalKey> {
    let (base_type, query) = match key.split_once(QUERY_SEPARATOR) {
        Some((base, query)) => (base, query),
        None => return Ok(DimensionalKey::new(key)),
    };

    let dimensions = query
        .split(PAIR_SEPARATOR)
        .map(|segment| match segment.split_once(VALUE_SEPARATOR) {
            Some((name, value)) => Ok((name.to_string(), value.to_string())),
            None => Err(CostrollError::MalformedKey {
                key: key.to_string(),
                reason: format!("segment '{}' has no '='", segment),
            }),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DimensionalKey {
        base_type: base_type.to_string(),
        dimensions,
    })
}

impl fmt::Display for DimensionalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(&self.base_type, &self.dimensions))
    }
}

impl FromStr for DimensionalKey {
    type Err = CostrollError;

    fn from_str(s: &str) -> Result<Self> {
        decode(s)
    }
}
