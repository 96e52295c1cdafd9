//! Decoders for resource keys and billing plugin responses

pub mod plugin_response;
pub mod resource_key;

pub use plugin_response::{
    decode_entries, parse_response, DecodedBatch, PluginResponse, RawBillingData, RawCostEntry,
};
pub use resource_key::{decode, encode};
