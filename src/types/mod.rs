//! Type definitions for costroll

mod billing;
mod error;
mod request;

pub use billing::*;
pub use error::*;
pub use request::*;

/// Cache loading warning types
#[derive(Debug, Clone, PartialEq)]
pub enum CacheWarning {
    /// Failed to open or read cache file
    LoadFailed(String),
    /// Cache file was corrupted (invalid JSON)
    Corrupted(String),
}
