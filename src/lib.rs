//! Dimension-aware cost aggregation over multi-account billing plugins

pub mod cli;
pub mod config;
pub mod connectors;
pub mod parsers;
pub mod services;
pub mod types;
