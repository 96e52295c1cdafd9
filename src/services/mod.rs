//! Services for collecting, aggregating and assembling billing data

pub mod aggregator;
pub mod assembler;
pub mod billing;
pub mod cache;
pub mod orchestrator;

pub use aggregator::Aggregator;
pub use assembler::Assembler;
pub use billing::BillingService;
pub use cache::ResponseCacheService;
pub use orchestrator::{Collection, Eligibility, ServiceAccountBinding, SourceOrchestrator};
