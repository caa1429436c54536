//! tcoctl library
//!
//! Estimates the monthly and annual AWS cost of migrating an on-premises VM
//! inventory: scope filtering, right-sizing, tiered price resolution and
//! cost aggregation. The `tcoctl` binary is a thin CLI over these modules.

pub mod calculator;
pub mod catalog;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod inventory;
pub mod pricing;
pub mod recommender;
pub mod report;
pub mod retry;
pub mod scope;
pub mod types;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use calculator::CostCalculator;
pub use pricing::PricingResolver;
pub use recommender::InstanceRecommender;
pub use scope::ScopeFilter;
pub use types::{TcoParameters, TcoReport, VmProfile};
