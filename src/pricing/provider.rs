//! Remote pricing provider abstraction

use crate::error::Result;
use crate::pricing::types::InstancePricing;
use async_trait::async_trait;

/// Source of published prices reachable over the network
///
/// Implementations return `Ok` with an empty `InstancePricing` when the
/// provider answered but does not sell the instance type in the region, and
/// a retryable `TcoError::Provider` for throttling, timeouts and transport
/// failures.
#[async_trait]
pub trait PricingProvider: Send + Sync {
    /// Provider name for logs and error messages
    fn name(&self) -> &'static str;

    /// On-demand and every reserved offer for one instance type in one region
    async fn fetch_instance_pricing(
        &self,
        instance_type: &str,
        region: &str,
    ) -> Result<InstancePricing>;

    /// EBS price in USD per GB-month
    async fn fetch_storage_price(&self, volume_type: &str, region: &str) -> Result<Option<f64>>;
}
