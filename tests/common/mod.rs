//! Shared fixtures for integration tests: fake pricing providers and VM
//! profiles

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tcoctl::error::{Result, TcoError};
use tcoctl::pricing::cache::PriceCache;
use tcoctl::pricing::provider::PricingProvider;
use tcoctl::pricing::types::InstancePricing;
use tcoctl::pricing::PricingResolver;
use tcoctl::retry::ExponentialBackoffPolicy;
use tcoctl::types::{OsFamily, VmProfile, WorkloadClass};

/// Remote API that is down: every call fails with a retryable error
#[derive(Default)]
pub struct UnreachableProvider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PricingProvider for UnreachableProvider {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn fetch_instance_pricing(&self, _: &str, _: &str) -> Result<InstancePricing> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TcoError::provider("unreachable", "connection timed out"))
    }

    async fn fetch_storage_price(&self, _: &str, _: &str) -> Result<Option<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TcoError::provider("unreachable", "connection timed out"))
    }
}

/// Remote API that answers every instance type with the same prices
pub struct FixedPriceProvider {
    pub on_demand: f64,
    pub storage: f64,
    pub calls: AtomicUsize,
}

impl FixedPriceProvider {
    pub fn new(on_demand: f64, storage: f64) -> Self {
        Self {
            on_demand,
            storage,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PricingProvider for FixedPriceProvider {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn fetch_instance_pricing(&self, _: &str, _: &str) -> Result<InstancePricing> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(InstancePricing {
            on_demand_hourly: Some(self.on_demand),
            reserved: Vec::new(),
        })
    }

    async fn fetch_storage_price(&self, _: &str, _: &str) -> Result<Option<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.storage))
    }
}

/// Remote API that answers correctly after a fixed delay
pub struct SlowProvider {
    pub inner: FixedPriceProvider,
    pub delay: Duration,
}

impl SlowProvider {
    pub fn new(on_demand: f64, delay: Duration) -> Self {
        Self {
            inner: FixedPriceProvider::new(on_demand, 0.08),
            delay,
        }
    }
}

#[async_trait]
impl PricingProvider for SlowProvider {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn fetch_instance_pricing(&self, instance_type: &str, region: &str) -> Result<InstancePricing> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_instance_pricing(instance_type, region).await
    }

    async fn fetch_storage_price(&self, volume_type: &str, region: &str) -> Result<Option<f64>> {
        self.inner.fetch_storage_price(volume_type, region).await
    }
}

pub fn fast_retry() -> ExponentialBackoffPolicy {
    ExponentialBackoffPolicy::new(2).with_initial_delay(Duration::from_millis(1))
}

pub fn offline_resolver(cache: Arc<PriceCache>) -> Arc<PricingResolver> {
    Arc::new(PricingResolver::new(cache, None))
}

pub fn resolver_with(
    cache: Arc<PriceCache>,
    provider: Arc<dyn PricingProvider>,
) -> Arc<PricingResolver> {
    Arc::new(PricingResolver::new(cache, Some(provider)).with_retry_policy(fast_retry()))
}

pub fn vm(name: &str, vcpu: u32, memory_gb: f64, storage_gb: f64, class: WorkloadClass) -> VmProfile {
    VmProfile {
        name: name.to_string(),
        vcpu,
        memory_gb,
        storage_gb,
        os_family: OsFamily::Linux,
        workload_class: class,
    }
}
