//! Price resolution
//!
//! Every compute and storage price goes through the same chain:
//!
//! 1. local cache, keyed by the full `PriceKey`
//! 2. remote provider, one call per (instance type, region) under a retry
//!    policy and a concurrency limit; every rate it returns is cached
//! 3. deterministic fallback: commitment discounts applied to a known
//!    on-demand rate, or a substitute rate scaled from the smallest cached
//!    sibling instance
//!
//! When all three come up empty the lookup fails with
//! `TcoError::PricingUnavailable`. A price is never silently zero.
//!
//! Savings Plans have no per-instance price list entry. Their rate is the
//! on-demand rate of the same type times one minus the table discount, and
//! carries the source of that on-demand anchor.

pub mod aws;
pub mod cache;
pub mod provider;
pub mod tables;
pub mod types;

use crate::catalog;
use crate::error::{Result, TcoError};
use crate::retry::{ExponentialBackoffPolicy, RetryPolicy};
use crate::types::{InstanceCandidate, PaymentOption, PricingModel, Term};
use cache::PriceCache;
use futures::stream::{self, StreamExt};
use provider::PricingProvider;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};
use types::{InstancePricing, PriceKey, PriceQuote, PriceSource, StorageKey};

pub struct PricingResolver {
    cache: Arc<PriceCache>,
    provider: Option<Arc<dyn PricingProvider>>,
    retry: ExponentialBackoffPolicy,
    remote_permits: Arc<Semaphore>,
    max_concurrent_lookups: usize,
    gates: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
    /// (instance type, region) pairs already asked remotely, with the note
    /// fallbacks report for rates the answer did not cover
    remote_attempts: Mutex<HashMap<(String, String), String>>,
}

impl PricingResolver {
    /// `provider = None` runs offline: cache and fallback tiers only
    pub fn new(cache: Arc<PriceCache>, provider: Option<Arc<dyn PricingProvider>>) -> Self {
        Self {
            cache,
            provider,
            retry: ExponentialBackoffPolicy::for_pricing_api(),
            remote_permits: Arc::new(Semaphore::new(4)),
            max_concurrent_lookups: 16,
            gates: Mutex::new(HashMap::new()),
            remote_attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: ExponentialBackoffPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cap on remote calls in flight at once
    pub fn with_max_concurrent_remote_calls(mut self, permits: usize) -> Self {
        self.remote_permits = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    /// Cap on (instance type, region) groups resolved at once by `get_rates`
    pub fn with_max_concurrent_lookups(mut self, lookups: usize) -> Self {
        self.max_concurrent_lookups = lookups.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    /// Let the next lookups ask the remote API again for types it already
    /// answered (or failed to answer)
    pub async fn forget_remote_attempts(&self) {
        self.remote_attempts.lock().await.clear();
    }

    /// Hourly compute rate for one instance type under one pricing model
    pub async fn get_rate(
        &self,
        instance_type: &str,
        region: &str,
        model: PricingModel,
        term: Term,
        payment: PaymentOption,
    ) -> Result<PriceQuote> {
        let key = PriceKey::new(instance_type, region, model, term, payment);
        self.resolve(&key).await
    }

    pub async fn resolve(&self, key: &PriceKey) -> Result<PriceQuote> {
        if let Some(rate) = self.cached(key).await {
            debug!("Cache hit for {}: {}", key, rate);
            return Ok(PriceQuote::new(rate, PriceSource::LocalCache));
        }
        let mut results = self
            .resolve_uncached(&key.instance_type, &key.region, vec![key.clone()])
            .await;
        match results.pop() {
            Some((_, result)) => result,
            None => Err(TcoError::pricing_unavailable(key, "lookup produced no result")),
        }
    }

    /// Resolve many keys, one remote call per distinct (instance type, region)
    pub async fn get_rates(&self, keys: &[PriceKey]) -> HashMap<PriceKey, Result<PriceQuote>> {
        let mut results = HashMap::new();
        let hits = self.cache.get_many(keys).await;

        let mut groups: BTreeMap<(String, String), Vec<PriceKey>> = BTreeMap::new();
        for key in keys {
            if results.contains_key(key) {
                continue;
            }
            match hits.get(key).copied().filter(|r| *r > 0.0) {
                Some(rate) => {
                    results.insert(key.clone(), Ok(PriceQuote::new(rate, PriceSource::LocalCache)));
                }
                None => {
                    let group = groups
                        .entry((key.instance_type.clone(), key.region.clone()))
                        .or_default();
                    if !group.contains(key) {
                        group.push(key.clone());
                    }
                }
            }
        }
        debug!(
            "{} keys: {} cache hits, {} groups to resolve",
            keys.len(),
            results.len(),
            groups.len()
        );

        let resolved: Vec<_> = stream::iter(groups)
            .map(|((instance_type, region), group)| async move {
                self.resolve_uncached(&instance_type, &region, group).await
            })
            .buffer_unordered(self.max_concurrent_lookups)
            .collect()
            .await;
        for (key, result) in resolved.into_iter().flatten() {
            results.insert(key, result);
        }
        results
    }

    /// EBS rate in USD per GB-month
    pub async fn get_storage_rate(&self, volume_type: &str, region: &str) -> Result<PriceQuote> {
        let key = StorageKey::new(volume_type, region);
        if let Some(rate) = self.cache.get_storage(&key).await.filter(|r| *r > 0.0) {
            debug!("Cache hit for {}: {}", key, rate);
            return Ok(PriceQuote::new(rate, PriceSource::LocalCache));
        }

        let mut remote_note = "remote pricing disabled".to_string();
        if let Some(provider) = &self.provider {
            let fetched = {
                let _permit = self
                    .remote_permits
                    .acquire()
                    .await
                    .map_err(|_| TcoError::Cancelled)?;
                self.retry
                    .execute_with_retry(|| provider.fetch_storage_price(volume_type, region))
                    .await
            };
            match fetched {
                Ok(Some(rate)) if rate > 0.0 => {
                    self.cache.upsert_storage(key, rate).await?;
                    return Ok(PriceQuote::new(rate, PriceSource::RemoteApi));
                }
                Ok(_) => remote_note = format!("{} has no price", provider.name()),
                Err(e) => {
                    warn!("Remote storage lookup for {} failed: {}", key, e);
                    remote_note = e.to_string();
                }
            }
        }

        match tables::reference_storage_rate(volume_type) {
            Some(rate) => {
                warn!(
                    "Using reference list price {} for {} ({})",
                    rate, key, remote_note
                );
                Ok(PriceQuote::new(rate, PriceSource::Fallback))
            }
            None => Err(TcoError::pricing_unavailable(
                key,
                format!("no cached, remote or reference price ({})", remote_note),
            )),
        }
    }

    async fn cached(&self, key: &PriceKey) -> Option<f64> {
        self.cache.get(key).await.filter(|r| *r > 0.0)
    }

    /// Tiers 2 and 3 for keys that share an instance type and region
    async fn resolve_uncached(
        &self,
        instance_type: &str,
        region: &str,
        keys: Vec<PriceKey>,
    ) -> Vec<(PriceKey, Result<PriceQuote>)> {
        // One lookup per (type, region) at a time; later arrivals find the
        // rates the first one cached
        let gate = self.gate(instance_type, region).await;
        let _turn = gate.lock().await;

        let mut results = Vec::with_capacity(keys.len());
        let mut pending = Vec::with_capacity(keys.len());
        for key in keys {
            match self.cached(&key).await {
                Some(rate) => results.push((key, Ok(PriceQuote::new(rate, PriceSource::LocalCache)))),
                None => pending.push(key),
            }
        }
        if pending.is_empty() {
            return results;
        }
        let keys = pending;

        let cached_on_demand = self
            .cached(&PriceKey::on_demand(instance_type, region))
            .await;

        // Savings plans only need the on-demand anchor
        let needs_remote = keys
            .iter()
            .any(|k| !(k.pricing_model.is_savings_plan() && cached_on_demand.is_some()));

        let mut remote = None;
        let mut remote_note = String::from("remote lookup not needed");
        if needs_remote {
            let attempt_key = (instance_type.to_string(), region.to_string());
            let earlier = self.remote_attempts.lock().await.get(&attempt_key).cloned();
            match earlier {
                // Asked once already; whatever it answered is in the cache
                Some(note) => {
                    debug!(
                        "Not asking remote again for {} in {}: {}",
                        instance_type, region, note
                    );
                    remote_note = note;
                }
                None => {
                    match self.fetch_remote(instance_type, region).await {
                        Ok(Some(pricing)) => {
                            remote_note = "remote price list has no matching offer".to_string();
                            remote = Some(pricing);
                        }
                        Ok(None) => remote_note = "remote pricing disabled".to_string(),
                        Err(e) => {
                            warn!(
                                "Remote lookup for {} in {} failed: {}",
                                instance_type, region, e
                            );
                            remote_note = e.to_string();
                        }
                    }
                    self.remote_attempts
                        .lock()
                        .await
                        .insert(attempt_key, remote_note.clone());
                }
            }
        }

        for key in keys {
            let result = match self
                .from_remote_or_anchor(&key, cached_on_demand, remote.as_ref())
                .await
            {
                Some(quote) => Ok(quote),
                None => self.fallback(&key, &remote_note).await,
            };
            results.push((key, result));
        }
        results
    }

    async fn gate(&self, instance_type: &str, region: &str) -> Arc<Mutex<()>> {
        self.gates
            .lock()
            .await
            .entry((instance_type.to_string(), region.to_string()))
            .or_default()
            .clone()
    }

    async fn fetch_remote(
        &self,
        instance_type: &str,
        region: &str,
    ) -> Result<Option<InstancePricing>> {
        let Some(provider) = &self.provider else {
            return Ok(None);
        };
        let pricing = {
            let _permit = self
                .remote_permits
                .acquire()
                .await
                .map_err(|_| TcoError::Cancelled)?;
            self.retry
                .execute_with_retry(|| provider.fetch_instance_pricing(instance_type, region))
                .await?
        };

        if let Some(rate) = pricing.on_demand_hourly.filter(|r| *r > 0.0) {
            self.cache
                .upsert(PriceKey::on_demand(instance_type, region), rate)
                .await?;
        }
        for reserved in &pricing.reserved {
            if reserved.effective_hourly > 0.0 {
                self.cache
                    .upsert(
                        PriceKey::new(
                            instance_type,
                            region,
                            PricingModel::Reserved,
                            reserved.term,
                            reserved.payment_option,
                        ),
                        reserved.effective_hourly,
                    )
                    .await?;
            }
        }
        debug!(
            "Fetched {} in {} from {} ({} reserved offers)",
            instance_type,
            region,
            provider.name(),
            pricing.reserved.len()
        );
        Ok(Some(pricing))
    }

    async fn from_remote_or_anchor(
        &self,
        key: &PriceKey,
        cached_on_demand: Option<f64>,
        remote: Option<&InstancePricing>,
    ) -> Option<PriceQuote> {
        let remote_on_demand = remote.and_then(|p| p.on_demand_hourly).filter(|r| *r > 0.0);
        match key.pricing_model {
            PricingModel::OnDemand => {
                remote_on_demand.map(|r| PriceQuote::new(r, PriceSource::RemoteApi))
            }
            PricingModel::Reserved => {
                let (term, payment) = (key.term?, key.payment_option?);
                remote
                    .and_then(|p| p.reserved_rate(term, payment))
                    .filter(|r| *r > 0.0)
                    .map(|r| PriceQuote::new(r, PriceSource::RemoteApi))
            }
            PricingModel::ComputeSavingsPlan | PricingModel::Ec2SavingsPlan => {
                let (anchor, source) = match (cached_on_demand, remote_on_demand) {
                    (Some(rate), _) => (rate, PriceSource::LocalCache),
                    (None, Some(rate)) => (rate, PriceSource::RemoteApi),
                    (None, None) => return None,
                };
                let rate = tables::discounted_rate(
                    anchor,
                    key.pricing_model,
                    key.term?,
                    key.payment_option?,
                );
                if let Err(e) = self.cache.upsert(key.clone(), rate).await {
                    warn!("Could not cache derived rate for {}: {}", key, e);
                }
                Some(PriceQuote::new(rate, source))
            }
        }
    }

    /// Deterministic estimate when neither cache nor remote has the rate.
    /// Results are not cached.
    async fn fallback(&self, key: &PriceKey, remote_note: &str) -> Result<PriceQuote> {
        let commitment = match (key.term, key.payment_option) {
            (Some(term), Some(payment)) if key.pricing_model != PricingModel::OnDemand => {
                Some((term, payment))
            }
            _ => None,
        };

        // Own on-demand rate, possibly cached by the remote tier just now
        if let Some((term, payment)) = commitment {
            if let Some(on_demand) = self.cached(&key.to_on_demand()).await {
                let rate = tables::discounted_rate(on_demand, key.pricing_model, term, payment);
                warn!(
                    "Estimated {} from on-demand {} and discount table {} ({})",
                    key,
                    on_demand,
                    tables::TABLE_VERSION,
                    remote_note
                );
                return Ok(PriceQuote::new(rate, PriceSource::Fallback));
            }
        }

        if let Some((substitute, on_demand)) = self.substitute_on_demand(key).await {
            let rate = match commitment {
                Some((term, payment)) => {
                    tables::discounted_rate(on_demand, key.pricing_model, term, payment)
                }
                None => on_demand,
            };
            warn!(
                "Estimated {} by scaling the on-demand rate of {} ({})",
                key, substitute, remote_note
            );
            return Ok(PriceQuote {
                hourly_rate: rate,
                source: PriceSource::Fallback,
                substituted_from: Some(substitute),
            });
        }

        Err(TcoError::pricing_unavailable(
            key,
            format!("no cached rate, no remote rate and no anchor ({})", remote_note),
        ))
    }

    /// On-demand rate for `key`'s type scaled from the cheapest cached
    /// sibling in the same family, else the cheapest cached catalog entry
    async fn substitute_on_demand(&self, key: &PriceKey) -> Option<(String, f64)> {
        let target = catalog::find(&key.instance_type)?;
        let known = self.cache.known_on_demand(&key.region).await;
        if known.is_empty() {
            return None;
        }

        let mut anchors: Vec<_> = catalog::CATALOG
            .iter()
            .filter(|c| c.instance_type != target.instance_type)
            .filter_map(|c| known.get(c.instance_type).map(|rate| (c, *rate)))
            .collect();
        anchors.sort_by(|a, b| {
            let other_family = |c: &InstanceCandidate| c.family != target.family;
            other_family(a.0)
                .cmp(&other_family(b.0))
                .then(
                    a.0.relative_cost_index
                        .partial_cmp(&b.0.relative_cost_index)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.0.instance_type.cmp(b.0.instance_type))
        });

        let (anchor, anchor_rate) = anchors.into_iter().next()?;
        let scaled = anchor_rate * target.relative_cost_index / anchor.relative_cost_index;
        Some((anchor.instance_type.to_string(), scaled))
    }
}
