//! Local price store
//!
//! Keyed by the full `PriceKey` (and `StorageKey` for EBS). Opened at the
//! start of a run, shared through an `Arc`, flushed at the end. Writes are
//! idempotent upserts: two lookups that miss the same key concurrently both
//! write the same value and the last write wins. The on-disk form is a JSON
//! file replaced atomically (temp file + rename), so an aborted run never
//! leaves a half-written cache behind.

use crate::catalog::CATALOG;
use crate::error::{Result, TcoError};
use crate::pricing::tables::{self, TABLE_VERSION};
use crate::pricing::types::{PriceKey, StorageKey};
use crate::types::PricingModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

const CACHE_FORMAT_VERSION: u32 = 1;

/// Region the bundled reference prices were published for
pub const REFERENCE_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedRate {
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ComputeEntry {
    #[serde(flatten)]
    key: PriceKey,
    hourly_rate: f64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StorageEntry {
    #[serde(flatten)]
    key: StorageKey,
    gb_month_rate: f64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    format_version: u32,
    table_version: String,
    updated_at: DateTime<Utc>,
    compute: Vec<ComputeEntry>,
    storage: Vec<StorageEntry>,
}

/// Price cache shared by every lookup of a run
#[derive(Debug)]
pub struct PriceCache {
    path: Option<PathBuf>,
    compute: RwLock<HashMap<PriceKey, CachedRate>>,
    storage: RwLock<HashMap<StorageKey, CachedRate>>,
    dirty: AtomicBool,
}

impl PriceCache {
    /// Cache that lives only for this process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            compute: RwLock::new(HashMap::new()),
            storage: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Open a file-backed cache; a missing file is an empty cache
    pub fn open(path: &Path) -> Result<Self> {
        let mut compute = HashMap::new();
        let mut storage = HashMap::new();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let file: CacheFile = serde_json::from_str(&content).map_err(|e| {
                TcoError::Cache(format!(
                    "Failed to parse price cache {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if file.format_version != CACHE_FORMAT_VERSION {
                return Err(TcoError::Cache(format!(
                    "Unsupported price cache format {} in {} (expected {}); run 'tcoctl cache clear'",
                    file.format_version,
                    path.display(),
                    CACHE_FORMAT_VERSION
                )));
            }
            for entry in file.compute {
                compute.insert(
                    entry.key,
                    CachedRate {
                        rate: entry.hourly_rate,
                        updated_at: entry.updated_at,
                    },
                );
            }
            for entry in file.storage {
                storage.insert(
                    entry.key,
                    CachedRate {
                        rate: entry.gb_month_rate,
                        updated_at: entry.updated_at,
                    },
                );
            }
            debug!(
                "Opened price cache {} ({} compute, {} storage entries)",
                path.display(),
                compute.len(),
                storage.len()
            );
        }

        Ok(Self {
            path: Some(path.to_path_buf()),
            compute: RwLock::new(compute),
            storage: RwLock::new(storage),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn get(&self, key: &PriceKey) -> Option<f64> {
        self.compute.read().await.get(key).map(|c| c.rate)
    }

    pub async fn get_many(&self, keys: &[PriceKey]) -> HashMap<PriceKey, f64> {
        let compute = self.compute.read().await;
        keys.iter()
            .filter_map(|k| compute.get(k).map(|c| (k.clone(), c.rate)))
            .collect()
    }

    /// Insert or replace a compute rate
    pub async fn upsert(&self, key: PriceKey, hourly_rate: f64) -> Result<()> {
        check_rate(&key.to_string(), hourly_rate)?;
        self.compute.write().await.insert(
            key,
            CachedRate {
                rate: hourly_rate,
                updated_at: Utc::now(),
            },
        );
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub async fn get_storage(&self, key: &StorageKey) -> Option<f64> {
        self.storage.read().await.get(key).map(|c| c.rate)
    }

    pub async fn upsert_storage(&self, key: StorageKey, gb_month_rate: f64) -> Result<()> {
        check_rate(&key.to_string(), gb_month_rate)?;
        self.storage.write().await.insert(
            key,
            CachedRate {
                rate: gb_month_rate,
                updated_at: Utc::now(),
            },
        );
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// On-demand rates known for a region, keyed by instance type
    pub async fn known_on_demand(&self, region: &str) -> HashMap<String, f64> {
        self.compute
            .read()
            .await
            .iter()
            .filter(|(k, c)| {
                k.pricing_model == PricingModel::OnDemand && k.region == region && c.rate > 0.0
            })
            .map(|(k, c)| (k.instance_type.clone(), c.rate))
            .collect()
    }

    /// All compute entries, optionally for one region, in key order
    pub async fn entries(&self, region: Option<&str>) -> Vec<(PriceKey, CachedRate)> {
        let mut entries: Vec<_> = self
            .compute
            .read()
            .await
            .iter()
            .filter(|(k, _)| region.map(|r| k.region == r).unwrap_or(true))
            .map(|(k, c)| (k.clone(), *c))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub async fn storage_entries(&self) -> Vec<(StorageKey, CachedRate)> {
        let mut entries: Vec<_> = self
            .storage
            .read()
            .await
            .iter()
            .map(|(k, c)| (k.clone(), *c))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub async fn len(&self) -> usize {
        self.compute.read().await.len() + self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.compute.write().await.clear();
        self.storage.write().await.clear();
        self.dirty.store(true, Ordering::Release);
    }

    /// Upsert the bundled us-east-1 on-demand and EBS list prices
    pub async fn seed_reference_prices(&self) -> Result<usize> {
        let mut count = 0;
        for candidate in CATALOG {
            self.upsert(
                PriceKey::on_demand(candidate.instance_type, REFERENCE_REGION),
                candidate.relative_cost_index,
            )
            .await?;
            count += 1;
        }
        for volume_type in ["gp3", "gp2", "io1", "io2", "st1", "sc1"] {
            if let Some(rate) = tables::reference_storage_rate(volume_type) {
                self.upsert_storage(StorageKey::new(volume_type, REFERENCE_REGION), rate)
                    .await?;
                count += 1;
            }
        }
        info!("Seeded {} reference prices for {}", count, REFERENCE_REGION);
        Ok(count)
    }

    /// Persist to disk if anything changed since open
    pub async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty.load(Ordering::Acquire) {
            return Ok(());
        }

        let file = CacheFile {
            format_version: CACHE_FORMAT_VERSION,
            table_version: TABLE_VERSION.to_string(),
            updated_at: Utc::now(),
            compute: self
                .entries(None)
                .await
                .into_iter()
                .map(|(key, c)| ComputeEntry {
                    key,
                    hourly_rate: c.rate,
                    updated_at: c.updated_at,
                })
                .collect(),
            storage: self
                .storage_entries()
                .await
                .into_iter()
                .map(|(key, c)| StorageEntry {
                    key,
                    gb_month_rate: c.rate,
                    updated_at: c.updated_at,
                })
                .collect(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;
        self.dirty.store(false, Ordering::Release);

        debug!(
            "Flushed price cache to {} ({} compute, {} storage entries)",
            path.display(),
            file.compute.len(),
            file.storage.len()
        );
        Ok(())
    }
}

fn check_rate(key: &str, rate: f64) -> Result<()> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(TcoError::Cache(format!(
            "Refusing to cache invalid rate {} for {}",
            rate, key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentOption, Term};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let cache = PriceCache::in_memory();
        let key = PriceKey::on_demand("m6i.large", "us-east-1");
        cache.upsert(key.clone(), 0.096).await.unwrap();
        cache.upsert(key.clone(), 0.096).await.unwrap();
        assert_eq!(cache.get(&key).await, Some(0.096));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_rejects_negative_and_nan() {
        let cache = PriceCache::in_memory();
        let key = PriceKey::on_demand("m6i.large", "us-east-1");
        assert!(cache.upsert(key.clone(), -0.1).await.is_err());
        assert!(cache.upsert(key.clone(), f64::NAN).await.is_err());
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_get_many_returns_only_hits() {
        let cache = PriceCache::in_memory();
        let hit = PriceKey::on_demand("t3.medium", "us-east-1");
        let miss = PriceKey::new(
            "t3.medium",
            "us-east-1",
            PricingModel::Reserved,
            Term::OneYear,
            PaymentOption::NoUpfront,
        );
        cache.upsert(hit.clone(), 0.0416).await.unwrap();

        let found = cache.get_many(&[hit.clone(), miss]).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found.get(&hit), Some(&0.0416));
    }

    #[tokio::test]
    async fn test_known_on_demand_filters_region_and_model() {
        let cache = PriceCache::in_memory();
        cache
            .upsert(PriceKey::on_demand("m6i.large", "us-east-1"), 0.096)
            .await
            .unwrap();
        cache
            .upsert(PriceKey::on_demand("m6i.large", "eu-west-1"), 0.107)
            .await
            .unwrap();
        cache
            .upsert(
                PriceKey::new(
                    "m6i.xlarge",
                    "us-east-1",
                    PricingModel::Reserved,
                    Term::OneYear,
                    PaymentOption::NoUpfront,
                ),
                0.12,
            )
            .await
            .unwrap();

        let known = cache.known_on_demand("us-east-1").await;
        assert_eq!(known.len(), 1);
        assert_eq!(known.get("m6i.large"), Some(&0.096));
    }

    #[tokio::test]
    async fn test_flush_and_reopen_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("prices.json");

        let cache = PriceCache::open(&path).unwrap();
        assert!(cache.is_empty().await);
        let key = PriceKey::new(
            "r6i.large",
            "eu-central-1",
            PricingModel::Ec2SavingsPlan,
            Term::ThreeYear,
            PaymentOption::AllUpfront,
        );
        cache.upsert(key.clone(), 0.0951).await.unwrap();
        cache
            .upsert_storage(StorageKey::new("gp3", "eu-central-1"), 0.0952)
            .await
            .unwrap();
        cache.flush().await.unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = PriceCache::open(&path).unwrap();
        assert_eq!(reopened.get(&key).await, Some(0.0951));
        assert_eq!(
            reopened
                .get_storage(&StorageKey::new("gp3", "eu-central-1"))
                .await,
            Some(0.0952)
        );
    }

    #[tokio::test]
    async fn test_open_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prices.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(PriceCache::open(&path), Err(TcoError::Cache(_))));
    }

    #[tokio::test]
    async fn test_seed_reference_prices() {
        let cache = PriceCache::in_memory();
        let count = cache.seed_reference_prices().await.unwrap();
        assert_eq!(count, CATALOG.len() + 6);
        assert_eq!(
            cache
                .get(&PriceKey::on_demand("t3.medium", REFERENCE_REGION))
                .await,
            Some(0.0416)
        );
        assert_eq!(
            cache
                .get_storage(&StorageKey::new("gp3", REFERENCE_REGION))
                .await,
            Some(0.08)
        );
    }

    #[tokio::test]
    async fn test_concurrent_fills_of_same_key() {
        let cache = std::sync::Arc::new(PriceCache::in_memory());
        let key = PriceKey::on_demand("c6i.large", "us-west-2");
        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move { cache.upsert(key, 0.085).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(cache.get(&key).await, Some(0.085));
        assert_eq!(cache.len().await, 1);
    }
}
