//! Subcommand handlers

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tcoctl::calculator::{attach_rejections, CostCalculator};
use tcoctl::config::Config;
use tcoctl::error::TcoError;
use tcoctl::inventory::{load_inventory, normalize_all};
use tcoctl::pricing::aws::AwsPricingProvider;
use tcoctl::pricing::cache::{PriceCache, REFERENCE_REGION};
use tcoctl::pricing::provider::PricingProvider;
use tcoctl::pricing::PricingResolver;
use tcoctl::recommender::InstanceRecommender;
use tcoctl::report;
use tcoctl::retry::ExponentialBackoffPolicy;
use tcoctl::scope::ScopeFilter;
use tcoctl::types::{PaymentOption, PricingModel, TcoParameters, Term, VmCostError, VmProfile};
use tcoctl::utils::format_hourly_rate;
use tcoctl::validation::validate_parameters;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run parameters that override the config file for one invocation
#[derive(Args, Clone, Debug)]
pub struct EstimateArgs {
    /// Inventory file (JSON array of VM records)
    #[arg(short, long)]
    pub inventory: PathBuf,
    /// Target AWS region
    #[arg(long)]
    pub region: Option<String>,
    /// Pricing model for production VMs
    #[arg(long, value_enum)]
    pub prod_model: Option<PricingModel>,
    /// Pricing model for non-production VMs
    #[arg(long, value_enum)]
    pub nonprod_model: Option<PricingModel>,
    /// Commitment term for reserved / savings plan models
    #[arg(long, value_enum)]
    pub term: Option<Term>,
    #[arg(long, value_enum)]
    pub payment: Option<PaymentOption>,
    /// Production utilization, percent of the month
    #[arg(long)]
    pub prod_util: Option<f64>,
    /// Non-production utilization, percent of the month
    #[arg(long)]
    pub nonprod_util: Option<f64>,
    /// EBS volume type for attached storage
    #[arg(long)]
    pub volume_type: Option<String>,
    /// Do not call the AWS Price List API (cache and fallback only)
    #[arg(long)]
    pub offline: bool,
    /// Also write the per-VM report as CSV
    #[arg(long)]
    pub export_csv: Option<PathBuf>,
}

impl EstimateArgs {
    fn parameters(&self, base: &TcoParameters) -> TcoParameters {
        let mut params = base.clone();
        if let Some(region) = &self.region {
            params.target_region = region.clone();
        }
        if let Some(model) = self.prod_model {
            params.production_pricing_model = model;
        }
        if let Some(model) = self.nonprod_model {
            params.non_production_pricing_model = model;
        }
        if let Some(term) = self.term {
            params.commitment_term = term;
        }
        if let Some(payment) = self.payment {
            params.payment_option = payment;
        }
        if let Some(pct) = self.prod_util {
            params.production_utilization_pct = pct;
        }
        if let Some(pct) = self.nonprod_util {
            params.non_production_utilization_pct = pct;
        }
        if let Some(volume_type) = &self.volume_type {
            params.storage_volume_type = volume_type.clone();
        }
        params
    }
}

#[derive(Subcommand, Clone)]
pub enum CacheCommands {
    /// Load bundled us-east-1 list prices into the local cache
    Seed,
    /// List cached prices
    Show {
        /// Only entries for this region
        #[arg(long)]
        region: Option<String>,
    },
    /// Remove every cached price
    Clear,
}

fn load_profiles(path: &Path, config: &Config) -> Result<(Vec<VmProfile>, Vec<VmCostError>)> {
    let records = load_inventory(path)?;
    let (profiles, rejected) = normalize_all(&records, config.inventory.include_powered_off);
    for r in &rejected {
        warn!("Rejected {}: {}", r.vm_name, r.reason);
    }
    info!(
        "Loaded {} VMs from {} ({} rejected)",
        profiles.len(),
        path.display(),
        rejected.len()
    );
    Ok((profiles, rejected))
}

fn open_cache(config: &Config) -> Result<Arc<PriceCache>> {
    let path = config.pricing.resolved_cache_path();
    let cache = PriceCache::open(&path)
        .with_context(|| format!("Failed to open price cache: {}", path.display()))?;
    Ok(Arc::new(cache))
}

async fn build_resolver(config: &Config, cache: Arc<PriceCache>, offline: bool) -> PricingResolver {
    let provider: Option<Arc<dyn PricingProvider>> = if offline || !config.pricing.remote_enabled {
        info!("Remote pricing disabled; using cache and fallback tiers only");
        None
    } else {
        Some(Arc::new(
            AwsPricingProvider::new(&config.pricing.pricing_api_region).await,
        ))
    };

    let retry = ExponentialBackoffPolicy::new(config.pricing.retry_attempts)
        .with_initial_delay(Duration::from_millis(config.pricing.initial_backoff_ms));
    PricingResolver::new(cache, provider)
        .with_retry_policy(retry)
        .with_max_concurrent_remote_calls(config.pricing.max_concurrent_remote_calls)
        .with_max_concurrent_lookups(config.pricing.max_concurrent_vms)
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} VMs priced")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

pub async fn handle_estimate(args: EstimateArgs, config: &Config, output: &str) -> Result<()> {
    let params = args.parameters(&config.tco);
    validate_parameters(&params)?;

    let (profiles, rejected) = load_profiles(&args.inventory, config)?;
    let cache = open_cache(config)?;
    let resolver = build_resolver(config, cache.clone(), args.offline).await;

    let progress = (output == "text").then(progress_bar);
    let mut calculator = CostCalculator::new(Arc::new(resolver))
        .with_scope_filter(ScopeFilter::new(&config.scope))
        .with_max_concurrent_vms(config.pricing.max_concurrent_vms);
    if let Some(pb) = &progress {
        calculator = calculator.with_progress(pb.clone());
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; stopping after in-flight lookups");
                cancel.cancel();
            }
        })
    };

    let result = calculator.run(&profiles, &params, &cancel).await;
    interrupt.abort();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    // Whatever was fetched stays cached, even for a failed or cancelled run
    if let Err(e) = cache.flush().await {
        warn!("Failed to persist price cache: {}", e);
    }

    let mut report = result?;
    attach_rejections(&mut report, rejected);

    if let Some(path) = &args.export_csv {
        std::fs::write(path, report::to_csv(&report))
            .with_context(|| format!("Failed to write CSV: {}", path.display()))?;
        if output == "text" {
            println!("{} {}", style("Exported to").dim(), path.display());
        }
    }

    match output {
        "json" => println!("{}", report::to_json(&report)?),
        _ => print!("{}", report::render_text(&report)),
    }

    if report.cancelled {
        return Err(TcoError::Cancelled.into());
    }
    Ok(())
}

pub async fn handle_scope(inventory: &Path, config: &Config, output: &str) -> Result<()> {
    let (profiles, _) = load_profiles(inventory, config)?;
    let decisions = ScopeFilter::new(&config.scope).classify(&profiles);

    match output {
        "json" => println!("{}", serde_json::to_string_pretty(&decisions)?),
        _ => print!("{}", report::render_scope(&decisions)),
    }
    Ok(())
}

pub async fn handle_recommend(inventory: &Path, config: &Config, output: &str) -> Result<()> {
    let (profiles, _) = load_profiles(inventory, config)?;
    let (in_scope, _) = ScopeFilter::new(&config.scope).partition(&profiles);
    let in_scope: Vec<VmProfile> = in_scope.into_iter().map(|(p, _)| p.clone()).collect();
    let recommendations = InstanceRecommender::default().recommend_all(&in_scope);

    match output {
        "json" => println!("{}", serde_json::to_string_pretty(&recommendations)?),
        _ => print!("{}", report::render_recommendations(&recommendations)),
    }
    Ok(())
}

#[derive(Serialize)]
struct CacheEntryJson {
    key: String,
    rate: f64,
    updated_at: String,
}

pub async fn handle_cache(command: CacheCommands, config: &Config, output: &str) -> Result<()> {
    let cache = open_cache(config)?;

    match command {
        CacheCommands::Seed => {
            let count = cache.seed_reference_prices().await?;
            cache.flush().await?;
            println!(
                "Seeded {} reference prices for {} into {}",
                count,
                REFERENCE_REGION,
                config.pricing.resolved_cache_path().display()
            );
        }
        CacheCommands::Show { region } => {
            let compute = cache.entries(region.as_deref()).await;
            let storage: Vec<_> = cache
                .storage_entries()
                .await
                .into_iter()
                .filter(|(k, _)| region.as_deref().map(|r| k.region == r).unwrap_or(true))
                .collect();

            if output == "json" {
                let entries: Vec<CacheEntryJson> = compute
                    .iter()
                    .map(|(k, c)| (k.to_string(), c))
                    .chain(storage.iter().map(|(k, c)| (k.to_string(), c)))
                    .map(|(key, c)| CacheEntryJson {
                        key,
                        rate: c.rate,
                        updated_at: c.updated_at.to_rfc3339(),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            let mut table = Table::new();
            table.set_header(vec!["Key", "Rate", "Updated"]);
            for (key, cached) in &compute {
                table.add_row(vec![
                    Cell::new(key),
                    Cell::new(format_hourly_rate(cached.rate)),
                    Cell::new(cached.updated_at.format("%Y-%m-%d %H:%M UTC")),
                ]);
            }
            for (key, cached) in &storage {
                table.add_row(vec![
                    Cell::new(key),
                    Cell::new(format!("${:.4}/GB-mo", cached.rate)),
                    Cell::new(cached.updated_at.format("%Y-%m-%d %H:%M UTC")),
                ]);
            }
            println!("{}", table);
            println!(
                "{} compute, {} storage entries",
                compute.len(),
                storage.len()
            );
        }
        CacheCommands::Clear => {
            let count = cache.len().await;
            cache.clear().await;
            cache.flush().await?;
            println!("Removed {} cached prices", count);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_args_override_config() {
        let args = EstimateArgs {
            inventory: PathBuf::from("vms.json"),
            region: Some("eu-west-1".to_string()),
            prod_model: Some(PricingModel::Reserved),
            nonprod_model: None,
            term: Some(Term::ThreeYear),
            payment: None,
            prod_util: None,
            nonprod_util: Some(30.0),
            volume_type: None,
            offline: true,
            export_csv: None,
        };
        let params = args.parameters(&TcoParameters::default());
        assert_eq!(params.target_region, "eu-west-1");
        assert_eq!(params.production_pricing_model, PricingModel::Reserved);
        assert_eq!(params.non_production_pricing_model, PricingModel::OnDemand);
        assert_eq!(params.commitment_term, Term::ThreeYear);
        assert_eq!(params.payment_option, PaymentOption::NoUpfront);
        assert_eq!(params.non_production_utilization_pct, 30.0);
        assert_eq!(params.storage_volume_type, "gp3");
    }
}
