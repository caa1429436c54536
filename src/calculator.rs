//! Monthly cost estimation
//!
//! `estimate` prices a single VM. `run` is the batch entry point: it
//! scope-filters the inventory, right-sizes every in-scope VM and prices
//! them concurrently in input order. A VM that cannot be priced becomes a
//! `VmCostError` in the report; it never aborts the run and never shows up
//! as a zero cost.

use crate::error::{Result, TcoError};
use crate::pricing::tables::os_multiplier;
use crate::pricing::types::PriceQuote;
use crate::pricing::PricingResolver;
use crate::recommender::InstanceRecommender;
use crate::scope::ScopeFilter;
use crate::types::{
    CostSummary, InstanceRecommendation, ScopeDecision, TcoParameters, TcoReport, VmCostError,
    VmCostEstimate, VmErrorKind, VmProfile, WorkloadCostBreakdown,
};
use crate::utils::{effective_monthly_hours, MONTHS_PER_YEAR};
use crate::validation::{validate_parameters, validate_profile};
use chrono::Utc;
use futures::future;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct CostCalculator {
    resolver: Arc<PricingResolver>,
    scope: ScopeFilter,
    recommender: InstanceRecommender,
    max_concurrent_vms: usize,
    progress: Option<ProgressBar>,
}

impl CostCalculator {
    pub fn new(resolver: Arc<PricingResolver>) -> Self {
        Self {
            resolver,
            scope: ScopeFilter::default(),
            recommender: InstanceRecommender::default(),
            max_concurrent_vms: 16,
            progress: None,
        }
    }

    pub fn with_scope_filter(mut self, scope: ScopeFilter) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_max_concurrent_vms(mut self, max: usize) -> Self {
        self.max_concurrent_vms = max.max(1);
        self
    }

    /// Ticked once per priced VM
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Price one VM; `Ok(None)` when the scope decision excludes it
    pub async fn estimate(
        &self,
        profile: &VmProfile,
        recommendation: &InstanceRecommendation,
        decision: &ScopeDecision,
        params: &TcoParameters,
    ) -> Result<Option<VmCostEstimate>> {
        if !decision.in_scope {
            return Ok(None);
        }
        validate_profile(profile)?;

        let model = params.pricing_model_for(profile.workload_class);
        let compute = self
            .resolver
            .get_rate(
                &recommendation.instance_type,
                &params.target_region,
                model,
                params.commitment_term,
                params.payment_option,
            )
            .await?;
        let storage = self
            .resolver
            .get_storage_rate(&params.storage_volume_type, &params.target_region)
            .await?;

        Ok(Some(price_vm(
            profile,
            recommendation,
            params,
            &compute,
            &storage,
        )))
    }

    /// Estimate a whole inventory
    ///
    /// Fails only on invalid parameters. Cancelling `cancel` stops pricing
    /// further VMs; lookups already started complete and land in the report,
    /// which is marked `cancelled`.
    pub async fn run(
        &self,
        profiles: &[VmProfile],
        params: &TcoParameters,
        cancel: &CancellationToken,
    ) -> Result<TcoReport> {
        validate_parameters(params)?;
        self.resolver.forget_remote_attempts().await;

        let (in_scope, out_of_scope) = self.scope.partition(profiles);
        info!(
            "{} VMs: {} in scope, {} excluded as infrastructure",
            profiles.len(),
            in_scope.len(),
            out_of_scope.len()
        );

        let mut errors = Vec::new();
        let mut candidates = Vec::with_capacity(in_scope.len());
        for (profile, _decision) in in_scope {
            match validate_profile(profile) {
                Ok(()) => candidates.push((profile, self.recommender.recommend(profile))),
                Err(e) => errors.push(input_error(profile, &e)),
            }
        }

        if let Some(pb) = &self.progress {
            pb.set_length(candidates.len() as u64);
        }

        // Same volume type and region for every VM
        let storage = self
            .resolver
            .get_storage_rate(&params.storage_volume_type, &params.target_region)
            .await;

        let outcomes: Vec<std::result::Result<VmCostEstimate, VmCostError>> =
            stream::iter(candidates.iter())
                // Stop scheduling on cancel; VMs already in the buffer finish
                .take_while(|_| future::ready(!cancel.is_cancelled()))
                .map(|(profile, rec)| self.price_one(profile, rec, params, &storage))
                .buffered(self.max_concurrent_vms)
                .collect()
                .await;

        let cancelled = outcomes.len() < candidates.len();
        if cancelled {
            warn!(
                "Run cancelled after {} of {} VMs",
                outcomes.len(),
                candidates.len()
            );
        }

        let mut estimates = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(estimate) => estimates.push(estimate),
                Err(error) => errors.push(error),
            }
        }

        let summary = summarize(&estimates, &errors, &out_of_scope);
        info!(
            "Priced {} VMs ({} failed): {:.2} USD/month",
            summary.priced_vm_count, summary.failed_vm_count, summary.total_monthly_cost
        );

        Ok(TcoReport {
            run_id: uuid::Uuid::new_v4(),
            generated_at: Utc::now(),
            parameters: params.clone(),
            estimates,
            errors,
            out_of_scope,
            summary,
            cancelled,
        })
    }

    async fn price_one(
        &self,
        profile: &VmProfile,
        recommendation: &InstanceRecommendation,
        params: &TcoParameters,
        storage: &Result<PriceQuote>,
    ) -> std::result::Result<VmCostEstimate, VmCostError> {
        let model = params.pricing_model_for(profile.workload_class);
        let compute = self
            .resolver
            .get_rate(
                &recommendation.instance_type,
                &params.target_region,
                model,
                params.commitment_term,
                params.payment_option,
            )
            .await;

        let outcome = match (compute, storage) {
            (Ok(compute), Ok(storage)) => Ok(price_vm(
                profile,
                recommendation,
                params,
                &compute,
                storage,
            )),
            (Err(e), _) => Err(pricing_error(profile, recommendation, e.to_string())),
            (_, Err(e)) => Err(pricing_error(profile, recommendation, e.to_string())),
        };

        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
        outcome
    }
}

/// Cost arithmetic for one VM from already resolved rates
pub fn price_vm(
    profile: &VmProfile,
    recommendation: &InstanceRecommendation,
    params: &TcoParameters,
    compute: &PriceQuote,
    storage: &PriceQuote,
) -> VmCostEstimate {
    let class = profile.workload_class;
    let hours = effective_monthly_hours(params.utilization_pct_for(class));
    let monthly_compute_cost = non_negative(
        &profile.name,
        "compute",
        compute.hourly_rate * hours * os_multiplier(profile.os_family),
    );
    let monthly_storage_cost = non_negative(
        &profile.name,
        "storage",
        profile.storage_gb * storage.hourly_rate,
    );

    VmCostEstimate {
        vm_name: profile.name.clone(),
        instance_type: recommendation.instance_type.clone(),
        pricing_plan_label: params.plan_label_for(class),
        monthly_compute_cost,
        monthly_storage_cost,
        total_monthly_cost: monthly_compute_cost + monthly_storage_cost,
        workload_class: class,
        os_family: profile.os_family,
        hourly_rate: compute.hourly_rate,
        price_source: compute.source,
        storage_price_source: storage.source,
        substituted_from: compute.substituted_from.clone(),
        recommendation_confidence: recommendation.confidence_score,
    }
}

fn non_negative(vm_name: &str, component: &str, amount: f64) -> f64 {
    if amount < 0.0 || !amount.is_finite() {
        warn!(
            "{}: {} cost {} is invalid, clamped to 0",
            vm_name, component, amount
        );
        return 0.0;
    }
    amount
}

fn input_error(profile: &VmProfile, error: &TcoError) -> VmCostError {
    let reason = match error {
        TcoError::Input { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    VmCostError {
        vm_name: profile.name.clone(),
        kind: VmErrorKind::Input,
        reason,
        workload_class: Some(profile.workload_class),
        os_family: Some(profile.os_family),
        instance_type: None,
    }
}

fn pricing_error(
    profile: &VmProfile,
    recommendation: &InstanceRecommendation,
    reason: String,
) -> VmCostError {
    warn!("{}: pricing unavailable: {}", profile.name, reason);
    VmCostError {
        vm_name: profile.name.clone(),
        kind: VmErrorKind::PricingUnavailable,
        reason,
        workload_class: Some(profile.workload_class),
        os_family: Some(profile.os_family),
        instance_type: Some(recommendation.instance_type.clone()),
    }
}

/// Totals overall and per workload class; annual is 12x monthly
pub fn summarize(
    estimates: &[VmCostEstimate],
    errors: &[VmCostError],
    out_of_scope: &[ScopeDecision],
) -> CostSummary {
    let mut summary = CostSummary {
        in_scope_vm_count: estimates.len() + errors.len(),
        priced_vm_count: estimates.len(),
        failed_vm_count: errors.len(),
        out_of_scope_vm_count: out_of_scope.len(),
        ..Default::default()
    };

    for estimate in estimates {
        summary.total_monthly_compute_cost += estimate.monthly_compute_cost;
        summary.total_monthly_storage_cost += estimate.monthly_storage_cost;
        summary.total_monthly_cost += estimate.total_monthly_cost;

        let breakdown: &mut WorkloadCostBreakdown = summary
            .by_workload_class
            .entry(estimate.workload_class)
            .or_default();
        breakdown.vm_count += 1;
        breakdown.monthly_compute_cost += estimate.monthly_compute_cost;
        breakdown.monthly_storage_cost += estimate.monthly_storage_cost;
        breakdown.monthly_total_cost += estimate.total_monthly_cost;
    }

    summary.total_annual_cost = summary.total_monthly_cost * MONTHS_PER_YEAR;
    for breakdown in summary.by_workload_class.values_mut() {
        breakdown.annual_total_cost = breakdown.monthly_total_cost * MONTHS_PER_YEAR;
    }
    summary
}

/// Add inventory records rejected before the run and recompute the summary
pub fn attach_rejections(report: &mut TcoReport, rejected: Vec<VmCostError>) {
    if rejected.is_empty() {
        return;
    }
    report.errors.extend(rejected);
    report.summary = summarize(&report.estimates, &report.errors, &report.out_of_scope);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::cache::PriceCache;
    use crate::pricing::types::{PriceKey, PriceSource, StorageKey};
    use crate::types::{OsFamily, PricingModel, WorkloadClass};

    fn profile(name: &str, vcpu: u32, memory_gb: f64, class: WorkloadClass) -> VmProfile {
        VmProfile {
            name: name.to_string(),
            vcpu,
            memory_gb,
            storage_gb: 50.0,
            os_family: OsFamily::Linux,
            workload_class: class,
        }
    }

    async fn seeded_calculator() -> CostCalculator {
        let cache = Arc::new(PriceCache::in_memory());
        cache
            .upsert(PriceKey::on_demand("t3.medium", "us-east-1"), 0.05)
            .await
            .unwrap();
        cache
            .upsert_storage(StorageKey::new("gp3", "us-east-1"), 0.10)
            .await
            .unwrap();
        CostCalculator::new(Arc::new(PricingResolver::new(cache, None)))
    }

    fn non_prod_on_demand_half() -> TcoParameters {
        TcoParameters {
            non_production_pricing_model: PricingModel::OnDemand,
            non_production_utilization_pct: 50.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_estimate_arithmetic() {
        let calculator = seeded_calculator().await;
        let vm = profile("app-dev-01", 2, 4.0, WorkloadClass::NonProduction);
        let rec = calculator.recommender.recommend(&vm);
        assert_eq!(rec.instance_type, "t3.medium");
        let decision = calculator.scope.classify_one(&vm.name);

        let estimate = calculator
            .estimate(&vm, &rec, &decision, &non_prod_on_demand_half())
            .await
            .unwrap()
            .unwrap();
        assert!((estimate.monthly_compute_cost - 18.264).abs() < 1e-9);
        assert!((estimate.monthly_storage_cost - 5.0).abs() < 1e-9);
        assert_eq!(
            estimate.total_monthly_cost,
            estimate.monthly_compute_cost + estimate.monthly_storage_cost
        );
        assert_eq!(estimate.pricing_plan_label, "On-Demand");
        assert_eq!(estimate.price_source, PriceSource::LocalCache);
    }

    #[tokio::test]
    async fn test_out_of_scope_is_none() {
        let calculator = seeded_calculator().await;
        let vm = profile("vcenter-01", 2, 4.0, WorkloadClass::Production);
        let rec = calculator.recommender.recommend(&vm);
        let decision = calculator.scope.classify_one(&vm.name);
        assert!(!decision.in_scope);
        let estimate = calculator
            .estimate(&vm, &rec, &decision, &TcoParameters::default())
            .await
            .unwrap();
        assert!(estimate.is_none());
    }

    #[tokio::test]
    async fn test_os_multiplier_applied() {
        let mut vm = profile("app-dev-02", 2, 4.0, WorkloadClass::NonProduction);
        vm.os_family = OsFamily::Windows;
        let rec = InstanceRecommender::default().recommend(&vm);
        let params = non_prod_on_demand_half();
        let estimate = price_vm(
            &vm,
            &rec,
            &params,
            &PriceQuote::new(0.05, PriceSource::LocalCache),
            &PriceQuote::new(0.10, PriceSource::LocalCache),
        );
        assert!((estimate.monthly_compute_cost - 18.264 * 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_negative_component_clamped() {
        let vm = profile("app-dev-03", 2, 4.0, WorkloadClass::NonProduction);
        let rec = InstanceRecommender::default().recommend(&vm);
        let estimate = price_vm(
            &vm,
            &rec,
            &TcoParameters::default(),
            &PriceQuote::new(-1.0, PriceSource::Fallback),
            &PriceQuote::new(0.10, PriceSource::LocalCache),
        );
        assert_eq!(estimate.monthly_compute_cost, 0.0);
        assert_eq!(estimate.total_monthly_cost, estimate.monthly_storage_cost);
    }

    #[tokio::test]
    async fn test_run_collects_failures_without_aborting() {
        let calculator = seeded_calculator().await;
        let mut bad = profile("broken-01", 2, 4.0, WorkloadClass::NonProduction);
        bad.vcpu = 0;
        let profiles = vec![
            profile("app-dev-01", 2, 4.0, WorkloadClass::NonProduction),
            bad,
            // Needs r6i pricing; nothing cached and no remote, but t3.medium
            // anchors a substitute
            profile("db-01", 4, 32.0, WorkloadClass::Production),
            profile("veeam-proxy-01", 4, 8.0, WorkloadClass::Production),
        ];

        let report = calculator
            .run(&profiles, &non_prod_on_demand_half(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.out_of_scope.len(), 1);
        assert_eq!(report.estimates.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, VmErrorKind::Input);
        assert_eq!(report.estimates[1].price_source, PriceSource::Fallback);
        assert_eq!(
            report.estimates[1].substituted_from.as_deref(),
            Some("t3.medium")
        );
        assert_eq!(report.summary.in_scope_vm_count, 3);
    }

    #[tokio::test]
    async fn test_run_rejects_bad_parameters() {
        let calculator = seeded_calculator().await;
        let params = TcoParameters {
            production_utilization_pct: 120.0,
            ..Default::default()
        };
        let err = calculator
            .run(&[], &params, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TcoError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_run_is_marked() {
        let calculator = seeded_calculator().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let profiles = vec![profile("app-dev-01", 2, 4.0, WorkloadClass::NonProduction)];
        let report = calculator
            .run(&profiles, &non_prod_on_demand_half(), &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert!(report.estimates.is_empty());
    }

    #[test]
    fn test_summarize_annual_is_twelve_months() {
        let vm = profile("app-01", 2, 8.0, WorkloadClass::Production);
        let rec = InstanceRecommender::default().recommend(&vm);
        let estimate = price_vm(
            &vm,
            &rec,
            &TcoParameters::default(),
            &PriceQuote::new(0.1, PriceSource::LocalCache),
            &PriceQuote::new(0.08, PriceSource::LocalCache),
        );
        let summary = summarize(&[estimate.clone(), estimate], &[], &[]);
        assert_eq!(summary.priced_vm_count, 2);
        assert!((summary.total_annual_cost - summary.total_monthly_cost * 12.0).abs() < 1e-9);
        let prod = &summary.by_workload_class[&WorkloadClass::Production];
        assert_eq!(prod.vm_count, 2);
    }
}
