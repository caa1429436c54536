//! End-to-end cost runs against fake pricing backends

mod common;

use common::{
    offline_resolver, resolver_with, vm, FixedPriceProvider, SlowProvider, UnreachableProvider,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tcoctl::calculator::CostCalculator;
use tcoctl::pricing::cache::PriceCache;
use tcoctl::pricing::types::{PriceKey, PriceSource, StorageKey};
use tcoctl::types::{PaymentOption, PricingModel, TcoParameters, Term, WorkloadClass};
use tokio_util::sync::CancellationToken;

async fn cache_with(entries: &[(&str, f64)], storage: f64) -> Arc<PriceCache> {
    let cache = Arc::new(PriceCache::in_memory());
    for (instance_type, rate) in entries {
        cache
            .upsert(PriceKey::on_demand(*instance_type, "us-east-1"), *rate)
            .await
            .unwrap();
    }
    cache
        .upsert_storage(StorageKey::new("gp3", "us-east-1"), storage)
        .await
        .unwrap();
    cache
}

#[tokio::test]
async fn test_non_production_on_demand_half_month() {
    let cache = cache_with(&[("t3.medium", 0.05)], 0.10).await;
    let calculator = CostCalculator::new(offline_resolver(cache));
    let params = TcoParameters {
        non_production_pricing_model: PricingModel::OnDemand,
        non_production_utilization_pct: 50.0,
        ..Default::default()
    };

    let report = calculator
        .run(
            &[vm("web01", 2, 4.0, 50.0, WorkloadClass::NonProduction)],
            &params,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.estimates.len(), 1);
    let e = &report.estimates[0];
    assert_eq!(e.instance_type, "t3.medium");
    assert!((e.monthly_compute_cost - 18.26).abs() < 0.01);
    assert!((e.monthly_storage_cost - 5.00).abs() < 1e-9);
    assert!((e.total_monthly_cost - 23.26).abs() < 0.01);
    assert_eq!(e.price_source, PriceSource::LocalCache);
    assert!((report.summary.total_annual_cost - e.total_monthly_cost * 12.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_infrastructure_vm_only_in_scope_report() {
    let cache = cache_with(&[("m6i.large", 0.096)], 0.08).await;
    let calculator = CostCalculator::new(offline_resolver(cache));

    let report = calculator
        .run(
            &[
                vm("erp-gateway-prod", 2, 8.0, 40.0, WorkloadClass::Production),
                vm("erp-app-prod", 2, 8.0, 40.0, WorkloadClass::Production),
            ],
            &TcoParameters::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.estimates.iter().all(|e| e.vm_name != "erp-gateway-prod"));
    assert!(report.errors.iter().all(|e| e.vm_name != "erp-gateway-prod"));
    assert_eq!(report.out_of_scope.len(), 1);
    assert_eq!(report.out_of_scope[0].vm_name, "erp-gateway-prod");
    assert!(!report.out_of_scope[0].in_scope);
    assert_eq!(report.summary.out_of_scope_vm_count, 1);
}

#[tokio::test]
async fn test_reserved_three_year_cheaper_than_on_demand() {
    let cache = cache_with(&[("m6i.xlarge", 0.232)], 0.08).await;
    let calculator = CostCalculator::new(offline_resolver(cache));
    let profiles = [vm("crm-app-01", 4, 16.0, 100.0, WorkloadClass::Production)];

    let reserved = TcoParameters {
        production_pricing_model: PricingModel::Reserved,
        commitment_term: Term::ThreeYear,
        payment_option: PaymentOption::NoUpfront,
        ..Default::default()
    };
    let on_demand = TcoParameters {
        production_pricing_model: PricingModel::OnDemand,
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let r = calculator.run(&profiles, &reserved, &cancel).await.unwrap();
    let o = calculator.run(&profiles, &on_demand, &cancel).await.unwrap();

    let reserved_vm = &r.estimates[0];
    let on_demand_vm = &o.estimates[0];
    assert_eq!(reserved_vm.instance_type, "m6i.xlarge");
    assert!((reserved_vm.hourly_rate - 0.1392).abs() < 1e-9);
    assert_eq!(reserved_vm.pricing_plan_label, "Reserved Instance (3yr, No Upfront)");
    assert_eq!(on_demand_vm.pricing_plan_label, "On-Demand");
    assert!(reserved_vm.monthly_compute_cost < on_demand_vm.monthly_compute_cost * 0.7);
}

#[tokio::test]
async fn test_unreachable_remote_uses_fallback_tier() {
    let cache = cache_with(&[("m6i.large", 0.096)], 0.08).await;
    let provider = Arc::new(UnreachableProvider::default());
    let calculator = CostCalculator::new(resolver_with(cache.clone(), provider.clone()));
    let params = TcoParameters {
        production_pricing_model: PricingModel::OnDemand,
        ..Default::default()
    };

    let report = calculator
        .run(
            &[vm("billing-01", 4, 16.0, 0.0, WorkloadClass::Production)],
            &params,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.errors.is_empty());
    let e = &report.estimates[0];
    assert_eq!(e.instance_type, "m6i.xlarge");
    assert_eq!(e.price_source, PriceSource::Fallback);
    assert_eq!(e.substituted_from.as_deref(), Some("m6i.large"));
    assert!(e.monthly_compute_cost > 0.0);
    assert!((e.hourly_rate - 0.192).abs() < 1e-9);
    assert!(provider.calls.load(Ordering::SeqCst) >= 2);
    // Fallback estimates are not written back
    assert!(cache
        .get(&PriceKey::on_demand("m6i.xlarge", "us-east-1"))
        .await
        .is_none());
}

#[tokio::test]
async fn test_nothing_to_anchor_is_marked_unavailable() {
    let calculator = CostCalculator::new(resolver_with(
        Arc::new(PriceCache::in_memory()),
        Arc::new(UnreachableProvider::default()),
    ));

    let report = calculator
        .run(
            &[vm("ledger-01", 2, 8.0, 20.0, WorkloadClass::Production)],
            &TcoParameters::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.estimates.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(
        report.errors[0].kind,
        tcoctl::types::VmErrorKind::PricingUnavailable
    );
    assert_eq!(report.summary.total_monthly_cost, 0.0);
    assert_eq!(report.summary.failed_vm_count, 1);
}

#[tokio::test]
async fn test_warm_cache_reruns_are_identical() {
    let provider = Arc::new(FixedPriceProvider::new(0.1, 0.08));
    let cache = Arc::new(PriceCache::in_memory());
    let calculator = CostCalculator::new(resolver_with(cache, provider.clone()))
        .with_max_concurrent_vms(4);
    let profiles: Vec<_> = (0..20)
        .map(|i| {
            let class = if i % 3 == 0 {
                WorkloadClass::NonProduction
            } else {
                WorkloadClass::Production
            };
            vm(&format!("app-{:02}", i), 2 + (i % 4) * 2, 4.0 + i as f64, 50.0, class)
        })
        .collect();
    let params = TcoParameters::default();
    let cancel = CancellationToken::new();

    let first = calculator.run(&profiles, &params, &cancel).await.unwrap();
    let calls_after_first = provider.calls();
    let second = calculator.run(&profiles, &params, &cancel).await.unwrap();
    let third = calculator.run(&profiles, &params, &cancel).await.unwrap();

    assert_eq!(provider.calls(), calls_after_first);
    assert_eq!(second.estimates, third.estimates);
    assert_eq!(second.summary, third.summary);
    let names: Vec<_> = first.estimates.iter().map(|e| e.vm_name.clone()).collect();
    let expected: Vec<_> = profiles.iter().map(|p| p.name.clone()).collect();
    assert_eq!(names, expected);
    assert!(second
        .estimates
        .iter()
        .all(|e| e.price_source == PriceSource::LocalCache));
}

#[tokio::test]
async fn test_every_in_scope_vm_is_accounted_for() {
    let cache = cache_with(&[("t3.medium", 0.0416), ("m6i.large", 0.096)], 0.08).await;
    let calculator = CostCalculator::new(offline_resolver(cache));
    let mut broken = vm("broken-01", 2, 4.0, 10.0, WorkloadClass::Production);
    broken.memory_gb = -1.0;
    let profiles = vec![
        vm("web-dev-01", 2, 4.0, 10.0, WorkloadClass::NonProduction),
        vm("esxi-host-01", 2, 4.0, 10.0, WorkloadClass::Production),
        broken,
        vm("api-01", 4, 12.0, 10.0, WorkloadClass::Production),
    ];

    let report = calculator
        .run(&profiles, &TcoParameters::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        report.estimates.len() + report.errors.len() + report.out_of_scope.len(),
        profiles.len()
    );
    assert_eq!(report.summary.in_scope_vm_count, 3);
    for e in &report.estimates {
        assert_eq!(
            e.total_monthly_cost,
            e.monthly_compute_cost + e.monthly_storage_cost
        );
    }
}

#[tokio::test]
async fn test_cancel_keeps_in_flight_vm() {
    let provider = Arc::new(SlowProvider::new(0.096, Duration::from_millis(300)));
    let calculator = CostCalculator::new(resolver_with(Arc::new(PriceCache::in_memory()), provider))
        .with_max_concurrent_vms(1);
    let params = TcoParameters {
        production_pricing_model: PricingModel::OnDemand,
        ..Default::default()
    };
    let profiles = [
        vm("orders-01", 2, 8.0, 20.0, WorkloadClass::Production),
        vm("orders-02", 4, 16.0, 20.0, WorkloadClass::Production),
    ];

    let cancel = CancellationToken::new();
    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };
    let report = calculator.run(&profiles, &params, &cancel).await.unwrap();
    trigger.await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.estimates.len(), 1);
    assert_eq!(report.estimates[0].vm_name, "orders-01");
    assert_eq!(report.estimates[0].price_source, PriceSource::RemoteApi);
}

#[tokio::test]
async fn test_unreachable_remote_asked_once_per_type() {
    let provider = Arc::new(UnreachableProvider::default());
    let calculator = CostCalculator::new(resolver_with(
        Arc::new(PriceCache::in_memory()),
        provider.clone(),
    ));
    let profiles: Vec<_> = (0..10)
        .map(|i| vm(&format!("pos-{:02}", i), 2, 8.0, 20.0, WorkloadClass::Production))
        .collect();
    let cancel = CancellationToken::new();

    let report = calculator
        .run(&profiles, &TcoParameters::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.errors.len(), 10);
    // Two attempts for storage, two for the one instance type
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);

    // A new run asks again
    calculator
        .run(&profiles, &TcoParameters::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 8);
}
