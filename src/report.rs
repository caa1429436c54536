//! Report rendering: terminal tables, CSV export and JSON

use crate::error::Result;
use crate::pricing::types::PriceSource;
use crate::types::{
    InstanceRecommendation, ScopeDecision, TcoReport, VmErrorKind, WorkloadClass,
};
use crate::utils::{format_currency, format_hourly_rate, round_cents};
use comfy_table::{Cell, Color, Table};

pub const PRICING_UNAVAILABLE: &str = "PRICING UNAVAILABLE";
pub const INVALID_INPUT: &str = "INVALID INPUT";

/// Human readable report: per-VM table, failures, totals
pub fn render_text(report: &TcoReport) -> String {
    let mut out = String::new();
    let params = &report.parameters;

    out.push_str(&format!(
        "TCO estimate for {} (run {})\n",
        params.target_region, report.run_id
    ));
    out.push_str(&format!(
        "Production: {} at {}% | Non-production: {} at {}%\n\n",
        params.plan_label_for(WorkloadClass::Production),
        params.production_utilization_pct,
        params.plan_label_for(WorkloadClass::NonProduction),
        params.non_production_utilization_pct
    ));

    let mut table = Table::new();
    table.set_header(vec![
        "VM",
        "Instance",
        "Rate/hr",
        "Compute/mo",
        "Storage/mo",
        "Total/mo",
        "Plan",
        "Source",
    ]);
    for e in &report.estimates {
        let source = match &e.substituted_from {
            Some(from) => format!("{} (via {})", e.price_source, from),
            None => e.price_source.to_string(),
        };
        let source_cell = match e.price_source {
            PriceSource::Fallback => Cell::new(source).fg(Color::Yellow),
            _ => Cell::new(source),
        };
        let instance_cell = if e.recommendation_confidence == 0.0 {
            Cell::new(format!("{} (review)", e.instance_type)).fg(Color::Yellow)
        } else {
            Cell::new(&e.instance_type)
        };
        table.add_row(vec![
            Cell::new(&e.vm_name),
            instance_cell,
            Cell::new(format_hourly_rate(e.hourly_rate)),
            Cell::new(format_currency(e.monthly_compute_cost)),
            Cell::new(format_currency(e.monthly_storage_cost)),
            Cell::new(format_currency(e.total_monthly_cost)),
            Cell::new(&e.pricing_plan_label),
            source_cell,
        ]);
    }
    for err in &report.errors {
        table.add_row(vec![
            Cell::new(&err.vm_name),
            Cell::new(err.instance_type.as_deref().unwrap_or("-")),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new(status_label(err.kind)).fg(Color::Red),
            Cell::new(&err.reason),
            Cell::new("-"),
        ]);
    }
    out.push_str(&table.to_string());
    out.push('\n');

    let s = &report.summary;
    out.push_str(&format!(
        "\n{} VMs in scope ({} priced, {} failed), {} excluded\n",
        s.in_scope_vm_count, s.priced_vm_count, s.failed_vm_count, s.out_of_scope_vm_count
    ));
    for (class, breakdown) in &s.by_workload_class {
        out.push_str(&format!(
            "  {:<15} {:>4} VMs  {}/mo  {}/yr\n",
            class.label(),
            breakdown.vm_count,
            format_currency(breakdown.monthly_total_cost),
            format_currency(breakdown.annual_total_cost)
        ));
    }
    out.push_str(&format!(
        "Monthly: {} (compute {}, storage {})\nAnnual:  {}\n",
        format_currency(s.total_monthly_cost),
        format_currency(s.total_monthly_compute_cost),
        format_currency(s.total_monthly_storage_cost),
        format_currency(s.total_annual_cost)
    ));
    if report.cancelled {
        out.push_str("\nRun was cancelled; totals cover the VMs priced before cancellation.\n");
    }
    out
}

fn status_label(kind: VmErrorKind) -> &'static str {
    match kind {
        VmErrorKind::PricingUnavailable => PRICING_UNAVAILABLE,
        VmErrorKind::Input => INVALID_INPUT,
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One row per VM; unpriced VMs keep their row with empty costs
pub fn to_csv(report: &TcoReport) -> String {
    let mut csv = String::from(
        "VM Name,Instance Type,Monthly Compute (USD),Monthly Storage (USD),Monthly Total (USD),Pricing Plan,OS,Environment,Price Source,Status\n",
    );

    for e in &report.estimates {
        let row = [
            csv_field(&e.vm_name),
            csv_field(&e.instance_type),
            format!("{:.2}", round_cents(e.monthly_compute_cost)),
            format!("{:.2}", round_cents(e.monthly_storage_cost)),
            format!("{:.2}", round_cents(e.total_monthly_cost)),
            csv_field(&e.pricing_plan_label),
            e.os_family.label().to_string(),
            e.workload_class.label().to_string(),
            e.price_source.to_string(),
            "OK".to_string(),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }

    for err in &report.errors {
        let row = [
            csv_field(&err.vm_name),
            csv_field(err.instance_type.as_deref().unwrap_or("")),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            err.os_family.map(|o| o.label().to_string()).unwrap_or_default(),
            err.workload_class
                .map(|c| c.label().to_string())
                .unwrap_or_default(),
            String::new(),
            status_label(err.kind).to_string(),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    csv
}

pub fn to_json(report: &TcoReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn render_scope(decisions: &[ScopeDecision]) -> String {
    let mut table = Table::new();
    table.set_header(vec!["VM", "In scope", "Category", "Reason"]);
    for d in decisions {
        let in_scope = if d.in_scope {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::Yellow)
        };
        table.add_row(vec![
            Cell::new(&d.vm_name),
            in_scope,
            Cell::new(d.category.label()),
            Cell::new(&d.reason),
        ]);
    }
    let excluded = decisions.iter().filter(|d| !d.in_scope).count();
    format!(
        "{}\n{} of {} VMs in scope\n",
        table,
        decisions.len() - excluded,
        decisions.len()
    )
}

pub fn render_recommendations(recommendations: &[InstanceRecommendation]) -> String {
    let mut table = Table::new();
    table.set_header(vec![
        "VM",
        "Instance",
        "vCPU",
        "Memory (GB)",
        "CPU headroom",
        "Mem headroom",
        "Confidence",
    ]);
    for r in recommendations {
        let confidence = if r.needs_review() {
            Cell::new("0.00 (review)").fg(Color::Red)
        } else if r.bounds_relaxed {
            Cell::new(format!("{:.2} (relaxed)", r.confidence_score)).fg(Color::Yellow)
        } else {
            Cell::new(format!("{:.2}", r.confidence_score))
        };
        table.add_row(vec![
            Cell::new(&r.vm_name),
            Cell::new(&r.instance_type),
            Cell::new(r.vcpu),
            Cell::new(format!("{:.1}", r.memory_gb)),
            Cell::new(format!("{:.2}x", r.cpu_headroom_ratio)),
            Cell::new(format!("{:.2}x", r.memory_headroom_ratio)),
            confidence,
        ]);
    }
    format!("{}\n", table)
}
