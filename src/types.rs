//! Type definitions for the cost estimation pipeline
//!
//! Closed enumerations for everything the inventory boundary resolves once
//! (OS family, workload class) and the records that flow between the scope
//! filter, recommender, pricing resolver and calculator. All of them are built
//! fresh for a run and dropped afterwards.

use crate::pricing::types::PriceSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Guest OS family, resolved from the inventory OS string at ingestion
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    Linux,
    Windows,
    Rhel,
    Suse,
    UbuntuPro,
}

impl OsFamily {
    pub fn label(&self) -> &'static str {
        match self {
            OsFamily::Linux => "Linux",
            OsFamily::Windows => "Windows",
            OsFamily::Rhel => "RHEL",
            OsFamily::Suse => "SUSE",
            OsFamily::UbuntuPro => "Ubuntu Pro",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Environment class of a workload
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadClass {
    Production,
    NonProduction,
}

impl WorkloadClass {
    pub fn label(&self) -> &'static str {
        match self {
            WorkloadClass::Production => "Production",
            WorkloadClass::NonProduction => "Non-Production",
        }
    }
}

impl fmt::Display for WorkloadClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalized resource profile of one VM. Immutable after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmProfile {
    pub name: String,
    pub vcpu: u32,
    pub memory_gb: f64,
    pub storage_gb: f64,
    pub os_family: OsFamily,
    pub workload_class: WorkloadClass,
}

/// Why a VM is (or is not) part of the cost run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeCategory {
    VmwareManagement,
    BackupInfra,
    NetworkInfra,
    BusinessApp,
}

impl ScopeCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ScopeCategory::VmwareManagement => "VMware management",
            ScopeCategory::BackupInfra => "Backup infrastructure",
            ScopeCategory::NetworkInfra => "Network infrastructure",
            ScopeCategory::BusinessApp => "Business application",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDecision {
    pub vm_name: String,
    pub in_scope: bool,
    pub reason: String,
    pub category: ScopeCategory,
}

/// EC2 instance family class used for right-sizing preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceFamily {
    Burstable,
    General,
    ComputeOpt,
    MemoryOpt,
}

/// One entry of the static instance catalog
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InstanceCandidate {
    pub instance_type: &'static str,
    pub vcpu: u32,
    pub memory_gb: f64,
    pub family: InstanceFamily,
    /// us-east-1 Linux on-demand list price (USD/hr); relative ranking only
    pub relative_cost_index: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecommendation {
    pub vm_name: String,
    pub instance_type: String,
    pub family: InstanceFamily,
    pub vcpu: u32,
    pub memory_gb: f64,
    pub confidence_score: f64,
    pub cpu_headroom_ratio: f64,
    pub memory_headroom_ratio: f64,
    /// The strict headroom bounds matched nothing and the doubled bounds were used
    pub bounds_relaxed: bool,
}

impl InstanceRecommendation {
    /// `confidence_score == 0` marks an advisory "oversized, manual review needed" pick
    pub fn needs_review(&self) -> bool {
        self.confidence_score == 0.0
    }
}

/// Commercial pricing model for compute
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum PricingModel {
    OnDemand,
    Reserved,
    ComputeSavingsPlan,
    Ec2SavingsPlan,
}

impl PricingModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingModel::OnDemand => "on_demand",
            PricingModel::Reserved => "reserved",
            PricingModel::ComputeSavingsPlan => "compute_savings_plan",
            PricingModel::Ec2SavingsPlan => "ec2_savings_plan",
        }
    }

    pub fn is_savings_plan(&self) -> bool {
        matches!(
            self,
            PricingModel::ComputeSavingsPlan | PricingModel::Ec2SavingsPlan
        )
    }

    /// Human readable label of the model as actually applied
    pub fn plan_label(&self, term: Term, payment: PaymentOption) -> String {
        let name = match self {
            PricingModel::OnDemand => return "On-Demand".to_string(),
            PricingModel::Reserved => "Reserved Instance",
            PricingModel::ComputeSavingsPlan => "Compute Savings Plan",
            PricingModel::Ec2SavingsPlan => "EC2 Instance Savings Plan",
        };
        format!("{} ({}, {})", name, term.label(), payment.label())
    }
}

impl fmt::Display for PricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum Term {
    #[serde(rename = "1yr")]
    #[value(name = "1yr")]
    OneYear,
    #[serde(rename = "3yr")]
    #[value(name = "3yr")]
    ThreeYear,
}

impl Term {
    pub fn years(&self) -> u32 {
        match self {
            Term::OneYear => 1,
            Term::ThreeYear => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Term::OneYear => "1yr",
            Term::ThreeYear => "3yr",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOption {
    NoUpfront,
    PartialUpfront,
    AllUpfront,
}

impl PaymentOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOption::NoUpfront => "no_upfront",
            PaymentOption::PartialUpfront => "partial_upfront",
            PaymentOption::AllUpfront => "all_upfront",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentOption::NoUpfront => "No Upfront",
            PaymentOption::PartialUpfront => "Partial Upfront",
            PaymentOption::AllUpfront => "All Upfront",
        }
    }
}

impl fmt::Display for PaymentOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User parameters for one cost run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcoParameters {
    pub target_region: String,
    pub production_pricing_model: PricingModel,
    pub non_production_pricing_model: PricingModel,
    pub commitment_term: Term,
    pub payment_option: PaymentOption,
    pub production_utilization_pct: f64,
    pub non_production_utilization_pct: f64,
    /// EBS volume type used to price attached storage
    #[serde(default = "default_volume_type")]
    pub storage_volume_type: String,
}

fn default_volume_type() -> String {
    "gp3".to_string()
}

impl Default for TcoParameters {
    fn default() -> Self {
        Self {
            target_region: "us-east-1".to_string(),
            production_pricing_model: PricingModel::ComputeSavingsPlan,
            non_production_pricing_model: PricingModel::OnDemand,
            commitment_term: Term::OneYear,
            payment_option: PaymentOption::NoUpfront,
            production_utilization_pct: 100.0,
            non_production_utilization_pct: 50.0,
            storage_volume_type: default_volume_type(),
        }
    }
}

impl TcoParameters {
    pub fn pricing_model_for(&self, class: WorkloadClass) -> PricingModel {
        match class {
            WorkloadClass::Production => self.production_pricing_model,
            WorkloadClass::NonProduction => self.non_production_pricing_model,
        }
    }

    pub fn utilization_pct_for(&self, class: WorkloadClass) -> f64 {
        match class {
            WorkloadClass::Production => self.production_utilization_pct,
            WorkloadClass::NonProduction => self.non_production_utilization_pct,
        }
    }

    pub fn plan_label_for(&self, class: WorkloadClass) -> String {
        self.pricing_model_for(class)
            .plan_label(self.commitment_term, self.payment_option)
    }
}

/// Monthly cost estimate for one in-scope VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmCostEstimate {
    pub vm_name: String,
    pub instance_type: String,
    pub pricing_plan_label: String,
    pub monthly_compute_cost: f64,
    pub monthly_storage_cost: f64,
    pub total_monthly_cost: f64,
    pub workload_class: WorkloadClass,
    pub os_family: OsFamily,
    pub hourly_rate: f64,
    pub price_source: PriceSource,
    pub storage_price_source: PriceSource,
    pub substituted_from: Option<String>,
    pub recommendation_confidence: f64,
}

/// Why a VM could not be priced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmErrorKind {
    Input,
    PricingUnavailable,
}

/// Marked per-VM failure; the report shows these rows as "pricing unavailable"
/// rather than a zero cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmCostError {
    pub vm_name: String,
    pub kind: VmErrorKind,
    pub reason: String,
    pub workload_class: Option<WorkloadClass>,
    pub os_family: Option<OsFamily>,
    pub instance_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadCostBreakdown {
    pub vm_count: usize,
    pub monthly_compute_cost: f64,
    pub monthly_storage_cost: f64,
    pub monthly_total_cost: f64,
    pub annual_total_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub in_scope_vm_count: usize,
    pub priced_vm_count: usize,
    pub failed_vm_count: usize,
    pub out_of_scope_vm_count: usize,
    pub total_monthly_compute_cost: f64,
    pub total_monthly_storage_cost: f64,
    pub total_monthly_cost: f64,
    pub total_annual_cost: f64,
    pub by_workload_class: BTreeMap<WorkloadClass, WorkloadCostBreakdown>,
}

/// Complete outcome of one cost run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcoReport {
    pub run_id: uuid::Uuid,
    pub generated_at: DateTime<Utc>,
    pub parameters: TcoParameters,
    pub estimates: Vec<VmCostEstimate>,
    pub errors: Vec<VmCostError>,
    pub out_of_scope: Vec<ScopeDecision>,
    pub summary: CostSummary,
    pub cancelled: bool,
}
