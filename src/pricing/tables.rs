//! Versioned pricing tables
//!
//! The single source for commitment discounts, OS license multipliers and
//! reference EBS prices. Discounts are fractions off the on-demand rate of
//! the same instance type. Values are the midpoints of the discount ranges
//! AWS publishes on the Reserved Instance and Savings Plans pricing pages
//! for current-generation general purpose instances in us-east-1; EC2
//! Instance Savings Plans sit 2-3 points above Compute Savings Plans.

use crate::types::{OsFamily, PaymentOption, PricingModel, Term};

pub const TABLE_VERSION: &str = "2024.1";

/// Discount off on-demand for a commitment model; 0 for on-demand
pub fn discount_factor(model: PricingModel, term: Term, payment: PaymentOption) -> f64 {
    use PaymentOption::*;
    use Term::*;
    match (model, term, payment) {
        (PricingModel::OnDemand, _, _) => 0.0,

        (PricingModel::Reserved, OneYear, NoUpfront) => 0.28,
        (PricingModel::Reserved, OneYear, PartialUpfront) => 0.33,
        (PricingModel::Reserved, OneYear, AllUpfront) => 0.35,
        (PricingModel::Reserved, ThreeYear, NoUpfront) => 0.40,
        (PricingModel::Reserved, ThreeYear, PartialUpfront) => 0.50,
        (PricingModel::Reserved, ThreeYear, AllUpfront) => 0.53,

        (PricingModel::ComputeSavingsPlan, OneYear, NoUpfront) => 0.17,
        (PricingModel::ComputeSavingsPlan, OneYear, PartialUpfront) => 0.19,
        (PricingModel::ComputeSavingsPlan, OneYear, AllUpfront) => 0.20,
        (PricingModel::ComputeSavingsPlan, ThreeYear, NoUpfront) => 0.31,
        (PricingModel::ComputeSavingsPlan, ThreeYear, PartialUpfront) => 0.33,
        (PricingModel::ComputeSavingsPlan, ThreeYear, AllUpfront) => 0.34,

        (PricingModel::Ec2SavingsPlan, OneYear, NoUpfront) => 0.20,
        (PricingModel::Ec2SavingsPlan, OneYear, PartialUpfront) => 0.21,
        (PricingModel::Ec2SavingsPlan, OneYear, AllUpfront) => 0.22,
        (PricingModel::Ec2SavingsPlan, ThreeYear, NoUpfront) => 0.34,
        (PricingModel::Ec2SavingsPlan, ThreeYear, PartialUpfront) => 0.35,
        (PricingModel::Ec2SavingsPlan, ThreeYear, AllUpfront) => 0.37,
    }
}

/// Apply the commitment discount to an on-demand hourly rate
pub fn discounted_rate(
    on_demand_hourly: f64,
    model: PricingModel,
    term: Term,
    payment: PaymentOption,
) -> f64 {
    on_demand_hourly * (1.0 - discount_factor(model, term, payment))
}

/// License uplift applied to Linux-priced compute
pub fn os_multiplier(os: OsFamily) -> f64 {
    match os {
        OsFamily::Linux => 1.0,
        OsFamily::UbuntuPro => 1.05,
        OsFamily::Suse => 1.20,
        OsFamily::Rhel => 1.25,
        OsFamily::Windows => 1.40,
    }
}

/// Published us-east-1 EBS list prices, USD per GB-month
pub fn reference_storage_rate(volume_type: &str) -> Option<f64> {
    match volume_type.to_ascii_lowercase().as_str() {
        "gp3" => Some(0.08),
        "gp2" => Some(0.10),
        "io1" | "io2" => Some(0.125),
        "st1" => Some(0.045),
        "sc1" => Some(0.015),
        "standard" => Some(0.05),
        _ => None,
    }
}
