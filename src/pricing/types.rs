//! Keys and results of price lookups

use crate::types::{PaymentOption, PricingModel, Term};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite key of a compute price
///
/// On-demand prices carry no term or payment option; the constructor drops
/// them so every on-demand lookup for a type and region hits the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PriceKey {
    pub instance_type: String,
    pub region: String,
    pub pricing_model: PricingModel,
    pub term: Option<Term>,
    pub payment_option: Option<PaymentOption>,
}

impl PriceKey {
    pub fn new(
        instance_type: impl Into<String>,
        region: impl Into<String>,
        pricing_model: PricingModel,
        term: Term,
        payment_option: PaymentOption,
    ) -> Self {
        let commitment = pricing_model != PricingModel::OnDemand;
        Self {
            instance_type: instance_type.into(),
            region: region.into(),
            pricing_model,
            term: commitment.then_some(term),
            payment_option: commitment.then_some(payment_option),
        }
    }

    pub fn on_demand(instance_type: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            instance_type: instance_type.into(),
            region: region.into(),
            pricing_model: PricingModel::OnDemand,
            term: None,
            payment_option: None,
        }
    }

    /// On-demand key of the same instance type and region
    pub fn to_on_demand(&self) -> Self {
        Self::on_demand(self.instance_type.clone(), self.region.clone())
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.instance_type, self.region, self.pricing_model)?;
        if let (Some(term), Some(payment)) = (self.term, self.payment_option) {
            write!(f, "/{}/{}", term, payment)?;
        }
        Ok(())
    }
}

/// Key of an EBS storage price (USD per GB-month)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageKey {
    pub volume_type: String,
    pub region: String,
}

impl StorageKey {
    pub fn new(volume_type: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            volume_type: volume_type.into(),
            region: region.into(),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ebs:{}/{}", self.volume_type, self.region)
    }
}

/// Which tier of the resolver chain produced a price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    LocalCache,
    RemoteApi,
    Fallback,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::LocalCache => "local_cache",
            PriceSource::RemoteApi => "remote_api",
            PriceSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved price. For compute the rate is USD/hr, for storage USD/GB-month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub hourly_rate: f64,
    pub source: PriceSource,
    /// Instance type whose rate anchored a fallback derivation, when it differs
    pub substituted_from: Option<String>,
}

impl PriceQuote {
    pub fn new(hourly_rate: f64, source: PriceSource) -> Self {
        Self {
            hourly_rate,
            source,
            substituted_from: None,
        }
    }
}

/// Everything one remote call returns for an instance type in a region
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstancePricing {
    pub on_demand_hourly: Option<f64>,
    /// Effective hourly reserved rates (upfront fees amortized over the term)
    pub reserved: Vec<ReservedRate>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservedRate {
    pub term: Term,
    pub payment_option: PaymentOption,
    pub effective_hourly: f64,
}

impl InstancePricing {
    pub fn reserved_rate(&self, term: Term, payment: PaymentOption) -> Option<f64> {
        self.reserved
            .iter()
            .find(|r| r.term == term && r.payment_option == payment)
            .map(|r| r.effective_hourly)
    }

    pub fn is_empty(&self) -> bool {
        self.on_demand_hourly.is_none() && self.reserved.is_empty()
    }
}
