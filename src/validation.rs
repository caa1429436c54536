//! Input validation utilities
//!
//! Rejects malformed VM profiles per VM and bad run parameters before any
//! pricing work starts.

use crate::error::{Result, TcoError};
use crate::types::{TcoParameters, VmProfile};
use regex::Regex;
use std::sync::OnceLock;

fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]{2}(-gov)?-[a-z]+-\d$").expect("region pattern is a valid regex")
    })
}

/// Validate an AWS region code (e.g. `us-east-1`, `eu-central-2`, `us-gov-west-1`)
pub fn validate_region(region: &str) -> Result<()> {
    if !region_pattern().is_match(region) {
        return Err(TcoError::Validation {
            field: "target_region".to_string(),
            reason: format!("Not an AWS region code: '{}'", region),
        });
    }
    Ok(())
}

/// Validate a utilization percentage (0-100 inclusive)
pub fn validate_utilization(field: &str, pct: f64) -> Result<()> {
    if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
        return Err(TcoError::Validation {
            field: field.to_string(),
            reason: format!("Utilization must be between 0 and 100, got: {}", pct),
        });
    }
    Ok(())
}

/// Validate run parameters
pub fn validate_parameters(params: &TcoParameters) -> Result<()> {
    validate_region(&params.target_region)?;
    validate_utilization(
        "production_utilization_pct",
        params.production_utilization_pct,
    )?;
    validate_utilization(
        "non_production_utilization_pct",
        params.non_production_utilization_pct,
    )?;
    if params.storage_volume_type.trim().is_empty() {
        return Err(TcoError::Validation {
            field: "storage_volume_type".to_string(),
            reason: "Storage volume type cannot be empty".to_string(),
        });
    }
    Ok(())
}

/// Validate a normalized VM profile
///
/// A VM needs at least one vCPU and some memory to be right-sized; storage
/// may be zero (diskless appliances), but never negative.
pub fn validate_profile(profile: &VmProfile) -> Result<()> {
    let reject = |reason: String| TcoError::Input {
        vm_name: profile.name.clone(),
        reason,
    };

    if profile.name.trim().is_empty() {
        return Err(reject("VM name cannot be empty".to_string()));
    }
    if profile.vcpu == 0 {
        return Err(reject("vCPU count must be at least 1".to_string()));
    }
    if !profile.memory_gb.is_finite() || profile.memory_gb <= 0.0 {
        return Err(reject(format!(
            "Memory must be positive, got: {} GB",
            profile.memory_gb
        )));
    }
    if !profile.storage_gb.is_finite() || profile.storage_gb < 0.0 {
        return Err(reject(format!(
            "Storage cannot be negative, got: {} GB",
            profile.storage_gb
        )));
    }
    Ok(())
}
