//! Inventory boundary: raw VM records into normalized `VmProfile`s
//!
//! Records arrive as a JSON array exported from the on-premises inventory
//! tool. Field names accept both snake_case and the RVTools column headers.
//! This is the only place that looks at raw strings: memory and storage are
//! converted from MiB to GB, the guest OS string becomes an `OsFamily` and the
//! environment becomes a `WorkloadClass`. Everything downstream works on the
//! closed enums.

use crate::error::{Result, TcoError};
use crate::types::{OsFamily, VmCostError, VmErrorKind, VmProfile, WorkloadClass};
use crate::validation::validate_profile;
use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

const MIB_PER_GB: f64 = 1024.0;

/// Name tokens that mark a non-production VM when no environment is given
const NON_PRODUCTION_TOKENS: &[&str] = &[
    "dev", "devel", "development", "test", "tst", "qa", "uat", "stg", "stage", "staging",
    "sandbox", "sbx", "lab", "demo", "poc", "nonprod", "preprod",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInventoryRecord {
    #[serde(alias = "VM", alias = "name")]
    pub vm_name: String,
    #[serde(alias = "CPUs", alias = "cpus")]
    pub vcpu: i64,
    #[serde(alias = "Memory", alias = "memory")]
    pub memory_mib: f64,
    #[serde(alias = "Provisioned MiB", alias = "provisioned_mib")]
    pub storage_mib: f64,
    #[serde(default, alias = "OS according to the configuration file", alias = "os")]
    pub guest_os: Option<String>,
    /// Guest-reported OS; RVTools exports carry it next to the configured one
    #[serde(default, alias = "OS according to the VMware Tools")]
    pub tools_os: Option<String>,
    #[serde(default, alias = "Powerstate", alias = "powerstate")]
    pub power_state: String,
    #[serde(default, alias = "Environment", alias = "env")]
    pub environment: Option<String>,
}

impl RawInventoryRecord {
    pub fn is_powered_off(&self) -> bool {
        let state = self.power_state.to_ascii_lowercase();
        state.contains("off") || state == "suspended"
    }

    /// Configured OS, else the one VMware Tools reports
    pub fn os_description(&self) -> &str {
        [&self.guest_os, &self.tools_os]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }
}

/// Read a JSON array of inventory records
pub fn load_inventory(path: &Path) -> anyhow::Result<Vec<RawInventoryRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory: {}", path.display()))?;
    let records: Vec<RawInventoryRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse inventory JSON: {}", path.display()))?;
    debug!("Loaded {} inventory records from {}", records.len(), path.display());
    Ok(records)
}

fn os_patterns() -> &'static [(Regex, OsFamily)] {
    static PATTERNS: OnceLock<Vec<(Regex, OsFamily)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // Order matters: "ubuntu pro" before generic linux, RHEL before "linux"
        [
            (r"windows", OsFamily::Windows),
            (r"red\s*hat|\brhel\b", OsFamily::Rhel),
            (r"\bsuse\b|\bsles\b", OsFamily::Suse),
            (r"ubuntu\s+pro", OsFamily::UbuntuPro),
            (
                r"linux|centos|ubuntu|debian|amazon|oracle|rocky|alma|fedora|photon|coreos",
                OsFamily::Linux,
            ),
        ]
        .into_iter()
        .map(|(p, os)| {
            (
                Regex::new(&format!("(?i){}", p)).expect("OS pattern is a valid regex"),
                os,
            )
        })
        .collect()
    })
}

/// Classify a guest OS string. `None` for unknown or empty strings.
pub fn classify_os(guest_os: &str) -> Option<OsFamily> {
    os_patterns()
        .iter()
        .find(|(re, _)| re.is_match(guest_os))
        .map(|(_, os)| *os)
}

/// Workload class from an explicit environment value, else from name tokens
pub fn classify_workload(vm_name: &str, environment: Option<&str>) -> WorkloadClass {
    if let Some(env) = environment.map(str::trim).filter(|e| !e.is_empty()) {
        let env = env.to_ascii_lowercase();
        return if env.starts_with("prod") || env == "prd" || env == "production" {
            WorkloadClass::Production
        } else {
            WorkloadClass::NonProduction
        };
    }

    let lowered = vm_name.to_ascii_lowercase();
    let non_prod = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .any(|token| {
            let stem = token.trim_end_matches(|c: char| c.is_ascii_digit());
            NON_PRODUCTION_TOKENS.contains(&stem)
        });

    if non_prod {
        WorkloadClass::NonProduction
    } else {
        WorkloadClass::Production
    }
}

/// Normalize one raw record into a validated profile
pub fn normalize(record: &RawInventoryRecord) -> Result<VmProfile> {
    let reject = |reason: String| TcoError::Input {
        vm_name: record.vm_name.clone(),
        reason,
    };

    if record.vcpu < 0 {
        return Err(reject(format!("Negative vCPU count: {}", record.vcpu)));
    }
    let vcpu = u32::try_from(record.vcpu)
        .map_err(|_| reject(format!("vCPU count out of range: {}", record.vcpu)))?;

    let guest_os = record.os_description();
    let os_family = classify_os(guest_os)
        .ok_or_else(|| reject(format!("Unknown guest OS: '{}'", guest_os)))?;

    let profile = VmProfile {
        name: record.vm_name.trim().to_string(),
        vcpu,
        memory_gb: record.memory_mib / MIB_PER_GB,
        storage_gb: record.storage_mib / MIB_PER_GB,
        os_family,
        workload_class: classify_workload(&record.vm_name, record.environment.as_deref()),
    };
    validate_profile(&profile)?;
    Ok(profile)
}

/// Normalize a whole inventory; bad records become per-VM input errors
pub fn normalize_all(
    records: &[RawInventoryRecord],
    include_powered_off: bool,
) -> (Vec<VmProfile>, Vec<VmCostError>) {
    let mut profiles = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for record in records {
        if !include_powered_off && record.is_powered_off() {
            debug!("Skipping powered-off VM {}", record.vm_name);
            continue;
        }
        match normalize(record) {
            Ok(profile) => profiles.push(profile),
            Err(e) => rejected.push(VmCostError {
                vm_name: record.vm_name.clone(),
                kind: VmErrorKind::Input,
                reason: e.to_string(),
                workload_class: None,
                os_family: None,
                instance_type: None,
            }),
        }
    }

    (profiles, rejected)
}
