//! Migration scope filter
//!
//! Decides which VMs are migratable business workloads and which are
//! on-premises infrastructure that does not move to AWS (hypervisor
//! management, backup appliances, network appliances). Classification is by
//! VM name only, case-insensitive, against three keyword sets checked in a
//! fixed order; the first hit wins.

use crate::config::ScopeConfig;
use crate::types::{ScopeCategory, ScopeDecision, VmProfile};

const VMWARE_MANAGEMENT_MARKERS: &[&str] = &[
    "vcenter", "vcsa", "vcs", "esxi", "esx", "vsphere", "vmware", "nsx", "vrops", "vrli",
    "vrealize", "vra", "vro", "hcx", "sddc", "psc", "vum", "srm", "vdp", "witness",
];

const BACKUP_INFRA_MARKERS: &[&str] = &[
    "veeam", "backup", "bkp", "bck", "commvault", "netbackup", "avamar", "rubrik",
    "cohesity", "datadomain", "arcserve", "vproxy", "networker", "dpm",
];

const NETWORK_INFRA_MARKERS: &[&str] = &[
    "gateway", "gw", "firewall", "fw", "router", "rtr", "bigip", "big-ip", "f5", "paloalto",
    "pan", "fortigate", "fortinet", "checkpoint", "netscaler", "adc", "loadbalancer", "lb",
    "infoblox", "vyos", "vpn", "dns", "dhcp", "proxy",
];

/// Markers of this length or longer match anywhere in the name; shorter ones
/// only match a whole name token (optionally followed by digits)
const SUBSTRING_MATCH_MIN_LEN: usize = 4;

#[derive(Debug, Clone)]
struct MarkerSet {
    category: ScopeCategory,
    markers: Vec<String>,
}

impl MarkerSet {
    fn new(category: ScopeCategory, builtin: &[&str], extra: &[String]) -> Self {
        let markers = builtin
            .iter()
            .map(|m| m.to_string())
            .chain(extra.iter().map(|m| m.trim().to_ascii_lowercase()))
            .filter(|m| !m.is_empty())
            .collect();
        Self { category, markers }
    }

    /// First marker matching the (lowercased) name and its tokens
    fn find_match(&self, lowered: &str, tokens: &[&str]) -> Option<&str> {
        self.markers
            .iter()
            .find(|marker| {
                if marker.len() >= SUBSTRING_MATCH_MIN_LEN {
                    lowered.contains(marker.as_str())
                } else {
                    tokens.iter().any(|token| token_matches(token, marker))
                }
            })
            .map(String::as_str)
    }
}

fn token_matches(token: &str, marker: &str) -> bool {
    token
        .strip_prefix(marker)
        .map(|rest| rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Name-based scope classifier
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    // Priority order: VMware management, backup, network
    sets: Vec<MarkerSet>,
}

impl Default for ScopeFilter {
    fn default() -> Self {
        Self::new(&ScopeConfig::default())
    }
}

impl ScopeFilter {
    pub fn new(config: &ScopeConfig) -> Self {
        Self {
            sets: vec![
                MarkerSet::new(
                    ScopeCategory::VmwareManagement,
                    VMWARE_MANAGEMENT_MARKERS,
                    &config.extra_vmware_markers,
                ),
                MarkerSet::new(
                    ScopeCategory::BackupInfra,
                    BACKUP_INFRA_MARKERS,
                    &config.extra_backup_markers,
                ),
                MarkerSet::new(
                    ScopeCategory::NetworkInfra,
                    NETWORK_INFRA_MARKERS,
                    &config.extra_network_markers,
                ),
            ],
        }
    }

    /// Classify one VM by name
    pub fn classify_one(&self, vm_name: &str) -> ScopeDecision {
        let lowered = vm_name.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        for set in &self.sets {
            if let Some(marker) = set.find_match(&lowered, &tokens) {
                return ScopeDecision {
                    vm_name: vm_name.to_string(),
                    in_scope: false,
                    reason: format!(
                        "Name matches {} marker '{}'",
                        set.category.label().to_lowercase(),
                        marker
                    ),
                    category: set.category,
                };
            }
        }

        ScopeDecision {
            vm_name: vm_name.to_string(),
            in_scope: true,
            reason: "No infrastructure marker in name".to_string(),
            category: ScopeCategory::BusinessApp,
        }
    }

    /// One decision per VM, in input order
    pub fn classify(&self, vm_profiles: &[VmProfile]) -> Vec<ScopeDecision> {
        vm_profiles
            .iter()
            .map(|p| self.classify_one(&p.name))
            .collect()
    }

    /// Split profiles into in-scope (with their decisions) and out-of-scope decisions
    pub fn partition<'a>(
        &self,
        vm_profiles: &'a [VmProfile],
    ) -> (Vec<(&'a VmProfile, ScopeDecision)>, Vec<ScopeDecision>) {
        let mut in_scope = Vec::new();
        let mut out_of_scope = Vec::new();
        for (profile, decision) in vm_profiles.iter().zip(self.classify(vm_profiles)) {
            if decision.in_scope {
                in_scope.push((profile, decision));
            } else {
                out_of_scope.push(decision);
            }
        }
        (in_scope, out_of_scope)
    }
}
