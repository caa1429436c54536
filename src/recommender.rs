//! Right-sizing: map a VM profile to an EC2 instance type
//!
//! Candidates must cover the VM's vCPU and memory and stay within a headroom
//! bound of `max(x * 1.3, x + 1)` per dimension, so a recommendation never
//! over-provisions by more than ~30% (plus one unit for small VMs). Survivors
//! are scored with cost weighted over performance fit:
//!
//! ```text
//! score = 0.3 * performance_fit + 0.7 * cost_efficiency * (1 - 0.3 * waste_penalty)
//! ```
//!
//! When nothing fits, the bounds are doubled once. When that also fails the
//! largest catalog entry is returned with `confidence_score = 0` so the VM is
//! flagged for manual review instead of failing the run.

use crate::catalog::{self, CATALOG};
use crate::types::{
    InstanceCandidate, InstanceFamily, InstanceRecommendation, VmProfile, WorkloadClass,
};
use std::cmp::Ordering;
use tracing::{debug, warn};

const HEADROOM_FACTOR: f64 = 1.3;
const PERFORMANCE_WEIGHT: f64 = 0.3;
const COST_WEIGHT: f64 = 0.7;
const WASTE_PENALTY_WEIGHT: f64 = 0.3;
const RELAXED_CONFIDENCE_FACTOR: f64 = 0.5;
const EPSILON: f64 = 1e-9;

/// Burstable is only preferred for small non-production VMs
const BURSTABLE_MAX_VCPU: u32 = 8;
const BURSTABLE_MAX_MEMORY_GB: f64 = 32.0;

/// GB per vCPU at which a workload counts as memory-heavy / compute-heavy
const MEMORY_HEAVY_RATIO: f64 = 6.0;
const COMPUTE_HEAVY_RATIO: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
struct HeadroomBounds {
    cpu: f64,
    memory: f64,
}

impl HeadroomBounds {
    fn strict(vcpu: f64, memory_gb: f64) -> Self {
        Self {
            cpu: (vcpu * HEADROOM_FACTOR).max(vcpu + 1.0),
            memory: (memory_gb * HEADROOM_FACTOR).max(memory_gb + 1.0),
        }
    }

    fn doubled(&self) -> Self {
        Self {
            cpu: self.cpu * 2.0,
            memory: self.memory * 2.0,
        }
    }
}

/// Upper vCPU bound a non-degraded recommendation must respect
pub fn cpu_headroom_bound(vcpu: u32) -> f64 {
    HeadroomBounds::strict(vcpu as f64, 0.0).cpu
}

/// Requirement as seen by the scorer; zero sizes are treated as the smallest unit
#[derive(Debug, Clone, Copy)]
struct Requirement {
    vcpu: f64,
    memory_gb: f64,
    class: WorkloadClass,
}

impl Requirement {
    fn from_profile(profile: &VmProfile) -> Self {
        Self {
            vcpu: profile.vcpu.max(1) as f64,
            memory_gb: profile.memory_gb.max(0.5),
            class: profile.workload_class,
        }
    }

    fn memory_per_vcpu(&self) -> f64 {
        self.memory_gb / self.vcpu
    }

    /// Preferred families, most preferred first
    fn preferred_families(&self) -> Vec<InstanceFamily> {
        use InstanceFamily::*;
        let ratio = self.memory_per_vcpu();
        match self.class {
            WorkloadClass::NonProduction
                if self.vcpu <= BURSTABLE_MAX_VCPU as f64
                    && self.memory_gb <= BURSTABLE_MAX_MEMORY_GB =>
            {
                vec![Burstable, General]
            }
            WorkloadClass::Production if ratio >= MEMORY_HEAVY_RATIO => vec![MemoryOpt, General],
            WorkloadClass::Production => vec![General, MemoryOpt],
            WorkloadClass::NonProduction if ratio >= MEMORY_HEAVY_RATIO => {
                vec![MemoryOpt, General]
            }
            WorkloadClass::NonProduction if ratio <= COMPUTE_HEAVY_RATIO => {
                vec![ComputeOpt, General]
            }
            WorkloadClass::NonProduction => vec![General, ComputeOpt],
        }
    }

    fn family_fit(&self, family: InstanceFamily, preferred: &[InstanceFamily]) -> f64 {
        match preferred.iter().position(|f| *f == family) {
            Some(0) => 1.0,
            Some(_) => 0.8,
            None if family == InstanceFamily::Burstable
                && self.class == WorkloadClass::Production =>
            {
                0.1
            }
            None => 0.5,
        }
    }

    fn covered_by(&self, c: &InstanceCandidate, bounds: &HeadroomBounds) -> bool {
        let vcpu = c.vcpu as f64;
        vcpu + EPSILON >= self.vcpu
            && c.memory_gb + EPSILON >= self.memory_gb
            && vcpu <= bounds.cpu + EPSILON
            && c.memory_gb <= bounds.memory + EPSILON
    }
}

#[derive(Debug, Clone, Copy)]
struct ScoredCandidate {
    candidate: &'static InstanceCandidate,
    score: f64,
}

/// Instance recommender over a fixed catalog
#[derive(Debug, Clone)]
pub struct InstanceRecommender {
    catalog: &'static [InstanceCandidate],
}

impl Default for InstanceRecommender {
    fn default() -> Self {
        Self { catalog: CATALOG }
    }
}

impl InstanceRecommender {
    pub fn with_catalog(catalog: &'static [InstanceCandidate]) -> Self {
        Self { catalog }
    }

    /// Recommend an instance type; never fails
    pub fn recommend(&self, profile: &VmProfile) -> InstanceRecommendation {
        let req = Requirement::from_profile(profile);
        let strict = HeadroomBounds::strict(req.vcpu, req.memory_gb);

        if let Some(best) = self.best_within(&req, &strict) {
            return build(profile, &req, best.candidate, best.score.clamp(0.0, 1.0), false);
        }

        let relaxed = strict.doubled();
        if let Some(best) = self.best_within(&req, &relaxed) {
            let confidence = if best.candidate.vcpu as f64 > strict.cpu + EPSILON {
                0.0
            } else {
                (best.score * RELAXED_CONFIDENCE_FACTOR).clamp(0.0, 1.0)
            };
            debug!(
                "{}: no candidate within strict headroom, relaxed pick {} (confidence {:.2})",
                profile.name, best.candidate.instance_type, confidence
            );
            return build(profile, &req, best.candidate, confidence, true);
        }

        let largest = self.largest();
        warn!(
            "{} ({} vCPU, {:.1} GB) exceeds the instance catalog; using {} - manual review needed",
            profile.name, profile.vcpu, profile.memory_gb, largest.instance_type
        );
        build(profile, &req, largest, 0.0, true)
    }

    pub fn recommend_all(&self, profiles: &[VmProfile]) -> Vec<InstanceRecommendation> {
        profiles.iter().map(|p| self.recommend(p)).collect()
    }

    fn largest(&self) -> &'static InstanceCandidate {
        self.catalog
            .iter()
            .max_by(|a, b| {
                a.vcpu
                    .cmp(&b.vcpu)
                    .then(a.memory_gb.partial_cmp(&b.memory_gb).unwrap_or(Ordering::Equal))
            })
            .unwrap_or_else(catalog::largest)
    }

    fn best_within(&self, req: &Requirement, bounds: &HeadroomBounds) -> Option<ScoredCandidate> {
        let survivors: Vec<&'static InstanceCandidate> = self
            .catalog
            .iter()
            .filter(|c| req.covered_by(c, bounds))
            .collect();
        if survivors.is_empty() {
            return None;
        }

        let preferred = req.preferred_families();
        let considered = narrow_to_preferred(survivors, &preferred, req.class);

        let cheapest = considered
            .iter()
            .map(|c| c.relative_cost_index)
            .fold(f64::INFINITY, f64::min);

        considered
            .into_iter()
            .map(|c| ScoredCandidate {
                candidate: c,
                score: score(req, c, &preferred, cheapest),
            })
            .max_by(compare_scored)
    }
}

/// Keep preferred-family survivors when there are any; production never
/// falls back to burstable while another family survives
fn narrow_to_preferred(
    survivors: Vec<&'static InstanceCandidate>,
    preferred: &[InstanceFamily],
    class: WorkloadClass,
) -> Vec<&'static InstanceCandidate> {
    let in_preferred: Vec<_> = survivors
        .iter()
        .copied()
        .filter(|c| preferred.contains(&c.family))
        .collect();
    if !in_preferred.is_empty() {
        return in_preferred;
    }

    if class == WorkloadClass::Production {
        let non_burstable: Vec<_> = survivors
            .iter()
            .copied()
            .filter(|c| c.family != InstanceFamily::Burstable)
            .collect();
        if !non_burstable.is_empty() {
            return non_burstable;
        }
    }
    survivors
}

fn score(
    req: &Requirement,
    c: &InstanceCandidate,
    preferred: &[InstanceFamily],
    cheapest_index: f64,
) -> f64 {
    let cpu_headroom = c.vcpu as f64 / req.vcpu;
    let memory_headroom = c.memory_gb / req.memory_gb;
    let balance = cpu_headroom.min(memory_headroom) / cpu_headroom.max(memory_headroom);
    let performance_fit = 0.7 * req.family_fit(c.family, preferred) + 0.3 * balance;

    let cost_efficiency = if c.relative_cost_index > 0.0 {
        (cheapest_index / c.relative_cost_index).min(1.0)
    } else {
        1.0
    };

    let cpu_waste = (1.0 - req.vcpu / c.vcpu as f64).max(0.0);
    let memory_waste = (1.0 - req.memory_gb / c.memory_gb).max(0.0);
    let waste_penalty = (cpu_waste + memory_waste) / 2.0;

    let cost_efficiency_adjusted = cost_efficiency * (1.0 - WASTE_PENALTY_WEIGHT * waste_penalty);
    PERFORMANCE_WEIGHT * performance_fit + COST_WEIGHT * cost_efficiency_adjusted
}

/// Higher score wins; ties go to fewer vCPU, then less memory, then name
fn compare_scored(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    if (a.score - b.score).abs() > EPSILON {
        return a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal);
    }
    // Reversed: the smaller instance must compare as "greater" for max_by
    b.candidate
        .vcpu
        .cmp(&a.candidate.vcpu)
        .then(
            b.candidate
                .memory_gb
                .partial_cmp(&a.candidate.memory_gb)
                .unwrap_or(Ordering::Equal),
        )
        .then(b.candidate.instance_type.cmp(a.candidate.instance_type))
}

fn build(
    profile: &VmProfile,
    req: &Requirement,
    c: &InstanceCandidate,
    confidence: f64,
    bounds_relaxed: bool,
) -> InstanceRecommendation {
    InstanceRecommendation {
        vm_name: profile.name.clone(),
        instance_type: c.instance_type.to_string(),
        family: c.family,
        vcpu: c.vcpu,
        memory_gb: c.memory_gb,
        confidence_score: confidence,
        cpu_headroom_ratio: c.vcpu as f64 / req.vcpu,
        memory_headroom_ratio: c.memory_gb / req.memory_gb,
        bounds_relaxed,
    }
}
