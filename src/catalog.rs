//! Static EC2 instance catalog
//!
//! The menu the recommender chooses from. `relative_cost_index` is the
//! us-east-1 Linux shared-tenancy on-demand list price in USD/hr; it ranks
//! candidates by cost and seeds a cold price cache (`tcoctl cache seed`).

use crate::types::{InstanceCandidate, InstanceFamily};

macro_rules! candidate {
    ($ty:literal, $vcpu:literal, $mem:literal, $family:ident, $index:literal) => {
        InstanceCandidate {
            instance_type: $ty,
            vcpu: $vcpu,
            memory_gb: $mem,
            family: InstanceFamily::$family,
            relative_cost_index: $index,
        }
    };
}

pub static CATALOG: &[InstanceCandidate] = &[
    // Burstable
    candidate!("t3.micro", 2, 1.0, Burstable, 0.0104),
    candidate!("t3.small", 2, 2.0, Burstable, 0.0208),
    candidate!("t3.medium", 2, 4.0, Burstable, 0.0416),
    candidate!("t3.large", 2, 8.0, Burstable, 0.0832),
    candidate!("t3.xlarge", 4, 16.0, Burstable, 0.1664),
    candidate!("t3.2xlarge", 8, 32.0, Burstable, 0.3328),
    // General purpose
    candidate!("m6i.large", 2, 8.0, General, 0.096),
    candidate!("m6i.xlarge", 4, 16.0, General, 0.192),
    candidate!("m6i.2xlarge", 8, 32.0, General, 0.384),
    candidate!("m6i.4xlarge", 16, 64.0, General, 0.768),
    candidate!("m6i.8xlarge", 32, 128.0, General, 1.536),
    candidate!("m6i.12xlarge", 48, 192.0, General, 2.304),
    candidate!("m6i.16xlarge", 64, 256.0, General, 3.072),
    candidate!("m6i.24xlarge", 96, 384.0, General, 4.608),
    candidate!("m6i.32xlarge", 128, 512.0, General, 6.144),
    // Compute optimized
    candidate!("c6i.large", 2, 4.0, ComputeOpt, 0.085),
    candidate!("c6i.xlarge", 4, 8.0, ComputeOpt, 0.17),
    candidate!("c6i.2xlarge", 8, 16.0, ComputeOpt, 0.34),
    candidate!("c6i.4xlarge", 16, 32.0, ComputeOpt, 0.68),
    candidate!("c6i.8xlarge", 32, 64.0, ComputeOpt, 1.36),
    candidate!("c6i.12xlarge", 48, 96.0, ComputeOpt, 2.04),
    candidate!("c6i.16xlarge", 64, 128.0, ComputeOpt, 2.72),
    candidate!("c6i.24xlarge", 96, 192.0, ComputeOpt, 4.08),
    // Memory optimized
    candidate!("r6i.large", 2, 16.0, MemoryOpt, 0.126),
    candidate!("r6i.xlarge", 4, 32.0, MemoryOpt, 0.252),
    candidate!("r6i.2xlarge", 8, 64.0, MemoryOpt, 0.504),
    candidate!("r6i.4xlarge", 16, 128.0, MemoryOpt, 1.008),
    candidate!("r6i.8xlarge", 32, 256.0, MemoryOpt, 2.016),
    candidate!("r6i.12xlarge", 48, 384.0, MemoryOpt, 3.024),
    candidate!("r6i.16xlarge", 64, 512.0, MemoryOpt, 4.032),
    candidate!("r6i.24xlarge", 96, 768.0, MemoryOpt, 6.048),
    candidate!("r6i.32xlarge", 128, 1024.0, MemoryOpt, 8.064),
];

/// Look up a catalog entry by instance type
pub fn find(instance_type: &str) -> Option<&'static InstanceCandidate> {
    CATALOG.iter().find(|c| c.instance_type == instance_type)
}

/// Largest entry (most vCPU, then most memory); last resort for oversized VMs
pub fn largest() -> &'static InstanceCandidate {
    CATALOG
        .iter()
        .max_by(|a, b| {
            a.vcpu.cmp(&b.vcpu).then(
                a.memory_gb
                    .partial_cmp(&b.memory_gb)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        })
        .unwrap_or(&CATALOG[0])
}
