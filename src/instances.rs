use std::collections::HashMap;
use tracing::warn;

const DEFAULT_VCPUS: u32 = 1;

const BUILT_IN_VCPUS: &[(&str, u32)] = &[
    ("t2.micro", 1),
    ("t2.small", 1),
    ("t2.medium", 2),
    ("t2.large", 2),
    ("c5.large", 2),
    ("c5.xlarge", 4),
    ("c5.2xlarge", 8),
    ("c5.4xlarge", 16),
    ("c5.9xlarge", 36),
    ("c5.18xlarge", 72),
    ("g4dn.xlarge", 4),
    ("g4dn.2xlarge", 8),
    ("g4dn.4xlarge", 16),
    ("g5.xlarge", 4),
    ("g5.2xlarge", 8),
    ("g5.4xlarge", 16),
];

/// Instance type to vCPU count. Every stored count is at least 1.
#[derive(Debug, Clone)]
pub struct InstanceClassTable {
    vcpus: HashMap<String, u32>,
}

/// Result of a lookup that may have fallen back to the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcpuCount {
    Known(u32),
    Defaulted,
}

impl VcpuCount {
    pub fn get(self) -> u32 {
        match self {
            VcpuCount::Known(n) => n,
            VcpuCount::Defaulted => DEFAULT_VCPUS,
        }
    }
}

impl InstanceClassTable {
    pub fn built_in() -> Self {
        Self {
            vcpus: BUILT_IN_VCPUS
                .iter()
                .map(|(name, n)| (name.to_string(), *n))
                .collect(),
        }
    }

    pub fn with_overrides(mut self, overrides: &HashMap<String, u32>) -> Self {
        for (instance_type, vcpus) in overrides {
            if *vcpus == 0 {
                warn!(instance_type = %instance_type, "Ignoring vCPU override of 0");
                continue;
            }
            self.vcpus.insert(instance_type.trim().to_string(), *vcpus);
        }
        self
    }

    pub fn lookup(&self, instance_type: &str) -> VcpuCount {
        self.vcpus
            .get(instance_type)
            .copied()
            .map_or(VcpuCount::Defaulted, VcpuCount::Known)
    }
}
