use crate::instances::{InstanceClassTable, VcpuCount};
use crate::models::{NormalizedRecord, UsageGroup};
use std::fmt;
use tracing::warn;

const BOX_USAGE_MARKER: &str = "BoxUsage:";

/// How a usage type is converted to clock hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageClass<'a> {
    /// On-demand instance hours, divided by the instance's vCPU count.
    BoxUsage { instance_type: &'a str },
    PassThrough,
}

impl<'a> UsageClass<'a> {
    pub fn classify(usage_type: &'a str) -> Self {
        if !usage_type.contains(BOX_USAGE_MARKER) {
            return UsageClass::PassThrough;
        }
        let instance_type = usage_type.split(':').nth(1).unwrap_or_default();
        UsageClass::BoxUsage { instance_type }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingUsageType,
    MissingQuantity,
    InvalidQuantity(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingUsageType => write!(f, "missing usage type"),
            SkipReason::MissingQuantity => write!(f, "missing usage quantity"),
            SkipReason::InvalidQuantity(raw) => write!(f, "invalid usage quantity '{raw}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Accepted {
        record: NormalizedRecord,
        /// Set when the instance type was not in the table and 1 vCPU was assumed.
        unknown_instance: Option<String>,
    },
    Skipped(SkipReason),
}

fn parse_hours(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn normalize(group: &UsageGroup, table: &InstanceClassTable) -> Normalized {
    let Some(usage_type) = group.usage_type.as_deref().filter(|s| !s.is_empty()) else {
        warn!(?group, "Skipping incomplete group");
        return Normalized::Skipped(SkipReason::MissingUsageType);
    };
    let Some(raw) = group.raw_quantity.as_deref() else {
        warn!(?group, "Skipping incomplete group");
        return Normalized::Skipped(SkipReason::MissingQuantity);
    };
    let Some(reported_hours) = parse_hours(raw) else {
        warn!(usage_type, raw_quantity = raw, "Invalid reported hours");
        return Normalized::Skipped(SkipReason::InvalidQuantity(raw.to_string()));
    };

    let (clock_hours, unknown_instance) = match UsageClass::classify(usage_type) {
        UsageClass::BoxUsage { instance_type } => {
            let vcpus = table.lookup(instance_type);
            let unknown = match vcpus {
                VcpuCount::Known(_) => None,
                VcpuCount::Defaulted => {
                    warn!(instance_type, "Unknown instance type, using 1 vCPU");
                    Some(instance_type.to_string())
                }
            };
            (reported_hours / f64::from(vcpus.get()), unknown)
        }
        UsageClass::PassThrough => (reported_hours, None),
    };

    Normalized::Accepted {
        record: NormalizedRecord {
            usage_type: usage_type.to_string(),
            reported_hours,
            clock_hours,
        },
        unknown_instance,
    }
}
