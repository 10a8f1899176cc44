use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One group of the usage query result, keyed by usage type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageGroup {
    pub usage_type: Option<String>,
    pub raw_quantity: Option<String>,
}

#[cfg(test)]
impl UsageGroup {
    pub fn new(usage_type: impl Into<String>, raw_quantity: impl Into<String>) -> Self {
        Self {
            usage_type: Some(usage_type.into()),
            raw_quantity: Some(raw_quantity.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub usage_type: String,
    pub reported_hours: f64,
    pub clock_hours: f64,
}

impl NormalizedRecord {
    pub fn reported_hours_label(&self) -> String {
        format!("{:.2}", self.reported_hours)
    }

    pub fn clock_hours_label(&self) -> String {
        format!("{:.2}", self.clock_hours)
    }
}

/// Inclusive first and last day of a calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    /// `YYYY-MM` of the reported month.
    pub fn month_label(&self) -> String {
        self.end.format("%Y-%m").to_string()
    }

    pub fn file_name(&self) -> String {
        format!("ec2_usage_{}.csv", self.month_label())
    }

    /// Day after `end`, for APIs that take a half-open range.
    pub fn exclusive_end(&self) -> NaiveDate {
        self.end + Duration::days(1)
    }

    pub fn as_label(&self) -> String {
        format!("{} to {}", self.start, self.end)
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub file_name: String,
    pub period: ReportPeriod,
    pub rows: Vec<NormalizedRecord>,
    pub skipped: usize,
    pub csv_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub stored: bool,
    pub message_id: Option<String>,
}

/// Structured result of one invocation, printed as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Success {
        file: String,
        #[serde(rename = "recordCount")]
        record_count: usize,
        #[serde(rename = "reportPeriod")]
        report_period: String,
    },
    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }
}
