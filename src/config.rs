use crate::error::AppError;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_REGION: &str = "ap-south-1";
pub const DEFAULT_SERVICE: &str = "Amazon Elastic Compute Cloud - Compute";
pub const DEFAULT_SUBJECT: &str = "EC2 Usage Report for {month}";

/// Settings as they arrive from the file and environment layers, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawSettings {
    bucket: Option<String>,
    ses_from: Option<String>,
    ses_to: Option<String>,
    report_region: Option<String>,
    report_service: Option<String>,
    email_subject: Option<String>,
    #[serde(default)]
    vcpu_overrides: HashMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub bucket: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub region: String,
    pub service: String,
    pub subject_template: String,
    pub vcpu_overrides: HashMap<String, u32>,
}

impl ReportConfig {
    pub fn subject_for(&self, month: &str) -> String {
        self.subject_template.replace("{month}", month)
    }
}

pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate(raw: RawSettings) -> Result<ReportConfig, AppError> {
    let bucket = non_blank(raw.bucket);
    let sender = non_blank(raw.ses_from);
    let recipients = raw
        .ses_to
        .as_deref()
        .map(parse_recipients)
        .unwrap_or_default();

    let mut missing = Vec::new();
    if bucket.is_none() {
        missing.push("BUCKET");
    }
    if sender.is_none() {
        missing.push("SES_FROM");
    }
    if recipients.is_empty() {
        missing.push("SES_TO");
    }

    match (bucket, sender) {
        (Some(bucket), Some(sender)) if missing.is_empty() => Ok(ReportConfig {
            bucket,
            sender,
            recipients,
            region: non_blank(raw.report_region).unwrap_or_else(|| DEFAULT_REGION.into()),
            service: non_blank(raw.report_service).unwrap_or_else(|| DEFAULT_SERVICE.into()),
            subject_template: non_blank(raw.email_subject)
                .unwrap_or_else(|| DEFAULT_SUBJECT.into()),
            vcpu_overrides: raw.vcpu_overrides,
        }),
        _ => Err(AppError::Configuration(format!(
            "Missing required environment variables: {}",
            missing.join(", ")
        ))),
    }
}

fn load_from(file: Option<&Path>, env: Environment) -> Result<ReportConfig, AppError> {
    let mut builder = Config::builder();
    if let Some(path) = file {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml));
    }
    let raw: RawSettings = builder
        .add_source(env)
        .build()
        .and_then(Config::try_deserialize)
        .map_err(|e| AppError::Configuration(e.to_string()))?;
    validate(raw)
}

/// Reads the optional TOML file, then the process environment on top of it.
pub fn load_config(file: Option<&Path>) -> Result<ReportConfig, AppError> {
    load_from(file, Environment::default())
}
