//! Raw MIME messages for the report email and the failure notification.

use crate::models::Report;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};

const CRLF: &str = "\r\n";
const BASE64_LINE_WIDTH: usize = 76;

pub const FAILURE_SUBJECT: &str = "EC2 Usage Report - Error Notification";

/// Sender, recipients and subject shared by both message kinds.
#[derive(Debug, Clone)]
pub struct Envelope<'a> {
    pub from: &'a str,
    pub to: &'a [String],
    pub subject: String,
    pub date: DateTime<Utc>,
}

impl Envelope<'_> {
    fn headers(&self) -> Vec<String> {
        vec![
            format!("From: {}", self.from),
            format!("To: {}", self.to.join(", ")),
            format!("Subject: {}", self.subject),
            format!("Date: {}", self.date.to_rfc2822()),
            "MIME-Version: 1.0".to_string(),
        ]
    }
}

pub fn boundary_for(now: DateTime<Utc>) -> String {
    format!("----=_Part_{}_{}", now.timestamp_millis(), std::process::id())
}

fn wrap_base64(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    encoded
        .as_bytes()
        .chunks(BASE64_LINE_WIDTH)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(CRLF)
}

/// multipart/mixed message: a short summary plus the CSV as a base64 attachment.
pub fn report_message(envelope: &Envelope<'_>, report: &Report, boundary: &str) -> String {
    let period = &report.period;
    let mut lines = envelope.headers();
    lines.extend([
        format!("Content-Type: multipart/mixed; boundary=\"{boundary}\""),
        String::new(),
        format!("--{boundary}"),
        "Content-Type: text/plain; charset=UTF-8".to_string(),
        String::new(),
        format!(
            "Please find attached the EC2 usage report for {}.",
            period.month_label()
        ),
        String::new(),
        format!("Report Period: {}", period.as_label()),
        format!("Total Usage Types: {}", report.rows.len()),
        String::new(),
        format!("--{boundary}"),
        format!("Content-Type: text/csv; name=\"{}\"", report.file_name),
        format!(
            "Content-Disposition: attachment; filename=\"{}\"",
            report.file_name
        ),
        "Content-Transfer-Encoding: base64".to_string(),
        String::new(),
        wrap_base64(report.csv_text.as_bytes()),
        String::new(),
        format!("--{boundary}--"),
    ]);
    lines.join(CRLF)
}

/// Single text/plain part describing a failed run.
pub fn failure_message(envelope: &Envelope<'_>, error: &str, trace: &str) -> String {
    let mut lines = envelope.headers();
    lines.extend([
        "Content-Type: text/plain; charset=UTF-8".to_string(),
        String::new(),
        "An error occurred while generating the EC2 usage report:".to_string(),
        String::new(),
        format!("Error: {error}"),
        format!("Timestamp: {}", envelope.date.to_rfc3339()),
        String::new(),
        "Please check the logs for more details.".to_string(),
        String::new(),
        "Diagnostic trace:".to_string(),
    ]);
    lines.extend(trace.lines().map(ToString::to_string));
    lines.join(CRLF)
}
