use crate::providers::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Configuration(String),

    #[error("failed to fetch Cost Explorer data: {0}")]
    UpstreamQuery(#[source] ClientError),

    #[error("failed to generate CSV: {0}")]
    CsvSerialization(String),

    #[error("failed to upload report to S3: {0}")]
    StorageWrite(#[source] ClientError),

    #[error("failed to send email: {0}")]
    EmailSend(#[source] ClientError),

    #[error("failed to send error notification: {0}")]
    Notification(#[source] ClientError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Renders an error and its `source()` chain, one level per line.
pub fn diagnostic_trace(err: &(dyn std::error::Error + 'static)) -> String {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    lines.join("\n")
}
