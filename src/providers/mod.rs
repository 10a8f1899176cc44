use crate::models::{ReportPeriod, UsageGroup};
use async_trait::async_trait;
use thiserror::Error;

pub mod cost_explorer;
pub mod s3;
pub mod ses;

pub const USAGE_TYPE_DIMENSION: &str = "USAGE_TYPE";
pub const USAGE_QUANTITY_METRIC: &str = "UsageQuantity";

/// Failure reported by an external collaborator, with the upstream message kept intact.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
    message: String,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageQuery {
    pub service: String,
    pub region: String,
    pub group_by: &'static str,
    pub metric: &'static str,
    pub period: ReportPeriod,
}

impl UsageQuery {
    /// Monthly usage quantity for one service and region, grouped by usage type.
    pub fn monthly(service: &str, region: &str, period: ReportPeriod) -> Self {
        Self {
            service: service.to_string(),
            region: region.to_string(),
            group_by: USAGE_TYPE_DIMENSION,
            metric: USAGE_QUANTITY_METRIC,
            period,
        }
    }
}

#[async_trait]
pub trait UsageDataSource: Send + Sync {
    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageGroup>, ClientError>;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, content: Vec<u8>, content_type: &str)
        -> Result<(), ClientError>;
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Sends a complete raw MIME message and returns the transport's message id, if any.
    async fn send(&self, raw_message: Vec<u8>) -> Result<Option<String>, ClientError>;
}
