use crate::config::ReportConfig;
use crate::error::{diagnostic_trace, AppError};
use crate::instances::InstanceClassTable;
use crate::mime::{self, Envelope, FAILURE_SUBJECT};
use crate::models::{DeliveryReceipt, Report, RunOutcome};
use crate::period::previous_month_range;
use crate::providers::cost_explorer::CostExplorerSource;
use crate::providers::s3::S3ArtifactStore;
use crate::providers::ses::SesTransport;
use crate::providers::{ArtifactStore, EmailTransport, UsageDataSource, UsageQuery};
use crate::report::build_report;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

const CSV_CONTENT_TYPE: &str = "text/csv";

pub struct ReportService {
    config: ReportConfig,
    table: InstanceClassTable,
    usage: Arc<dyn UsageDataSource>,
    store: Arc<dyn ArtifactStore>,
    mailer: Arc<dyn EmailTransport>,
}

impl ReportService {
    pub fn new(
        config: ReportConfig,
        usage: Arc<dyn UsageDataSource>,
        store: Arc<dyn ArtifactStore>,
        mailer: Arc<dyn EmailTransport>,
    ) -> Self {
        let table = InstanceClassTable::built_in().with_overrides(&config.vcpu_overrides);
        Self {
            config,
            table,
            usage,
            store,
            mailer,
        }
    }

    /// Wires the AWS clients from the ambient credential chain.
    pub async fn from_aws(config: ReportConfig) -> Self {
        let sdk = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let usage = CostExplorerSource::new(aws_sdk_costexplorer::Client::new(&sdk));
        let store = S3ArtifactStore::new(aws_sdk_s3::Client::new(&sdk), config.bucket.clone());
        let mailer = SesTransport::new(
            aws_sdk_sesv2::Client::new(&sdk),
            config.sender.clone(),
            config.recipients.clone(),
        );
        Self::new(config, Arc::new(usage), Arc::new(store), Arc::new(mailer))
    }

    fn envelope(&self, subject: String) -> Envelope<'_> {
        Envelope {
            from: &self.config.sender,
            to: &self.config.recipients,
            subject,
            date: Utc::now(),
        }
    }

    /// Stores the CSV (best effort), then emails it. Only the email can fail the call.
    pub async fn deliver(&self, report: &Report) -> Result<DeliveryReceipt, AppError> {
        let stored = match self
            .store
            .put(
                &report.file_name,
                report.csv_text.as_bytes().to_vec(),
                CSV_CONTENT_TYPE,
            )
            .await
        {
            Ok(()) => {
                info!(
                    file = %report.file_name,
                    bucket = %self.config.bucket,
                    "File uploaded to S3 successfully"
                );
                true
            }
            Err(e) => {
                let err = AppError::StorageWrite(e);
                error!(error = %err, "Continuing with email despite S3 upload failure");
                false
            }
        };

        let month = report.period.month_label();
        let envelope = self.envelope(self.config.subject_for(&month));
        let raw = mime::report_message(&envelope, report, &mime::boundary_for(envelope.date));

        info!(
            recipients = self.config.recipients.len(),
            "Sending email with attachment"
        );
        let message_id = self
            .mailer
            .send(raw.into_bytes())
            .await
            .map_err(AppError::EmailSend)?;
        info!(message_id = ?message_id, "Email sent successfully");

        Ok(DeliveryReceipt { stored, message_id })
    }

    /// Sends the plain-text failure notice. Never fails; problems are only logged.
    pub async fn notify_failure(&self, err: &AppError) {
        let envelope = self.envelope(FAILURE_SUBJECT.to_string());
        let raw = mime::failure_message(&envelope, &err.to_string(), &diagnostic_trace(err));
        match self.mailer.send(raw.into_bytes()).await {
            Ok(_) => info!("Error notification sent successfully"),
            Err(e) => {
                let err = AppError::Notification(e);
                error!(error = %err, "Failed to send error notification email");
            }
        }
    }

    async fn generate_and_deliver(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(Report, DeliveryReceipt), AppError> {
        let period = previous_month_range(now.date_naive());
        info!(period = %period.as_label(), "Report period computed");

        let query = UsageQuery::monthly(&self.config.service, &self.config.region, period);
        let report = build_report(period, &query, self.usage.as_ref(), &self.table).await?;
        let receipt = self.deliver(&report).await?;
        Ok((report, receipt))
    }

    /// One full pass for the month before `now`. Fatal errors trigger a notification
    /// and become an error outcome.
    pub async fn run(&self, now: DateTime<Utc>) -> RunOutcome {
        match self.generate_and_deliver(now).await {
            Ok((report, receipt)) => {
                // A failed upload still counts as success; only the email is required.
                info!(
                    file = %report.file_name,
                    rows = report.rows.len(),
                    skipped = report.skipped,
                    stored = receipt.stored,
                    message_id = ?receipt.message_id,
                    "EC2 usage report completed successfully"
                );
                RunOutcome::Success {
                    file: report.file_name,
                    record_count: report.rows.len(),
                    report_period: report.period.as_label(),
                }
            }
            Err(err) => {
                error!(error = %err, trace = %diagnostic_trace(&err), "Fatal error in handler");
                self.notify_failure(&err).await;
                RunOutcome::Error {
                    error: err.to_string(),
                    timestamp: Utc::now(),
                }
            }
        }
    }
}

/// Outcome for a run that failed before any collaborator existed.
pub fn preflight_failure(err: &AppError) -> RunOutcome {
    warn!(error = %err, "Skipping error notification, run aborted before setup");
    RunOutcome::Error {
        error: err.to_string(),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UsageGroup;
    use crate::providers::ClientError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeUsage {
        groups: Vec<UsageGroup>,
        fail: bool,
        queries: Mutex<Vec<UsageQuery>>,
    }

    #[async_trait]
    impl UsageDataSource for FakeUsage {
        async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageGroup>, ClientError> {
            self.queries.lock().expect("lock").push(query.clone());
            if self.fail {
                return Err(ClientError::new("ExpiredTokenException: token expired"));
            }
            Ok(self.groups.clone())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        fail: bool,
        puts: Mutex<Vec<(String, Vec<u8>, String)>>,
    }

    #[async_trait]
    impl ArtifactStore for FakeStore {
        async fn put(
            &self,
            key: &str,
            content: Vec<u8>,
            content_type: &str,
        ) -> Result<(), ClientError> {
            self.puts
                .lock()
                .expect("lock")
                .push((key.to_string(), content, content_type.to_string()));
            if self.fail {
                return Err(ClientError::new("AccessDenied"));
            }
            Ok(())
        }
    }

    /// Fails the first `fail_first` sends.
    #[derive(Default)]
    struct FakeMailer {
        fail_first: usize,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmailTransport for FakeMailer {
        async fn send(&self, raw_message: Vec<u8>) -> Result<Option<String>, ClientError> {
            let mut sent = self.sent.lock().expect("lock");
            sent.push(String::from_utf8(raw_message).expect("utf8 message"));
            if sent.len() <= self.fail_first {
                return Err(ClientError::new("Throttling: maximum sending rate exceeded"));
            }
            Ok(Some(format!("msg-{}", sent.len())))
        }
    }

    fn config() -> ReportConfig {
        ReportConfig {
            bucket: "usage-reports".into(),
            sender: "reports@example.com".into(),
            recipients: vec!["ops@example.com".into()],
            region: "ap-south-1".into(),
            service: "Amazon Elastic Compute Cloud - Compute".into(),
            subject_template: "EC2 Usage Report for {month}".into(),
            vcpu_overrides: HashMap::new(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    fn service(
        usage: &Arc<FakeUsage>,
        store: &Arc<FakeStore>,
        mailer: &Arc<FakeMailer>,
    ) -> ReportService {
        ReportService::new(config(), usage.clone(), store.clone(), mailer.clone())
    }

    fn sample_usage() -> Arc<FakeUsage> {
        Arc::new(FakeUsage {
            groups: vec![
                UsageGroup::new("APS3-BoxUsage:c5.xlarge", "40"),
                UsageGroup::new("APS3-DataTransfer-Out-Bytes", "5"),
            ],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn successful_run_stores_and_emails_previous_month() {
        let usage = sample_usage();
        let store = Arc::new(FakeStore::default());
        let mailer = Arc::new(FakeMailer::default());

        let outcome = service(&usage, &store, &mailer).run(now()).await;
        assert_eq!(
            outcome,
            RunOutcome::Success {
                file: "ec2_usage_2024-02.csv".into(),
                record_count: 2,
                report_period: "2024-02-01 to 2024-02-29".into(),
            }
        );

        let queries = usage.queries.lock().expect("lock");
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].region, "ap-south-1");
        assert_eq!(queries[0].group_by, "USAGE_TYPE");
        assert_eq!(queries[0].metric, "UsageQuantity");
        assert_eq!(queries[0].period.end.to_string(), "2024-02-29");

        let puts = store.puts.lock().expect("lock");
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, "ec2_usage_2024-02.csv");
        assert_eq!(puts[0].2, "text/csv");
        assert!(String::from_utf8_lossy(&puts[0].1)
            .starts_with("UsageType,ReportedHours,ClockHours\n"));

        let sent = mailer.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Subject: EC2 Usage Report for 2024-02\r\n"));
        assert!(sent[0].contains("Total Usage Types: 2\r\n"));
    }

    #[tokio::test]
    async fn storage_failure_does_not_block_email_or_change_status() {
        let usage = sample_usage();
        let store = Arc::new(FakeStore {
            fail: true,
            ..Default::default()
        });
        let mailer = Arc::new(FakeMailer::default());

        let outcome = service(&usage, &store, &mailer).run(now()).await;
        assert!(outcome.is_success());
        assert_eq!(store.puts.lock().expect("lock").len(), 1);
        assert_eq!(mailer.sent.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn deliver_reports_storage_result_and_message_id() {
        let usage = sample_usage();
        let store = Arc::new(FakeStore {
            fail: true,
            ..Default::default()
        });
        let mailer = Arc::new(FakeMailer::default());
        let svc = service(&usage, &store, &mailer);

        let period = previous_month_range(now().date_naive());
        let query = UsageQuery::monthly("svc", "ap-south-1", period);
        let report = build_report(period, &query, usage.as_ref(), &svc.table)
            .await
            .expect("report");
        let receipt = svc.deliver(&report).await.expect("delivered");
        assert_eq!(
            receipt,
            DeliveryReceipt {
                stored: false,
                message_id: Some("msg-1".into()),
            }
        );
    }

    #[tokio::test]
    async fn email_failure_yields_error_and_one_notification() {
        let usage = sample_usage();
        let store = Arc::new(FakeStore::default());
        let mailer = Arc::new(FakeMailer {
            fail_first: 1,
            ..Default::default()
        });

        let outcome = service(&usage, &store, &mailer).run(now()).await;
        let RunOutcome::Error { error, .. } = outcome else {
            panic!("expected error outcome");
        };
        assert!(error.starts_with("failed to send email:"));
        assert!(error.contains("maximum sending rate exceeded"));

        let sent = mailer.sent.lock().expect("lock");
        assert_eq!(sent.len(), 2);
        assert!(sent[1].contains("Subject: EC2 Usage Report - Error Notification\r\n"));
        assert!(sent[1].contains("Error: failed to send email: Throttling"));
    }

    #[tokio::test]
    async fn upstream_failure_skips_delivery_and_notifies() {
        let usage = Arc::new(FakeUsage {
            fail: true,
            ..Default::default()
        });
        let store = Arc::new(FakeStore::default());
        let mailer = Arc::new(FakeMailer::default());

        let outcome = service(&usage, &store, &mailer).run(now()).await;
        let RunOutcome::Error { error, .. } = outcome else {
            panic!("expected error outcome");
        };
        assert!(error.contains("ExpiredTokenException"));
        assert!(store.puts.lock().expect("lock").is_empty());

        let sent = mailer.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("caused by: ExpiredTokenException: token expired"));
    }

    #[tokio::test]
    async fn notification_failure_is_swallowed() {
        let usage = Arc::new(FakeUsage {
            fail: true,
            ..Default::default()
        });
        let store = Arc::new(FakeStore::default());
        let mailer = Arc::new(FakeMailer {
            fail_first: usize::MAX,
            ..Default::default()
        });

        let outcome = service(&usage, &store, &mailer).run(now()).await;
        assert!(!outcome.is_success());
        assert_eq!(mailer.sent.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn vcpu_overrides_flow_into_normalization() {
        let usage = Arc::new(FakeUsage {
            groups: vec![UsageGroup::new("BoxUsage:m5.large", "10")],
            ..Default::default()
        });
        let store = Arc::new(FakeStore::default());
        let mailer = Arc::new(FakeMailer::default());
        let mut cfg = config();
        cfg.vcpu_overrides.insert("m5.large".into(), 2);
        let svc = ReportService::new(cfg, usage.clone(), store.clone(), mailer.clone());

        assert!(svc.run(now()).await.is_success());
        let puts = store.puts.lock().expect("lock");
        assert!(String::from_utf8_lossy(&puts[0].1).contains("BoxUsage:m5.large,10.00,5.00"));
    }

    #[test]
    fn preflight_failure_is_an_error_outcome() {
        let outcome = preflight_failure(&AppError::Configuration("missing".into()));
        assert!(!outcome.is_success());
    }
}
