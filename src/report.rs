use crate::error::AppError;
use crate::instances::InstanceClassTable;
use crate::models::{NormalizedRecord, Report, ReportPeriod};
use crate::normalize::{normalize, Normalized};
use crate::providers::{UsageDataSource, UsageQuery};
use tracing::{debug, info, warn};

pub const CSV_HEADER: [&str; 3] = ["UsageType", "ReportedHours", "ClockHours"];

/// Header row first, then one row per record with hours at two decimals.
pub fn render_csv(rows: &[NormalizedRecord]) -> Result<String, AppError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer
        .write_record(CSV_HEADER)
        .map_err(|e| AppError::CsvSerialization(e.to_string()))?;
    for row in rows {
        writer
            .write_record([
                row.usage_type.as_str(),
                row.reported_hours_label().as_str(),
                row.clock_hours_label().as_str(),
            ])
            .map_err(|e| AppError::CsvSerialization(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::CsvSerialization(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AppError::CsvSerialization(e.to_string()))
}

pub async fn build_report(
    period: ReportPeriod,
    query: &UsageQuery,
    source: &dyn UsageDataSource,
    table: &InstanceClassTable,
) -> Result<Report, AppError> {
    info!(
        start = %period.start,
        end = %period.end,
        service = %query.service,
        region = %query.region,
        "Fetching usage data"
    );
    let groups = source
        .query(query)
        .await
        .map_err(AppError::UpstreamQuery)?;

    if groups.is_empty() {
        warn!("No usage data found for the specified period");
    } else {
        info!(groups = groups.len(), "Found usage groups");
    }

    let mut rows = Vec::with_capacity(groups.len());
    let mut skipped = 0;
    let mut unknown_instances: Vec<String> = Vec::new();
    for group in &groups {
        match normalize(group, table) {
            Normalized::Accepted {
                record,
                unknown_instance,
            } => {
                if let Some(instance_type) = unknown_instance {
                    if !unknown_instances.contains(&instance_type) {
                        unknown_instances.push(instance_type);
                    }
                }
                rows.push(record);
            }
            Normalized::Skipped(reason) => {
                debug!(reason = %reason, "Usage group left out of report");
                skipped += 1;
            }
        }
    }
    if !unknown_instances.is_empty() {
        warn!(
            instance_types = %unknown_instances.join(", "),
            "Clock hours assume 1 vCPU for instance types missing from the table"
        );
    }
    info!(rows = rows.len(), skipped, "Processed usage records");

    let csv_text = render_csv(&rows)?;
    info!("CSV data generated successfully");

    Ok(Report {
        file_name: period.file_name(),
        period,
        rows,
        skipped,
        csv_text,
    })
}
