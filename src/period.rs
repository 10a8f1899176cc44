use crate::models::ReportPeriod;
use chrono::{Datelike, Duration, NaiveDate};

/// The full calendar month before the one containing `today`.
pub fn previous_month_range(today: NaiveDate) -> ReportPeriod {
    let first_of_current = today - Duration::days(i64::from(today.day0()));
    let end = first_of_current - Duration::days(1);
    let start = end - Duration::days(i64::from(end.day0()));
    ReportPeriod { start, end }
}
