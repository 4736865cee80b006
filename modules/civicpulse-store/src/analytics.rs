use serde::Serialize;

use civicpulse_common::{Report, ReportStatus};

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub total_reports: u64,
    pub submitted: u64,
    pub in_progress: u64,
    pub resolved: u64,
    /// Resolved share of all reports, 0.0 when there are none.
    pub resolution_rate: f64,
    /// Mean hours from creation to first resolution over resolved reports.
    pub avg_resolution_hours: Option<f64>,
    /// Open reports marked High or Critical.
    pub high_priority: u64,
}

pub fn is_high_priority(urgency: &str) -> bool {
    urgency.eq_ignore_ascii_case("high") || urgency.eq_ignore_ascii_case("critical")
}

pub fn compute<'a, I>(reports: I) -> Kpis
where
    I: IntoIterator<Item = &'a Report>,
{
    let mut kpis = Kpis {
        total_reports: 0,
        submitted: 0,
        in_progress: 0,
        resolved: 0,
        resolution_rate: 0.0,
        avg_resolution_hours: None,
        high_priority: 0,
    };
    let mut resolution_secs = 0i64;

    for report in reports {
        kpis.total_reports += 1;
        match report.status {
            ReportStatus::Submitted => kpis.submitted += 1,
            ReportStatus::InProgress => kpis.in_progress += 1,
            ReportStatus::Resolved => {
                kpis.resolved += 1;
                let resolved_at = report.resolved_at.unwrap_or(report.updated_at);
                resolution_secs += (resolved_at - report.created_at).num_seconds();
            }
        }
        if report.status != ReportStatus::Resolved && is_high_priority(&report.urgency) {
            kpis.high_priority += 1;
        }
    }

    if kpis.total_reports > 0 {
        kpis.resolution_rate = kpis.resolved as f64 / kpis.total_reports as f64;
    }
    if kpis.resolved > 0 {
        kpis.avg_resolution_hours = Some(resolution_secs as f64 / 3600.0 / kpis.resolved as f64);
    }
    kpis
}
