//! Administrative filtering and stable paging.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use civicpulse_common::{Report, ReportStatus};

use crate::error::StoreError;

/// Conjunction of optional facets. A `None` facet places no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    pub department: Option<String>,
    pub category: Option<String>,
    pub status: Option<ReportStatus>,
    /// Inclusive on both ends.
    pub created_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl ReportFilter {
    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn status(mut self, status: ReportStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.created_between = Some((start, end));
        self
    }

    /// Build a filter from raw query-string values. Empty strings are absent facets.
    pub fn from_params(
        department: Option<&str>,
        category: Option<&str>,
        status: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Self, StoreError> {
        let status = match present(status) {
            Some(raw) => Some(
                raw.parse::<ReportStatus>()
                    .map_err(|e| StoreError::InvalidArgument(e.to_string()))?,
            ),
            None => None,
        };

        let created_between = match (present(start_date), present(end_date)) {
            (None, None) => None,
            (Some(start), Some(end)) => {
                let start = parse_bound(start, false)?;
                let end = parse_bound(end, true)?;
                if start > end {
                    return Err(StoreError::InvalidArgument(
                        "startDate must not be after endDate".to_string(),
                    ));
                }
                Some((start, end))
            }
            _ => {
                return Err(StoreError::InvalidArgument(
                    "startDate and endDate must be supplied together".to_string(),
                ))
            }
        };

        Ok(Self {
            department: present(department).map(str::to_string),
            category: present(category).map(str::to_string),
            status,
            created_between,
        })
    }

    pub fn is_empty(&self) -> bool {
        self == &ReportFilter::default()
    }

    pub fn matches(&self, report: &Report) -> bool {
        if let Some(department) = &self.department {
            if &report.assigned_department != department {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &report.category != category {
                return false;
            }
        }
        if let Some(status) = self.status {
            if report.status != status {
                return false;
            }
        }
        if let Some((start, end)) = self.created_between {
            if report.created_at < start || report.created_at > end {
                return false;
            }
        }
        true
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Accept RFC 3339 timestamps or bare dates. A bare end date covers the whole day.
fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| StoreError::InvalidArgument(format!("{raw} is not a date")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };
    let time = time.ok_or_else(|| StoreError::InvalidArgument(format!("{raw} is not a date")))?;
    Ok(date.and_time(time).and_utc())
}

// --- Paging ---

/// A validated 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    page_size: usize,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: usize = 20;

    pub fn new(page: i64, page_size: i64) -> Result<Self, StoreError> {
        if page < 1 {
            return Err(StoreError::InvalidArgument(format!(
                "page must be at least 1, got {page}"
            )));
        }
        if page_size < 1 {
            return Err(StoreError::InvalidArgument(format!(
                "page_size must be at least 1, got {page_size}"
            )));
        }
        Ok(Self {
            page: page as usize,
            page_size: page_size as usize,
        })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(rename = "totalCount")]
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Newest first; equal timestamps ordered by id ascending.
pub fn newest_first(a: &Report, b: &Report) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Sort matched reports and cut out the requested page.
pub fn paginate(mut matched: Vec<Report>, request: PageRequest) -> Page<Report> {
    matched.sort_by(newest_first);
    let total_count = matched.len();
    let items = matched
        .into_iter()
        .skip(request.offset())
        .take(request.page_size())
        .collect();
    Page {
        items,
        total_count,
        page: request.page(),
        page_size: request.page_size(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{validate_report_create, LocationInput, NewReport};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn report(department: &str, created_at: DateTime<Utc>) -> Report {
        let input = NewReport {
            title: Some("Issue".into()),
            category: Some("Other".into()),
            urgency: Some("Low".into()),
            assigned_department: Some(department.into()),
            location: Some(LocationInput::LatLon { lat: 17.4, lon: 78.4 }),
            ..Default::default()
        };
        validate_report_create(input, "citizen", Uuid::new_v4(), created_at).unwrap()
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn rejects_non_positive_paging() {
        assert!(PageRequest::new(0, 10).is_err());
        assert!(PageRequest::new(1, 0).is_err());
        assert!(PageRequest::new(-3, 10).is_err());
        assert_eq!(PageRequest::new(3, 10).unwrap().offset(), 20);
    }

    #[test]
    fn five_items_in_pages_of_two() {
        let reports: Vec<Report> = (0..5)
            .map(|i| report("Sanitation", base() + Duration::minutes(i)))
            .collect();

        let sizes: Vec<usize> = (1..=3)
            .map(|p| paginate(reports.clone(), PageRequest::new(p, 2).unwrap()))
            .inspect(|page| assert_eq!(page.total_count, 5))
            .map(|page| page.items.len())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        let past_end = paginate(reports, PageRequest::new(10, 2).unwrap());
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total_count, 5);
    }

    #[test]
    fn newest_first_with_id_tiebreak() {
        let mut same_time: Vec<Report> = (0..3).map(|_| report("General", base())).collect();
        let newest = report("General", base() + Duration::hours(1));
        same_time.push(newest.clone());

        let page = paginate(same_time.clone(), PageRequest::default());
        assert_eq!(page.items[0].id, newest.id);

        let mut tied: Vec<Uuid> = same_time[..3].iter().map(|r| r.id).collect();
        tied.sort();
        let listed: Vec<Uuid> = page.items[1..].iter().map(|r| r.id).collect();
        assert_eq!(listed, tied);
    }

    #[test]
    fn facets_are_conjunctive_and_absent_means_any() {
        let r = report("Electrical", base());
        assert!(ReportFilter::default().matches(&r));
        assert!(ReportFilter::default().department("Electrical").matches(&r));
        assert!(!ReportFilter::default()
            .department("Electrical")
            .status(ReportStatus::Resolved)
            .matches(&r));
        assert!(!ReportFilter::default().category("Pothole").matches(&r));
    }

    #[test]
    fn created_range_is_inclusive() {
        let r = report("Electrical", base());
        assert!(ReportFilter::default()
            .created_between(base(), base())
            .matches(&r));
        assert!(!ReportFilter::default()
            .created_between(base() + Duration::seconds(1), base() + Duration::days(1))
            .matches(&r));
    }

    #[test]
    fn params_parse_dates_and_require_both_bounds() {
        let filter = ReportFilter::from_params(
            Some(""),
            None,
            Some("In Progress"),
            Some("2025-03-01"),
            Some("2025-03-01"),
        )
        .unwrap();
        assert_eq!(filter.department, None);
        assert_eq!(filter.status, Some(ReportStatus::InProgress));
        let (start, end) = filter.created_between.unwrap();
        assert!(start <= base() && base() <= end);

        assert!(ReportFilter::from_params(None, None, None, Some("2025-03-01"), None).is_err());
        assert!(ReportFilter::from_params(None, None, Some("Closed"), None, None).is_err());
        assert!(ReportFilter::from_params(
            None,
            None,
            None,
            Some("2025-03-02"),
            Some("2025-03-01")
        )
        .is_err());
    }
}
