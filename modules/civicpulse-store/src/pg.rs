//! Postgres persistence.
//!
//! Status changes lock the report row (`SELECT ... FOR UPDATE`) and run the
//! same lifecycle rules as the in-memory store. Upvotes insert the marker with
//! `ON CONFLICT DO NOTHING` and bump the counter in the same transaction.
//! Every mutation bumps `version`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use civicpulse_common::{DomainError, GeoPoint, Report, ReportStatus, Role, User};

use crate::error::StoreError;
use crate::geo_index::{covering_cells, geohash_key, INDEX_PRECISION};
use crate::heatmap::{cells_from_counts, clamp_precision, HeatmapCell};
use crate::lifecycle;
use crate::proximity::{rank_nearby, NearbyQuery, NearbyReport};
use crate::query::{Page, PageRequest, ReportFilter};
use crate::repository::{ReportRepository, UserRepository};
use crate::upvote::check_user;
use crate::validate::StatusPatch;

const REPORT_COLUMNS: &str = "id, reporter_id, title, category, urgency, assigned_department, \
     original_text, image_url, video_url, voice_note_url, lng, lat, status, notes, \
     progress_image_url, resolved_image_url, upvotes, created_at, updated_at, resolved_at";

/// Connect, then run the embedded migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    migrate(&pool).await?;
    info!("Connected to Postgres");
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))
}

// --- Rows ---

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    reporter_id: String,
    title: String,
    category: String,
    urgency: String,
    assigned_department: String,
    original_text: Option<String>,
    image_url: Option<String>,
    video_url: Option<String>,
    voice_note_url: Option<String>,
    lng: f64,
    lat: f64,
    status: String,
    notes: Option<String>,
    progress_image_url: Option<String>,
    resolved_image_url: Option<String>,
    upvotes: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReportRow> for Report {
    type Error = StoreError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |e: DomainError| StoreError::Database(format!("report {id}: {e}"));
        let location = GeoPoint::new(row.lng, row.lat).map_err(corrupt)?;
        let status: ReportStatus = row.status.parse().map_err(corrupt)?;

        Ok(Report {
            id: row.id,
            reporter_id: row.reporter_id,
            title: row.title,
            category: row.category,
            urgency: row.urgency,
            assigned_department: row.assigned_department,
            original_text: row.original_text,
            image_url: row.image_url,
            video_url: row.video_url,
            voice_note_url: row.voice_note_url,
            location,
            status,
            notes: row.notes,
            progress_image_url: row.progress_image_url,
            resolved_image_url: row.resolved_image_url,
            upvotes: row.upvotes.max(0) as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
        })
    }
}

fn into_reports(rows: Vec<ReportRow>) -> Result<Vec<Report>, StoreError> {
    rows.into_iter().map(Report::try_from).collect()
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e: DomainError| StoreError::Database(format!("user {}: {e}", row.id)))?;
        Ok(User {
            id: row.id,
            email: row.email,
            role,
            created_at: row.created_at,
        })
    }
}

fn conflict_on_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what()),
        _ => err.into(),
    }
}

/// Appends `WHERE` clauses for every facet set on `filter`.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ReportFilter) {
    qb.push(" WHERE TRUE");
    if let Some(department) = &filter.department {
        qb.push(" AND assigned_department = ").push_bind(department.clone());
    }
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some((start, end)) = filter.created_between {
        qb.push(" AND created_at >= ").push_bind(start);
        qb.push(" AND created_at <= ").push_bind(end);
    }
}

/// Appends a disjunction of geohash prefix ranges, one per cell. Pattern-ops
/// comparisons let the planner serve each range from `idx_reports_geohash`.
fn push_cell_ranges(qb: &mut QueryBuilder<'_, Postgres>, cells: &[String]) {
    qb.push("(FALSE");
    for cell in cells {
        qb.push(" OR (geohash ~>=~ ")
            .push_bind(cell.clone())
            .push(" AND geohash ~<~ ")
            .push_bind(prefix_upper_bound(cell))
            .push(")");
    }
    qb.push(")");
}

/// Smallest string above every geohash that starts with `prefix`.
fn prefix_upper_bound(prefix: &str) -> String {
    // '~' sorts after every character of the geohash alphabet.
    format!("{prefix}~")
}

/// Postgres has no unsigned integers; saturate instead of wrapping negative.
fn sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// --- Reports ---

pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_report(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Report, StoreError> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::report_not_found(id))?;
        row.try_into()
    }
}

#[async_trait]
impl ReportRepository for PgReportStore {
    async fn insert(&self, report: Report) -> Result<Report, StoreError> {
        let geohash = geohash_key(&report.location, INDEX_PRECISION)?;

        sqlx::query(
            r#"
            INSERT INTO reports
                (id, reporter_id, title, category, urgency, assigned_department,
                 original_text, image_url, video_url, voice_note_url,
                 lng, lat, geohash, status, notes, progress_image_url, resolved_image_url,
                 upvotes, created_at, updated_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(report.id)
        .bind(&report.reporter_id)
        .bind(&report.title)
        .bind(&report.category)
        .bind(&report.urgency)
        .bind(&report.assigned_department)
        .bind(&report.original_text)
        .bind(&report.image_url)
        .bind(&report.video_url)
        .bind(&report.voice_note_url)
        .bind(report.location.lng())
        .bind(report.location.lat())
        .bind(&geohash)
        .bind(report.status.as_str())
        .bind(&report.notes)
        .bind(&report.progress_image_url)
        .bind(&report.resolved_image_url)
        .bind(i64::try_from(report.upvotes).unwrap_or(i64::MAX))
        .bind(report.created_at)
        .bind(report.updated_at)
        .bind(report.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("report {} already exists", report.id)))?;

        Ok(report)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Report>, StoreError> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Report::try_from).transpose()
    }

    async fn apply_status(
        &self,
        id: Uuid,
        patch: &StatusPatch,
        now: DateTime<Utc>,
    ) -> Result<Report, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut report = Self::lock_report(&mut tx, id).await?;

        if !lifecycle::apply(&mut report, patch, now)? {
            tx.commit().await?;
            return Ok(report);
        }

        sqlx::query(
            r#"
            UPDATE reports
            SET status = $2,
                notes = $3,
                progress_image_url = $4,
                resolved_image_url = $5,
                updated_at = $6,
                resolved_at = $7,
                version = version + 1
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(report.status.as_str())
        .bind(&report.notes)
        .bind(&report.progress_image_url)
        .bind(&report.resolved_image_url)
        .bind(report.updated_at)
        .bind(report.resolved_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(report)
    }

    async fn upvote(&self, id: Uuid, user_id: &str, now: DateTime<Utc>) -> Result<Report, StoreError> {
        check_user(user_id)?;
        let mut tx = self.pool.begin().await?;
        let report = Self::lock_report(&mut tx, id).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO report_upvotes (report_id, user_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (report_id, user_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Err(StoreError::AlreadyUpvoted {
                report_id: report.id,
                user_id: user_id.to_string(),
            });
        }

        let row = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            UPDATE reports
            SET upvotes = upvotes + 1,
                updated_at = GREATEST(updated_at, created_at, $2),
                version = version + 1
            WHERE id = $1
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn list(&self, filter: &ReportFilter, page: PageRequest) -> Result<Page<Report>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM reports");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {REPORT_COLUMNS} FROM reports"));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id ASC LIMIT ")
            .push_bind(sql_int(page.page_size()))
            .push(" OFFSET ")
            .push_bind(sql_int(page.offset()));
        let rows: Vec<ReportRow> = select.build_query_as().fetch_all(&mut *tx).await?;

        tx.commit().await?;
        Ok(Page {
            items: into_reports(rows)?,
            total_count: total.max(0) as usize,
            page: page.page(),
            page_size: page.page_size(),
        })
    }

    async fn matching(&self, filter: &ReportFilter) -> Result<Vec<Report>, StoreError> {
        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {REPORT_COLUMNS} FROM reports"));
        push_filter(&mut select, filter);
        let rows: Vec<ReportRow> = select.build_query_as().fetch_all(&self.pool).await?;
        into_reports(rows)
    }

    async fn by_reporter(&self, reporter_id: &str) -> Result<Vec<Report>, StoreError> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE reporter_id = $1 ORDER BY created_at DESC, id ASC"
        ))
        .bind(reporter_id)
        .fetch_all(&self.pool)
        .await?;
        into_reports(rows)
    }

    async fn nearby(&self, query: &NearbyQuery) -> Result<Vec<NearbyReport>, StoreError> {
        let bbox = query.bounding_box();
        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {REPORT_COLUMNS} FROM reports WHERE "));
        push_cell_ranges(&mut select, &covering_cells(&bbox));
        select
            .push(" AND lat BETWEEN ")
            .push_bind(bbox.min_lat)
            .push(" AND ")
            .push_bind(bbox.max_lat)
            .push(" AND (FALSE");
        for (lo, hi) in bbox.lng_ranges() {
            select
                .push(" OR lng BETWEEN ")
                .push_bind(lo)
                .push(" AND ")
                .push_bind(hi);
        }
        select.push(")");

        let rows: Vec<ReportRow> = select.build_query_as().fetch_all(&self.pool).await?;
        Ok(rank_nearby(into_reports(rows)?, query))
    }

    async fn heatmap(
        &self,
        filter: &ReportFilter,
        precision: usize,
    ) -> Result<Vec<HeatmapCell>, StoreError> {
        let precision = clamp_precision(precision) as i32;
        let mut select = QueryBuilder::<Postgres>::new("SELECT substr(geohash, 1, ");
        select
            .push_bind(precision)
            .push(") AS cell, COUNT(*) AS count FROM reports");
        push_filter(&mut select, filter);
        select.push(" GROUP BY cell");

        let rows: Vec<(String, i64)> = select.build_query_as().fetch_all(&self.pool).await?;
        let counts: BTreeMap<String, u64> = rows
            .into_iter()
            .map(|(cell, count)| (cell, count.max(0) as u64))
            .collect();
        Ok(cells_from_counts(counts))
    }
}

// --- Users ---

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserStore {
    async fn upsert(
        &self,
        id: &str,
        email: &str,
        role: Option<Role>,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email, role, created_at)
            VALUES ($1, $2, COALESCE($3, 'citizen'), $4)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                role = COALESCE($3, users.role)
            RETURNING id, email, role, created_at
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(role.map(|r| r.as_str()))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("email {email} belongs to another user")))?;
        row.try_into()
    }

    async fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, role, created_at FROM users ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(User::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civicpulse_common::BoundingBox;

    #[test]
    fn nearby_prefilter_is_a_geohash_range_per_cell() {
        let center = GeoPoint::new(78.4013, 17.4458).unwrap();
        let cells = covering_cells(&BoundingBox::around(&center, 1_000.0));
        assert!(!cells.is_empty());

        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM reports WHERE ");
        push_cell_ranges(&mut qb, &cells);
        let sql = qb.sql();
        assert!(sql.contains("(geohash ~>=~ $1 AND geohash ~<~ $2)"));
        assert_eq!(sql.matches("geohash ~>=~").count(), cells.len());
        assert!(!sql.contains("lat BETWEEN"));
    }

    #[test]
    fn prefix_upper_bound_brackets_the_cell() {
        let upper = prefix_upper_bound("tepf");
        assert!("tepf".to_string() < upper);
        assert!("tepfzzzzz".to_string() < upper);
        assert!("tepg0".to_string() > upper);
    }

    #[test]
    fn oversized_offsets_saturate() {
        assert_eq!(sql_int(40), 40);
        assert_eq!(sql_int(usize::MAX), i64::MAX);
        let far = PageRequest::new(i64::MAX, 50).unwrap();
        assert_eq!(sql_int(far.offset()), i64::MAX);
    }
}
