//! Integration tests for the Postgres backend.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.
//!
//! Tests share one database, so each one scopes its reads to its own
//! department or reporter instead of truncating tables.

use std::sync::Arc;

use chrono::Utc;
use civicpulse_common::{ReportStatus, Role};
use civicpulse_store::pg::{migrate, PgReportStore, PgUserStore};
use civicpulse_store::validate::validate_report_create;
use civicpulse_store::{
    LocationInput, NearbyQuery, NewReport, PageRequest, ReportFilter, ReportRepository,
    StatusPatch, StoreError, UserRepository,
};
use futures::future::join_all;
use sqlx::PgPool;
use uuid::Uuid;

/// Get a migrated test pool, or skip if no test DB is available.
async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    migrate(&pool).await.ok()?;
    Some(pool)
}

fn report(reporter: &str, department: &str, lng: f64, lat: f64) -> civicpulse_common::Report {
    let input = NewReport {
        title: Some("Water main break".into()),
        category: Some("Water Leakage".into()),
        urgency: Some("Critical".into()),
        assigned_department: Some(department.into()),
        location: Some(LocationInput::LatLon { lat, lon: lng }),
        ..Default::default()
    };
    validate_report_create(input, reporter, Uuid::new_v4(), Utc::now()).unwrap()
}

fn scope() -> String {
    format!("dept-{}", Uuid::new_v4())
}

#[tokio::test]
async fn insert_then_get_round_trips() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PgReportStore::new(pool);
    let r = report("alice", &scope(), 78.40, 17.44);
    store.insert(r.clone()).await.unwrap();

    let fetched = store.get(r.id).await.unwrap().unwrap();
    assert_eq!(fetched.location, r.location);
    assert_eq!(fetched.status, ReportStatus::Submitted);
    assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());

    assert!(matches!(store.insert(r).await, Err(StoreError::Conflict(_))));
}

#[tokio::test]
async fn status_rules_hold_in_postgres() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PgReportStore::new(pool);
    let r = report("alice", &scope(), 78.40, 17.44);
    store.insert(r.clone()).await.unwrap();

    let resolved = store
        .apply_status(r.id, &StatusPatch::to(ReportStatus::Resolved).with_notes("fixed"), Utc::now())
        .await
        .unwrap();
    assert_eq!(resolved.notes.as_deref(), Some("fixed"));
    let resolved_at = resolved.resolved_at.expect("stamped on resolution");

    let upvoted = store
        .upvote(r.id, "bob", resolved_at + chrono::Duration::days(30))
        .await
        .unwrap();
    assert!(upvoted.updated_at > resolved_at);
    assert_eq!(upvoted.resolved_at, Some(resolved_at));

    let err = store
        .apply_status(r.id, &StatusPatch::to(ReportStatus::InProgress), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    let missing = store
        .apply_status(Uuid::new_v4(), &StatusPatch::to(ReportStatus::Resolved), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(missing, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn concurrent_upvotes_count_each_user_once() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = Arc::new(PgReportStore::new(pool));
    let r = report("alice", &scope(), 78.40, 17.44);
    store.insert(r.clone()).await.unwrap();

    let id = r.id;
    let mut tasks = Vec::new();
    for i in 0..10 {
        for _ in 0..2 {
            let store = store.clone();
            let user = format!("voter_{i}");
            tasks.push(tokio::spawn(async move { store.upvote(id, &user, Utc::now()).await }));
        }
    }
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 10);
    assert_eq!(store.get(r.id).await.unwrap().unwrap().upvotes, 10);
}

#[tokio::test]
async fn list_filters_and_pages() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PgReportStore::new(pool);
    let department = scope();
    for i in 0..5 {
        store
            .insert(report("alice", &department, 78.40 + i as f64 * 0.001, 17.44))
            .await
            .unwrap();
    }

    let filter = ReportFilter::default().department(department.as_str());
    let page = store.list(&filter, PageRequest::new(3, 2).unwrap()).await.unwrap();
    assert_eq!(page.total_count, 5);
    assert_eq!(page.items.len(), 1);

    let past_end = store.list(&filter, PageRequest::new(9, 2).unwrap()).await.unwrap();
    assert!(past_end.items.is_empty());
    assert_eq!(past_end.total_count, 5);

    let far_past_end = store
        .list(&filter, PageRequest::new(i64::MAX, 50).unwrap())
        .await
        .unwrap();
    assert!(far_past_end.items.is_empty());
    assert_eq!(far_past_end.total_count, 5);

    let heat = store.heatmap(&filter, 5).await.unwrap();
    assert_eq!(heat.iter().map(|c| c.count).sum::<u64>(), 5);
}

#[tokio::test]
async fn nearby_matches_by_true_distance() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PgReportStore::new(pool);
    let department = scope();
    // A remote spot so rows from other tests never fall inside the radius.
    let a = report("alice", &department, -140.0, -60.0);
    let b = report("alice", &department, -140.0030, -60.0010);
    store.insert(a.clone()).await.unwrap();
    store.insert(b.clone()).await.unwrap();

    let query = NearbyQuery::new(Some(-60.0), Some(-140.0), 1_000.0, None).unwrap();
    let hits = store.nearby(&query).await.unwrap();
    let ids: Vec<Uuid> = hits.iter().map(|h| h.report.id).collect();
    assert!(ids.contains(&a.id) && ids.contains(&b.id));
    assert_eq!(ids[0], a.id);
}

#[tokio::test]
async fn nearby_spans_geohash_cells_at_the_antimeridian() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PgReportStore::new(pool);
    let department = scope();
    let west = report("alice", &department, -179.9990, -45.0);
    let east = report("alice", &department, 179.9990, -45.0);
    let outside = report("alice", &department, 179.9000, -45.0);
    for r in [&west, &east, &outside] {
        store.insert(r.clone()).await.unwrap();
    }

    let query = NearbyQuery::new(Some(-45.0), Some(180.0), 1_000.0, None).unwrap();
    let mut ids: Vec<Uuid> = store
        .nearby(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.report.id)
        .collect();
    ids.sort();
    let mut expected = vec![west.id, east.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn user_upsert_keeps_role_and_created_at() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let users = PgUserStore::new(pool);
    let id = format!("user_{}", Uuid::new_v4());
    let email = format!("{id}@example.org");

    let first = users.upsert(&id, &email, Some(Role::Admin), Utc::now()).await.unwrap();
    let second = users.upsert(&id, &email, None, Utc::now()).await.unwrap();
    assert_eq!(second.role, Role::Admin);
    assert_eq!(second.created_at, first.created_at);

    let other = format!("user_{}", Uuid::new_v4());
    assert!(matches!(
        users.upsert(&other, &email, None, Utc::now()).await,
        Err(StoreError::Conflict(_))
    ));
}
