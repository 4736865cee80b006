//! In-process store.
//!
//! Each report lives in a slot holding an `ArcSwap` snapshot plus a write
//! mutex. Readers load the snapshot without locking, so they never wait on a
//! writer and never observe a half-applied mutation. Writers to the same
//! report serialize on the slot mutex; writers to different reports touch
//! different slots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use civicpulse_common::{Report, Role, User};

use crate::error::StoreError;
use crate::geo_index::GeoIndex;
use crate::heatmap::{self, clamp_precision, HeatmapCell};
use crate::lifecycle;
use crate::proximity::{rank_nearby, NearbyQuery, NearbyReport};
use crate::query::{newest_first, paginate, Page, PageRequest, ReportFilter};
use crate::repository::{ReportRepository, UserRepository};
use crate::upvote::{apply_upvote, UpvoteLedger};
use crate::validate::StatusPatch;

struct ReportSlot {
    current: ArcSwap<Report>,
    write: Mutex<()>,
}

impl ReportSlot {
    fn new(report: Report) -> Self {
        Self {
            current: ArcSwap::from_pointee(report),
            write: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Report {
        Report::clone(&self.current.load())
    }

    /// Run `f` on a private copy under the slot lock; publish the copy only if
    /// `f` succeeds.
    fn mutate<F>(&self, f: F) -> Result<Report, StoreError>
    where
        F: FnOnce(&mut Report) -> Result<(), StoreError>,
    {
        let _guard = self.write.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = self.snapshot();
        f(&mut next)?;
        self.current.store(Arc::new(next.clone()));
        Ok(next)
    }
}

#[derive(Default)]
pub struct InMemoryReportStore {
    reports: DashMap<Uuid, Arc<ReportSlot>>,
    geo: GeoIndex,
    by_reporter: DashMap<String, Vec<Uuid>>,
    upvotes: UpvoteLedger,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    fn slot(&self, id: Uuid) -> Option<Arc<ReportSlot>> {
        self.reports.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    fn snapshots<I>(&self, ids: I) -> Vec<Report>
    where
        I: IntoIterator<Item = Uuid>,
    {
        ids.into_iter()
            .filter_map(|id| self.slot(id))
            .map(|slot| slot.snapshot())
            .collect()
    }

    fn mutate<F>(&self, id: Uuid, f: F) -> Result<Report, StoreError>
    where
        F: FnOnce(&mut Report) -> Result<(), StoreError>,
    {
        let slot = self.slot(id).ok_or_else(|| StoreError::report_not_found(id))?;
        slot.mutate(f)
    }
}

#[async_trait]
impl ReportRepository for InMemoryReportStore {
    async fn insert(&self, report: Report) -> Result<Report, StoreError> {
        match self.reports.entry(report.id) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "report {} already exists",
                    report.id
                )))
            }
            Entry::Vacant(vacant) => {
                self.geo.insert(report.id, report.location)?;
                vacant.insert(Arc::new(ReportSlot::new(report.clone())));
            }
        }
        self.by_reporter
            .entry(report.reporter_id.clone())
            .or_default()
            .push(report.id);
        Ok(report)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Report>, StoreError> {
        Ok(self.slot(id).map(|slot| slot.snapshot()))
    }

    async fn apply_status(
        &self,
        id: Uuid,
        patch: &StatusPatch,
        now: DateTime<Utc>,
    ) -> Result<Report, StoreError> {
        self.mutate(id, |report| lifecycle::apply(report, patch, now).map(|_| ()))
    }

    async fn upvote(&self, id: Uuid, user_id: &str, now: DateTime<Utc>) -> Result<Report, StoreError> {
        self.mutate(id, |report| apply_upvote(&self.upvotes, report, user_id, now))
    }

    async fn list(&self, filter: &ReportFilter, page: PageRequest) -> Result<Page<Report>, StoreError> {
        let matched = self.matching(filter).await?;
        Ok(paginate(matched, page))
    }

    async fn matching(&self, filter: &ReportFilter) -> Result<Vec<Report>, StoreError> {
        Ok(self
            .reports
            .iter()
            .map(|entry| entry.value().snapshot())
            .filter(|report| filter.matches(report))
            .collect())
    }

    async fn by_reporter(&self, reporter_id: &str) -> Result<Vec<Report>, StoreError> {
        let ids = self
            .by_reporter
            .get(reporter_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let mut reports = self.snapshots(ids);
        reports.sort_by(newest_first);
        Ok(reports)
    }

    async fn nearby(&self, query: &NearbyQuery) -> Result<Vec<NearbyReport>, StoreError> {
        let candidates = self.geo.within(&query.bounding_box());
        let reports = self.snapshots(candidates.into_iter().map(|(id, _)| id));
        Ok(rank_nearby(reports, query))
    }

    async fn heatmap(
        &self,
        filter: &ReportFilter,
        precision: usize,
    ) -> Result<Vec<HeatmapCell>, StoreError> {
        if filter.is_empty() {
            let counts = self.geo.cell_counts(clamp_precision(precision));
            return Ok(heatmap::cells_from_counts(counts));
        }
        let matched = self.matching(filter).await?;
        heatmap::aggregate(&matched, precision)
    }
}

// --- Users ---

#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserStore {
    async fn upsert(
        &self,
        id: &str,
        email: &str,
        role: Option<Role>,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());

        if users.values().any(|u| u.email == email && u.id != id) {
            return Err(StoreError::Conflict(format!(
                "email {email} belongs to another user"
            )));
        }

        let user = users
            .entry(id.to_string())
            .and_modify(|existing| {
                existing.email = email.to_string();
                if let Some(role) = role {
                    existing.role = role;
                }
            })
            .or_insert_with(|| User {
                id: id.to_string(),
                email: email.to_string(),
                role: role.unwrap_or_default(),
                created_at: now,
            });
        Ok(user.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        Ok(users.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{validate_report_create, LocationInput, NewReport};

    fn report(reporter: &str, lng: f64, lat: f64) -> Report {
        let input = NewReport {
            title: Some("Overflowing bin".into()),
            category: Some("Sanitation".into()),
            urgency: Some("Medium".into()),
            assigned_department: Some("Sanitation".into()),
            location: Some(LocationInput::LatLon { lat, lon: lng }),
            ..Default::default()
        };
        validate_report_create(input, reporter, Uuid::new_v4(), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn insert_is_visible_to_spatial_reads() {
        let store = InMemoryReportStore::new();
        let r = store.insert(report("alice", 78.40, 17.44)).await.unwrap();

        let query = NearbyQuery::new(Some(17.44), Some(78.40), 10.0, None).unwrap();
        let hits = store.nearby(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].report.id, r.id);
        assert_eq!(store.heatmap(&ReportFilter::default(), 6).await.unwrap()[0].count, 1);
    }

    #[tokio::test]
    async fn duplicate_id_is_a_conflict() {
        let store = InMemoryReportStore::new();
        let r = report("alice", 1.0, 1.0);
        store.insert(r.clone()).await.unwrap();
        assert!(matches!(
            store.insert(r).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failed_transition_keeps_stored_state() {
        let store = InMemoryReportStore::new();
        let r = store.insert(report("alice", 1.0, 1.0)).await.unwrap();
        store
            .apply_status(r.id, &StatusPatch::to(civicpulse_common::ReportStatus::Resolved), Utc::now())
            .await
            .unwrap();
        let before = store.get(r.id).await.unwrap().unwrap();

        let err = store
            .apply_status(
                r.id,
                &StatusPatch::to(civicpulse_common::ReportStatus::InProgress).with_notes("x"),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(store.get(r.id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn by_reporter_returns_only_own_reports() {
        let store = InMemoryReportStore::new();
        store.insert(report("alice", 1.0, 1.0)).await.unwrap();
        store.insert(report("alice", 2.0, 2.0)).await.unwrap();
        store.insert(report("bob", 3.0, 3.0)).await.unwrap();

        let mine = store.by_reporter("alice").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.reporter_id == "alice"));
        assert!(store.by_reporter("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filtered_and_index_heatmaps_agree() {
        let store = InMemoryReportStore::new();
        for i in 0..8 {
            store
                .insert(report("alice", 78.40 + i as f64 * 0.02, 17.44))
                .await
                .unwrap();
        }
        let from_index = store.heatmap(&ReportFilter::default(), 5).await.unwrap();
        let from_scan = store
            .heatmap(&ReportFilter::default().department("Sanitation"), 5)
            .await
            .unwrap();
        assert_eq!(from_index, from_scan);
    }

    #[tokio::test]
    async fn user_upsert_is_idempotent_and_keeps_created_at() {
        let users = InMemoryUserStore::new();
        let first = users.upsert("user_1", "a@x.org", None, Utc::now()).await.unwrap();
        assert_eq!(first.role, Role::Citizen);

        let later = first.created_at + chrono::Duration::days(1);
        let second = users
            .upsert("user_1", "new@x.org", Some(Role::Admin), later)
            .await
            .unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.email, "new@x.org");
        assert_eq!(second.role, Role::Admin);

        let third = users.upsert("user_1", "new@x.org", None, later).await.unwrap();
        assert_eq!(third.role, Role::Admin);
        assert_eq!(users.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn email_owned_by_another_user_conflicts() {
        let users = InMemoryUserStore::new();
        users.upsert("user_1", "a@x.org", None, Utc::now()).await.unwrap();
        assert!(matches!(
            users.upsert("user_2", "a@x.org", None, Utc::now()).await,
            Err(StoreError::Conflict(_))
        ));
    }
}
