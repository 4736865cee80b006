//! "Reports within D meters of P", ordered by great-circle distance.

use std::cmp::Ordering;

use serde::Serialize;

use civicpulse_common::{BoundingBox, GeoPoint, Report};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyQuery {
    pub center: GeoPoint,
    pub max_distance_m: f64,
    /// Keep only the nearest `limit` matches.
    pub limit: Option<usize>,
}

impl NearbyQuery {
    /// Build a query from loosely-typed request values.
    pub fn new(
        lat: Option<f64>,
        lng: Option<f64>,
        max_distance_m: f64,
        limit: Option<usize>,
    ) -> Result<Self, StoreError> {
        let (Some(lat), Some(lng)) = (lat, lng) else {
            return Err(StoreError::InvalidArgument(
                "lat and lng are both required".to_string(),
            ));
        };
        let center =
            GeoPoint::new(lng, lat).map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        if !max_distance_m.is_finite() || max_distance_m < 0.0 {
            return Err(StoreError::InvalidArgument(format!(
                "max distance must be a non-negative number of meters, got {max_distance_m}"
            )));
        }
        if limit == Some(0) {
            return Err(StoreError::InvalidArgument(
                "limit must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            center,
            max_distance_m,
            limit,
        })
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::around(&self.center, self.max_distance_m)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyReport {
    #[serde(flatten)]
    pub report: Report,
    pub distance_meters: f64,
}

/// Keep candidates within the query radius, nearest first.
///
/// Ties on distance fall back to id so repeated queries agree. The cap is
/// applied after sorting, so the nearest entries always win.
pub fn rank_nearby<I>(candidates: I, query: &NearbyQuery) -> Vec<NearbyReport>
where
    I: IntoIterator<Item = Report>,
{
    let mut hits: Vec<NearbyReport> = candidates
        .into_iter()
        .filter_map(|report| {
            let distance_meters = query.center.distance_m(&report.location);
            (distance_meters <= query.max_distance_m).then_some(NearbyReport {
                report,
                distance_meters,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance_meters
            .partial_cmp(&b.distance_meters)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.report.id.cmp(&b.report.id))
    });

    if let Some(limit) = query.limit {
        hits.truncate(limit);
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{validate_report_create, LocationInput, NewReport};
    use chrono::Utc;
    use uuid::Uuid;

    fn report(lng: f64, lat: f64) -> Report {
        let input = NewReport {
            title: Some("Pothole".into()),
            category: Some("Pothole".into()),
            urgency: Some("Medium".into()),
            assigned_department: Some("Public Works".into()),
            location: Some(LocationInput::Coordinates {
                coordinates: vec![lng, lat],
            }),
            ..Default::default()
        };
        validate_report_create(input, "citizen", Uuid::new_v4(), Utc::now()).unwrap()
    }

    #[test]
    fn missing_coordinates_are_invalid() {
        assert!(matches!(
            NearbyQuery::new(None, Some(78.4), 100.0, None),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            NearbyQuery::new(Some(17.4), Some(200.0), 100.0, None),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            NearbyQuery::new(Some(17.4), Some(78.4), -1.0, None),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn orders_by_distance_and_filters_radius() {
        let a = report(78.40, 17.44);
        let b = report(78.4050, 17.4470);
        let query = NearbyQuery::new(Some(17.4458), Some(78.4013), 1_000.0, None).unwrap();

        let ranked = rank_nearby(vec![a.clone(), b.clone()], &query);
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].distance_meters <= ranked[1].distance_meters);
        // B is ~410m away, A ~660m.
        assert_eq!(ranked[0].report.id, b.id);
        assert_eq!(ranked[1].report.id, a.id);

        let tight = NearbyQuery::new(Some(17.4458), Some(78.4013), 100.0, None).unwrap();
        assert!(rank_nearby(vec![a, b], &tight).is_empty());
    }

    #[test]
    fn zero_radius_matches_only_coincident_points() {
        let here = report(78.40, 17.44);
        let nearby = report(78.4001, 17.44);
        let query = NearbyQuery::new(Some(17.44), Some(78.40), 0.0, None).unwrap();
        let ranked = rank_nearby(vec![here.clone(), nearby], &query);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].report.id, here.id);
        assert_eq!(ranked[0].distance_meters, 0.0);
    }

    #[test]
    fn cap_keeps_the_nearest() {
        let reports: Vec<Report> = (1..=5)
            .map(|i| report(78.40 + i as f64 * 0.001, 17.44))
            .collect();
        let query = NearbyQuery::new(Some(17.44), Some(78.40), 10_000.0, Some(2)).unwrap();
        let ranked = rank_nearby(reports.clone().into_iter().rev(), &query);
        let ids: Vec<Uuid> = ranked.iter().map(|r| r.report.id).collect();
        assert_eq!(ids, vec![reports[0].id, reports[1].id]);
    }

    #[test]
    fn serializes_distance_alongside_report_fields() {
        let query = NearbyQuery::new(Some(17.44), Some(78.40), 10.0, None).unwrap();
        let ranked = rank_nearby(vec![report(78.40, 17.44)], &query);
        let json = serde_json::to_value(&ranked[0]).unwrap();
        assert_eq!(json["distance_meters"], 0.0);
        assert_eq!(json["status"], "Submitted");
    }
}
