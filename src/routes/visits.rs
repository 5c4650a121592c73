use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::ApiError;
use crate::app_state::AppState;
use crate::models::api::{StoreVisitsResponse, VisitData, VisitsQuery};
use crate::models::store::VisitFilter;

/// GET /api/visits: visit history grouped by store.
///
/// Every supplied parameter narrows the result; at least one is required.
pub async fn get_store_visits(
    State(state): State<AppState>,
    Query(query): Query<VisitsQuery>,
) -> Result<Json<Vec<StoreVisitsResponse>>, ApiError> {
    let filter = VisitFilter {
        store_id: non_empty(query.storeid),
        area: non_empty(query.area),
        start: parse_date(query.startdate, "startdate")?,
        end: parse_date(query.enddate, "enddate")?,
    };
    if filter.is_empty() {
        return Err(ApiError::BadRequest(
            "one of storeid, area, startdate or enddate is required".to_string(),
        ));
    }

    let visits = state.store.query_visits(&filter).await?;

    let mut grouped: BTreeMap<String, Vec<VisitData>> = BTreeMap::new();
    for visit in visits {
        grouped.entry(visit.store_id).or_default().push(VisitData {
            date: visit.visit_time.format("%Y-%m-%d").to_string(),
            perimeter: visit.perimeter,
        });
    }

    let mut response = Vec::with_capacity(grouped.len());
    for (store_id, data) in grouped {
        let store = state.store.get_store(&store_id).await?;
        let (area, store_name) = store
            .map(|s| (s.store_area, s.store_name))
            .unwrap_or_default();
        response.push(StoreVisitsResponse {
            store_id,
            area,
            store_name,
            data,
        });
    }

    Ok(Json(response))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(value: Option<String>, name: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = non_empty(value) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| {
            ApiError::BadRequest(format!(
                "invalid {}, expected an RFC3339 timestamp: {}",
                name, e
            ))
        })
}
