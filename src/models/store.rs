use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store metadata imported from CSV.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Store {
    pub store_id: String,
    pub store_area: String,
    pub store_name: String,
}

/// A successfully analysed store visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreVisit {
    pub store_id: String,
    pub store_area: String,
    pub perimeter: i64,
    pub visit_time: DateTime<Utc>,
}

/// Filters for visit history lookups. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct VisitFilter {
    pub store_id: Option<String>,
    pub area: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl VisitFilter {
    pub fn is_empty(&self) -> bool {
        self.store_id.is_none() && self.area.is_none() && self.start.is_none() && self.end.is_none()
    }

    pub fn matches(&self, visit: &StoreVisit) -> bool {
        self.store_id.as_deref().map_or(true, |id| visit.store_id == id)
            && self.area.as_deref().map_or(true, |a| visit.store_area == a)
            && self.start.map_or(true, |s| visit.visit_time >= s)
            && self.end.map_or(true, |e| visit.visit_time <= e)
    }
}
