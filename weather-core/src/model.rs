use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A searchable place as returned by the search endpoint.
///
/// This is also the cached blob: the last selection is stored as its JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Absent for ad-hoc results, e.g. the `location` block of `current.json`.
    pub id: Option<i64>,
    pub name: String,
    pub region: String,
    pub country: String,
}

impl Location {
    pub fn new(
        id: Option<i64>,
        name: impl Into<String>,
        region: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self { id, name: name.into(), region: region.into(), country: country.into() }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.region, self.country)
    }
}

/// Current conditions, always in normalized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temperature_c: f64,
    pub humidity: u8,
    pub uv: f64,
    pub feels_like_c: f64,
    pub condition: Condition,
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub icon_url: String,
}
