use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::classifier::{AgencySchedule, GeoPoint};

pub const AGENCY_COLUMNS: &str = "id, name, address, contact_person, contact_email, \
     latitude, longitude, operating_days, opening_time, closing_time, \
     lunch_start_time, lunch_end_time";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[schema(example = json!({
    "id": 3,
    "name": "Provincial Engineering Office",
    "address": "Capitol Compound",
    "contact_person": "Engr. Reyes",
    "contact_email": "peo@example.gov",
    "latitude": 14.0,
    "longitude": 121.0,
    "operating_days": "Monday,Tuesday,Wednesday,Thursday,Friday",
    "opening_time": "08:00",
    "closing_time": "17:00",
    "lunch_start_time": "12:00",
    "lunch_end_time": "13:00"
}))]
pub struct Agency {
    pub id: u64,
    pub name: String,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub operating_days: Option<String>,
    pub opening_time: Option<String>,
    pub closing_time: Option<String>,
    pub lunch_start_time: Option<String>,
    pub lunch_end_time: Option<String>,
}

impl Agency {
    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::from_parts(self.latitude, self.longitude)
    }

    pub fn schedule(&self) -> AgencySchedule {
        AgencySchedule::from_raw(
            self.opening_time.as_deref(),
            self.closing_time.as_deref(),
            self.lunch_start_time.as_deref(),
            self.lunch_end_time.as_deref(),
            self.operating_days.as_deref(),
        )
    }
}

/// Parsed view of an agency used by the clock handlers; cached per agency id.
#[derive(Debug, Clone)]
pub struct AgencyProfile {
    pub id: u64,
    pub name: String,
    pub location: Option<GeoPoint>,
    pub schedule: AgencySchedule,
}

impl From<&Agency> for AgencyProfile {
    fn from(agency: &Agency) -> Self {
        Self {
            id: agency.id,
            name: agency.name.clone(),
            location: agency.location(),
            schedule: agency.schedule(),
        }
    }
}
