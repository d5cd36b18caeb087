use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum WorkSetup {
    OnSite,
    Remote,
    Hybrid,
}

pub const PRACTICUM_COLUMNS: &str = "p.id, p.student_id, p.agency_id, a.name AS agency_name, \
     p.start_date, p.end_date, p.total_hours, p.completed_hours, p.work_setup";

#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Practicum {
    pub id: u64,
    pub student_id: u64,
    pub agency_id: u64,
    pub agency_name: String,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub total_hours: f64,
    pub completed_hours: f64,
    #[schema(example = "on-site")]
    pub work_setup: String,
}

impl Practicum {
    /// Completion in percent, capped at 100.
    pub fn progress_percent(&self) -> f64 {
        if self.total_hours <= 0.0 {
            return 0.0;
        }
        (self.completed_hours / self.total_hours * 100.0).min(100.0)
    }

    pub fn remaining_hours(&self) -> f64 {
        (self.total_hours - self.completed_hours).max(0.0)
    }
}
