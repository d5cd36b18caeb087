use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct Announcement {
    pub id: u64,
    #[schema(example = "Orientation on Monday")]
    pub title: String,
    pub body: String,
    pub created_by: u64,
    pub author_name: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
