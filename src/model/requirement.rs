use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequirementStatus {
    /// Nothing submitted yet; never stored.
    Pending,
    Submitted,
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct RequirementTemplate {
    pub id: u64,
    #[schema(example = "Medical Certificate")]
    pub title: String,
    pub description: Option<String>,
    pub is_mandatory: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct Requirement {
    pub id: u64,
    pub student_id: u64,
    pub template_id: u64,
    pub template_title: String,
    #[schema(example = "https://files.example.com/req/12.pdf")]
    pub file_url: String,
    #[schema(example = "submitted")]
    pub status: String,
    pub feedback: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub submitted_at: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// One template with the caller's submission against it, if any.
#[derive(Debug, FromRow)]
pub struct ChecklistRow {
    pub template_id: u64,
    pub title: String,
    pub is_mandatory: bool,
    pub requirement_id: Option<u64>,
    pub file_url: Option<String>,
    pub status: Option<String>,
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChecklistItem {
    pub template_id: u64,
    pub title: String,
    pub is_mandatory: bool,
    pub requirement_id: Option<u64>,
    pub file_url: Option<String>,
    pub status: RequirementStatus,
    pub feedback: Option<String>,
}

impl From<ChecklistRow> for ChecklistItem {
    fn from(row: ChecklistRow) -> Self {
        // A missing or unreadable submission shows as pending.
        let status = row
            .status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(RequirementStatus::Pending);

        Self {
            template_id: row.template_id,
            title: row.title,
            is_mandatory: row.is_mandatory,
            requirement_id: row.requirement_id,
            file_url: row.file_url,
            status,
            feedback: row.feedback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: Option<&str>) -> ChecklistRow {
        ChecklistRow {
            template_id: 1,
            title: "Resume".into(),
            is_mandatory: true,
            requirement_id: status.map(|_| 5),
            file_url: status.map(|_| "https://files/x.pdf".to_string()),
            status: status.map(str::to_string),
            feedback: None,
        }
    }

    #[test]
    fn test_unsubmitted_template_is_pending() {
        assert_eq!(ChecklistItem::from(row(None)).status, RequirementStatus::Pending);
    }

    #[test]
    fn test_submitted_status_carries_over() {
        assert_eq!(
            ChecklistItem::from(row(Some("approved"))).status,
            RequirementStatus::Approved
        );
    }
}
