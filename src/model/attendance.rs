use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::classifier::{DayPunches, Session, SessionPunch, rendered_minutes};
use crate::error::AppError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Excused,
}

impl AttendanceStatus {
    /// Status after a clock-in. A late day stays late.
    pub fn after_clock_in(current: Option<Self>, late: bool) -> Self {
        match current {
            Some(AttendanceStatus::Late) => AttendanceStatus::Late,
            _ if late => AttendanceStatus::Late,
            _ => AttendanceStatus::Present,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr,
)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum PunchAction {
    In,
    Out,
}

/// Column of the `attendance` table holding the given punch.
pub fn punch_column(session: Session, action: PunchAction) -> &'static str {
    match (session, action) {
        (Session::Morning, PunchAction::In) => "morning_time_in",
        (Session::Morning, PunchAction::Out) => "morning_time_out",
        (Session::Afternoon, PunchAction::In) => "afternoon_time_in",
        (Session::Afternoon, PunchAction::Out) => "afternoon_time_out",
        (Session::Overtime, PunchAction::In) => "overtime_time_in",
        (Session::Overtime, PunchAction::Out) => "overtime_time_out",
    }
}

pub const ATTENDANCE_COLUMNS: &str = "id, student_id, date, \
     morning_time_in, morning_time_out, \
     afternoon_time_in, afternoon_time_out, \
     overtime_time_in, overtime_time_out, \
     status, approval_status";

#[derive(Debug, FromRow)]
pub struct AttendanceRow {
    pub id: u64,
    pub student_id: u64,
    pub date: NaiveDate,
    pub morning_time_in: Option<NaiveDateTime>,
    pub morning_time_out: Option<NaiveDateTime>,
    pub afternoon_time_in: Option<NaiveDateTime>,
    pub afternoon_time_out: Option<NaiveDateTime>,
    pub overtime_time_in: Option<NaiveDateTime>,
    pub overtime_time_out: Option<NaiveDateTime>,
    pub status: String,
    pub approval_status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceDay {
    pub id: u64,
    pub student_id: u64,
    pub date: NaiveDate,
    pub punches: DayPunches,
    pub status: AttendanceStatus,
    pub approval_status: ApprovalStatus,
}

impl TryFrom<AttendanceRow> for AttendanceDay {
    type Error = AppError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|_| {
            tracing::error!(attendance_id = row.id, status = %row.status, "Unknown attendance status");
            AppError::Internal
        })?;
        let approval_status = row.approval_status.parse().map_err(|_| {
            tracing::error!(
                attendance_id = row.id,
                approval_status = %row.approval_status,
                "Unknown approval status"
            );
            AppError::Internal
        })?;

        Ok(Self {
            id: row.id,
            student_id: row.student_id,
            date: row.date,
            punches: DayPunches {
                morning: SessionPunch {
                    time_in: row.morning_time_in,
                    time_out: row.morning_time_out,
                },
                afternoon: SessionPunch {
                    time_in: row.afternoon_time_in,
                    time_out: row.afternoon_time_out,
                },
                overtime: SessionPunch {
                    time_in: row.overtime_time_in,
                    time_out: row.overtime_time_out,
                },
            },
            status,
            approval_status,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[schema(example = json!({
    "id": 7,
    "student_id": 12,
    "date": "2026-03-02",
    "morning_time_in": "2026-03-02T07:58:00",
    "morning_time_out": "2026-03-02T12:01:00",
    "afternoon_time_in": null,
    "afternoon_time_out": null,
    "overtime_time_in": null,
    "overtime_time_out": null,
    "status": "present",
    "approval_status": "Pending",
    "rendered_minutes": 243
}))]
pub struct AttendanceResponse {
    pub id: u64,
    pub student_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub morning_time_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub morning_time_out: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub afternoon_time_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub afternoon_time_out: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub overtime_time_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub overtime_time_out: Option<NaiveDateTime>,
    pub status: AttendanceStatus,
    pub approval_status: ApprovalStatus,
    pub rendered_minutes: i64,
}

impl From<&AttendanceDay> for AttendanceResponse {
    fn from(day: &AttendanceDay) -> Self {
        let p = &day.punches;
        Self {
            id: day.id,
            student_id: day.student_id,
            date: day.date,
            morning_time_in: p.morning.time_in,
            morning_time_out: p.morning.time_out,
            afternoon_time_in: p.afternoon.time_in,
            afternoon_time_out: p.afternoon.time_out,
            overtime_time_in: p.overtime.time_in,
            overtime_time_out: p.overtime.time_out,
            status: day.status,
            approval_status: day.approval_status,
            rendered_minutes: rendered_minutes(p),
        }
    }
}
