use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use strum::IntoEnumIterator;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

use crate::api::practicum::fetch_practicum_for_student;
use crate::api::{FilterValue, PageBounds, WhereBuilder};
use crate::auth::auth::AuthUser;
use crate::classifier::{
    DayPunches, GeoPoint, LocationType, PunchContext, Session, SessionPreview, plan_clock_in,
    plan_clock_out, preview, rendered_minutes,
};
use crate::config::Config;
use crate::error::{AppError, db_error, is_integrity_violation};
use crate::model::agency::AgencyProfile;
use crate::model::attendance::{
    ATTENDANCE_COLUMNS, ApprovalStatus, AttendanceDay, AttendanceResponse, AttendanceRow,
    AttendanceStatus, PunchAction, punch_column,
};
use crate::utils::agency_cache::AgencyCache;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClockRequest {
    /// Session to punch; omitted means the one the rules pick
    pub session: Option<Session>,
    #[schema(example = 14.0010)]
    pub latitude: Option<f64>,
    #[schema(example = 121.0)]
    pub longitude: Option<f64>,
    /// Selfie captured by the client after face detection
    pub photo_url: Option<String>,
    /// Reverse-geocoded address of the fix
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PositionQuery {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AttendanceFilter {
    /// Filter by student ID (ignored for students)
    pub student_id: Option<u64>,
    /// First date to include
    #[param(value_type = Option<String>, format = "date")]
    #[schema(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    /// Last date to include
    #[param(value_type = Option<String>, format = "date")]
    #[schema(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
    /// Pending, Approved or Declined
    pub approval_status: Option<ApprovalStatus>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Items per page
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceResponse>,
    pub page: u64,
    pub per_page: u64,
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct SessionState {
    pub session: Session,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub time_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub time_out: Option<NaiveDateTime>,
    pub in_progress: bool,
}

#[derive(Serialize, ToSchema)]
pub struct TodayResponse {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub agency_id: u64,
    pub agency_name: String,
    pub attendance: Option<AttendanceResponse>,
    pub sessions: Vec<SessionState>,
    pub preview: SessionPreview,
}

#[derive(Serialize, ToSchema)]
pub struct ClockResponse {
    #[schema(example = "Clocked in")]
    pub message: String,
    pub session: Session,
    /// Late arrival on clock-in, early departure on clock-out
    pub flagged: bool,
    pub location_type: Option<LocationType>,
    pub attendance: AttendanceResponse,
}

#[derive(Deserialize, ToSchema)]
pub struct StatusUpdate {
    pub status: AttendanceStatus,
}

fn position(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<GeoPoint>, AppError> {
    match (latitude, longitude) {
        (None, None) => Ok(None),
        (Some(lat), Some(lng))
            if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) =>
        {
            Ok(Some(GeoPoint::new(lat, lng)))
        }
        (Some(_), Some(_)) => Err(AppError::bad_request("Coordinates out of range")),
        _ => Err(AppError::bad_request(
            "latitude and longitude must be given together",
        )),
    }
}

fn session_states(punches: &DayPunches) -> Vec<SessionState> {
    Session::iter()
        .map(|session| {
            let punch = punches.get(session);
            SessionState {
                session,
                time_in: punch.time_in,
                time_out: punch.time_out,
                in_progress: punch.in_progress(),
            }
        })
        .collect()
}

/// Agency of the student's placement, through the cache.
async fn student_agency(
    pool: &MySqlPool,
    cache: &AgencyCache,
    student_id: u64,
) -> Result<std::sync::Arc<AgencyProfile>, AppError> {
    let practicum = fetch_practicum_for_student(pool, student_id)
        .await?
        .ok_or_else(|| AppError::not_found("No practicum assigned"))?;

    cache
        .get(pool, practicum.agency_id)
        .await
        .map_err(db_error("Failed to load agency"))?
        .ok_or_else(|| AppError::not_found("Agency not found"))
}

async fn fetch_day(
    pool: &MySqlPool,
    student_id: u64,
    date: NaiveDate,
) -> Result<Option<AttendanceDay>, AppError> {
    let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE student_id = ? AND date = ?");
    sqlx::query_as::<_, AttendanceRow>(&sql)
        .bind(student_id)
        .bind(date)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to fetch attendance day"))?
        .map(AttendanceDay::try_from)
        .transpose()
}

async fn fetch_day_by_id(pool: &MySqlPool, attendance_id: u64) -> Result<AttendanceDay, AppError> {
    let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?");
    sqlx::query_as::<_, AttendanceRow>(&sql)
        .bind(attendance_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to fetch attendance"))?
        .map(AttendanceDay::try_from)
        .transpose()?
        .ok_or_else(|| AppError::not_found("Attendance record not found"))
}

struct PunchLog<'a> {
    attendance_id: u64,
    session: Session,
    action: PunchAction,
    at: NaiveDateTime,
    position: Option<GeoPoint>,
    location: Option<LocationType>,
    request: &'a ClockRequest,
}

async fn insert_punch_log(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    log: PunchLog<'_>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO attendance_punches
            (attendance_id, session, action, punched_at, latitude, longitude,
             location_type, photo_url, address)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(log.attendance_id)
    .bind(log.session.as_ref())
    .bind(log.action.as_ref())
    .bind(log.at)
    .bind(log.position.map(|p| p.latitude))
    .bind(log.position.map(|p| p.longitude))
    .bind(log.location.map(|l| l.as_ref().to_string()))
    .bind(&log.request.photo_url)
    .bind(&log.request.address)
    .execute(&mut **tx)
    .await
    .map_err(db_error("Failed to record punch"))?;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/v1/attendance/today",
    params(PositionQuery),
    responses(
        (status = 200, description = "Today's attendance and available actions", body = TodayResponse),
        (status = 403, description = "Students only"),
        (status = 404, description = "No practicum assigned")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<AgencyCache>,
    config: web::Data<Config>,
    query: web::Query<PositionQuery>,
) -> Result<HttpResponse, AppError> {
    let student_id = auth.require_student()?;
    let position = position(query.latitude, query.longitude)?;

    let agency = student_agency(pool.get_ref(), cache.get_ref(), student_id).await?;
    let now = config.local_now();
    let day = fetch_day(pool.get_ref(), student_id, now.date()).await?;
    let punches = day.as_ref().map(|d| d.punches).unwrap_or_default();

    let ctx = PunchContext {
        schedule: &agency.schedule,
        agency_point: agency.location,
        now,
        position,
    };

    Ok(HttpResponse::Ok().json(TodayResponse {
        date: now.date(),
        agency_id: agency.id,
        agency_name: agency.name.clone(),
        attendance: day.as_ref().map(AttendanceResponse::from),
        sessions: session_states(&punches),
        preview: preview(&punches, &ctx),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/attendance/clock-in",
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Clocked in", body = ClockResponse),
        (status = 400, description = "No session available", body = Object, example = json!({
            "code": "BAD_REQUEST",
            "message": "No attendance session is available for clock-in"
        })),
        (status = 403, description = "Students only"),
        (status = 404, description = "No practicum assigned"),
        (status = 409, description = "Concurrent punch detected")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(name = "clock_in", skip_all, fields(student_id = auth.user_id))]
pub async fn clock_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<AgencyCache>,
    config: web::Data<Config>,
    payload: web::Json<ClockRequest>,
) -> Result<HttpResponse, AppError> {
    let student_id = auth.require_student()?;
    let position = position(payload.latitude, payload.longitude)?;

    let agency = student_agency(pool.get_ref(), cache.get_ref(), student_id).await?;
    let now = config.local_now();
    let day = fetch_day(pool.get_ref(), student_id, now.date()).await?;
    let punches = day.as_ref().map(|d| d.punches).unwrap_or_default();

    let ctx = PunchContext {
        schedule: &agency.schedule,
        agency_point: agency.location,
        now,
        position,
    };
    let plan = plan_clock_in(&punches, &ctx, payload.session)?;
    let status = AttendanceStatus::after_clock_in(day.as_ref().map(|d| d.status), plan.late);
    let column = punch_column(plan.session, PunchAction::In);

    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;

    let attendance_id = match &day {
        None => {
            let sql = format!(
                "INSERT INTO attendance (student_id, date, {column}, status, approval_status) \
                 VALUES (?, ?, ?, ?, ?)"
            );
            let result = sqlx::query(&sql)
                .bind(student_id)
                .bind(now.date())
                .bind(plan.at)
                .bind(status.as_ref())
                .bind(ApprovalStatus::Pending.as_ref())
                .execute(&mut *tx)
                .await;

            match result {
                Ok(r) => r.last_insert_id(),
                Err(e) if is_integrity_violation(&e) => {
                    return Err(AppError::conflict("Attendance changed concurrently, retry"));
                }
                Err(e) => return Err(db_error("Failed to create attendance day")(e)),
            }
        }
        Some(day) => {
            let sql = format!(
                "UPDATE attendance SET {column} = ?, status = ? WHERE id = ? AND {column} IS NULL"
            );
            let affected = sqlx::query(&sql)
                .bind(plan.at)
                .bind(status.as_ref())
                .bind(day.id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to clock in"))?
                .rows_affected();

            if affected == 0 {
                return Err(AppError::conflict("Attendance changed concurrently, retry"));
            }
            day.id
        }
    };

    insert_punch_log(
        &mut tx,
        PunchLog {
            attendance_id,
            session: plan.session,
            action: PunchAction::In,
            at: plan.at,
            position,
            location: plan.location,
            request: &payload,
        },
    )
    .await?;

    tx.commit().await.map_err(db_error("Failed to commit clock-in"))?;

    tracing::info!(
        attendance_id,
        session = %plan.session,
        late = plan.late,
        location = ?plan.location,
        "Clocked in"
    );

    let attendance = fetch_day_by_id(pool.get_ref(), attendance_id).await?;
    Ok(HttpResponse::Ok().json(ClockResponse {
        message: "Clocked in".into(),
        session: plan.session,
        flagged: plan.late,
        location_type: plan.location,
        attendance: AttendanceResponse::from(&attendance),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/attendance/clock-out",
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Clocked out", body = ClockResponse),
        (status = 400, description = "No session in progress", body = Object, example = json!({
            "code": "BAD_REQUEST",
            "message": "No session is in progress"
        })),
        (status = 403, description = "Students only"),
        (status = 404, description = "No practicum assigned"),
        (status = 409, description = "Concurrent punch detected")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(name = "clock_out", skip_all, fields(student_id = auth.user_id))]
pub async fn clock_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<AgencyCache>,
    config: web::Data<Config>,
    payload: web::Json<ClockRequest>,
) -> Result<HttpResponse, AppError> {
    let student_id = auth.require_student()?;
    let position = position(payload.latitude, payload.longitude)?;

    let agency = student_agency(pool.get_ref(), cache.get_ref(), student_id).await?;
    let now = config.local_now();
    let day = fetch_day(pool.get_ref(), student_id, now.date()).await?;
    let punches = day.as_ref().map(|d| d.punches).unwrap_or_default();

    let ctx = PunchContext {
        schedule: &agency.schedule,
        agency_point: agency.location,
        now,
        position,
    };
    let plan = plan_clock_out(&punches, &ctx, payload.session)?;

    // A planned clock-out implies an in-progress session, hence a stored day.
    let Some(day) = day else {
        return Err(AppError::Internal);
    };
    let column = punch_column(plan.session, PunchAction::Out);

    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;

    let sql = format!("UPDATE attendance SET {column} = ? WHERE id = ? AND {column} IS NULL");
    let affected = sqlx::query(&sql)
        .bind(plan.at)
        .bind(day.id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to clock out"))?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::conflict("Attendance changed concurrently, retry"));
    }

    insert_punch_log(
        &mut tx,
        PunchLog {
            attendance_id: day.id,
            session: plan.session,
            action: PunchAction::Out,
            at: plan.at,
            position,
            location: plan.location,
            request: &payload,
        },
    )
    .await?;

    tx.commit().await.map_err(db_error("Failed to commit clock-out"))?;

    tracing::info!(
        attendance_id = day.id,
        session = %plan.session,
        early_departure = plan.early_departure,
        location = ?plan.location,
        "Clocked out"
    );

    let attendance = fetch_day_by_id(pool.get_ref(), day.id).await?;
    Ok(HttpResponse::Ok().json(ClockResponse {
        message: "Clocked out".into(),
        session: plan.session,
        flagged: plan.early_departure,
        location_type: plan.location,
        attendance: AttendanceResponse::from(&attendance),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/attendance",
    params(AttendanceFilter),
    responses(
        (status = 200, description = "Paginated attendance list", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceFilter>,
) -> Result<HttpResponse, AppError> {
    let bounds = PageBounds::new(query.page, query.per_page);

    let mut filter = WhereBuilder::new();
    // Students only ever see their own days.
    let student_id = if auth.is_student() {
        Some(auth.user_id)
    } else {
        query.student_id
    };
    if let Some(student_id) = student_id {
        filter.and("student_id = ?", FilterValue::U64(student_id));
    }
    if let Some(from) = query.from {
        filter.and("date >= ?", FilterValue::Date(from));
    }
    if let Some(to) = query.to {
        filter.and("date <= ?", FilterValue::Date(to));
    }
    if let Some(approval) = query.approval_status {
        filter.and(
            "approval_status = ?",
            FilterValue::Str(approval.as_ref().to_string()),
        );
    }

    let count_sql = format!("SELECT COUNT(*) FROM attendance{}", filter.sql());
    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count attendance"))?;

    let data_sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance{} ORDER BY date DESC, id DESC LIMIT ? OFFSET ?",
        filter.sql()
    );
    let rows = filter
        .bind_rows(sqlx::query_as::<_, AttendanceRow>(&data_sql))
        .bind(bounds.per_page)
        .bind(bounds.offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to fetch attendance"))?;

    let data = rows
        .into_iter()
        .map(|row| AttendanceDay::try_from(row).map(|day| AttendanceResponse::from(&day)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data,
        page: bounds.page,
        per_page: bounds.per_page,
        total,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/attendance/{attendance_id}/approve",
    params(("attendance_id" = u64, Path, description = "Attendance day ID")),
    responses(
        (status = 200, description = "Approved; rendered hours credited", body = Object, example = json!({
            "message": "Attendance approved",
            "credited_hours": 8.0
        })),
        (status = 400, description = "Already reviewed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn approve_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;
    let attendance_id = path.into_inner();

    let day = fetch_day_by_id(pool.get_ref(), attendance_id).await?;
    if day.approval_status != ApprovalStatus::Pending {
        return Err(AppError::bad_request("Attendance already reviewed"));
    }
    if day.punches.any_in_progress() {
        return Err(AppError::bad_request("A session is still in progress"));
    }

    let credited_hours = rendered_minutes(&day.punches) as f64 / 60.0;

    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;

    let affected = sqlx::query(
        "UPDATE attendance SET approval_status = ? WHERE id = ? AND approval_status = ?",
    )
    .bind(ApprovalStatus::Approved.as_ref())
    .bind(attendance_id)
    .bind(ApprovalStatus::Pending.as_ref())
    .execute(&mut *tx)
    .await
    .map_err(db_error("Failed to approve attendance"))?
    .rows_affected();

    if affected == 0 {
        return Err(AppError::bad_request("Attendance already reviewed"));
    }

    sqlx::query("UPDATE practicums SET completed_hours = completed_hours + ? WHERE student_id = ?")
        .bind(credited_hours)
        .bind(day.student_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to credit practicum hours"))?;

    tx.commit().await.map_err(db_error("Failed to commit approval"))?;

    tracing::info!(
        attendance_id,
        student_id = day.student_id,
        credited_hours,
        approved_by = auth.user_id,
        "Attendance approved"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Attendance approved",
        "credited_hours": credited_hours
    })))
}

#[utoipa::path(
    put,
    path = "/api/v1/attendance/{attendance_id}/decline",
    params(("attendance_id" = u64, Path, description = "Attendance day ID")),
    responses(
        (status = 200, description = "Declined", body = Object, example = json!({
            "message": "Attendance declined"
        })),
        (status = 400, description = "Attendance not found or already reviewed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn decline_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;
    let attendance_id = path.into_inner();

    let affected = sqlx::query(
        "UPDATE attendance SET approval_status = ? WHERE id = ? AND approval_status = ?",
    )
    .bind(ApprovalStatus::Declined.as_ref())
    .bind(attendance_id)
    .bind(ApprovalStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to decline attendance"))?
    .rows_affected();

    if affected == 0 {
        return Err(AppError::bad_request(
            "Attendance not found or already reviewed",
        ));
    }

    tracing::info!(attendance_id, declined_by = auth.user_id, "Attendance declined");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Attendance declined" })))
}

#[utoipa::path(
    put,
    path = "/api/v1/attendance/{attendance_id}/status",
    params(("attendance_id" = u64, Path, description = "Attendance day ID")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Status changed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn set_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<StatusUpdate>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;
    let attendance_id = path.into_inner();

    // Existence check first: MySQL reports 0 rows for an unchanged value.
    fetch_day_by_id(pool.get_ref(), attendance_id).await?;

    sqlx::query("UPDATE attendance SET status = ? WHERE id = ?")
        .bind(payload.status.as_ref())
        .bind(attendance_id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to update attendance status"))?;

    tracing::info!(
        attendance_id,
        status = payload.status.as_ref(),
        updated_by = auth.user_id,
        "Attendance status changed"
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Attendance status updated" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SessionPunch;
    use serde_json::json;

    #[test]
    fn test_position_validation() {
        assert_eq!(position(None, None).unwrap(), None);
        assert_eq!(
            position(Some(14.0), Some(121.0)).unwrap(),
            Some(GeoPoint::new(14.0, 121.0))
        );
        assert!(position(Some(14.0), None).is_err());
        assert!(position(Some(91.0), Some(0.0)).is_err());
    }

    #[test]
    fn test_session_states_cover_every_session() {
        let at = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let punches = DayPunches {
            morning: SessionPunch {
                time_in: Some(at),
                time_out: None,
            },
            ..DayPunches::default()
        };

        let states = session_states(&punches);
        assert_eq!(states.len(), 3);
        assert_eq!(states[0].session, Session::Morning);
        assert!(states[0].in_progress);
        assert!(!states[1].in_progress);
        assert_eq!(states[2].session, Session::Overtime);
    }

    #[test]
    fn test_clock_request_parses_session() {
        let req: ClockRequest = serde_json::from_value(json!({
            "session": "afternoon",
            "latitude": 14.0,
            "longitude": 121.0
        }))
        .unwrap();
        assert_eq!(req.session, Some(Session::Afternoon));

        let bad = serde_json::from_value::<ClockRequest>(json!({ "session": "evening" }));
        assert!(bad.is_err());
    }
}
