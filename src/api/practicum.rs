use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::api::{FilterValue, PageBounds, WhereBuilder};
use crate::auth::auth::AuthUser;
use crate::error::{AppError, db_error, is_integrity_violation};
use crate::model::practicum::{PRACTICUM_COLUMNS, Practicum, WorkSetup};
use crate::model::role::Role;
use crate::utils::db_utils::{build_update_sql, execute_update};

const UPDATABLE_COLUMNS: &[&str] = &[
    "agency_id",
    "start_date",
    "end_date",
    "total_hours",
    "work_setup",
];

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePracticum {
    #[schema(example = 12)]
    pub student_id: u64,
    #[schema(example = 3)]
    pub agency_id: u64,
    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(example = "2026-04-30", value_type = String, format = "date")]
    pub end_date: NaiveDate,
    #[schema(example = 486.0)]
    pub total_hours: f64,
    pub work_setup: WorkSetup,
}

impl CreatePracticum {
    fn validate(&self) -> Result<(), AppError> {
        if self.start_date > self.end_date {
            return Err(AppError::bad_request("start_date cannot be after end_date"));
        }
        if !(self.total_hours.is_finite() && self.total_hours > 0.0) {
            return Err(AppError::bad_request("total_hours must be positive"));
        }
        Ok(())
    }
}

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PracticumFilter {
    /// Filter by agency ID
    pub agency_id: Option<u64>,
    /// Filter by student ID
    pub student_id: Option<u64>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Items per page
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct PracticumListResponse {
    pub data: Vec<Practicum>,
    pub page: u64,
    pub per_page: u64,
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct PracticumProgress {
    #[serde(flatten)]
    pub practicum: Practicum,
    #[schema(example = 25.0)]
    pub progress_percent: f64,
    #[schema(example = 364.5)]
    pub remaining_hours: f64,
}

fn validate_patch(body: &Value) -> Result<(), AppError> {
    let Some(obj) = body.as_object() else {
        return Ok(());
    };

    if let Some(setup) = obj.get("work_setup") {
        let valid = setup
            .as_str()
            .is_some_and(|s| s.parse::<WorkSetup>().is_ok());
        if !valid {
            return Err(AppError::bad_request(
                "work_setup must be one of on-site, remote, hybrid",
            ));
        }
    }
    if let Some(hours) = obj.get("total_hours") {
        if !hours.as_f64().is_some_and(|h| h > 0.0) {
            return Err(AppError::bad_request("total_hours must be positive"));
        }
    }
    for column in ["start_date", "end_date"] {
        if let Some(value) = obj.get(column) {
            let valid = value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok());
            if !valid {
                return Err(AppError::bad_request(format!("{column} must be YYYY-MM-DD")));
            }
        }
    }
    Ok(())
}

/// Rejects a patch whose dates, merged with the stored ones, would end before they start.
fn check_date_order(stored: (NaiveDate, NaiveDate), body: &Value) -> Result<(), AppError> {
    let patched = |column: &str, current: NaiveDate| {
        body.get(column)
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .unwrap_or(current)
    };
    if patched("start_date", stored.0) > patched("end_date", stored.1) {
        return Err(AppError::bad_request("start_date cannot be after end_date"));
    }
    Ok(())
}

pub(crate) async fn fetch_practicum_for_student(
    pool: &MySqlPool,
    student_id: u64,
) -> Result<Option<Practicum>, AppError> {
    let sql = format!(
        "SELECT {PRACTICUM_COLUMNS} FROM practicums p \
         JOIN agencies a ON a.id = p.agency_id WHERE p.student_id = ?"
    );
    sqlx::query_as::<_, Practicum>(&sql)
        .bind(student_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to fetch practicum"))
}

#[utoipa::path(
    post,
    path = "/api/v1/practicum",
    request_body = CreatePracticum,
    responses(
        (status = 201, description = "Student assigned", body = Object, example = json!({
            "message": "Practicum created",
            "id": 4
        })),
        (status = 400, description = "Invalid payload or user is not a student"),
        (status = 409, description = "Student already has a practicum or agency does not exist")
    ),
    security(("bearer_auth" = [])),
    tag = "Practicum"
)]
pub async fn create_practicum(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePracticum>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;
    payload.validate()?;

    let role_id = sqlx::query_scalar::<_, u8>("SELECT role_id FROM users WHERE id = ?")
        .bind(payload.student_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(db_error("Failed to look up student"))?;

    if role_id.and_then(Role::from_id) != Some(Role::Student) {
        return Err(AppError::bad_request("student_id does not refer to a student"));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO practicums
            (student_id, agency_id, start_date, end_date, total_hours, completed_hours, work_setup)
        VALUES (?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(payload.student_id)
    .bind(payload.agency_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.total_hours)
    .bind(payload.work_setup.as_ref())
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(r) => {
            tracing::info!(
                practicum_id = r.last_insert_id(),
                student_id = payload.student_id,
                agency_id = payload.agency_id,
                "Practicum created"
            );
            Ok(HttpResponse::Created().json(serde_json::json!({
                "message": "Practicum created",
                "id": r.last_insert_id()
            })))
        }
        Err(e) if is_integrity_violation(&e) => Err(AppError::conflict(
            "Student already has a practicum or agency does not exist",
        )),
        Err(e) => Err(db_error("Failed to create practicum")(e)),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/practicum",
    params(PracticumFilter),
    responses(
        (status = 200, description = "Paginated practicum list", body = PracticumListResponse),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Practicum"
)]
pub async fn list_practicums(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PracticumFilter>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;
    let bounds = PageBounds::new(query.page, query.per_page);

    let mut filter = WhereBuilder::new();
    if let Some(agency_id) = query.agency_id {
        filter.and("p.agency_id = ?", FilterValue::U64(agency_id));
    }
    if let Some(student_id) = query.student_id {
        filter.and("p.student_id = ?", FilterValue::U64(student_id));
    }

    let count_sql = format!("SELECT COUNT(*) FROM practicums p{}", filter.sql());
    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count practicums"))?;

    let data_sql = format!(
        "SELECT {PRACTICUM_COLUMNS} FROM practicums p JOIN agencies a ON a.id = p.agency_id{} \
         ORDER BY p.start_date DESC, p.id DESC LIMIT ? OFFSET ?",
        filter.sql()
    );
    let data = filter
        .bind_rows(sqlx::query_as::<_, Practicum>(&data_sql))
        .bind(bounds.per_page)
        .bind(bounds.offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to fetch practicums"))?;

    Ok(HttpResponse::Ok().json(PracticumListResponse {
        data,
        page: bounds.page,
        per_page: bounds.per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/practicum/me",
    responses(
        (status = 200, description = "Own placement with progress", body = PracticumProgress),
        (status = 403, description = "Students only"),
        (status = 404, description = "No practicum assigned")
    ),
    security(("bearer_auth" = [])),
    tag = "Practicum"
)]
pub async fn my_practicum(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, AppError> {
    let student_id = auth.require_student()?;

    let practicum = fetch_practicum_for_student(pool.get_ref(), student_id)
        .await?
        .ok_or_else(|| AppError::not_found("No practicum assigned"))?;

    Ok(HttpResponse::Ok().json(PracticumProgress {
        progress_percent: practicum.progress_percent(),
        remaining_hours: practicum.remaining_hours(),
        practicum,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/practicum/{practicum_id}",
    params(("practicum_id" = u64, Path, description = "Practicum ID")),
    request_body(content = Object, description = "Any of agency_id, start_date, end_date, total_hours, work_setup"),
    responses(
        (status = 200, description = "Practicum updated"),
        (status = 400, description = "Invalid field"),
        (status = 404, description = "Practicum not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Practicum"
)]
pub async fn update_practicum(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;
    let practicum_id = path.into_inner();

    validate_patch(&body)?;
    let update = build_update_sql("practicums", UPDATABLE_COLUMNS, &body, "id", practicum_id)?;

    let mut tx = pool
        .begin()
        .await
        .map_err(db_error("Failed to start transaction"))?;

    // Row lock keeps the date check valid until the update lands.
    let stored = sqlx::query_as::<_, (NaiveDate, NaiveDate)>(
        "SELECT start_date, end_date FROM practicums WHERE id = ? FOR UPDATE",
    )
    .bind(practicum_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_error("Failed to fetch practicum"))?
    .ok_or_else(|| AppError::not_found("Practicum not found"))?;

    check_date_order(stored, &body)?;

    execute_update(&mut *tx, update).await.map_err(|e| {
        if is_integrity_violation(&e) {
            AppError::conflict("Agency does not exist")
        } else {
            db_error("Failed to update practicum")(e)
        }
    })?;

    tx.commit()
        .await
        .map_err(db_error("Failed to commit practicum update"))?;

    tracing::info!(practicum_id, updated_by = auth.user_id, "Practicum updated");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Practicum updated" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create(start: (i32, u32, u32), end: (i32, u32, u32), hours: f64) -> CreatePracticum {
        CreatePracticum {
            student_id: 1,
            agency_id: 1,
            start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            total_hours: hours,
            work_setup: WorkSetup::OnSite,
        }
    }

    #[test]
    fn test_create_validation() {
        assert!(create((2026, 1, 5), (2026, 4, 30), 486.0).validate().is_ok());
        assert!(create((2026, 5, 5), (2026, 4, 30), 486.0).validate().is_err());
        assert!(create((2026, 1, 5), (2026, 4, 30), 0.0).validate().is_err());
    }

    #[test]
    fn test_patch_validation() {
        assert!(validate_patch(&json!({"work_setup": "remote"})).is_ok());
        assert!(validate_patch(&json!({"work_setup": "moon"})).is_err());
        assert!(validate_patch(&json!({"total_hours": -3})).is_err());
        assert!(validate_patch(&json!({"end_date": "30/04/2026"})).is_err());
        assert!(validate_patch(&json!({"end_date": "2026-04-30"})).is_ok());
    }

    #[test]
    fn test_patched_dates_must_stay_ordered() {
        let d = |m, day| NaiveDate::from_ymd_opt(2026, m, day).unwrap();
        let stored = (d(1, 5), d(4, 30));

        assert!(check_date_order(stored, &json!({"total_hours": 300})).is_ok());
        assert!(check_date_order(stored, &json!({"start_date": "2026-04-30"})).is_ok());
        assert!(check_date_order(stored, &json!({"start_date": "2026-05-01"})).is_err());
        assert!(check_date_order(stored, &json!({"end_date": "2026-01-04"})).is_err());
        assert!(
            check_date_order(
                stored,
                &json!({"start_date": "2026-06-01", "end_date": "2026-09-30"})
            )
            .is_ok()
        );
    }

    #[test]
    fn test_work_setup_deserializes_kebab_case() {
        let p: CreatePracticum = serde_json::from_value(json!({
            "student_id": 1,
            "agency_id": 2,
            "start_date": "2026-01-05",
            "end_date": "2026-04-30",
            "total_hours": 300.0,
            "work_setup": "on-site"
        }))
        .unwrap();
        assert_eq!(p.work_setup, WorkSetup::OnSite);
    }
}
