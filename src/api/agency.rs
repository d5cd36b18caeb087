use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::api::{FilterValue, PageBounds, WhereBuilder};
use crate::auth::auth::AuthUser;
use crate::classifier::schedule::{format_time_of_day, parse_operating_days, parse_time_of_day};
use crate::error::{AppError, db_error, is_integrity_violation};
use crate::model::agency::{AGENCY_COLUMNS, Agency};
use crate::utils::agency_cache::AgencyCache;
use crate::utils::db_utils::{build_update_sql, execute_update};

const UPDATABLE_COLUMNS: &[&str] = &[
    "name",
    "address",
    "contact_person",
    "contact_email",
    "latitude",
    "longitude",
    "operating_days",
    "opening_time",
    "closing_time",
    "lunch_start_time",
    "lunch_end_time",
];

const TIME_COLUMNS: &[&str] = &[
    "opening_time",
    "closing_time",
    "lunch_start_time",
    "lunch_end_time",
];

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAgency {
    #[schema(example = "Provincial Engineering Office")]
    pub name: String,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    #[schema(example = 14.0)]
    pub latitude: Option<f64>,
    #[schema(example = 121.0)]
    pub longitude: Option<f64>,
    #[schema(example = "Monday,Tuesday,Wednesday,Thursday,Friday")]
    pub operating_days: Option<String>,
    #[schema(example = "08:00")]
    pub opening_time: Option<String>,
    #[schema(example = "17:00")]
    pub closing_time: Option<String>,
    #[schema(example = "12:00")]
    pub lunch_start_time: Option<String>,
    #[schema(example = "13:00")]
    pub lunch_end_time: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AgencyFilter {
    /// Case-insensitive substring of the agency name
    pub search: Option<String>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Items per page
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct AgencyListResponse {
    pub data: Vec<Agency>,
    pub page: u64,
    pub per_page: u64,
    pub total: i64,
}

/// Column width of `agencies.operating_days`.
const OPERATING_DAYS_MAX_LEN: usize = 128;

/// Canonical "HH:MM" for a time field; blank means unset.
fn normalize_time(field: &str, value: Option<&str>) -> Result<Option<String>, AppError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_time_of_day(v)
            .map(|minutes| Some(format_time_of_day(minutes)))
            .ok_or_else(|| AppError::bad_request(format!("{field} must be HH:MM or HH:MM:SS"))),
    }
}

fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), AppError> {
    match (latitude, longitude) {
        (None, None) => Ok(()),
        (Some(lat), Some(lng)) => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                Err(AppError::bad_request("Coordinates out of range"))
            } else {
                Ok(())
            }
        }
        _ => Err(AppError::bad_request(
            "latitude and longitude must be given together",
        )),
    }
}

fn normalize_operating_days(value: Option<&str>) -> Result<Option<String>, AppError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.len() > OPERATING_DAYS_MAX_LEN => Err(AppError::bad_request(
            "operating_days is too long",
        )),
        Some(v) if parse_operating_days(v).is_empty() => Err(AppError::bad_request(
            "operating_days has no recognised weekday names",
        )),
        Some(v) => Ok(Some(v.to_string())),
    }
}

impl CreateAgency {
    /// Checks the payload and rewrites schedule fields into their stored form.
    fn prepare(&mut self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::bad_request("name must not be empty"));
        }
        validate_coordinates(self.latitude, self.longitude)?;
        self.operating_days = normalize_operating_days(self.operating_days.as_deref())?;
        self.opening_time = normalize_time("opening_time", self.opening_time.as_deref())?;
        self.closing_time = normalize_time("closing_time", self.closing_time.as_deref())?;
        self.lunch_start_time =
            normalize_time("lunch_start_time", self.lunch_start_time.as_deref())?;
        self.lunch_end_time = normalize_time("lunch_end_time", self.lunch_end_time.as_deref())?;
        Ok(())
    }
}

/// String-or-null content of a patch field; other JSON types are rejected.
fn patch_str<'a>(
    obj: &'a serde_json::Map<String, Value>,
    column: &str,
) -> Result<Option<&'a str>, AppError> {
    match obj.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(AppError::bad_request(format!(
            "{column} must be a string or null"
        ))),
    }
}

fn stored(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

/// Validates a partial update and rewrites schedule fields into their stored form.
fn prepare_patch(body: &mut Value) -> Result<(), AppError> {
    let Some(obj) = body.as_object_mut() else {
        return Ok(()); // build_update_sql reports the shape error
    };

    for column in TIME_COLUMNS {
        if obj.contains_key(*column) {
            let time = normalize_time(column, patch_str(obj, column)?)?;
            obj.insert(column.to_string(), stored(time));
        }
    }
    if obj.contains_key("operating_days") {
        let days = normalize_operating_days(patch_str(obj, "operating_days")?)?;
        obj.insert("operating_days".to_string(), stored(days));
    }

    if obj.contains_key("name") {
        match patch_str(obj, "name")? {
            Some(n) if !n.trim().is_empty() => {}
            _ => return Err(AppError::bad_request("name must not be empty")),
        }
    }

    let lat = obj.get("latitude").and_then(Value::as_f64);
    let lng = obj.get("longitude").and_then(Value::as_f64);
    if lat.is_some() || lng.is_some() {
        validate_coordinates(lat, lng)?;
    }
    Ok(())
}

async fn fetch_agency(pool: &MySqlPool, agency_id: u64) -> Result<Option<Agency>, AppError> {
    let sql = format!("SELECT {AGENCY_COLUMNS} FROM agencies WHERE id = ?");
    sqlx::query_as::<_, Agency>(&sql)
        .bind(agency_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to fetch agency"))
}

#[utoipa::path(
    post,
    path = "/api/v1/agency",
    request_body = CreateAgency,
    responses(
        (status = 201, description = "Agency created", body = Agency),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Agency name already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Agency"
)]
pub async fn create_agency(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<AgencyCache>,
    payload: web::Json<CreateAgency>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;
    let mut payload = payload.into_inner();
    payload.prepare()?;

    let result = sqlx::query(
        r#"
        INSERT INTO agencies
            (name, address, contact_person, contact_email, latitude, longitude,
             operating_days, opening_time, closing_time, lunch_start_time, lunch_end_time)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.address)
    .bind(&payload.contact_person)
    .bind(&payload.contact_email)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(&payload.operating_days)
    .bind(&payload.opening_time)
    .bind(&payload.closing_time)
    .bind(&payload.lunch_start_time)
    .bind(&payload.lunch_end_time)
    .execute(pool.get_ref())
    .await;

    let agency_id = match result {
        Ok(r) => r.last_insert_id(),
        Err(e) if is_integrity_violation(&e) => {
            return Err(AppError::conflict("Agency name already exists"));
        }
        Err(e) => return Err(db_error("Failed to create agency")(e)),
    };

    let agency = fetch_agency(pool.get_ref(), agency_id)
        .await?
        .ok_or(AppError::Internal)?;
    cache.put(&agency).await;

    tracing::info!(agency_id, created_by = auth.user_id, "Agency created");
    Ok(HttpResponse::Created().json(agency))
}

#[utoipa::path(
    get,
    path = "/api/v1/agency",
    params(AgencyFilter),
    responses(
        (status = 200, description = "Paginated agency list", body = AgencyListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Agency"
)]
pub async fn list_agencies(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AgencyFilter>,
) -> Result<HttpResponse, AppError> {
    let bounds = PageBounds::new(query.page, query.per_page);

    let mut filter = WhereBuilder::new();
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        filter.and(
            "LOWER(name) LIKE ?",
            FilterValue::Str(format!("%{}%", search.to_lowercase())),
        );
    }

    let count_sql = format!("SELECT COUNT(*) FROM agencies{}", filter.sql());
    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count agencies"))?;

    let data_sql = format!(
        "SELECT {AGENCY_COLUMNS} FROM agencies{} ORDER BY name LIMIT ? OFFSET ?",
        filter.sql()
    );
    let data = filter
        .bind_rows(sqlx::query_as::<_, Agency>(&data_sql))
        .bind(bounds.per_page)
        .bind(bounds.offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to fetch agencies"))?;

    Ok(HttpResponse::Ok().json(AgencyListResponse {
        data,
        page: bounds.page,
        per_page: bounds.per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/agency/{agency_id}",
    params(("agency_id" = u64, Path, description = "Agency ID")),
    responses(
        (status = 200, description = "Agency found", body = Agency),
        (status = 404, description = "Agency not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Agency"
)]
pub async fn get_agency(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    match fetch_agency(pool.get_ref(), path.into_inner()).await? {
        Some(agency) => Ok(HttpResponse::Ok().json(agency)),
        None => Err(AppError::not_found("Agency not found")),
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/agency/{agency_id}",
    params(("agency_id" = u64, Path, description = "Agency ID")),
    request_body(content = Object, description = "Any subset of the agency fields"),
    responses(
        (status = 200, description = "Agency updated", body = Agency),
        (status = 400, description = "Invalid field"),
        (status = 404, description = "Agency not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Agency"
)]
pub async fn update_agency(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<AgencyCache>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;
    let agency_id = path.into_inner();

    let mut body = body.into_inner();
    prepare_patch(&mut body)?;
    let update = build_update_sql("agencies", UPDATABLE_COLUMNS, &body, "id", agency_id)?;

    let mut conn = pool
        .acquire()
        .await
        .map_err(db_error("Failed to acquire connection"))?;
    let affected = execute_update(&mut conn, update).await.map_err(|e| {
        if is_integrity_violation(&e) {
            AppError::conflict("Agency name already exists")
        } else {
            db_error("Failed to update agency")(e)
        }
    })?;

    // MySQL reports 0 affected rows for a no-op update, so re-read instead of trusting it.
    let agency = fetch_agency(pool.get_ref(), agency_id)
        .await?
        .ok_or_else(|| AppError::not_found("Agency not found"))?;

    cache.invalidate(agency_id).await;
    tracing::info!(agency_id, affected, updated_by = auth.user_id, "Agency updated");

    Ok(HttpResponse::Ok().json(agency))
}

#[utoipa::path(
    delete,
    path = "/api/v1/agency/{agency_id}",
    params(("agency_id" = u64, Path, description = "Agency ID")),
    responses(
        (status = 200, description = "Agency deleted", body = Object, example = json!({
            "message": "Agency deleted"
        })),
        (status = 404, description = "Agency not found"),
        (status = 409, description = "Agency still has practicum placements")
    ),
    security(("bearer_auth" = [])),
    tag = "Agency"
)]
pub async fn delete_agency(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<AgencyCache>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;
    let agency_id = path.into_inner();

    let result = sqlx::query("DELETE FROM agencies WHERE id = ?")
        .bind(agency_id)
        .execute(pool.get_ref())
        .await;

    let affected = match result {
        Ok(r) => r.rows_affected(),
        Err(e) if is_integrity_violation(&e) => {
            return Err(AppError::conflict("Agency still has practicum placements"));
        }
        Err(e) => return Err(db_error("Failed to delete agency")(e)),
    };

    if affected == 0 {
        return Err(AppError::not_found("Agency not found"));
    }

    cache.invalidate(agency_id).await;
    tracing::info!(agency_id, deleted_by = auth.user_id, "Agency deleted");

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Agency deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create(lat: Option<f64>, lng: Option<f64>, opening: Option<&str>) -> CreateAgency {
        CreateAgency {
            name: "Agency".into(),
            address: None,
            contact_person: None,
            contact_email: None,
            latitude: lat,
            longitude: lng,
            operating_days: Some("Monday,Friday".into()),
            opening_time: opening.map(str::to_string),
            closing_time: None,
            lunch_start_time: None,
            lunch_end_time: None,
        }
    }

    #[test]
    fn test_create_validation() {
        assert!(create(Some(14.0), Some(121.0), Some("08:00")).prepare().is_ok());
        assert!(create(None, None, None).prepare().is_ok());
        assert!(create(Some(14.0), None, None).prepare().is_err());
        assert!(create(Some(95.0), Some(121.0), None).prepare().is_err());
        assert!(create(None, None, Some("8 o'clock")).prepare().is_err());
    }

    #[test]
    fn test_create_stores_times_as_hh_mm() {
        let mut agency = create(None, None, Some(" 08:00:00 "));
        agency.lunch_end_time = Some("13:00:45".into());
        agency.closing_time = Some("   ".into());
        agency.prepare().unwrap();

        assert_eq!(agency.opening_time.as_deref(), Some("08:00"));
        assert_eq!(agency.lunch_end_time.as_deref(), Some("13:00"));
        assert_eq!(agency.closing_time, None);
    }

    #[test]
    fn test_patch_validation() {
        let check = |mut body: Value| prepare_patch(&mut body);
        assert!(check(json!({"opening_time": "07:30"})).is_ok());
        assert!(check(json!({"opening_time": "later"})).is_err());
        assert!(check(json!({"operating_days": "Someday"})).is_err());
        assert!(check(json!({"latitude": 14.0})).is_err());
        assert!(check(json!({"latitude": 14.0, "longitude": 121.0})).is_ok());
        assert!(check(json!({"name": "  "})).is_err());
    }

    #[test]
    fn test_patch_rejects_non_string_schedule_values() {
        let mut body = json!({"opening_time": 800});
        assert!(prepare_patch(&mut body).is_err());
        let mut body = json!({"operating_days": ["Monday"]});
        assert!(prepare_patch(&mut body).is_err());
        let mut body = json!({"name": 7});
        assert!(prepare_patch(&mut body).is_err());
    }

    #[test]
    fn test_patch_normalises_times() {
        let mut body = json!({
            "opening_time": "08:00:00",
            "closing_time": "",
            "lunch_start_time": null,
            "operating_days": " Monday,Friday "
        });
        prepare_patch(&mut body).unwrap();
        assert_eq!(body["opening_time"], "08:00");
        assert_eq!(body["closing_time"], Value::Null);
        assert_eq!(body["lunch_start_time"], Value::Null);
        assert_eq!(body["operating_days"], "Monday,Friday");
    }
}
