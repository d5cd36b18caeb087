use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::api::{FilterValue, PageBounds, WhereBuilder};
use crate::auth::auth::AuthUser;
use crate::error::{AppError, db_error, is_integrity_violation};
use crate::model::requirement::{
    ChecklistItem, ChecklistRow, Requirement, RequirementStatus, RequirementTemplate,
};

const REQUIREMENT_COLUMNS: &str = "r.id, r.student_id, r.template_id, t.title AS template_title, \
     r.file_url, r.status, r.feedback, r.submitted_at, r.reviewed_at";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTemplate {
    #[schema(example = "Medical Certificate")]
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_mandatory")]
    pub is_mandatory: bool,
}

fn default_mandatory() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitRequirement {
    #[schema(example = 1)]
    pub template_id: u64,
    #[schema(example = "https://files.example.com/req/12.pdf")]
    pub file_url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequirement {
    #[schema(example = "Looks good")]
    pub feedback: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct RequirementFilter {
    /// Filter by student ID
    pub student_id: Option<u64>,
    /// Filter by template ID
    pub template_id: Option<u64>,
    /// submitted, approved or rejected
    pub status: Option<RequirementStatus>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Items per page
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct RequirementListResponse {
    pub data: Vec<Requirement>,
    pub page: u64,
    pub per_page: u64,
    pub total: i64,
}

fn validate_file_url(url: &str) -> Result<(), AppError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(AppError::bad_request("file_url is required"));
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(AppError::bad_request("file_url must be an http(s) URL"));
    }
    Ok(())
}

async fn fetch_requirement(pool: &MySqlPool, requirement_id: u64) -> Result<Requirement, AppError> {
    let sql = format!(
        "SELECT {REQUIREMENT_COLUMNS} FROM requirements r \
         JOIN requirement_templates t ON t.id = r.template_id WHERE r.id = ?"
    );
    sqlx::query_as::<_, Requirement>(&sql)
        .bind(requirement_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to fetch requirement"))?
        .ok_or_else(|| AppError::not_found("Requirement not found"))
}

#[utoipa::path(
    get,
    path = "/api/v1/requirement/template",
    responses(
        (status = 200, description = "All requirement templates", body = [RequirementTemplate])
    ),
    security(("bearer_auth" = [])),
    tag = "Requirement"
)]
pub async fn list_templates(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, AppError> {
    let templates = sqlx::query_as::<_, RequirementTemplate>(
        "SELECT id, title, description, is_mandatory, created_at \
         FROM requirement_templates ORDER BY id",
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to fetch requirement templates"))?;

    Ok(HttpResponse::Ok().json(templates))
}

#[utoipa::path(
    post,
    path = "/api/v1/requirement/template",
    request_body = CreateTemplate,
    responses(
        (status = 201, description = "Template created", body = Object, example = json!({
            "message": "Template created",
            "template_id": 1
        })),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Template title already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Requirement"
)]
pub async fn create_template(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTemplate>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title is required"));
    }

    let result = sqlx::query(
        "INSERT INTO requirement_templates (title, description, is_mandatory) VALUES (?, ?, ?)",
    )
    .bind(title)
    .bind(&payload.description)
    .bind(payload.is_mandatory)
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(r) => {
            let template_id = r.last_insert_id();
            tracing::info!(template_id, created_by = auth.user_id, "Requirement template created");
            Ok(HttpResponse::Created().json(serde_json::json!({
                "message": "Template created",
                "template_id": template_id
            })))
        }
        Err(e) if is_integrity_violation(&e) => {
            Err(AppError::conflict("Template title already exists"))
        }
        Err(e) => Err(db_error("Failed to create requirement template")(e)),
    }
}

/// Approved submissions are final; anything else may be replaced.
fn ensure_resubmittable(current_status: Option<&str>) -> Result<(), AppError> {
    if current_status == Some(RequirementStatus::Approved.as_ref()) {
        return Err(AppError::bad_request("Requirement already approved"));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/v1/requirement",
    request_body = SubmitRequirement,
    responses(
        (status = 200, description = "Submitted (or resubmitted)", body = Requirement),
        (status = 400, description = "Invalid input or already approved"),
        (status = 403, description = "Students only"),
        (status = 404, description = "Template not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Requirement"
)]
pub async fn submit_requirement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SubmitRequirement>,
) -> Result<HttpResponse, AppError> {
    let student_id = auth.require_student()?;
    validate_file_url(&payload.file_url)?;

    let mut tx = pool
        .begin()
        .await
        .map_err(db_error("Failed to start transaction"))?;

    // Locked so a concurrent approval cannot slip in before the upsert.
    let current: Option<String> = sqlx::query_scalar(
        "SELECT status FROM requirements WHERE student_id = ? AND template_id = ? FOR UPDATE",
    )
    .bind(student_id)
    .bind(payload.template_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_error("Failed to check existing requirement"))?;

    ensure_resubmittable(current.as_deref())?;

    let result = sqlx::query(
        r#"
        INSERT INTO requirements (student_id, template_id, file_url, status, submitted_at)
        VALUES (?, ?, ?, ?, UTC_TIMESTAMP())
        ON DUPLICATE KEY UPDATE
            file_url = VALUES(file_url),
            status = VALUES(status),
            feedback = NULL,
            reviewed_at = NULL,
            submitted_at = UTC_TIMESTAMP()
        "#,
    )
    .bind(student_id)
    .bind(payload.template_id)
    .bind(payload.file_url.trim())
    .bind(RequirementStatus::Submitted.as_ref())
    .execute(&mut *tx)
    .await;

    match result {
        Ok(_) => {}
        // Unknown template_id trips the foreign key.
        Err(e) if is_integrity_violation(&e) => {
            return Err(AppError::not_found("Requirement template not found"));
        }
        Err(e) => return Err(db_error("Failed to submit requirement")(e)),
    }

    tx.commit()
        .await
        .map_err(db_error("Failed to commit requirement"))?;

    let sql = format!(
        "SELECT {REQUIREMENT_COLUMNS} FROM requirements r \
         JOIN requirement_templates t ON t.id = r.template_id \
         WHERE r.student_id = ? AND r.template_id = ?"
    );
    let requirement = sqlx::query_as::<_, Requirement>(&sql)
        .bind(student_id)
        .bind(payload.template_id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to reload requirement"))?;

    tracing::info!(
        requirement_id = requirement.id,
        student_id,
        template_id = payload.template_id,
        resubmission = current.is_some(),
        "Requirement submitted"
    );
    Ok(HttpResponse::Ok().json(requirement))
}

#[utoipa::path(
    get,
    path = "/api/v1/requirement/me",
    responses(
        (status = 200, description = "Every template with the caller's submission status", body = [ChecklistItem]),
        (status = 403, description = "Students only")
    ),
    security(("bearer_auth" = [])),
    tag = "Requirement"
)]
pub async fn my_requirements(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, AppError> {
    let student_id = auth.require_student()?;

    let rows = sqlx::query_as::<_, ChecklistRow>(
        r#"
        SELECT t.id AS template_id, t.title, t.is_mandatory,
               r.id AS requirement_id, r.file_url, r.status, r.feedback
        FROM requirement_templates t
        LEFT JOIN requirements r ON r.template_id = t.id AND r.student_id = ?
        ORDER BY t.id
        "#,
    )
    .bind(student_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to fetch requirement checklist"))?;

    let items: Vec<ChecklistItem> = rows.into_iter().map(ChecklistItem::from).collect();
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    get,
    path = "/api/v1/requirement",
    params(RequirementFilter),
    responses(
        (status = 200, description = "Paginated submissions", body = RequirementListResponse),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Requirement"
)]
pub async fn list_requirements(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequirementFilter>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;
    let bounds = PageBounds::new(query.page, query.per_page);

    let mut filter = WhereBuilder::new();
    if let Some(student_id) = query.student_id {
        filter.and("r.student_id = ?", FilterValue::U64(student_id));
    }
    if let Some(template_id) = query.template_id {
        filter.and("r.template_id = ?", FilterValue::U64(template_id));
    }
    if let Some(status) = query.status {
        filter.and("r.status = ?", FilterValue::Str(status.as_ref().to_string()));
    }

    let from = " FROM requirements r JOIN requirement_templates t ON t.id = r.template_id";

    let count_sql = format!("SELECT COUNT(*){from}{}", filter.sql());
    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count requirements"))?;

    let data_sql = format!(
        "SELECT {REQUIREMENT_COLUMNS}{from}{} ORDER BY r.submitted_at DESC LIMIT ? OFFSET ?",
        filter.sql()
    );
    let data = filter
        .bind_rows(sqlx::query_as::<_, Requirement>(&data_sql))
        .bind(bounds.per_page)
        .bind(bounds.offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to fetch requirements"))?;

    Ok(HttpResponse::Ok().json(RequirementListResponse {
        data,
        page: bounds.page,
        per_page: bounds.per_page,
        total,
    }))
}

async fn review(
    auth: &AuthUser,
    pool: &MySqlPool,
    requirement_id: u64,
    outcome: RequirementStatus,
    feedback: Option<&str>,
) -> Result<Requirement, AppError> {
    auth.require_staff()?;

    let affected = sqlx::query(
        "UPDATE requirements SET status = ?, feedback = ?, reviewed_at = UTC_TIMESTAMP() \
         WHERE id = ? AND status = ?",
    )
    .bind(outcome.as_ref())
    .bind(feedback)
    .bind(requirement_id)
    .bind(RequirementStatus::Submitted.as_ref())
    .execute(pool)
    .await
    .map_err(db_error("Failed to review requirement"))?
    .rows_affected();

    if affected == 0 {
        // Distinguish a missing row from one that is not awaiting review.
        fetch_requirement(pool, requirement_id).await?;
        return Err(AppError::bad_request("Requirement is not awaiting review"));
    }

    tracing::info!(
        requirement_id,
        outcome = outcome.as_ref(),
        reviewed_by = auth.user_id,
        "Requirement reviewed"
    );
    fetch_requirement(pool, requirement_id).await
}

#[utoipa::path(
    put,
    path = "/api/v1/requirement/{requirement_id}/approve",
    params(("requirement_id" = u64, Path, description = "Requirement ID")),
    request_body = ReviewRequirement,
    responses(
        (status = 200, description = "Approved", body = Requirement),
        (status = 400, description = "Not awaiting review"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Requirement not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Requirement"
)]
pub async fn approve_requirement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ReviewRequirement>,
) -> Result<HttpResponse, AppError> {
    let requirement = review(
        &auth,
        pool.get_ref(),
        path.into_inner(),
        RequirementStatus::Approved,
        payload.feedback.as_deref(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(requirement))
}

#[utoipa::path(
    put,
    path = "/api/v1/requirement/{requirement_id}/reject",
    params(("requirement_id" = u64, Path, description = "Requirement ID")),
    request_body = ReviewRequirement,
    responses(
        (status = 200, description = "Rejected", body = Requirement),
        (status = 400, description = "Not awaiting review or missing feedback"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Requirement not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Requirement"
)]
pub async fn reject_requirement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ReviewRequirement>,
) -> Result<HttpResponse, AppError> {
    let feedback = payload
        .feedback
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::bad_request("feedback is required when rejecting"))?;

    let requirement = review(
        &auth,
        pool.get_ref(),
        path.into_inner(),
        RequirementStatus::Rejected,
        Some(feedback),
    )
    .await?;
    Ok(HttpResponse::Ok().json(requirement))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_url_validation() {
        assert!(validate_file_url("https://files.example.com/a.pdf").is_ok());
        assert!(validate_file_url("   ").is_err());
        assert!(validate_file_url("ftp://files/a.pdf").is_err());
    }

    #[test]
    fn test_only_approved_submissions_are_final() {
        assert!(ensure_resubmittable(None).is_ok());
        assert!(ensure_resubmittable(Some("submitted")).is_ok());
        assert!(ensure_resubmittable(Some("rejected")).is_ok());
        assert!(matches!(
            ensure_resubmittable(Some("approved")),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_template_defaults_to_mandatory() {
        let t: CreateTemplate = serde_json::from_value(json!({ "title": "Resume" })).unwrap();
        assert!(t.is_mandatory);
    }

    #[test]
    fn test_filter_status_is_lowercase() {
        let f: RequirementFilter =
            serde_json::from_value(json!({ "status": "submitted" })).unwrap();
        assert_eq!(f.status, Some(RequirementStatus::Submitted));
    }
}
