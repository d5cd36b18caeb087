use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::api::PageBounds;
use crate::auth::auth::AuthUser;
use crate::error::{AppError, db_error};
use crate::model::announcement::Announcement;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAnnouncement {
    #[schema(example = "Orientation on Monday")]
    pub title: String,
    #[schema(example = "Bring your signed MOA.")]
    pub body: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnnouncementQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct AnnouncementListResponse {
    pub data: Vec<Announcement>,
    pub page: u64,
    pub per_page: u64,
    pub total: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/announcement",
    params(AnnouncementQuery),
    responses(
        (status = 200, description = "Newest announcements first", body = AnnouncementListResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Announcement"
)]
pub async fn list_announcements(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AnnouncementQuery>,
) -> Result<HttpResponse, AppError> {
    let bounds = PageBounds::new(query.page, query.per_page);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM announcements")
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count announcements"))?;

    let data = sqlx::query_as::<_, Announcement>(
        r#"
        SELECT a.id, a.title, a.body, a.created_by, u.full_name AS author_name, a.created_at
        FROM announcements a
        JOIN users u ON u.id = a.created_by
        ORDER BY a.created_at DESC, a.id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(bounds.per_page)
    .bind(bounds.offset)
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to fetch announcements"))?;

    Ok(HttpResponse::Ok().json(AnnouncementListResponse {
        data,
        page: bounds.page,
        per_page: bounds.per_page,
        total,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/announcement",
    request_body = CreateAnnouncement,
    responses(
        (status = 201, description = "Announcement posted", body = Object, example = json!({
            "message": "Announcement posted",
            "announcement_id": 4
        })),
        (status = 400, description = "Empty title or body"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcement"
)]
pub async fn create_announcement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAnnouncement>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;

    let title = payload.title.trim();
    let body = payload.body.trim();
    if title.is_empty() || body.is_empty() {
        return Err(AppError::bad_request("title and body are required"));
    }

    let announcement_id = sqlx::query(
        "INSERT INTO announcements (title, body, created_by, created_at) \
         VALUES (?, ?, ?, UTC_TIMESTAMP())",
    )
    .bind(title)
    .bind(body)
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to create announcement"))?
    .last_insert_id();

    tracing::info!(announcement_id, created_by = auth.user_id, "Announcement posted");
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Announcement posted",
        "announcement_id": announcement_id
    })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/announcement/{announcement_id}",
    params(("announcement_id" = u64, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Announcement not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcement"
)]
pub async fn delete_announcement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.require_staff()?;
    let announcement_id = path.into_inner();

    let affected = sqlx::query("DELETE FROM announcements WHERE id = ?")
        .bind(announcement_id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to delete announcement"))?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::not_found("Announcement not found"));
    }

    tracing::info!(announcement_id, deleted_by = auth.user_id, "Announcement deleted");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Announcement deleted" })))
}
