use crate::{
    auth::{
        auth::AuthUser,
        jwt::{TokenType, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{AppError, db_error, is_integrity_violation},
    model::{
        role::Role,
        user::{UserProfileRow, UserRow},
    },
    utils::username_registry,
};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 32;

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "juan.dc")]
    pub username: String,
    #[schema(example = "s3cret-pass")]
    pub password: String,
    #[schema(example = "Juan Dela Cruz")]
    pub full_name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    #[schema(example = "prof.santos")]
    pub username: String,
    pub password: String,
    #[schema(example = "Maria Santos")]
    pub full_name: String,
    pub role: Role,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "juan.dc")]
    pub username: String,
    #[schema(example = "s3cret-pass")]
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Access token lifetime in seconds
    #[schema(example = 900)]
    pub expires_in: usize,
}

#[derive(Serialize, ToSchema)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    pub role: Role,
    pub full_name: String,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_at: Option<DateTime<Utc>>,
}

fn validate_credentials(username: &str, password: &str) -> Result<(), AppError> {
    if username.is_empty() || password.is_empty() {
        return Err(AppError::bad_request(
            "Username and password must not be empty",
        ));
    }
    if username.len() > MAX_USERNAME_LEN
        || !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(AppError::bad_request(
            "Username may contain only letters, digits, '.', '_' and '-' (max 32)",
        ));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(
            "Password must be at least 8 characters",
        ));
    }
    Ok(())
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn token_error(e: jsonwebtoken::errors::Error) -> AppError {
    error!(error = %e, "Failed to sign token");
    AppError::Internal
}

/// Inserts a user after the availability check and records the name in the registry.
async fn insert_user(
    pool: &MySqlPool,
    username: &str,
    password: &str,
    full_name: &str,
    role: Role,
) -> Result<u64, AppError> {
    let available = username_registry::is_available(username, pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Username availability check failed");
            AppError::Internal
        })?;
    if !available {
        return Err(AppError::conflict("Username already taken"));
    }

    let hashed = hash_password(password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        AppError::Internal
    })?;

    let result = sqlx::query(
        "INSERT INTO users (username, password, role_id, full_name) VALUES (?, ?, ?, ?)",
    )
    .bind(username_registry::normalize(username))
    .bind(hashed)
    .bind(role.id())
    .bind(full_name)
    .execute(pool)
    .await;

    match result {
        Ok(r) => {
            username_registry::mark_taken(username).await;
            Ok(r.last_insert_id())
        }
        Err(e) if is_integrity_violation(&e) => Err(AppError::conflict("Username already exists")),
        Err(e) => Err(db_error("Failed to insert user")(e)),
    }
}

async fn store_refresh_token(
    pool: &MySqlPool,
    user_id: u64,
    jti: &str,
    exp: usize,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user_id)
    .bind(jti)
    .bind(exp as i64)
    .execute(pool)
    .await
    .map_err(db_error("Failed to store refresh token"))?;
    Ok(())
}

async fn issue_tokens(
    pool: &MySqlPool,
    config: &Config,
    user_id: u64,
    username: &str,
    role: Role,
) -> Result<TokenResponse, AppError> {
    let access_token = generate_access_token(
        user_id,
        username,
        role,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(token_error)?;

    let (refresh_token, refresh_claims) = generate_refresh_token(
        user_id,
        username,
        role,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(token_error)?;

    debug!(user_id, jti = %refresh_claims.jti, "Storing refresh token");
    store_refresh_token(pool, user_id, &refresh_claims.jti, refresh_claims.exp).await?;

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".into(),
        expires_in: config.access_token_ttl,
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Student account created", body = Object, example = json!({
            "message": "User registered successfully",
            "user_id": 12
        })),
        (status = 400, description = "Invalid username or password"),
        (status = 409, description = "Username already taken")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip_all, fields(username = %payload.username))]
pub async fn register(
    payload: web::Json<RegisterRequest>,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, AppError> {
    let username = payload.username.trim();
    validate_credentials(username, &payload.password)?;
    let full_name = payload.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::bad_request("full_name is required"));
    }

    // Self-registration always yields a student.
    let user_id = insert_user(
        pool.get_ref(),
        username,
        &payload.password,
        full_name,
        Role::Student,
    )
    .await?;

    info!(user_id, "Student registered");
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "User registered successfully",
        "user_id": user_id
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = Object, example = json!({
            "message": "User created",
            "user_id": 2
        })),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Username already taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn create_user(
    auth: AuthUser,
    payload: web::Json<CreateUserRequest>,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;

    let username = payload.username.trim();
    validate_credentials(username, &payload.password)?;
    let full_name = payload.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::bad_request("full_name is required"));
    }

    let user_id = insert_user(
        pool.get_ref(),
        username,
        &payload.password,
        full_name,
        payload.role,
    )
    .await?;

    info!(user_id, role = payload.role.as_ref(), created_by = auth.user_id, "User created");
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "User created",
        "user_id": user_id
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access and refresh tokens", body = TokenResponse),
        (status = 400, description = "Missing credentials"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, payload),
    fields(username = %payload.username)
)]
pub async fn login(
    payload: web::Json<LoginRequest>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    info!("Login request received");

    let username = username_registry::normalize(&payload.username);
    if username.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("Username or password required"));
    }

    let user = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, username, password, role_id, full_name
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(&username)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Database error while fetching user"))?
    .ok_or_else(|| {
        info!("Invalid credentials: user not found");
        AppError::Unauthorized("Invalid credentials".into())
    })?;

    if let Err(e) = verify_password(&payload.password, &user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let role = Role::from_id(user.role_id).ok_or_else(|| {
        error!(user_id = user.id, role_id = user.role_id, "User has unknown role");
        AppError::Internal
    })?;

    let tokens = issue_tokens(pool.get_ref(), &config, user.id, &user.username, role).await?;

    // Not fatal: the tokens are already issued.
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = UTC_TIMESTAMP() WHERE id = ?")
        .bind(user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = user.id, full_name = %user.full_name, "Login successful");
    Ok(HttpResponse::Ok().json(tokens))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    responses(
        (status = 200, description = "Rotated tokens", body = TokenResponse),
        (status = 401, description = "Missing, invalid, expired or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(name = "auth_refresh", skip_all)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let unauthorized = || AppError::Unauthorized("Invalid refresh token".into());

    let token = bearer_token(&req).ok_or_else(unauthorized)?;
    let claims = verify_token(token, &config.jwt_secret).map_err(|e| {
        debug!(error = %e, "Refresh token rejected");
        unauthorized()
    })?;
    if claims.token_type != TokenType::Refresh {
        return Err(unauthorized());
    }

    // Revoking with a guard makes a replayed token lose the race.
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = 1
        WHERE jti = ? AND revoked = 0 AND expires_at > NOW()
        "#,
    )
    .bind(&claims.jti)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to revoke refresh token"))?
    .rows_affected();

    if revoked == 0 {
        warn!(user_id = claims.user_id, jti = %claims.jti, "Refresh token reuse or unknown jti");
        return Err(unauthorized());
    }

    // Re-read the role so a demotion takes effect at the next rotation.
    let role_id: Option<u8> = sqlx::query_scalar("SELECT role_id FROM users WHERE id = ?")
        .bind(claims.user_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(db_error("Failed to load user for refresh"))?;
    let role = role_id.and_then(Role::from_id).ok_or_else(unauthorized)?;

    let tokens = issue_tokens(pool.get_ref(), &config, claims.user_id, &claims.sub, role).await?;

    info!(user_id = claims.user_id, "Refresh token rotated");
    Ok(HttpResponse::Ok().json(tokens))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 204, description = "Refresh token revoked (idempotent)")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer_token(&req) else {
        return HttpResponse::NoContent().finish();
    };
    let Ok(claims) = verify_token(token, &config.jwt_secret) else {
        return HttpResponse::NoContent().finish();
    };
    if claims.token_type != TokenType::Refresh {
        return HttpResponse::NoContent().finish();
    }

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<HttpResponse, AppError> {
    let row = sqlx::query_as::<_, UserProfileRow>(
        "SELECT id, username, role_id, full_name, last_login_at FROM users WHERE id = ?",
    )
    .bind(auth.user_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Failed to fetch profile"))?
    .ok_or_else(|| AppError::not_found("User not found"))?;

    let role = Role::from_id(row.role_id).ok_or(AppError::Internal)?;

    Ok(HttpResponse::Ok().json(UserProfile {
        id: row.id,
        username: row.username,
        role,
        full_name: row.full_name,
        last_login_at: row.last_login_at,
    }))
}
