use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Row of the `users` table as read during login.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub role_id: u8,
    pub full_name: String,
}

/// Public part of a user.
#[derive(Debug, FromRow)]
pub struct UserProfileRow {
    pub id: u64,
    pub username: String,
    pub role_id: u8,
    pub full_name: String,
    pub last_login_at: Option<DateTime<Utc>>,
}
