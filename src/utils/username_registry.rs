//! Fast username availability checks for registration.
//!
//! A cuckoo filter answers "definitely free" without touching the database,
//! a moka cache answers "recently seen as taken", and MySQL settles the rest.

use anyhow::{Context, Result};
use autoscale_cuckoo_filter::CuckooFilter;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::{sync::RwLock, time::Duration};
use tracing::{info, warn};

const FILTER_CAPACITY: usize = 50_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static USERNAME_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

/// Usernames known to be taken.
static TAKEN_CACHE: Lazy<Cache<String, ()>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(Duration::from_secs(86_400))
        .build()
});

#[inline]
pub fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}

fn filter_might_contain(username: &str) -> bool {
    match USERNAME_FILTER.read() {
        Ok(filter) => filter.contains(&username.to_string()),
        // A poisoned filter can only produce false negatives; fall through to the database.
        Err(_) => true,
    }
}

fn filter_add_all<'a>(usernames: impl IntoIterator<Item = &'a String>) {
    match USERNAME_FILTER.write() {
        Ok(mut filter) => {
            for username in usernames {
                filter.add(username);
            }
        }
        Err(_) => warn!("Username filter lock poisoned; skipping insert"),
    }
}

/// Records a freshly registered username in both tiers.
pub async fn mark_taken(username: &str) {
    let username = normalize(username);
    filter_add_all([&username]);
    TAKEN_CACHE.insert(username, ()).await;
}

/// `true` when nobody has registered `username` yet.
pub async fn is_available(username: &str, pool: &MySqlPool) -> Result<bool> {
    let username = normalize(username);

    if !filter_might_contain(&username) {
        return Ok(true);
    }

    if TAKEN_CACHE.contains_key(&username) {
        return Ok(false);
    }

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ? LIMIT 1)",
    )
    .bind(&username)
    .fetch_one(pool)
    .await
    .context("Username lookup failed")?
        != 0;

    if exists {
        TAKEN_CACHE.insert(username, ()).await;
    }

    Ok(!exists)
}

/// Streams every username into the filter, and recently active ones into the cache.
pub async fn warmup(pool: &MySqlPool, recent_days: u32, batch_size: usize) -> Result<()> {
    let batch_size = batch_size.max(1);
    let mut stream = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT username,
               COALESCE(last_login_at >= NOW() - INTERVAL ? DAY, 0) AS recent
        FROM users
        "#,
    )
    .bind(recent_days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut recent = Vec::new();
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (username, is_recent) = row.context("Username warmup row fetch failed")?;
        let username = normalize(&username);
        if is_recent != 0 {
            recent.push(username.clone());
        }
        batch.push(username);
        total += 1;

        if batch.len() == batch_size {
            filter_add_all(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        filter_add_all(&batch);
    }

    futures::future::join_all(recent.iter().map(|u| TAKEN_CACHE.insert(u.clone(), ()))).await;

    info!(
        total,
        recent = recent.len(),
        recent_days,
        "Username registry warmup complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Ana.Cruz "), "ana.cruz");
    }

    #[actix_web::test]
    async fn test_mark_taken_reaches_both_tiers() {
        mark_taken("Registry-Test-User").await;
        assert!(filter_might_contain("registry-test-user"));
        assert!(TAKEN_CACHE.contains_key("registry-test-user"));
    }

    #[test]
    fn test_unknown_name_is_not_in_filter() {
        assert!(!filter_might_contain("never-registered-7f3a9c"));
    }
}
