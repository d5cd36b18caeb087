use chrono::NaiveDate;
use serde_json::Value;
use sqlx::MySqlConnection;

use crate::error::AppError;

/// SQL bindable value
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

/// Partial UPDATE statement with its bind values in order.
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Builds `UPDATE table SET a = ?, b = ? WHERE id_column = ?` from a JSON object.
///
/// Only keys listed in `allowed` may appear; they are the only text spliced into
/// the statement. Strings shaped like `YYYY-MM-DD` bind as dates.
pub fn build_update_sql(
    table: &str,
    allowed: &[&str],
    payload: &Value,
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, AppError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(AppError::bad_request("No fields provided for update"));
    }

    let mut columns = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        if !allowed.contains(&key.as_str()) {
            return Err(AppError::bad_request(format!("Field '{key}' cannot be updated")));
        }
        columns.push(format!("{key} = ?"));

        let value = match value {
            Value::String(s) => match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Ok(d) => SqlValue::Date(d),
                Err(_) => SqlValue::String(s.clone()),
            },
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::I64(i)
                } else if let Some(f) = n.as_f64() {
                    SqlValue::F64(f)
                } else {
                    return Err(AppError::bad_request(format!("Field '{key}' is out of range")));
                }
            }
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Null => SqlValue::Null,
            _ => {
                return Err(AppError::bad_request(format!(
                    "Unsupported JSON value type for '{key}'"
                )));
            }
        };
        values.push(value);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        columns.join(", "),
        id_column
    );
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// Executes the update and returns the affected row count.
pub async fn execute_update(
    conn: &mut MySqlConnection,
    update: SqlUpdate,
) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(conn).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALLOWED: &[&str] = &["name", "latitude", "opening_time", "end_date"];

    #[test]
    fn test_builds_statement_in_payload_order() {
        let update = build_update_sql(
            "agencies",
            ALLOWED,
            &json!({"name": "New", "latitude": 14.5, "end_date": "2026-05-01"}),
            "id",
            9,
        )
        .unwrap();

        assert!(update.sql.starts_with("UPDATE agencies SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert_eq!(update.values.len(), 4);
        assert!(update.values.contains(&SqlValue::String("New".into())));
        assert!(update.values.contains(&SqlValue::F64(14.5)));
        assert!(
            update
                .values
                .contains(&SqlValue::Date(NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()))
        );
        assert_eq!(update.values.last(), Some(&SqlValue::U64(9)));
    }

    #[test]
    fn test_rejects_unknown_column() {
        let err = build_update_sql("agencies", ALLOWED, &json!({"id; DROP": 1}), "id", 1)
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_rejects_empty_and_non_object() {
        assert!(build_update_sql("agencies", ALLOWED, &json!({}), "id", 1).is_err());
        assert!(build_update_sql("agencies", ALLOWED, &json!([1, 2]), "id", 1).is_err());
    }

    #[test]
    fn test_null_clears_column() {
        let update =
            build_update_sql("agencies", ALLOWED, &json!({"opening_time": null}), "id", 3).unwrap();
        assert_eq!(update.values[0], SqlValue::Null);
    }

    #[test]
    fn test_rejects_nested_values() {
        assert!(build_update_sql("agencies", ALLOWED, &json!({"name": {"x": 1}}), "id", 1).is_err());
    }
}
