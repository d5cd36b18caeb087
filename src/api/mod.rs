pub mod agency;
pub mod announcement;
pub mod attendance;
pub mod practicum;
pub mod requirement;

use sqlx::{MySql, mysql::MySqlArguments, query::QueryAs, query::QueryScalar};

pub const DEFAULT_PER_PAGE: u64 = 10;
pub const MAX_PER_PAGE: u64 = 100;

/// Normalised pagination: 1-based page, bounded page size, row offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub page: u64,
    pub per_page: u64,
    pub offset: u64,
}

impl PageBounds {
    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Self {
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let page = page.unwrap_or(1).max(1);
        Self {
            page,
            per_page,
            offset: (page - 1) * per_page,
        }
    }
}

/// Typed bind value for dynamically built WHERE clauses.
#[derive(Debug, Clone)]
pub enum FilterValue {
    U64(u64),
    Str(String),
    Date(chrono::NaiveDate),
}

/// Accumulates `AND column = ?` conditions with their bind values.
#[derive(Debug, Default)]
pub struct WhereBuilder {
    sql: String,
    args: Vec<FilterValue>,
}

impl WhereBuilder {
    pub fn new() -> Self {
        Self {
            sql: String::from(" WHERE 1=1"),
            args: Vec::new(),
        }
    }

    /// `condition` must contain exactly one `?` placeholder.
    pub fn and(&mut self, condition: &str, value: FilterValue) -> &mut Self {
        self.sql.push_str(" AND ");
        self.sql.push_str(condition);
        self.args.push(value);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bind_scalar<'q, T>(
        &self,
        mut q: QueryScalar<'q, MySql, T, MySqlArguments>,
    ) -> QueryScalar<'q, MySql, T, MySqlArguments> {
        for arg in &self.args {
            q = match arg.clone() {
                FilterValue::U64(v) => q.bind(v),
                FilterValue::Str(v) => q.bind(v),
                FilterValue::Date(v) => q.bind(v),
            };
        }
        q
    }

    pub fn bind_rows<'q, T>(
        &self,
        mut q: QueryAs<'q, MySql, T, MySqlArguments>,
    ) -> QueryAs<'q, MySql, T, MySqlArguments> {
        for arg in &self.args {
            q = match arg.clone() {
                FilterValue::U64(v) => q.bind(v),
                FilterValue::Str(v) => q.bind(v),
                FilterValue::Date(v) => q.bind(v),
            };
        }
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds_defaults_and_clamps() {
        assert_eq!(
            PageBounds::new(None, None),
            PageBounds {
                page: 1,
                per_page: 10,
                offset: 0
            }
        );
        assert_eq!(PageBounds::new(Some(0), Some(0)).offset, 0);
        assert_eq!(PageBounds::new(Some(0), Some(0)).per_page, 1);
        assert_eq!(PageBounds::new(Some(3), Some(500)).per_page, 100);
        assert_eq!(PageBounds::new(Some(3), Some(20)).offset, 40);
    }

    #[test]
    fn test_where_builder() {
        let mut w = WhereBuilder::new();
        w.and("student_id = ?", FilterValue::U64(4))
            .and("status = ?", FilterValue::Str("submitted".into()));
        assert_eq!(w.sql(), " WHERE 1=1 AND student_id = ? AND status = ?");
        assert_eq!(w.args.len(), 2);
    }
}
