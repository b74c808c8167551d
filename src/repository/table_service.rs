use chrono::NaiveDate;
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Postgres, QueryBuilder, Row};

use crate::error::AppError;

/// Hard ceiling on a single page of rows. User-facing limits are clamped far
/// lower at the route layer; this bound exists for internal full-table reads
/// such as the dashboard aggregation, which must see every row to keep its
/// totals honest.
const MAX_PAGE_SIZE: i64 = 20_000;

const ALLOWED_TABLES: &[&str] = &[
    "app_users",
    "audit_logs",
    "clients",
    "expenses",
    "rental_payments",
    "rentals",
    "scooters",
];

/// Filter keys accept an operator suffix: `start_date__gte`, `name__ilike`.
/// Bare keys compare with equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOperator {
    Eq,
    Gte,
    Lte,
    ILike,
}

impl FilterOperator {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Gte => " >= ",
            Self::Lte => " <= ",
            Self::ILike => " ILIKE ",
        }
    }
}

pub async fn list_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    let table_name = validate_table(table)?;
    let order_name = if order_by.trim().is_empty() {
        "created_at"
    } else {
        validate_identifier(order_by)?
    };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");

    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter_clause(&mut query, key, value)?;
        }
    }

    query.push(" ORDER BY t.").push(order_name);
    query.push(if ascending { " ASC" } else { " DESC" });
    query
        .push(" LIMIT ")
        .push_bind(effective_limit(limit))
        .push(" OFFSET ")
        .push_bind(offset.max(0));

    let rows = query.build().fetch_all(pool).await.map_err(map_db_error)?;
    Ok(read_rows(rows))
}

pub async fn get_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE ");
    push_scalar(&mut query, "id", FilterOperator::Eq, &Value::String(row_id.to_string()));
    query.push(" LIMIT 1");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

/// Insert via `jsonb_populate_record` so Postgres resolves the column types
/// (uuid, enum, numeric, date) from the table definition.
pub async fn create_row(
    pool: &sqlx::PgPool,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {table_name} record."
        )));
    }
    let keys = sorted_valid_keys(payload)?;

    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(table_name).push(" (");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(key.as_str());
        }
    }
    query.push(") SELECT ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push("r.");
            separated.push_unseparated(key.as_str());
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query
        .push(") r RETURNING row_to_json(")
        .push(table_name)
        .push(".*) AS row");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::Internal(format!("Could not create {table_name} record.")))
}

pub async fn update_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let keys = sorted_valid_keys(payload)?;

    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query.push(table_name).push(" t SET ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(key.as_str());
            separated.push_unseparated(" = r.");
            separated.push_unseparated(key.as_str());
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query.push(") r WHERE ");
    push_scalar(&mut query, "id", FilterOperator::Eq, &Value::String(row_id.to_string()));
    query.push(" RETURNING row_to_json(t) AS row");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

/// Delete and return the removed row, erroring when it never existed.
pub async fn delete_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
) -> Result<Value, AppError> {
    let existing = get_row(pool, table, row_id).await?;
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query.push(table_name).push(" t WHERE ");
    push_scalar(&mut query, "id", FilterOperator::Eq, &Value::String(row_id.to_string()));
    query.build().execute(pool).await.map_err(map_db_error)?;

    Ok(existing)
}

pub async fn count_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
) -> Result<i64, AppError> {
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*)::bigint AS total FROM ");
    query.push(table_name).push(" t WHERE 1=1");

    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter_clause(&mut query, key, value)?;
        }
    }

    let row = query.build().fetch_one(pool).await.map_err(map_db_error)?;
    Ok(row.try_get::<i64, _>("total").unwrap_or(0))
}

fn effective_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_PAGE_SIZE)
}

fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .collect()
}

fn sorted_valid_keys(payload: &Map<String, Value>) -> Result<Vec<String>, AppError> {
    let mut keys = payload.keys().cloned().collect::<Vec<_>>();
    keys.sort_unstable();
    for key in &keys {
        validate_identifier(key)?;
    }
    Ok(keys)
}

fn validate_table(table: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(table)?;
    if ALLOWED_TABLES.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::Forbidden(format!(
        "Table '{normalized}' is not allowed."
    )))
}

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    let valid = !trimmed.is_empty()
        && !trimmed.starts_with(|first: char| first.is_ascii_digit())
        && trimmed.chars().all(|character| {
            character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
        });
    if valid {
        Ok(trimmed)
    } else {
        Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )))
    }
}

fn parse_filter_key(filter_key: &str) -> Result<(&str, FilterOperator), AppError> {
    if let Some((column, suffix)) = filter_key.rsplit_once("__") {
        let operator = match suffix {
            "gte" => Some(FilterOperator::Gte),
            "lte" => Some(FilterOperator::Lte),
            "ilike" => Some(FilterOperator::ILike),
            _ => None,
        };
        if let Some(operator) = operator {
            return Ok((validate_identifier(column)?, operator));
        }
    }
    Ok((validate_identifier(filter_key)?, FilterOperator::Eq))
}

fn push_filter_clause(
    query: &mut QueryBuilder<Postgres>,
    filter_key: &str,
    value: &Value,
) -> Result<(), AppError> {
    if value.is_null() {
        return Ok(());
    }
    let (column, operator) = parse_filter_key(filter_key)?;
    query.push(" AND ");
    push_scalar(query, column, operator, value);
    Ok(())
}

/// Bind a scalar filter with the right Postgres type: uuid columns (`id`,
/// `*_id`) bind as uuid when the value parses, `*_date` columns as dates,
/// numbers and booleans natively, everything else as text.
fn push_scalar(
    query: &mut QueryBuilder<Postgres>,
    column: &str,
    operator: FilterOperator,
    value: &Value,
) {
    query.push("t.").push(column);

    match value {
        Value::Bool(flag) => {
            query.push(operator.sql()).push_bind(*flag);
        }
        Value::Number(number) => {
            if let Some(as_i64) = number.as_i64() {
                query.push(operator.sql()).push_bind(as_i64);
            } else {
                query
                    .push(operator.sql())
                    .push_bind(number.as_f64().unwrap_or(0.0));
            }
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if is_uuid_column(column) {
                if let Ok(parsed) = uuid::Uuid::parse_str(trimmed) {
                    query.push(operator.sql()).push_bind(parsed);
                    return;
                }
            }
            if is_date_column(column) {
                if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
                    query.push(operator.sql()).push_bind(parsed);
                    return;
                }
            }
            query
                .push("::text")
                .push(operator.sql())
                .push_bind(trimmed.to_string());
        }
        _ => {
            query
                .push("::text")
                .push(operator.sql())
                .push_bind(value.to_string());
        }
    }
}

fn is_uuid_column(column: &str) -> bool {
    column == "id" || column.ends_with("_id")
}

fn is_date_column(column: &str) -> bool {
    column.ends_with("_date") || column == "date"
}

fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if message.contains("23505")
        || message
            .to_ascii_lowercase()
            .contains("duplicate key value violates unique constraint")
    {
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    AppError::Dependency("Database operation failed.".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value};
    use sqlx::{Postgres, QueryBuilder};

    use super::{
        effective_limit, parse_filter_key, validate_identifier, validate_table, FilterOperator,
        MAX_PAGE_SIZE,
    };

    #[test]
    fn identifier_validation() {
        assert!(validate_identifier("start_date").is_ok());
        assert!(validate_identifier(" rentals ").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("na me").is_err());
        assert!(validate_identifier("name; DROP TABLE rentals").is_err());
    }

    #[test]
    fn only_allow_listed_tables() {
        assert!(validate_table("rentals").is_ok());
        assert!(validate_table("scooters").is_ok());
        assert!(validate_table("pg_catalog").is_err());
    }

    #[test]
    fn operator_suffixes() {
        assert_eq!(
            parse_filter_key("start_date__gte").unwrap(),
            ("start_date", FilterOperator::Gte)
        );
        assert_eq!(
            parse_filter_key("name__ilike").unwrap(),
            ("name", FilterOperator::ILike)
        );
        assert_eq!(
            parse_filter_key("status").unwrap(),
            ("status", FilterOperator::Eq)
        );
        // Unknown suffixes fall back to equality on the raw key.
        assert_eq!(
            parse_filter_key("status__magic").unwrap(),
            ("status__magic", FilterOperator::Eq)
        );
    }

    #[test]
    fn page_size_admits_full_table_snapshots() {
        // Aggregation reads request every row; the ceiling must not shrink
        // them to a recent-rows window.
        assert_eq!(effective_limit(10_000), 10_000);
        assert_eq!(effective_limit(3_000), 3_000);
        assert_eq!(effective_limit(0), 1);
        assert_eq!(effective_limit(i64::MAX), MAX_PAGE_SIZE);
    }

    #[test]
    fn insert_sql_uses_jsonb_populate_record() {
        let mut payload = Map::new();
        payload.insert("name".to_string(), Value::String("City Rider".to_string()));
        payload.insert("daily_price".to_string(), Value::from(120));

        let mut keys = payload.keys().cloned().collect::<Vec<_>>();
        keys.sort_unstable();

        let mut query = QueryBuilder::<Postgres>::new("INSERT INTO scooters (");
        {
            let mut separated = query.separated(", ");
            for key in &keys {
                separated.push(key.as_str());
            }
        }
        query.push(") SELECT ");
        {
            let mut separated = query.separated(", ");
            for key in &keys {
                separated.push("r.");
                separated.push_unseparated(key.as_str());
            }
        }
        query.push(" FROM jsonb_populate_record(NULL::scooters, ");
        query.push_bind(Value::Object(payload));
        query.push(") r");

        let sql = query.sql();
        assert!(sql.contains("jsonb_populate_record(NULL::scooters"));
        assert!(sql.contains("SELECT r.daily_price, r.name"));
    }
}
