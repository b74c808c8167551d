use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::{require_role, require_user_id, ROLE_ADMIN, ROLE_STAFF},
    error::{AppError, AppResult},
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, non_empty_opt, remove_nulls, serialize_to_map, validate_input,
        CreateExpenseInput, ExpensePath, ExpensesQuery, UpdateExpenseInput,
    },
    services::{audit::write_audit_log, dates::is_valid_date},
    state::AppState,
};

const EXPENSE_CATEGORIES: &[&str] = &[
    "maintenance",
    "fuel",
    "insurance",
    "spare_parts",
    "salaries",
    "rent",
    "marketing",
    "other",
];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/expenses",
            axum::routing::get(list_expenses).post(create_expense),
        )
        .route(
            "/expenses/{expense_id}",
            axum::routing::get(get_expense)
                .patch(update_expense)
                .delete(delete_expense),
        )
}

async fn list_expenses(
    State(state): State<AppState>,
    Query(query): Query<ExpensesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(category) = non_empty_opt(query.category.as_deref()) {
        filters.insert("category".to_string(), Value::String(category));
    }
    if let Some(search) = non_empty_opt(query.search.as_deref()) {
        filters.insert(
            "label__ilike".to_string(),
            Value::String(format!("%{search}%")),
        );
    }
    if let Some(from_date) = non_empty_opt(query.from_date.as_deref()) {
        filters.insert("expense_date__gte".to_string(), Value::String(from_date));
    }
    if let Some(to_date) = non_empty_opt(query.to_date.as_deref()) {
        filters.insert("expense_date__lte".to_string(), Value::String(to_date));
    }

    let rows = list_rows(
        pool,
        "expenses",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "expense_date",
        false,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_expense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateExpenseInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let user = require_role(&state, &headers, &[ROLE_ADMIN, ROLE_STAFF]).await?;
    let pool = db_pool(&state)?;

    assert_known_category(&payload.category)?;
    if !is_valid_date(payload.expense_date.trim()) {
        return Err(AppError::BadRequest(
            "date must be a valid YYYY-MM-DD calendar date.".to_string(),
        ));
    }

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.insert(
        "created_by_user_id".to_string(),
        Value::String(user.id.clone()),
    );

    let created = create_row(pool, "expenses", &record).await?;
    let entity_id = value_str(&created, "id");

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "create",
        "expenses",
        Some(&entity_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;
    let row = get_row(pool, "expenses", &path.expense_id).await?;
    Ok(Json(row))
}

async fn update_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateExpenseInput>,
) -> AppResult<Json<Value>> {
    let user = require_role(&state, &headers, &[ROLE_ADMIN, ROLE_STAFF]).await?;
    let pool = db_pool(&state)?;

    if let Some(category) = payload.category.as_deref() {
        assert_known_category(category)?;
    }
    if let Some(date) = payload.expense_date.as_deref() {
        if !is_valid_date(date.trim()) {
            return Err(AppError::BadRequest(
                "date must be a valid YYYY-MM-DD calendar date.".to_string(),
            ));
        }
    }
    if payload.amount.is_some_and(|amount| amount <= 0.0) {
        return Err(AppError::BadRequest("amount must be positive.".to_string()));
    }

    let record = get_row(pool, "expenses", &path.expense_id).await?;
    let patch = remove_nulls(serialize_to_map(&payload));
    let updated = update_row(pool, "expenses", &path.expense_id, &patch).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "update",
        "expenses",
        Some(&path.expense_id),
        Some(record),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_role(&state, &headers, &[ROLE_ADMIN]).await?;
    let pool = db_pool(&state)?;

    let deleted = delete_row(pool, "expenses", &path.expense_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "delete",
        "expenses",
        Some(&path.expense_id),
        Some(deleted.clone()),
        None,
    )
    .await;

    Ok(Json(deleted))
}

fn assert_known_category(category: &str) -> AppResult<()> {
    if EXPENSE_CATEGORIES.contains(&category) {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "Unknown expense category '{category}'."
    )))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state
        .db_pool
        .as_ref()
        .ok_or_else(|| AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string()))
}

fn value_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}
