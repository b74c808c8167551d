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
    repository::table_service::{count_rows, create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, non_empty_opt, remove_nulls, serialize_to_map, validate_input,
        CreateScooterInput, ScooterPath, ScootersQuery, UpdateScooterInput,
    },
    services::audit::write_audit_log,
    state::AppState,
};

const SCOOTER_STATUSES: &[&str] = &["available", "rented", "maintenance"];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/scooters",
            axum::routing::get(list_scooters).post(create_scooter),
        )
        .route(
            "/scooters/{scooter_id}",
            axum::routing::get(get_scooter)
                .patch(update_scooter)
                .delete(delete_scooter),
        )
}

async fn list_scooters(
    State(state): State<AppState>,
    Query(query): Query<ScootersQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        filters.insert("status".to_string(), Value::String(status));
    }

    let mut rows = list_rows(
        pool,
        "scooters",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 500),
        0,
        "created_at",
        false,
    )
    .await?;

    // Search spans name and model, applied in memory.
    if let Some(search) = non_empty_opt(query.search.as_deref()) {
        let needle = search.to_lowercase();
        rows.retain(|row| {
            value_str(row, "name").to_lowercase().contains(&needle)
                || value_str(row, "model").to_lowercase().contains(&needle)
        });
    }
    Ok(Json(json!({ "data": rows })))
}

async fn create_scooter(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateScooterInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let user = require_role(&state, &headers, &[ROLE_ADMIN, ROLE_STAFF]).await?;
    let pool = db_pool(&state)?;

    assert_known_status(&payload.status)?;

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, "scooters", &record).await?;
    let entity_id = value_str(&created, "id");

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "create",
        "scooters",
        Some(&entity_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_scooter(
    State(state): State<AppState>,
    Path(path): Path<ScooterPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;
    let row = get_row(pool, "scooters", &path.scooter_id).await?;
    Ok(Json(row))
}

async fn update_scooter(
    State(state): State<AppState>,
    Path(path): Path<ScooterPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateScooterInput>,
) -> AppResult<Json<Value>> {
    let user = require_role(&state, &headers, &[ROLE_ADMIN, ROLE_STAFF]).await?;
    let pool = db_pool(&state)?;

    if let Some(status) = payload.status.as_deref() {
        assert_known_status(status)?;
    }
    if payload.daily_price.is_some_and(|price| price < 0) {
        return Err(AppError::BadRequest(
            "daily_price cannot be negative.".to_string(),
        ));
    }

    let record = get_row(pool, "scooters", &path.scooter_id).await?;
    let patch = remove_nulls(serialize_to_map(&payload));
    let updated = update_row(pool, "scooters", &path.scooter_id, &patch).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "update",
        "scooters",
        Some(&path.scooter_id),
        Some(record),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_scooter(
    State(state): State<AppState>,
    Path(path): Path<ScooterPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_role(&state, &headers, &[ROLE_ADMIN]).await?;
    let pool = db_pool(&state)?;

    // Refuse to orphan rentals that still reference this scooter.
    let mut filters = Map::new();
    filters.insert(
        "scooter_id".to_string(),
        Value::String(path.scooter_id.clone()),
    );
    let rental_count = count_rows(pool, "rentals", Some(&filters)).await?;
    if rental_count > 0 {
        return Err(AppError::Conflict(format!(
            "Scooter has {rental_count} rental(s); delete or reassign them first."
        )));
    }

    let deleted = delete_row(pool, "scooters", &path.scooter_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "delete",
        "scooters",
        Some(&path.scooter_id),
        Some(deleted.clone()),
        None,
    )
    .await;

    Ok(Json(deleted))
}

fn assert_known_status(status: &str) -> AppResult<()> {
    if SCOOTER_STATUSES.contains(&status) {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "Unknown scooter status '{status}'."
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
