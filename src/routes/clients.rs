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
        ClientPath, ClientsQuery, CreateClientInput, UpdateClientInput,
    },
    services::audit::write_audit_log,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/clients",
            axum::routing::get(list_clients).post(create_client),
        )
        .route(
            "/clients/{client_id}",
            axum::routing::get(get_client)
                .patch(update_client)
                .delete(delete_client),
        )
}

async fn list_clients(
    State(state): State<AppState>,
    Query(query): Query<ClientsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut rows = list_rows(
        pool,
        "clients",
        None,
        clamp_limit_in_range(query.limit, 1, 500),
        0,
        "created_at",
        false,
    )
    .await?;

    // Search spans name and phone, so it is applied in memory rather than as
    // a single-column ILIKE.
    if let Some(search) = non_empty_opt(query.search.as_deref()) {
        let needle = search.to_lowercase();
        rows.retain(|row| {
            value_str(row, "full_name").to_lowercase().contains(&needle)
                || value_str(row, "phone").to_lowercase().contains(&needle)
        });
    }
    Ok(Json(json!({ "data": rows })))
}

async fn create_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateClientInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let user = require_role(&state, &headers, &[ROLE_ADMIN, ROLE_STAFF]).await?;
    let pool = db_pool(&state)?;

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, "clients", &record).await?;
    let entity_id = value_str(&created, "id");

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "create",
        "clients",
        Some(&entity_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_client(
    State(state): State<AppState>,
    Path(path): Path<ClientPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;
    let row = get_row(pool, "clients", &path.client_id).await?;
    Ok(Json(row))
}

async fn update_client(
    State(state): State<AppState>,
    Path(path): Path<ClientPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateClientInput>,
) -> AppResult<Json<Value>> {
    let user = require_role(&state, &headers, &[ROLE_ADMIN, ROLE_STAFF]).await?;
    let pool = db_pool(&state)?;

    if payload
        .full_name
        .as_deref()
        .is_some_and(|name| name.trim().is_empty())
    {
        return Err(AppError::BadRequest(
            "full_name cannot be empty.".to_string(),
        ));
    }

    let record = get_row(pool, "clients", &path.client_id).await?;
    let patch = remove_nulls(serialize_to_map(&payload));
    let updated = update_row(pool, "clients", &path.client_id, &patch).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "update",
        "clients",
        Some(&path.client_id),
        Some(record),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_client(
    State(state): State<AppState>,
    Path(path): Path<ClientPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_role(&state, &headers, &[ROLE_ADMIN]).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    filters.insert(
        "client_id".to_string(),
        Value::String(path.client_id.clone()),
    );
    let rental_count = count_rows(pool, "rentals", Some(&filters)).await?;
    if rental_count > 0 {
        return Err(AppError::Conflict(format!(
            "Client has {rental_count} rental(s); delete them first."
        )));
    }

    let deleted = delete_row(pool, "clients", &path.client_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "delete",
        "clients",
        Some(&path.client_id),
        Some(deleted.clone()),
        None,
    )
    .await;

    Ok(Json(deleted))
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
