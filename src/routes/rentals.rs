use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::{
    auth::{require_role, require_user_id, ROLE_ADMIN, ROLE_STAFF},
    error::{AppError, AppResult},
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, non_empty_opt, remove_nulls, serialize_to_map, validate_input,
        CreateRentalInput, RecordPaymentInput, RentalPath, RentalsQuery, UpdateRentalInput,
    },
    services::{
        audit::write_audit_log,
        dates::{format_date_display, is_overdue, is_valid_date},
        payments::{derive_payment_status, remaining_balance},
        pricing::calculate_rental_price,
    },
    state::AppState,
};

const RENTAL_STATUSES: &[&str] = &["active", "completed", "cancelled"];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/rentals",
            axum::routing::get(list_rentals).post(create_rental),
        )
        .route(
            "/rentals/{rental_id}",
            axum::routing::get(get_rental)
                .patch(update_rental)
                .delete(delete_rental),
        )
        .route(
            "/rentals/{rental_id}/complete",
            axum::routing::post(complete_rental),
        )
        .route(
            "/rentals/{rental_id}/cancel",
            axum::routing::post(cancel_rental),
        )
        .route(
            "/rentals/{rental_id}/payments",
            axum::routing::get(list_payments).post(record_payment),
        )
}

async fn list_rentals(
    State(state): State<AppState>,
    Query(query): Query<RentalsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        filters.insert("status".to_string(), Value::String(status));
    }
    if let Some(scooter_id) = non_empty_opt(query.scooter_id.as_deref()) {
        filters.insert("scooter_id".to_string(), Value::String(scooter_id));
    }
    if let Some(client_id) = non_empty_opt(query.client_id.as_deref()) {
        filters.insert("client_id".to_string(), Value::String(client_id));
    }
    if let Some(from_date) = non_empty_opt(query.from_date.as_deref()) {
        filters.insert("start_date__gte".to_string(), Value::String(from_date));
    }
    if let Some(to_date) = non_empty_opt(query.to_date.as_deref()) {
        filters.insert("start_date__lte".to_string(), Value::String(to_date));
    }

    let rows = list_rows(
        pool,
        "rentals",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "created_at",
        false,
    )
    .await?;

    let today = today_iso();
    let mut decorated: Vec<Value> = rows
        .into_iter()
        .map(|row| decorate_rental(row, &today))
        .collect();

    // payment_status is derived, not stored, so it is filtered post-query.
    if let Some(wanted) = non_empty_opt(query.payment_status.as_deref()) {
        decorated.retain(|row| value_str(row, "payment_status") == wanted);
    }

    Ok(Json(json!({ "data": decorated })))
}

async fn create_rental(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRentalInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let user = require_role(&state, &headers, &[ROLE_ADMIN, ROLE_STAFF]).await?;
    let pool = db_pool(&state)?;

    assert_date_range(&payload.start_date, &payload.end_date)?;

    let scooter = get_row(pool, "scooters", &payload.scooter_id).await?;
    if value_str(&scooter, "status") == "rented" {
        return Err(AppError::Conflict(
            "Scooter is already rented out.".to_string(),
        ));
    }
    // Client must exist before the rental references it.
    get_row(pool, "clients", &payload.client_id).await?;

    let scooter_name = value_str(&scooter, "name");
    let daily_price = payload
        .daily_price
        .unwrap_or_else(|| number_from_value(scooter.get("daily_price")) as i64);
    let total_price = calculate_rental_price(
        daily_price,
        &payload.start_date,
        &payload.end_date,
        Some(&scooter_name),
    );

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.insert("daily_price".to_string(), json!(daily_price));
    record.insert("total_price".to_string(), json!(total_price));
    record.insert("status".to_string(), Value::String("active".to_string()));
    record.insert(
        "created_by_user_id".to_string(),
        Value::String(user.id.clone()),
    );

    let created = create_row(pool, "rentals", &record).await?;
    let rental_id = value_str(&created, "id");

    // Up-front money is tracked like any later instalment.
    if payload.amount_paid > 0.0 && !rental_id.is_empty() {
        let mut payment = Map::new();
        payment.insert("rental_id".to_string(), Value::String(rental_id.clone()));
        payment.insert("amount".to_string(), json!(payload.amount_paid));
        payment.insert("paid_on".to_string(), Value::String(today_iso()));
        log_best_effort(
            create_row(pool, "rental_payments", &payment).await,
            "record initial payment",
            &rental_id,
        );
    }

    flip_scooter_status(pool, &payload.scooter_id, "rented").await;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "create",
        "rentals",
        Some(&rental_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(decorate_rental(created, &today_iso())),
    ))
}

async fn get_rental(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let row = get_row(pool, "rentals", &path.rental_id).await?;
    let mut decorated = decorate_rental(row, &today_iso());

    let payments = rental_payment_rows(pool, &path.rental_id).await?;
    if let Some(object) = decorated.as_object_mut() {
        object.insert("payments".to_string(), Value::Array(payments));
    }
    Ok(Json(decorated))
}

async fn update_rental(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateRentalInput>,
) -> AppResult<Json<Value>> {
    let user = require_role(&state, &headers, &[ROLE_ADMIN, ROLE_STAFF]).await?;
    let pool = db_pool(&state)?;

    if payload.daily_price.is_some_and(|price| price < 0) {
        return Err(AppError::BadRequest(
            "daily_price cannot be negative.".to_string(),
        ));
    }

    let record = get_row(pool, "rentals", &path.rental_id).await?;
    if value_str(&record, "status") != "active" {
        return Err(AppError::Conflict(
            "Only active rentals can be edited.".to_string(),
        ));
    }

    let mut patch = remove_nulls(serialize_to_map(&payload));

    // Re-price whenever the dates or the rate change.
    let reprice = patch.contains_key("start_date")
        || patch.contains_key("end_date")
        || patch.contains_key("daily_price");
    if reprice {
        let start_date = string_from_map(&patch, "start_date")
            .unwrap_or_else(|| value_str(&record, "start_date"));
        let end_date = string_from_map(&patch, "end_date")
            .unwrap_or_else(|| value_str(&record, "end_date"));
        assert_date_range(&start_date, &end_date)?;

        let daily_price = payload
            .daily_price
            .unwrap_or_else(|| number_from_value(record.get("daily_price")) as i64);

        let scooter_id = value_str(&record, "scooter_id");
        let scooter_name = if scooter_id.is_empty() {
            String::new()
        } else {
            get_row(pool, "scooters", &scooter_id)
                .await
                .map(|scooter| value_str(&scooter, "name"))
                .unwrap_or_default()
        };

        let total_price =
            calculate_rental_price(daily_price, &start_date, &end_date, Some(&scooter_name));
        patch.insert("total_price".to_string(), json!(total_price));
    }

    let updated = update_row(pool, "rentals", &path.rental_id, &patch).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "update",
        "rentals",
        Some(&path.rental_id),
        Some(record),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(decorate_rental(updated, &today_iso())))
}

async fn complete_rental(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    transition_rental(state, path, headers, "completed").await
}

async fn cancel_rental(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    transition_rental(state, path, headers, "cancelled").await
}

async fn transition_rental(
    state: AppState,
    path: RentalPath,
    headers: HeaderMap,
    next_status: &str,
) -> AppResult<Json<Value>> {
    debug_assert!(RENTAL_STATUSES.contains(&next_status));
    let user = require_role(&state, &headers, &[ROLE_ADMIN, ROLE_STAFF]).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "rentals", &path.rental_id).await?;
    if value_str(&record, "status") != "active" {
        return Err(AppError::Conflict(format!(
            "Only active rentals can be {next_status}."
        )));
    }

    let mut patch = Map::new();
    patch.insert(
        "status".to_string(),
        Value::String(next_status.to_string()),
    );
    patch.insert(
        "closed_at".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    let updated = update_row(pool, "rentals", &path.rental_id, &patch).await?;

    // Return the scooter to the pool.
    let scooter_id = value_str(&record, "scooter_id");
    flip_scooter_status(pool, &scooter_id, "available").await;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        next_status,
        "rentals",
        Some(&path.rental_id),
        Some(record),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(decorate_rental(updated, &today_iso())))
}

async fn delete_rental(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_role(&state, &headers, &[ROLE_ADMIN]).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "rentals", &path.rental_id).await?;
    let deleted = delete_row(pool, "rentals", &path.rental_id).await?;

    // An active rental going away frees its scooter.
    if value_str(&record, "status") == "active" {
        let scooter_id = value_str(&record, "scooter_id");
        flip_scooter_status(pool, &scooter_id, "available").await;
    }

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "delete",
        "rentals",
        Some(&path.rental_id),
        Some(deleted.clone()),
        None,
    )
    .await;

    Ok(Json(deleted))
}

async fn list_payments(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    // 404 for unknown rentals rather than an empty list.
    get_row(pool, "rentals", &path.rental_id).await?;
    let payments = rental_payment_rows(pool, &path.rental_id).await?;
    Ok(Json(json!({ "data": payments })))
}

async fn record_payment(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
    Json(payload): Json<RecordPaymentInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let user = require_role(&state, &headers, &[ROLE_ADMIN, ROLE_STAFF]).await?;
    let pool = db_pool(&state)?;

    let rental = get_row(pool, "rentals", &path.rental_id).await?;
    if value_str(&rental, "status") == "cancelled" {
        return Err(AppError::Conflict(
            "Cannot record a payment on a cancelled rental.".to_string(),
        ));
    }

    let paid_on = payload
        .paid_on
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(today_iso);
    if !is_valid_date(&paid_on) {
        return Err(AppError::BadRequest(
            "paid_on must be a valid YYYY-MM-DD calendar date.".to_string(),
        ));
    }

    let mut payment = Map::new();
    payment.insert(
        "rental_id".to_string(),
        Value::String(path.rental_id.clone()),
    );
    payment.insert("amount".to_string(), json!(payload.amount));
    payment.insert("paid_on".to_string(), Value::String(paid_on));
    if let Some(method) = payload.method.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        payment.insert("method".to_string(), Value::String(method.to_string()));
    }
    let created_payment = create_row(pool, "rental_payments", &payment).await?;

    // Overpayment is legal; the resolver clamps the displayed balance at 0.
    let new_amount_paid = number_from_value(rental.get("amount_paid")) + payload.amount;
    let mut rental_patch = Map::new();
    rental_patch.insert("amount_paid".to_string(), json!(new_amount_paid));
    let updated = update_row(pool, "rentals", &path.rental_id, &rental_patch).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "payment",
        "rentals",
        Some(&path.rental_id),
        Some(rental),
        Some(created_payment),
    )
    .await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(decorate_rental(updated, &today_iso())),
    ))
}

/// Best-effort scooter status transition after the rental row has already
/// committed. A failure here leaves the fleet status stale, so it must land
/// in the logs even though the request itself still succeeds.
async fn flip_scooter_status(pool: &sqlx::PgPool, scooter_id: &str, next_status: &str) {
    if scooter_id.is_empty() {
        return;
    }
    let mut patch = Map::new();
    patch.insert(
        "status".to_string(),
        Value::String(next_status.to_string()),
    );
    log_best_effort(
        update_row(pool, "scooters", scooter_id, &patch).await,
        "flip scooter status",
        scooter_id,
    );
}

fn log_best_effort(result: AppResult<Value>, action: &str, entity_id: &str) {
    if let Err(error) = result {
        tracing::warn!(error = %error, action, entity_id, "Follow-up write failed");
    }
}

async fn rental_payment_rows(pool: &sqlx::PgPool, rental_id: &str) -> AppResult<Vec<Value>> {
    let mut filters = Map::new();
    filters.insert(
        "rental_id".to_string(),
        Value::String(rental_id.to_string()),
    );
    list_rows(pool, "rental_payments", Some(&filters), 500, 0, "paid_on", true).await
}

/// Attach the derived fields the tables and badges are built from:
/// payment_status, remaining_balance, and is_overdue (active rentals whose
/// end date has passed).
fn decorate_rental(mut row: Value, today: &str) -> Value {
    let total_price = number_from_value(row.get("total_price"));
    let amount_paid = number_from_value(row.get("amount_paid"));
    let status = value_str(&row, "status");
    let end_date = value_str(&row, "end_date");

    if let Some(object) = row.as_object_mut() {
        object.insert(
            "payment_status".to_string(),
            Value::String(
                derive_payment_status(total_price, amount_paid)
                    .as_str()
                    .to_string(),
            ),
        );
        object.insert(
            "remaining_balance".to_string(),
            json!(remaining_balance(total_price, amount_paid)),
        );
        object.insert(
            "is_overdue".to_string(),
            Value::Bool(status == "active" && is_overdue(&end_date, today)),
        );
        let start_date = object
            .get("start_date")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        object.insert(
            "period_display".to_string(),
            Value::String(format!(
                "{} - {}",
                format_date_display(&start_date),
                format_date_display(&end_date)
            )),
        );
    }
    row
}

fn assert_date_range(start_date: &str, end_date: &str) -> AppResult<()> {
    if !is_valid_date(start_date.trim()) || !is_valid_date(end_date.trim()) {
        return Err(AppError::BadRequest(
            "start_date and end_date must be valid YYYY-MM-DD calendar dates.".to_string(),
        ));
    }
    // ISO strings compare chronologically.
    if end_date.trim() < start_date.trim() {
        return Err(AppError::BadRequest(
            "end_date must not be before start_date.".to_string(),
        ));
    }
    Ok(())
}

fn today_iso() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
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

fn string_from_map(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .map(ToOwned::to_owned)
}

fn number_from_value(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{assert_date_range, decorate_rental, log_best_effort};
    use crate::error::AppError;

    #[test]
    fn decoration_derives_payment_fields() {
        let row = json!({
            "id": "r1",
            "status": "active",
            "start_date": "2020-01-01",
            "end_date": "2020-01-05",
            "total_price": 1000.0,
            "amount_paid": 400.0,
        });
        let decorated = decorate_rental(row, "2024-01-01");
        assert_eq!(decorated["payment_status"], "partial");
        assert_eq!(decorated["remaining_balance"], 600.0);
        assert_eq!(decorated["is_overdue"], true);
        assert_eq!(decorated["period_display"], "01/01/2020 - 05/01/2020");
    }

    #[test]
    fn completed_rentals_are_never_overdue() {
        let row = json!({
            "status": "completed",
            "end_date": "2020-01-05",
            "total_price": 100.0,
            "amount_paid": 100.0,
        });
        let decorated = decorate_rental(row, "2024-01-01");
        assert_eq!(decorated["is_overdue"], false);
        assert_eq!(decorated["payment_status"], "paid");
    }

    #[test]
    fn follow_up_write_failures_are_absorbed() {
        // Both arms return unit; the Err arm warns instead of propagating so
        // the already-committed rental row is still returned to the caller.
        log_best_effort(Ok(json!({"id": "s1"})), "flip scooter status", "s1");
        log_best_effort(
            Err(AppError::Dependency("Database operation failed.".to_string())),
            "flip scooter status",
            "s1",
        );
    }

    #[test]
    fn date_range_validation() {
        assert!(assert_date_range("2024-01-01", "2024-01-05").is_ok());
        assert!(assert_date_range("2024-01-01", "2024-01-01").is_ok());
        assert!(assert_date_range("2024-01-05", "2024-01-01").is_err());
        assert!(assert_date_range("2024-02-30", "2024-03-01").is_err());
        assert!(assert_date_range("01/01/2024", "2024-03-01").is_err());
    }
}
