use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::list_rows,
    schemas::DashboardQuery,
    services::{
        analytics::{
            compute_monthly_stats, compute_top_assets, generate_tips, ExpenseRecord, MonthFilter,
            RentalRecord,
        },
        dates::is_overdue,
        payments::{derive_payment_status, remaining_balance, PaymentStatus},
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/dashboard/summary", axum::routing::get(dashboard_summary))
}

/// One payload feeds the whole dashboard: monthly revenue/expense/profit
/// series, top scooters by cash collected, overdue and outstanding badges,
/// and the advice strip. Cached briefly since every page load hits it.
async fn dashboard_summary(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;

    let cache_key = format!(
        "dashboard:{}:{}",
        query.month.map_or_else(|| "all".to_string(), |m| m.to_string()),
        query.year.map_or_else(|| "all".to_string(), |y| y.to_string()),
    );
    if let Some(cached) = state.dashboard_cache.get(&cache_key).await {
        return Ok(Json(cached));
    }

    let pool = db_pool(&state)?;

    let month_filter = match (query.month, query.year) {
        (Some(month), Some(year)) => {
            if !(1..=12).contains(&month) {
                return Err(AppError::BadRequest(
                    "month must be between 1 and 12.".to_string(),
                ));
            }
            Some(MonthFilter { month, year })
        }
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "month and year must be provided together.".to_string(),
            ))
        }
    };

    let scooters = list_rows(pool, "scooters", None, 3000, 0, "created_at", false).await?;
    let rentals = list_rows(pool, "rentals", None, 10000, 0, "created_at", false).await?;
    let expense_rows = list_rows(pool, "expenses", None, 10000, 0, "expense_date", false).await?;

    let scooter_names: HashMap<String, String> = scooters
        .iter()
        .map(|scooter| (value_str(scooter, "id"), value_str(scooter, "name")))
        .collect();

    let rental_records: Vec<RentalRecord> = rentals
        .iter()
        .map(|row| {
            let scooter_id = value_str(row, "scooter_id");
            let scooter_name = scooter_names
                .get(&scooter_id)
                .cloned()
                .unwrap_or_else(|| scooter_id.clone());
            RentalRecord {
                scooter_id,
                scooter_name,
                start_date: value_str(row, "start_date"),
                end_date: value_str(row, "end_date"),
                total_price: number_from_value(row.get("total_price")),
                amount_paid: number_from_value(row.get("amount_paid")),
                status: value_str(row, "status"),
            }
        })
        .collect();

    let expense_records: Vec<ExpenseRecord> = expense_rows
        .iter()
        .map(|row| ExpenseRecord {
            date: value_str(row, "expense_date"),
            amount: number_from_value(row.get("amount")),
        })
        .collect();

    let monthly_stats = compute_monthly_stats(&rental_records, &expense_records, month_filter);
    let top_assets = compute_top_assets(&rental_records, state.config.dashboard_top_assets);

    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    let mut overdue_count = 0_i64;
    let mut outstanding_balance = 0.0;
    let mut active_rentals = 0_i64;
    for rental in &rental_records {
        if rental.status != "active" {
            continue;
        }
        active_rentals += 1;
        if is_overdue(&rental.end_date, &today) {
            overdue_count += 1;
        }
        if derive_payment_status(rental.total_price, rental.amount_paid) != PaymentStatus::Paid {
            outstanding_balance += remaining_balance(rental.total_price, rental.amount_paid);
        }
    }

    let available_scooters = scooters
        .iter()
        .filter(|scooter| value_str(scooter, "status") == "available")
        .count() as i64;

    let total_revenue = round2(monthly_stats.iter().map(|stat| stat.revenue).sum());
    let total_expenses = round2(monthly_stats.iter().map(|stat| stat.expenses).sum());
    let tips = generate_tips(&monthly_stats, &top_assets, overdue_count);

    let payload = json!({
        "totals": {
            "revenue": total_revenue,
            "expenses": total_expenses,
            "profit": round2(total_revenue - total_expenses),
            "active_rentals": active_rentals,
            "available_scooters": available_scooters,
            "overdue_rentals": overdue_count,
            "outstanding_balance": round2(outstanding_balance),
        },
        "monthly_stats": monthly_stats,
        "top_scooters": top_assets,
        "tips": tips,
    });

    state
        .dashboard_cache
        .insert(cache_key, payload.clone())
        .await;

    Ok(Json(payload))
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

fn number_from_value(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
