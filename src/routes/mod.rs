use axum::{routing::get, Router};

use crate::state::AppState;

pub mod clients;
pub mod dashboard;
pub mod expenses;
pub mod health;
pub mod identity;
pub mod rentals;
pub mod scooters;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/me", get(identity::me))
        .merge(scooters::router())
        .merge(clients::router())
        .merge(rentals::router())
        .merge(expenses::router())
        .merge(dashboard::router())
}
