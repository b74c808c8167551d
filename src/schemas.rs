use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

fn default_status_available() -> String {
    "available".to_string()
}
fn default_zero_f64() -> f64 {
    0.0
}
fn default_limit_100() -> i64 {
    100
}
fn default_limit_300() -> i64 {
    300
}

// ── Scooters ──

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateScooterInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub model: Option<String>,
    pub plate_number: Option<String>,
    #[validate(range(min = 0))]
    pub daily_price: i64,
    #[serde(default = "default_status_available")]
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateScooterInput {
    pub name: Option<String>,
    pub model: Option<String>,
    pub plate_number: Option<String>,
    pub daily_price: Option<i64>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ScootersQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ScooterPath {
    pub scooter_id: String,
}

// ── Clients ──

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateClientInput {
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub national_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateClientInput {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub national_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ClientsQuery {
    pub search: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ClientPath {
    pub client_id: String,
}

// ── Rentals ──

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateRentalInput {
    pub scooter_id: String,
    pub client_id: String,
    pub start_date: String,
    pub end_date: String,
    /// Overrides the scooter's listed daily price when set.
    #[validate(range(min = 0))]
    pub daily_price: Option<i64>,
    #[serde(default = "default_zero_f64")]
    #[validate(range(min = 0.0))]
    pub amount_paid: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateRentalInput {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub daily_price: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct RecordPaymentInput {
    #[validate(range(min = 0.01))]
    pub amount: f64,
    pub method: Option<String>,
    /// ISO date of the payment; defaults to today when omitted.
    pub paid_on: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct RentalsQuery {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub scooter_id: Option<String>,
    pub client_id: Option<String>,
    #[serde(rename = "from")]
    pub from_date: Option<String>,
    #[serde(rename = "to")]
    pub to_date: Option<String>,
    #[serde(default = "default_limit_300")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct RentalPath {
    pub rental_id: String,
}

// ── Expenses ──

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateExpenseInput {
    #[validate(length(min = 1, max = 255))]
    pub label: String,
    pub category: String,
    #[validate(range(min = 0.01))]
    pub amount: f64,
    /// Accepted as `date` on the wire; stored as `expense_date`.
    #[serde(rename(deserialize = "date"))]
    pub expense_date: String,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateExpenseInput {
    pub label: Option<String>,
    pub category: Option<String>,
    pub amount: Option<f64>,
    #[serde(rename(deserialize = "date"))]
    pub expense_date: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ExpensesQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    #[serde(rename = "from")]
    pub from_date: Option<String>,
    #[serde(rename = "to")]
    pub to_date: Option<String>,
    #[serde(default = "default_limit_300")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ExpensePath {
    pub expense_id: String,
}

// ── Dashboard ──

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct DashboardQuery {
    /// 1-indexed month; both month and year must be given to filter.
    pub month: Option<u32>,
    pub year: Option<i32>,
}

// ── Helpers ──

pub fn clamp_limit_in_range(limit: i64, min: i64, max: i64) -> i64 {
    limit.clamp(min, max)
}

/// Trimmed, non-empty query parameter or `None`. Shared by the route modules
/// so optional filters are normalized the same way everywhere.
pub fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

pub fn serialize_to_map<T>(value: &T) -> serde_json::Map<String, serde_json::Value>
where
    T: serde::Serialize,
{
    let json = serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|_, value| !value.is_null());
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_payloads_drop_null_fields() {
        let patch = UpdateScooterInput {
            name: Some("City Rider".to_string()),
            model: None,
            plate_number: None,
            daily_price: Some(120),
            status: None,
            notes: None,
        };
        let map = remove_nulls(serialize_to_map(&patch));
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("name"));
        assert!(map.contains_key("daily_price"));
    }

    #[test]
    fn create_inputs_validate() {
        let bad = CreateExpenseInput {
            label: String::new(),
            category: "maintenance".to_string(),
            amount: 50.0,
            expense_date: "2024-01-10".to_string(),
            payment_method: None,
            notes: None,
        };
        assert!(validate_input(&bad).is_err());

        let negative = CreateRentalInput {
            scooter_id: "s".to_string(),
            client_id: "c".to_string(),
            start_date: "2024-01-01".to_string(),
            end_date: "2024-01-05".to_string(),
            daily_price: Some(-1),
            amount_paid: 0.0,
            notes: None,
        };
        assert!(validate_input(&negative).is_err());
    }

    #[test]
    fn expense_date_maps_between_wire_and_storage_names() {
        let input: CreateExpenseInput = serde_json::from_value(serde_json::json!({
            "label": "Brake pads",
            "category": "spare_parts",
            "amount": 150.0,
            "date": "2024-01-10",
        }))
        .unwrap();
        assert_eq!(input.expense_date, "2024-01-10");

        let map = serialize_to_map(&input);
        assert!(map.contains_key("expense_date"));
        assert!(!map.contains_key("date"));
    }

    #[test]
    fn limits_clamp() {
        assert_eq!(clamp_limit_in_range(0, 1, 1000), 1);
        assert_eq!(clamp_limit_in_range(5000, 1, 1000), 1000);
        assert_eq!(clamp_limit_in_range(200, 1, 1000), 200);
    }

    #[test]
    fn optional_params_are_trimmed_or_dropped() {
        assert_eq!(non_empty_opt(Some(" active ")).as_deref(), Some("active"));
        assert_eq!(non_empty_opt(Some("   ")), None);
        assert_eq!(non_empty_opt(Some("")), None);
        assert_eq!(non_empty_opt(None), None);
    }
}
