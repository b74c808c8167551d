use serde::{Deserialize, Serialize};

/// Tri-state payment classification, derived purely from totals — nothing is
/// stored, so the status can never drift from the underlying amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Partial,
    Pending,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Partial => "partial",
            Self::Pending => "pending",
        }
    }
}

/// Paid iff the amount covers the total (overpayment included), partial iff
/// something but not everything was received, pending otherwise.
pub fn derive_payment_status(total_price: f64, amount_paid: f64) -> PaymentStatus {
    if amount_paid >= total_price {
        PaymentStatus::Paid
    } else if amount_paid > 0.0 {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Pending
    }
}

/// Outstanding balance, clamped at zero so overpayment never shows negative.
pub fn remaining_balance(total_price: f64, amount_paid: f64) -> f64 {
    (total_price - amount_paid).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_at_the_boundaries() {
        assert_eq!(derive_payment_status(1000.0, 1000.0), PaymentStatus::Paid);
        assert_eq!(derive_payment_status(1000.0, 999.0), PaymentStatus::Partial);
        assert_eq!(derive_payment_status(1000.0, 0.0), PaymentStatus::Pending);
        assert_eq!(derive_payment_status(1000.0, -5.0), PaymentStatus::Pending);
    }

    #[test]
    fn overpayment_is_paid_with_zero_balance() {
        assert_eq!(derive_payment_status(1000.0, 1200.0), PaymentStatus::Paid);
        assert_eq!(remaining_balance(1000.0, 1200.0), 0.0);
    }

    #[test]
    fn zero_total_counts_as_paid() {
        // A free rental (promotional zero price) has nothing outstanding.
        assert_eq!(derive_payment_status(0.0, 0.0), PaymentStatus::Paid);
        assert_eq!(remaining_balance(0.0, 0.0), 0.0);
    }

    #[test]
    fn balance_tracks_partial_payments() {
        assert_eq!(remaining_balance(1000.0, 400.0), 600.0);
        assert_eq!(remaining_balance(1000.0, 0.0), 1000.0);
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(PaymentStatus::Partial.as_str(), "partial");
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Pending).unwrap(),
            "\"pending\""
        );
    }
}
