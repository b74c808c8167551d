use chrono::NaiveDate;

/// Tenure discount tiers, highest threshold first. Values are flat MAD
/// reductions to the daily rate, not percentages.
const DISCOUNT_TIERS: &[(i64, i64)] = &[(15, 30), (7, 20), (3, 10)];

/// Rental length at which the monthly special-case rates kick in.
const MONTHLY_THRESHOLD_DAYS: i64 = 30;

/// Promotional asset: any scooter with this name rents at a fixed monthly
/// daily rate regardless of its listed price.
const PROMO_SCOOTER_NAME: &str = "GO SWAP FLOW";
const PROMO_DAILY_RATE: i64 = 50;

/// Number of billable days for a date range. The difference is taken as an
/// absolute value, so a reversed range prices the same as the forward one —
/// inherited behavior; handlers validate `end >= start` before calling.
/// Same-day and malformed ranges bill a minimum of one day.
pub fn billable_days(start_date: &str, end_date: &str) -> i64 {
    let start = NaiveDate::parse_from_str(start_date.trim(), "%Y-%m-%d");
    let end = NaiveDate::parse_from_str(end_date.trim(), "%Y-%m-%d");
    match (start, end) {
        (Ok(start), Ok(end)) => (end - start).num_days().abs().max(1),
        _ => 1,
    }
}

/// Flat per-day discount for a rental of `days` length; highest tier wins.
pub fn tenure_discount(days: i64) -> i64 {
    DISCOUNT_TIERS
        .iter()
        .find(|(threshold, _)| days >= *threshold)
        .map(|(_, discount)| *discount)
        .unwrap_or(0)
}

/// Total rental price in MAD.
///
/// 1. Count billable days (minimum one).
/// 2. Subtract the tenure discount from the daily rate, floored at zero.
/// 3. At 30 days or more, apply the monthly special cases in priority order:
///    promotional scooter name, then the 120 -> 80 and 100 -> 70 rate
///    overrides; otherwise keep the tiered rate.
///
/// All arithmetic is integral, so the result is exact — there is no rounding
/// step to pick a tie-breaking rule for.
pub fn calculate_rental_price(
    daily_price: i64,
    start_date: &str,
    end_date: &str,
    scooter_name: Option<&str>,
) -> i64 {
    let days = billable_days(start_date, end_date);

    let mut effective_daily = (daily_price - tenure_discount(days)).max(0);

    if days >= MONTHLY_THRESHOLD_DAYS {
        let is_promo_scooter = scooter_name
            .map(str::trim)
            .is_some_and(|name| name.eq_ignore_ascii_case(PROMO_SCOOTER_NAME));
        if is_promo_scooter {
            effective_daily = PROMO_DAILY_RATE;
        } else if daily_price == 120 {
            effective_daily = 80;
        } else if daily_price == 100 {
            effective_daily = 70;
        }
    }

    effective_daily * days
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bills_at_least_one_day() {
        assert_eq!(billable_days("2024-01-01", "2024-01-01"), 1);
        assert_eq!(calculate_rental_price(90, "2024-01-01", "2024-01-01", None), 90);
    }

    #[test]
    fn malformed_dates_fall_back_to_one_day() {
        assert_eq!(billable_days("garbage", "2024-01-05"), 1);
        assert_eq!(calculate_rental_price(90, "garbage", "2024-01-05", None), 90);
    }

    #[test]
    fn reversed_ranges_price_like_forward_ones() {
        let forward = calculate_rental_price(90, "2024-01-01", "2024-01-10", None);
        let backward = calculate_rental_price(90, "2024-01-10", "2024-01-01", None);
        assert_eq!(forward, backward);
    }

    #[test]
    fn discount_tier_boundaries() {
        assert_eq!(tenure_discount(2), 0);
        assert_eq!(tenure_discount(3), 10);
        assert_eq!(tenure_discount(6), 10);
        assert_eq!(tenure_discount(7), 20);
        assert_eq!(tenure_discount(14), 20);
        assert_eq!(tenure_discount(15), 30);
        assert_eq!(tenure_discount(29), 30);
        assert_eq!(tenure_discount(30), 30);
    }

    #[test]
    fn two_week_rental_at_120() {
        // 2024-01-01 -> 2024-01-14 is 13 billable days, tier ">= 7",
        // effective 100/day.
        assert_eq!(billable_days("2024-01-01", "2024-01-14"), 13);
        assert_eq!(
            calculate_rental_price(120, "2024-01-01", "2024-01-14", None),
            1300
        );
    }

    #[test]
    fn monthly_promo_scooter_rate() {
        // 30 days at the fixed promotional rate, case-insensitive match.
        assert_eq!(
            calculate_rental_price(200, "2024-01-01", "2024-01-31", Some("go swap flow")),
            1500
        );
        assert_eq!(
            calculate_rental_price(200, "2024-01-01", "2024-01-31", Some("  GO SWAP FLOW ")),
            1500
        );
    }

    #[test]
    fn monthly_rate_overrides_by_base_price() {
        assert_eq!(
            calculate_rental_price(120, "2024-01-01", "2024-01-31", Some("City Rider")),
            2400
        );
        assert_eq!(
            calculate_rental_price(100, "2024-01-01", "2024-01-31", None),
            2100
        );
    }

    #[test]
    fn monthly_rental_without_special_case_keeps_tier_rate() {
        // 30 days at 150/day, tier ">= 15" discount of 30 -> 120/day.
        assert_eq!(
            calculate_rental_price(150, "2024-01-01", "2024-01-31", None),
            3600
        );
    }

    #[test]
    fn promo_name_wins_over_price_override() {
        // daily_price 120 would map to 80/day, but the promo name takes
        // priority.
        assert_eq!(
            calculate_rental_price(120, "2024-01-01", "2024-01-31", Some("GO SWAP FLOW")),
            1500
        );
    }

    #[test]
    fn under_30_days_ignores_monthly_overrides() {
        // 29 days: tier discount only, even for the promo scooter.
        assert_eq!(
            calculate_rental_price(120, "2024-01-01", "2024-01-30", Some("GO SWAP FLOW")),
            (120 - 30) * 29
        );
    }

    #[test]
    fn discount_never_drives_the_rate_negative() {
        assert_eq!(calculate_rental_price(20, "2024-01-01", "2024-01-20", None), 0);
        assert_eq!(calculate_rental_price(0, "2024-01-01", "2024-01-02", None), 0);
    }
}
