use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Rentals excluded from revenue aggregation.
const EXCLUDED_STATUS: &str = "cancelled";

/// Profit-margin floor below which the dashboard flags the business.
const LOW_MARGIN_THRESHOLD: f64 = 0.2;

/// Revenue share at which a single scooter dominates the fleet.
const CONCENTRATION_THRESHOLD: f64 = 0.6;

/// Rental fields the analytics rules need; built by the dashboard route from
/// stored rows. Monetary values share one currency unit (MAD).
#[derive(Debug, Clone)]
pub struct RentalRecord {
    pub scooter_id: String,
    pub scooter_name: String,
    pub start_date: String,
    pub end_date: String,
    pub total_price: f64,
    pub amount_paid: f64,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct ExpenseRecord {
    pub date: String,
    pub amount: f64,
}

/// Optional restriction of the aggregation to one calendar month.
#[derive(Debug, Clone, Copy)]
pub struct MonthFilter {
    pub month: u32,
    pub year: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyStat {
    /// `YYYY-MM` label, chronological across the returned series.
    pub month: String,
    pub revenue: f64,
    pub expenses: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopAsset {
    pub id: String,
    pub name: String,
    pub revenue: f64,
    pub trip_count: i64,
}

/// Monthly revenue/expense/profit series. Rentals are bucketed by the month
/// of their start date; revenue recognizes cash received (`amount_paid`), not
/// accrued totals, so a half-paid rental contributes only what was actually
/// collected. Cancelled rentals are skipped. One entry per month present in
/// the inputs, oldest first.
pub fn compute_monthly_stats(
    rentals: &[RentalRecord],
    expenses: &[ExpenseRecord],
    filter: Option<MonthFilter>,
) -> Vec<MonthlyStat> {
    let mut buckets: BTreeMap<(i32, u32), (f64, f64)> = BTreeMap::new();

    for rental in rentals {
        if rental.status == EXCLUDED_STATUS {
            continue;
        }
        let Some(key) = month_key(&rental.start_date) else {
            continue;
        };
        if !matches_filter(key, filter) {
            continue;
        }
        buckets.entry(key).or_default().0 += rental.amount_paid;
    }

    for expense in expenses {
        let Some(key) = month_key(&expense.date) else {
            continue;
        };
        if !matches_filter(key, filter) {
            continue;
        }
        buckets.entry(key).or_default().1 += expense.amount;
    }

    buckets
        .into_iter()
        .map(|((year, month), (revenue, expense_total))| MonthlyStat {
            month: format!("{year:04}-{month:02}"),
            revenue: round2(revenue),
            expenses: round2(expense_total),
            profit: round2(revenue - expense_total),
        })
        .collect()
}

/// Rank scooters by collected revenue, counting trips along the way, and keep
/// the first `limit`. Ties break on trip count, then name, so the ordering is
/// stable across refreshes.
pub fn compute_top_assets(rentals: &[RentalRecord], limit: usize) -> Vec<TopAsset> {
    let mut by_scooter: HashMap<String, TopAsset> = HashMap::new();

    for rental in rentals {
        if rental.status == EXCLUDED_STATUS {
            continue;
        }
        let key = if rental.scooter_id.is_empty() {
            rental.scooter_name.clone()
        } else {
            rental.scooter_id.clone()
        };
        if key.is_empty() {
            continue;
        }
        let entry = by_scooter.entry(key.clone()).or_insert_with(|| TopAsset {
            id: key,
            name: rental.scooter_name.clone(),
            revenue: 0.0,
            trip_count: 0,
        });
        entry.revenue += rental.amount_paid;
        entry.trip_count += 1;
    }

    let mut ranked: Vec<TopAsset> = by_scooter.into_values().collect();
    ranked.sort_by(|left, right| {
        right
            .revenue
            .total_cmp(&left.revenue)
            .then(right.trip_count.cmp(&left.trip_count))
            .then(left.name.cmp(&right.name))
    });
    ranked.truncate(limit);
    for asset in &mut ranked {
        asset.revenue = round2(asset.revenue);
    }
    ranked
}

/// Heuristic observations over the computed aggregates. Each rule fires
/// independently; an empty input set yields only the "no activity" note.
pub fn generate_tips(
    stats: &[MonthlyStat],
    top_assets: &[TopAsset],
    overdue_count: i64,
) -> Vec<String> {
    let mut tips = Vec::new();

    if stats.is_empty() {
        tips.push("No rental activity recorded yet — the dashboard will fill in as rentals and expenses are logged.".to_string());
        return tips;
    }

    let total_revenue: f64 = stats.iter().map(|stat| stat.revenue).sum();
    let total_profit: f64 = stats.iter().map(|stat| stat.profit).sum();

    if total_revenue > 0.0 && total_profit / total_revenue < LOW_MARGIN_THRESHOLD {
        tips.push(format!(
            "Profit margin is {:.0}% — below the {:.0}% target. Review expenses or daily rates.",
            100.0 * total_profit / total_revenue,
            100.0 * LOW_MARGIN_THRESHOLD
        ));
    }

    for stat in stats {
        if stat.profit < 0.0 {
            tips.push(format!(
                "{} closed at a loss ({:.0} MAD). Expenses outpaced collected revenue that month.",
                stat.month, stat.profit
            ));
        }
    }

    if overdue_count > 0 {
        tips.push(format!(
            "{overdue_count} active rental(s) are past their end date. Follow up on returns and outstanding balances."
        ));
    }

    if let Some(leader) = top_assets.first() {
        if total_revenue > 0.0 && leader.revenue / total_revenue > CONCENTRATION_THRESHOLD {
            tips.push(format!(
                "'{}' brings in {:.0}% of revenue — consider promoting the rest of the fleet.",
                leader.name,
                100.0 * leader.revenue / total_revenue
            ));
        }
    }

    tips
}

fn month_key(date: &str) -> Option<(i32, u32)> {
    let parsed = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    Some((parsed.year(), parsed.month()))
}

fn matches_filter(key: (i32, u32), filter: Option<MonthFilter>) -> bool {
    match filter {
        Some(filter) => key.0 == filter.year && key.1 == filter.month,
        None => true,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rental(scooter: &str, start: &str, paid: f64, status: &str) -> RentalRecord {
        RentalRecord {
            scooter_id: format!("id-{scooter}"),
            scooter_name: scooter.to_string(),
            start_date: start.to_string(),
            end_date: start.to_string(),
            total_price: paid,
            amount_paid: paid,
            status: status.to_string(),
        }
    }

    fn expense(date: &str, amount: f64) -> ExpenseRecord {
        ExpenseRecord {
            date: date.to_string(),
            amount,
        }
    }

    #[test]
    fn buckets_by_start_month_in_order() {
        let rentals = vec![
            rental("Alpha", "2024-02-10", 500.0, "completed"),
            rental("Alpha", "2024-01-05", 300.0, "active"),
            rental("Beta", "2024-01-20", 200.0, "completed"),
        ];
        let expenses = vec![expense("2024-01-15", 100.0), expense("2024-02-01", 50.0)];

        let stats = compute_monthly_stats(&rentals, &expenses, None);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].month, "2024-01");
        assert_eq!(stats[0].revenue, 500.0);
        assert_eq!(stats[0].expenses, 100.0);
        assert_eq!(stats[0].profit, 400.0);
        assert_eq!(stats[1].month, "2024-02");
        assert_eq!(stats[1].profit, 450.0);
    }

    #[test]
    fn cancelled_rentals_and_bad_dates_are_skipped() {
        let rentals = vec![
            rental("Alpha", "2024-01-05", 300.0, "cancelled"),
            rental("Alpha", "not-a-date", 300.0, "active"),
        ];
        let stats = compute_monthly_stats(&rentals, &[], None);
        assert!(stats.is_empty());
    }

    #[test]
    fn month_filter_restricts_the_series() {
        let rentals = vec![
            rental("Alpha", "2024-01-05", 300.0, "completed"),
            rental("Alpha", "2024-02-05", 700.0, "completed"),
        ];
        let filter = Some(MonthFilter {
            month: 2,
            year: 2024,
        });
        let stats = compute_monthly_stats(&rentals, &[], filter);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].month, "2024-02");
        assert_eq!(stats[0].revenue, 700.0);
    }

    #[test]
    fn expense_only_months_show_negative_profit() {
        let stats = compute_monthly_stats(&[], &[expense("2024-03-10", 250.0)], None);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].revenue, 0.0);
        assert_eq!(stats[0].profit, -250.0);
    }

    #[test]
    fn ranks_assets_by_revenue_and_truncates() {
        let rentals = vec![
            rental("Alpha", "2024-01-01", 100.0, "completed"),
            rental("Alpha", "2024-01-10", 150.0, "completed"),
            rental("Beta", "2024-01-01", 400.0, "completed"),
            rental("Gamma", "2024-01-01", 50.0, "completed"),
            rental("Delta", "2024-01-01", 50.0, "cancelled"),
        ];
        let ranked = compute_top_assets(&rentals, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].name, "Beta");
        assert_eq!(ranked[0].revenue, 400.0);
        assert_eq!(ranked[0].trip_count, 1);
        assert_eq!(ranked[1].name, "Alpha");
        assert_eq!(ranked[1].trip_count, 2);
    }

    #[test]
    fn tie_breaks_are_deterministic() {
        let rentals = vec![
            rental("Beta", "2024-01-01", 100.0, "completed"),
            rental("Alpha", "2024-01-01", 100.0, "completed"),
        ];
        let ranked = compute_top_assets(&rentals, 5);
        assert_eq!(ranked[0].name, "Alpha");
        assert_eq!(ranked[1].name, "Beta");
    }

    #[test]
    fn tips_flag_losses_overdues_and_concentration() {
        let stats = vec![
            MonthlyStat {
                month: "2024-01".to_string(),
                revenue: 1000.0,
                expenses: 1100.0,
                profit: -100.0,
            },
            MonthlyStat {
                month: "2024-02".to_string(),
                revenue: 1000.0,
                expenses: 850.0,
                profit: 150.0,
            },
        ];
        let top = vec![TopAsset {
            id: "id-alpha".to_string(),
            name: "Alpha".to_string(),
            revenue: 1500.0,
            trip_count: 9,
        }];

        let tips = generate_tips(&stats, &top, 3);
        assert!(tips.iter().any(|tip| tip.contains("Profit margin")));
        assert!(tips.iter().any(|tip| tip.contains("2024-01")));
        assert!(tips.iter().any(|tip| tip.contains("3 active rental")));
        assert!(tips.iter().any(|tip| tip.contains("Alpha")));
    }

    #[test]
    fn tips_on_empty_input() {
        let tips = generate_tips(&[], &[], 0);
        assert_eq!(tips.len(), 1);
        assert!(tips[0].contains("No rental activity"));
    }

    #[test]
    fn healthy_month_produces_no_warnings() {
        let stats = vec![MonthlyStat {
            month: "2024-02".to_string(),
            revenue: 1000.0,
            expenses: 500.0,
            profit: 500.0,
        }];
        let top = vec![TopAsset {
            id: "id-alpha".to_string(),
            name: "Alpha".to_string(),
            revenue: 400.0,
            trip_count: 2,
        }];
        assert!(generate_tips(&stats, &top, 0).is_empty());
    }
}
