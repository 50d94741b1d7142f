//! Spend-by-item reporting
//!
//! Read-only aggregation over historical request lines: total quantity,
//! distinct requester head-count, and total spend per item, with
//! percent-of-total and cumulative-percent ranking. A single grouping pass,
//! no write path.

use crate::money::Money;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};

/// One request line joined with its item and requester, the report's input.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub item_id: String,
    pub item_name: String,
    pub unit_cost: Money,
    pub employee_id: String,
    pub quantity: u32,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCostSummary {
    pub item_id: String,
    pub item_name: String,
    /// Current catalog price, carried for display alongside historical spend.
    pub unit_cost: Money,
    pub total_requested: u64,
    /// Distinct employees who ever requested the item.
    pub head_count: u32,
    pub total_spent: Money,
    pub percent_of_total: Decimal,
    pub cumulative_percent: Decimal,
}

struct Bucket {
    item_name: String,
    unit_cost: Money,
    total_requested: u64,
    requesters: HashSet<String>,
    total_spent: Money,
}

/// Aggregates rows into per-item summaries sorted by total spend descending.
/// A zero grand total is treated as 1 so percentages degrade to 0% instead of
/// dividing by zero.
pub fn summarize(rows: &[ReportRow]) -> Vec<ItemCostSummary> {
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();

    for row in rows {
        let bucket = buckets.entry(row.item_id.clone()).or_insert_with(|| Bucket {
            item_name: row.item_name.clone(),
            unit_cost: row.unit_cost,
            total_requested: 0,
            requesters: HashSet::new(),
            total_spent: Money::ZERO,
        });
        bucket.total_requested += u64::from(row.quantity);
        bucket.requesters.insert(row.employee_id.clone());
        bucket.total_spent += row.line_total;
    }

    let grand_total: Money = buckets.values().map(|b| b.total_spent).sum();
    let divisor = if grand_total == Money::ZERO {
        Decimal::ONE
    } else {
        grand_total.amount()
    };

    let mut ordered: Vec<(String, Bucket)> = buckets.into_iter().collect();
    // descending by spend; item id breaks ties so output order is stable
    ordered.sort_by(|(a_id, a), (b_id, b)| {
        b.total_spent.cmp(&a.total_spent).then(a_id.cmp(b_id))
    });

    let hundred = Decimal::ONE_HUNDRED;
    let mut running = Money::ZERO;
    ordered
        .into_iter()
        .map(|(item_id, bucket)| {
            running += bucket.total_spent;
            ItemCostSummary {
                item_id,
                item_name: bucket.item_name,
                unit_cost: bucket.unit_cost,
                total_requested: bucket.total_requested,
                head_count: bucket.requesters.len() as u32,
                total_spent: bucket.total_spent,
                percent_of_total: (bucket.total_spent.amount() / divisor * hundred).round_dp(2),
                cumulative_percent: (running.amount() / divisor * hundred).round_dp(2),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(item: &str, employee: &str, quantity: u32, unit_cents: i64) -> ReportRow {
        let unit_cost = Money::new(unit_cents, 2);
        ReportRow {
            item_id: item.to_string(),
            item_name: item.to_uppercase(),
            unit_cost,
            employee_id: employee.to_string(),
            quantity,
            line_total: unit_cost * quantity,
        }
    }

    #[test]
    fn groups_and_sorts_by_spend_descending() {
        let rows = vec![
            row("item_pen", "emp_a", 10, 1_00),   // 10.00
            row("item_pen", "emp_b", 5, 1_00),    // 5.00
            row("item_desk", "emp_a", 1, 85_00),  // 85.00
        ];
        let report = summarize(&rows);

        assert_eq!(report.len(), 2);
        assert_eq!(report[0].item_id, "item_desk");
        assert_eq!(report[0].total_spent, Money::new(85_00, 2));
        assert_eq!(report[0].head_count, 1);
        assert_eq!(report[1].item_id, "item_pen");
        assert_eq!(report[1].total_requested, 15);
        assert_eq!(report[1].head_count, 2);
    }

    #[test]
    fn percentages_and_cumulative_ranking() {
        let rows = vec![
            row("item_a", "emp_1", 1, 75_00),
            row("item_b", "emp_1", 1, 25_00),
        ];
        let report = summarize(&rows);

        assert_eq!(report[0].percent_of_total, Decimal::new(75_00, 2));
        assert_eq!(report[0].cumulative_percent, Decimal::new(75_00, 2));
        assert_eq!(report[1].percent_of_total, Decimal::new(25_00, 2));
        assert_eq!(report[1].cumulative_percent, Decimal::new(100_00, 2));
    }

    #[test]
    fn distinct_requesters_counted_once() {
        let rows = vec![
            row("item_a", "emp_1", 1, 1_00),
            row("item_a", "emp_1", 3, 1_00),
            row("item_a", "emp_2", 2, 1_00),
        ];
        let report = summarize(&rows);
        assert_eq!(report[0].head_count, 2);
        assert_eq!(report[0].total_requested, 6);
    }

    #[test]
    fn zero_total_yields_zero_percent_rows() {
        // free items: spend is zero everywhere, percentages must not divide by zero
        let rows = vec![row("item_free", "emp_1", 4, 0)];
        let report = summarize(&rows);

        assert_eq!(report[0].total_spent, Money::ZERO);
        assert_eq!(report[0].percent_of_total, Decimal::ZERO);
        assert_eq!(report[0].cumulative_percent, Decimal::ZERO);
    }

    #[test]
    fn empty_input_is_empty_report() {
        assert!(summarize(&[]).is_empty());
    }
}
