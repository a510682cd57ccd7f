//! Reorder prediction: per user×product purchase-interval statistics over the
//! trailing 365 days, focused on goods reordered within 90 days.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::event::OrderEvent;
use crate::domain::pattern::ReorderPattern;
use crate::patterns::{days_between, population_std_dev};

/// Window the reorder predictor reads.
pub const REORDER_WINDOW_DAYS: i64 = 365;

/// A product is "due" once this fraction of the average gap has elapsed.
pub const DUE_RATIO: f64 = 0.8;

/// Rows with a longer average gap are not materialized; the predictor targets
/// frequently-reordered goods.
pub const MAX_AVG_REORDER_DAYS: f64 = 90.0;

#[derive(Debug, Default)]
struct PurchaseHistory {
    /// One entry per distinct order: (timestamp, total quantity of the sku).
    orders: Vec<(DateTime<Utc>, u32)>,
    seen_orders: HashSet<String>,
}

/// Compute the reorder snapshot from a 365-day order window.
///
/// Requires at least two completed intervals (three orders) per
/// (user, product) before a row is produced. Division that would be
/// undefined (zero mean gap) yields `reorder_consistency = None`, never an
/// error; the confidence formula treats that as no variability penalty.
pub fn compute_reorder(orders: &[OrderEvent], now: DateTime<Utc>) -> Vec<ReorderPattern> {
    let mut histories: BTreeMap<(String, String), PurchaseHistory> = BTreeMap::new();

    for order in orders {
        let Some(user_id) = order.user_id.as_deref() else {
            continue;
        };

        // Sum quantities per sku within the order so a sku listed on two
        // lines still counts as one purchase occasion.
        let mut quantities: BTreeMap<&str, u32> = BTreeMap::new();
        for item in &order.items {
            *quantities.entry(item.sku.as_str()).or_insert(0) += item.quantity;
        }

        for (sku, quantity) in quantities {
            let history = histories.entry((user_id.to_string(), sku.to_string())).or_default();
            if history.seen_orders.insert(order.order_id.clone()) {
                history.orders.push((order.timestamp, quantity));
            }
        }
    }

    histories
        .into_iter()
        .filter_map(|((user_id, product_sku), mut history)| {
            history.orders.sort_by_key(|(timestamp, _)| *timestamp);

            let gaps: Vec<f64> = history
                .orders
                .windows(2)
                .map(|pair| days_between(pair[0].0, pair[1].0))
                .collect();
            if gaps.len() < 2 {
                return None;
            }

            let avg_reorder_days = gaps.iter().sum::<f64>() / gaps.len() as f64;
            if avg_reorder_days > MAX_AVG_REORDER_DAYS {
                return None;
            }

            let reorder_variance = population_std_dev(&gaps);
            let reorder_consistency = if avg_reorder_days == 0.0 {
                None
            } else {
                Some(reorder_variance / avg_reorder_days)
            };

            let order_count = history.orders.len() as u32;
            let total_quantity: u32 = history.orders.iter().map(|(_, quantity)| quantity).sum();
            let (last_order_date, _) = *history.orders.last()?;
            let days_since_last_order = days_between(last_order_date, now);

            let consistency_penalty = reorder_consistency.unwrap_or(0.0).min(1.0);
            let reorder_confidence =
                ((f64::from(order_count) / 10.0) * (1.0 - consistency_penalty)).min(1.0);

            let mut min_gap = f64::MAX;
            let mut max_gap = f64::MIN;
            for gap in &gaps {
                min_gap = min_gap.min(*gap);
                max_gap = max_gap.max(*gap);
            }

            Some(ReorderPattern {
                user_id,
                product_sku,
                order_count,
                avg_reorder_days,
                reorder_variance,
                min_reorder_days: min_gap,
                max_reorder_days: max_gap,
                reorder_consistency,
                avg_quantity: f64::from(total_quantity) / f64::from(order_count),
                last_order_date,
                days_since_last_order,
                reorder_due: days_since_last_order >= DUE_RATIO * avg_reorder_days,
                reorder_confidence,
                last_updated: now,
            })
        })
        .collect()
}
