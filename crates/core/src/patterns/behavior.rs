//! Shopping behavior profiling: per-user cadence, order-value statistics,
//! preferred shopping time, and top purchase categories over the trailing
//! 180 days.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

use crate::domain::event::{InteractionEvent, InteractionType, OrderEvent};
use crate::domain::pattern::{ShoppingBehaviorPattern, ShoppingFrequency};
use crate::patterns::days_between;

/// Window the behavior profiler reads.
pub const BEHAVIOR_WINDOW_DAYS: i64 = 180;

/// Users with fewer orders are not profiled.
pub const MIN_TOTAL_ORDERS: u32 = 3;

/// How many categories `top_categories` keeps.
const TOP_CATEGORY_LIMIT: usize = 5;

#[derive(Debug, Default)]
struct BehaviorAccumulator {
    order_totals: Vec<f64>,
    item_counts: Vec<u32>,
    shopping_days: HashSet<NaiveDate>,
    day_of_week_counts: [u32; 7],
    hour_counts: [u32; 24],
    first_order: Option<DateTime<Utc>>,
    seen_orders: HashSet<String>,
}

/// Compute the behavior snapshot from a 180-day order window.
///
/// `interactions` supplies purchase interactions from the same window for the
/// `top_categories` ranking; orders themselves carry no category data.
pub fn compute_behavior(
    orders: &[OrderEvent],
    interactions: &[InteractionEvent],
    now: DateTime<Utc>,
) -> Vec<ShoppingBehaviorPattern> {
    let mut groups: BTreeMap<String, BehaviorAccumulator> = BTreeMap::new();

    for order in orders {
        let Some(user_id) = order.user_id.as_deref() else {
            continue;
        };

        let acc = groups.entry(user_id.to_string()).or_default();
        if !acc.seen_orders.insert(order.order_id.clone()) {
            continue;
        }

        acc.order_totals.push(order.order_total);
        acc.item_counts.push(order.items.iter().map(|item| item.quantity).sum());
        acc.shopping_days.insert(order.timestamp.date_naive());
        acc.day_of_week_counts[order.timestamp.weekday().num_days_from_sunday() as usize] += 1;
        acc.hour_counts[order.timestamp.hour() as usize] += 1;
        acc.first_order = Some(match acc.first_order {
            Some(current) => current.min(order.timestamp),
            None => order.timestamp,
        });
    }

    let mut category_counts: HashMap<&str, HashMap<String, u32>> = HashMap::new();
    for interaction in interactions {
        if interaction.interaction_type != InteractionType::Purchase {
            continue;
        }
        let Some(user_id) = interaction.user_id.as_deref() else {
            continue;
        };
        *category_counts
            .entry(user_id)
            .or_default()
            .entry(interaction.category.clone())
            .or_insert(0) += 1;
    }

    groups
        .into_iter()
        .filter(|(_, acc)| acc.order_totals.len() as u32 >= MIN_TOTAL_ORDERS)
        .filter_map(|(user_id, acc)| {
            let total_orders = acc.order_totals.len() as u32;
            let order_count = f64::from(total_orders);

            let avg_order_value = acc.order_totals.iter().sum::<f64>() / order_count;
            let order_value_variance = super::population_std_dev(&acc.order_totals);
            let avg_items_per_order =
                acc.item_counts.iter().map(|count| f64::from(*count)).sum::<f64>() / order_count;

            let first_order = acc.first_order?;
            let avg_days_between_orders = days_between(first_order, now).max(0.0) / order_count;

            Some(ShoppingBehaviorPattern {
                top_categories: top_categories(category_counts.get(user_id.as_str())),
                user_id,
                total_orders,
                shopping_days: acc.shopping_days.len() as u32,
                avg_order_value,
                order_value_variance,
                avg_items_per_order,
                preferred_day_of_week: arg_max(&acc.day_of_week_counts),
                preferred_hour: arg_max(&acc.hour_counts),
                avg_days_between_orders,
                shopping_frequency: ShoppingFrequency::from_avg_days(avg_days_between_orders),
                last_updated: now,
            })
        })
        .collect()
}

/// Index of the highest count; the lowest index wins ties.
fn arg_max(counts: &[u32]) -> u32 {
    let mut best_index = 0;
    let mut best_count = 0;
    for (index, count) in counts.iter().enumerate() {
        if *count > best_count {
            best_count = *count;
            best_index = index;
        }
    }
    best_index as u32
}

/// Top categories by purchase count, count descending then name ascending.
fn top_categories(counts: Option<&HashMap<String, u32>>) -> Vec<String> {
    let Some(counts) = counts else {
        return Vec::new();
    };

    let mut ranked: Vec<(&String, &u32)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(TOP_CATEGORY_LIMIT).map(|(name, _)| name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::domain::event::OrderItem;

    use super::*;

    fn order(order_id: &str, user: &str, total: f64, items: u32, at: DateTime<Utc>) -> OrderEvent {
        OrderEvent {
            order_id: order_id.to_string(),
            timestamp: at,
            user_id: Some(user.to_string()),
            session_id: format!("sess-{order_id}"),
            order_total: total,
            items: vec![OrderItem {
                sku: "sku".to_string(),
                name: "sku".to_string(),
                quantity: items,
                unit_price: total / f64::from(items.max(1)),
            }],
        }
    }

    fn purchase(user: &str, category: &str, at: DateTime<Utc>) -> InteractionEvent {
        InteractionEvent {
            event_id: format!("evt-{category}-{}", at.timestamp()),
            timestamp: at,
            user_id: Some(user.to_string()),
            session_id: "sess".to_string(),
            product_sku: "sku".to_string(),
            product_name: "sku".to_string(),
            interaction_type: InteractionType::Purchase,
            category: category.to_string(),
            brand: "brand".to_string(),
            price: 2.0,
        }
    }

    #[test]
    fn aggregates_order_statistics() {
        // A Tuesday at 09:00 UTC.
        let base = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        let orders = vec![
            order("o1", "u1", 10.0, 2, base),
            order("o2", "u1", 20.0, 4, base + Duration::days(7)),
            order("o3", "u1", 30.0, 6, base + Duration::days(14)),
        ];
        let now = base + Duration::days(21);

        let rows = compute_behavior(&orders, &[], now);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];

        assert_eq!(row.total_orders, 3);
        assert_eq!(row.shopping_days, 3);
        assert!((row.avg_order_value - 20.0).abs() < 1e-9);
        assert!((row.avg_items_per_order - 4.0).abs() < 1e-9);
        // Tuesday = 2 with Sunday = 0; all orders at hour 9.
        assert_eq!(row.preferred_day_of_week, 2);
        assert_eq!(row.preferred_hour, 9);
        // (now - first) / orders = 21 / 3 = 7 → weekly.
        assert!((row.avg_days_between_orders - 7.0).abs() < 1e-9);
        assert_eq!(row.shopping_frequency, ShoppingFrequency::Weekly);
    }

    #[test]
    fn frequency_buckets_follow_the_gap() {
        assert_eq!(ShoppingFrequency::from_avg_days(7.0), ShoppingFrequency::Weekly);
        assert_eq!(ShoppingFrequency::from_avg_days(7.5), ShoppingFrequency::BiWeekly);
        assert_eq!(ShoppingFrequency::from_avg_days(14.0), ShoppingFrequency::BiWeekly);
        assert_eq!(ShoppingFrequency::from_avg_days(30.0), ShoppingFrequency::Monthly);
        assert_eq!(ShoppingFrequency::from_avg_days(31.0), ShoppingFrequency::Occasional);
    }

    #[test]
    fn fewer_than_three_orders_is_not_profiled() {
        let base = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        let orders =
            vec![order("o1", "u1", 10.0, 1, base), order("o2", "u1", 10.0, 1, base)];
        assert!(compute_behavior(&orders, &[], base + Duration::days(5)).is_empty());
    }

    #[test]
    fn top_categories_rank_by_count_then_name() {
        let base = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        let orders = vec![
            order("o1", "u1", 10.0, 1, base),
            order("o2", "u1", 10.0, 1, base + Duration::days(1)),
            order("o3", "u1", 10.0, 1, base + Duration::days(2)),
        ];

        let mut interactions = Vec::new();
        for (category, count) in
            [("dairy", 3), ("bakery", 3), ("produce", 2), ("snacks", 1), ("frozen", 1), ("deli", 1)]
        {
            for i in 0..count {
                interactions.push(purchase("u1", category, base + Duration::minutes(i)));
            }
        }

        let rows = compute_behavior(&orders, &interactions, base + Duration::days(3));
        let top = &rows[0].top_categories;
        assert_eq!(top.len(), 5);
        // bakery and dairy tie at 3; bakery sorts first by name.
        assert_eq!(&top[0], "bakery");
        assert_eq!(&top[1], "dairy");
        assert_eq!(&top[2], "produce");
        // deli and frozen beat snacks alphabetically at equal counts.
        assert_eq!(&top[3], "deli");
        assert_eq!(&top[4], "frozen");
    }

    #[test]
    fn tie_break_on_preferred_slots_picks_lowest_value() {
        let sunday = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let tuesday = Utc.with_ymd_and_hms(2026, 3, 3, 23, 0, 0).unwrap();
        let orders = vec![
            order("o1", "u1", 10.0, 1, sunday),
            order("o2", "u1", 10.0, 1, tuesday),
            order("o3", "u1", 10.0, 1, sunday + Duration::days(7)),
            order("o4", "u1", 10.0, 1, tuesday + Duration::days(7)),
        ];

        let rows = compute_behavior(&orders, &[], tuesday + Duration::days(8));
        // Sunday (0) and Tuesday (2) tie with two orders each.
        assert_eq!(rows[0].preferred_day_of_week, 0);
        // Hours 8 and 23 tie as well.
        assert_eq!(rows[0].preferred_hour, 8);
    }
}
