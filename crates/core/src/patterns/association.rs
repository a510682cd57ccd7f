//! Basket analysis: support / confidence / lift for unordered product pairs
//! co-occurring in completed orders over the trailing 180 days.
//!
//! Pairs are canonicalized as `product_a < product_b` (lexical ordering), so
//! the symmetric orientation is never stored and self-pairs cannot occur.
//! The stored confidence is P(product_b | product_a) for that canonical
//! orientation only; callers needing the reverse conditional must recompute.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::event::{CartAction, CartEvent, OrderEvent};
use crate::domain::pattern::AssociationPattern;

/// Window the association miner reads.
pub const ASSOCIATION_WINDOW_DAYS: i64 = 180;

/// Minimum distinct orders containing the pair.
pub const MIN_CO_OCCURRENCE: u32 = 5;

/// Minimum distinct identified users among those orders.
pub const MIN_UNIQUE_USERS: u32 = 3;

/// Lower threshold used by the cart-session variant, which works on the
/// noisier same-session cart-add signal instead of completed orders.
pub const MIN_CART_CO_OCCURRENCE: u32 = 3;

#[derive(Debug, Default)]
struct PairAccumulator {
    co_occurrence_count: u32,
    users: HashSet<String>,
}

/// One basket of distinct SKUs plus the identity that produced it.
struct Basket<'a> {
    skus: BTreeSet<&'a str>,
    user_id: Option<&'a str>,
}

/// Mine associations from completed orders. `now` stamps `last_updated`.
pub fn compute_associations(orders: &[OrderEvent], now: DateTime<Utc>) -> Vec<AssociationPattern> {
    // Orders are deduplicated by id; a replayed order must not double-count.
    let mut seen = HashSet::new();
    let baskets: Vec<Basket<'_>> = orders
        .iter()
        .filter(|order| seen.insert(order.order_id.as_str()))
        .map(|order| Basket {
            skus: order.items.iter().map(|item| item.sku.as_str()).collect(),
            user_id: order.user_id.as_deref(),
        })
        .collect();

    mine_baskets(&baskets, MIN_CO_OCCURRENCE, MIN_UNIQUE_USERS, now)
}

/// Simplified variant over same-session cart adds: each session's distinct
/// added SKUs form one basket. Not wired into the default refresh path.
pub fn compute_cart_associations(
    cart_events: &[CartEvent],
    now: DateTime<Utc>,
) -> Vec<AssociationPattern> {
    let mut sessions: BTreeMap<&str, Basket<'_>> = BTreeMap::new();
    for event in cart_events {
        if event.action != CartAction::Add {
            continue;
        }
        let basket = sessions
            .entry(event.session_id.as_str())
            .or_insert_with(|| Basket { skus: BTreeSet::new(), user_id: None });
        basket.skus.insert(event.product_sku.as_str());
        if basket.user_id.is_none() {
            basket.user_id = event.user_id.as_deref();
        }
    }

    // The cart variant keeps the co-occurrence threshold only; anonymous
    // sessions still count.
    let baskets: Vec<Basket<'_>> = sessions.into_values().collect();
    mine_baskets(&baskets, MIN_CART_CO_OCCURRENCE, 0, now)
}

fn mine_baskets(
    baskets: &[Basket<'_>],
    min_co_occurrence: u32,
    min_unique_users: u32,
    now: DateTime<Utc>,
) -> Vec<AssociationPattern> {
    // Every deduplicated order counts toward the support denominator, even
    // one with no line items.
    let total_baskets = baskets.len() as f64;

    let mut pairs: BTreeMap<(String, String), PairAccumulator> = BTreeMap::new();
    let mut baskets_with: HashMap<String, u32> = HashMap::new();

    for basket in baskets {
        for sku in &basket.skus {
            *baskets_with.entry((*sku).to_string()).or_insert(0) += 1;
        }

        // BTreeSet iteration is ordered, so a < b holds for every pair.
        let skus: Vec<&str> = basket.skus.iter().copied().collect();
        for (i, a) in skus.iter().enumerate() {
            for b in &skus[i + 1..] {
                let acc = pairs.entry(((*a).to_string(), (*b).to_string())).or_default();
                acc.co_occurrence_count += 1;
                if let Some(user) = basket.user_id {
                    acc.users.insert(user.to_string());
                }
            }
        }
    }

    pairs
        .into_iter()
        .filter(|(_, acc)| {
            acc.co_occurrence_count >= min_co_occurrence
                && acc.users.len() as u32 >= min_unique_users
        })
        .map(|((product_a, product_b), acc)| {
            let co = f64::from(acc.co_occurrence_count);
            let with_a = f64::from(baskets_with.get(&product_a).copied().unwrap_or(0));
            let with_b = f64::from(baskets_with.get(&product_b).copied().unwrap_or(0));

            AssociationPattern {
                co_occurrence_count: acc.co_occurrence_count,
                unique_users: acc.users.len() as u32,
                support: co / total_baskets,
                confidence: co / with_a,
                lift: (co * total_baskets) / (with_a * with_b),
                product_a,
                product_b,
                last_updated: now,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::domain::event::OrderItem;

    use super::*;

    fn order(order_id: &str, user: &str, skus: &[&str]) -> OrderEvent {
        OrderEvent {
            order_id: order_id.to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            user_id: Some(user.to_string()),
            session_id: format!("sess-{order_id}"),
            order_total: 20.0,
            items: skus
                .iter()
                .map(|sku| OrderItem {
                    sku: sku.to_string(),
                    name: sku.to_string(),
                    quantity: 1,
                    unit_price: 5.0,
                })
                .collect(),
        }
    }

    fn cart_add(session: &str, user: &str, sku: &str) -> CartEvent {
        CartEvent {
            event_id: format!("cart-{session}-{sku}"),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            user_id: Some(user.to_string()),
            session_id: session.to_string(),
            action: CartAction::Add,
            product_sku: sku.to_string(),
            quantity: 1,
            cart_total_after: 10.0,
        }
    }

    #[test]
    fn support_confidence_and_lift_match_hand_computation() {
        // Two orders {A,B}, one order {A,C}: A appears in all three orders,
        // so support(A,B)=2/3 and conf(A→B)=2/3.
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let orders = vec![
            order("o1", "u1", &["A", "B"]),
            order("o2", "u2", &["A", "B"]),
            order("o3", "u3", &["A", "C"]),
        ];

        let rows = mine_baskets(
            &orders
                .iter()
                .map(|o| Basket {
                    skus: o.items.iter().map(|i| i.sku.as_str()).collect(),
                    user_id: o.user_id.as_deref(),
                })
                .collect::<Vec<_>>(),
            1,
            1,
            now,
        );

        let ab = rows.iter().find(|r| r.product_a == "A" && r.product_b == "B").unwrap();
        assert_eq!(ab.co_occurrence_count, 2);
        assert!((ab.support - 2.0 / 3.0).abs() < 1e-9);
        assert!((ab.confidence - 2.0 / 3.0).abs() < 1e-9);
        // lift = 2*3 / (3*2) = 1.0
        assert!((ab.lift - 1.0).abs() < 1e-9);

        let ac = rows.iter().find(|r| r.product_a == "A" && r.product_b == "C").unwrap();
        assert_eq!(ac.co_occurrence_count, 1);
        assert!((ac.confidence - 1.0 / 3.0).abs() < 1e-9);
        // lift = 1*3 / (3*1) = 1.0
        assert!((ac.lift - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pairs_are_canonical_with_no_self_pairs() {
        let now = Utc::now();
        let mut orders = Vec::new();
        for i in 0..6 {
            // SKU order inside the basket is deliberately reversed.
            orders.push(order(&format!("o{i}"), &format!("u{i}"), &["zucchini", "apple", "apple"]));
        }

        let rows = compute_associations(&orders, now);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_a, "apple");
        assert_eq!(rows[0].product_b, "zucchini");
        assert!(rows[0].product_a < rows[0].product_b);
    }

    #[test]
    fn materialization_thresholds_apply() {
        let now = Utc::now();

        // 5 co-occurrences but only 2 distinct users: dropped.
        let mut orders: Vec<OrderEvent> = (0..5)
            .map(|i| order(&format!("few-{i}"), if i % 2 == 0 { "u1" } else { "u2" }, &["A", "B"]))
            .collect();
        assert!(compute_associations(&orders, now).is_empty());

        // 4 co-occurrences with 4 users: still below MIN_CO_OCCURRENCE.
        orders = (0..4).map(|i| order(&format!("o{i}"), &format!("u{i}"), &["A", "B"])).collect();
        assert!(compute_associations(&orders, now).is_empty());

        // 5 co-occurrences, 5 users: materialized.
        orders = (0..5).map(|i| order(&format!("o{i}"), &format!("u{i}"), &["A", "B"])).collect();
        assert_eq!(compute_associations(&orders, now).len(), 1);
    }

    #[test]
    fn duplicate_order_ids_do_not_double_count() {
        let now = Utc::now();
        let mut orders: Vec<OrderEvent> =
            (0..5).map(|i| order(&format!("o{i}"), &format!("u{i}"), &["A", "B"])).collect();
        orders.push(order("o0", "u0", &["A", "B"]));

        let rows = compute_associations(&orders, now);
        assert_eq!(rows[0].co_occurrence_count, 5);
        assert!((rows[0].support - 1.0).abs() < 1e-9);
    }

    #[test]
    fn itemless_orders_count_toward_the_support_denominator() {
        let now = Utc::now();
        let mut orders: Vec<OrderEvent> =
            (0..5).map(|i| order(&format!("o{i}"), &format!("u{i}"), &["A", "B"])).collect();
        orders.push(order("o-empty", "u9", &[]));

        let rows = compute_associations(&orders, now);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].co_occurrence_count, 5);
        assert!((rows[0].support - 5.0 / 6.0).abs() < 1e-9);
        // Confidence and lift stay conditioned on orders containing A.
        assert!((rows[0].confidence - 1.0).abs() < 1e-9);
        assert!((rows[0].lift - 6.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn lift_above_one_for_positively_associated_pairs() {
        let now = Utc::now();
        let mut orders = Vec::new();
        // {A,B} together in 5 of 10 orders; A and B never appear alone.
        for i in 0..5 {
            orders.push(order(&format!("ab{i}"), &format!("u{i}"), &["A", "B"]));
        }
        for i in 0..5 {
            orders.push(order(&format!("cd{i}"), &format!("v{i}"), &["C", "D"]));
        }

        let rows = compute_associations(&orders, now);
        let ab = rows.iter().find(|r| r.product_a == "A").unwrap();
        // lift = 5*10 / (5*5) = 2.0
        assert!((ab.lift - 2.0).abs() < 1e-9);
        assert!(ab.lift > 1.0);
    }

    #[test]
    fn cart_variant_groups_by_session_with_lower_threshold() {
        let now = Utc::now();
        let mut events = Vec::new();
        for i in 0..3 {
            let session = format!("s{i}");
            events.push(cart_add(&session, &format!("u{i}"), "milk"));
            events.push(cart_add(&session, &format!("u{i}"), "cereal"));
        }
        // A remove must not contribute to the basket.
        events.push(CartEvent { action: CartAction::Remove, ..cart_add("s0", "u0", "eggs") });

        let rows = compute_cart_associations(&events, now);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_a, "cereal");
        assert_eq!(rows[0].product_b, "milk");
        assert_eq!(rows[0].co_occurrence_count, 3);
    }
}
