//! Session context summarization: near-real-time intent inference over every
//! session active in the trailing 24 hours. No minimum-activity threshold;
//! one event is enough to be represented.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::event::{CartAction, CartEvent, InteractionEvent, InteractionType, SearchEvent};
use crate::domain::pattern::{SessionContextPattern, SessionIntent};

/// Window the session summarizer reads, in hours.
pub const SESSION_WINDOW_HOURS: i64 = 24;

/// More than this many clicks reads as browsing.
const BROWSING_CLICK_THRESHOLD: u32 = 5;

/// More than this many distinct queries reads as exploring.
const EXPLORING_QUERY_THRESHOLD: u32 = 3;

#[derive(Debug, Default)]
struct SessionAccumulator {
    user_id: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    queries: HashSet<String>,
    total_searches: u32,
    viewed_skus: HashSet<String>,
    clicks: u32,
    cart_adds: u32,
    items_added: u32,
    items_removed: u32,
    /// (timestamp, total) of the latest cart event seen so far.
    last_cart: Option<(DateTime<Utc>, f64)>,
}

impl SessionAccumulator {
    fn touch(&mut self, timestamp: DateTime<Utc>, user_id: Option<&str>) {
        self.start = Some(match self.start {
            Some(current) => current.min(timestamp),
            None => timestamp,
        });
        self.end = Some(match self.end {
            Some(current) => current.max(timestamp),
            None => timestamp,
        });
        if self.user_id.is_none() {
            self.user_id = user_id.map(str::to_string);
        }
    }
}

/// Infer intent from activity counters, highest-signal rule first.
pub fn infer_intent(cart_adds: u32, clicks: u32, unique_queries: u32) -> SessionIntent {
    if cart_adds > 0 {
        SessionIntent::Shopping
    } else if clicks > BROWSING_CLICK_THRESHOLD {
        SessionIntent::Browsing
    } else if unique_queries > EXPLORING_QUERY_THRESHOLD {
        SessionIntent::Exploring
    } else {
        SessionIntent::Searching
    }
}

/// Compute the session context snapshot from the trailing-day slices of all
/// three session-scoped event streams.
pub fn compute_session_context(
    searches: &[SearchEvent],
    interactions: &[InteractionEvent],
    cart_events: &[CartEvent],
    now: DateTime<Utc>,
) -> Vec<SessionContextPattern> {
    let mut sessions: BTreeMap<String, SessionAccumulator> = BTreeMap::new();

    for search in searches {
        let acc = sessions.entry(search.session_id.clone()).or_default();
        acc.touch(search.timestamp, search.user_id.as_deref());
        acc.queries.insert(search.query.clone());
        acc.total_searches += 1;
    }

    for interaction in interactions {
        let acc = sessions.entry(interaction.session_id.clone()).or_default();
        acc.touch(interaction.timestamp, interaction.user_id.as_deref());
        match interaction.interaction_type {
            InteractionType::View => {
                acc.viewed_skus.insert(interaction.product_sku.clone());
            }
            InteractionType::Click => acc.clicks += 1,
            _ => {}
        }
    }

    for cart_event in cart_events {
        let acc = sessions.entry(cart_event.session_id.clone()).or_default();
        acc.touch(cart_event.timestamp, cart_event.user_id.as_deref());
        match cart_event.action {
            CartAction::Add => {
                acc.cart_adds += 1;
                acc.items_added += cart_event.quantity;
            }
            CartAction::Remove => acc.items_removed += cart_event.quantity,
            CartAction::UpdateQuantity | CartAction::Clear => {}
        }
        let is_newer = acc
            .last_cart
            .map(|(timestamp, _)| cart_event.timestamp >= timestamp)
            .unwrap_or(true);
        if is_newer {
            acc.last_cart = Some((cart_event.timestamp, cart_event.cart_total_after));
        }
    }

    sessions
        .into_iter()
        .filter_map(|(session_id, acc)| {
            let session_start = acc.start?;
            let session_end = acc.end?;
            let unique_queries = acc.queries.len() as u32;

            Some(SessionContextPattern {
                session_id,
                user_id: acc.user_id,
                session_start,
                session_end,
                unique_queries,
                total_searches: acc.total_searches,
                products_viewed: acc.viewed_skus.len() as u32,
                clicks: acc.clicks,
                cart_adds: acc.cart_adds,
                items_added: acc.items_added,
                items_removed: acc.items_removed,
                current_cart_total: acc.last_cart.map(|(_, total)| total),
                session_intent: infer_intent(acc.cart_adds, acc.clicks, unique_queries),
                last_updated: now,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn search(session: &str, query: &str, minute: i64) -> SearchEvent {
        SearchEvent {
            event_id: format!("s-{session}-{minute}"),
            timestamp: at(minute),
            user_id: None,
            session_id: session.to_string(),
            query: query.to_string(),
            result_count: 12,
            response_time_ms: 40,
        }
    }

    fn click(session: &str, sku: &str, minute: i64) -> InteractionEvent {
        InteractionEvent {
            event_id: format!("i-{session}-{sku}-{minute}"),
            timestamp: at(minute),
            user_id: Some("u1".to_string()),
            session_id: session.to_string(),
            product_sku: sku.to_string(),
            product_name: sku.to_string(),
            interaction_type: InteractionType::Click,
            category: "dairy".to_string(),
            brand: "brand".to_string(),
            price: 2.5,
        }
    }

    fn cart(session: &str, action: CartAction, quantity: u32, total: f64, minute: i64) -> CartEvent {
        CartEvent {
            event_id: format!("c-{session}-{minute}"),
            timestamp: at(minute),
            user_id: Some("u1".to_string()),
            session_id: session.to_string(),
            action,
            product_sku: "sku".to_string(),
            quantity,
            cart_total_after: total,
        }
    }

    #[test]
    fn browsing_intent_with_clicks_but_no_cart_adds() {
        // 0 cart adds, 6 clicks, 2 unique queries → browsing.
        let searches = vec![search("s1", "milk", 0), search("s1", "bread", 1)];
        let clicks: Vec<_> = (0..6).map(|i| click("s1", &format!("sku{i}"), 2 + i)).collect();

        let rows = compute_session_context(&searches, &clicks, &[], at(10));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].session_intent, SessionIntent::Browsing);
        assert_eq!(rows[0].clicks, 6);
        assert_eq!(rows[0].unique_queries, 2);
        assert_eq!(rows[0].current_cart_total, None);
    }

    #[test]
    fn intent_priority_puts_shopping_first() {
        assert_eq!(infer_intent(1, 10, 10), SessionIntent::Shopping);
        assert_eq!(infer_intent(0, 6, 10), SessionIntent::Browsing);
        assert_eq!(infer_intent(0, 5, 4), SessionIntent::Exploring);
        assert_eq!(infer_intent(0, 5, 3), SessionIntent::Searching);
        assert_eq!(infer_intent(0, 0, 0), SessionIntent::Searching);
    }

    #[test]
    fn span_and_cart_counters_cover_all_three_streams() {
        let searches = vec![search("s1", "milk", 0)];
        let interactions = vec![click("s1", "sku1", 5)];
        let carts = vec![
            cart("s1", CartAction::Add, 2, 4.0, 10),
            cart("s1", CartAction::Add, 1, 6.5, 12),
            cart("s1", CartAction::Remove, 1, 4.0, 15),
        ];

        let rows = compute_session_context(&searches, &interactions, &carts, at(20));
        let row = &rows[0];
        assert_eq!(row.session_start, at(0));
        assert_eq!(row.session_end, at(15));
        assert_eq!(row.cart_adds, 2);
        assert_eq!(row.items_added, 3);
        assert_eq!(row.items_removed, 1);
        assert_eq!(row.current_cart_total, Some(4.0));
        assert_eq!(row.session_intent, SessionIntent::Shopping);
        assert_eq!(row.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn every_session_with_one_event_is_represented() {
        let searches = vec![search("lonely", "anything", 0)];
        let rows = compute_session_context(&searches, &[], &[], at(1));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_searches, 1);
        assert_eq!(rows[0].session_intent, SessionIntent::Searching);
    }

    #[test]
    fn sessions_are_keyed_independently() {
        let searches = vec![search("a", "milk", 0), search("b", "milk", 0)];
        let carts = vec![cart("b", CartAction::Add, 1, 3.0, 1)];

        let rows = compute_session_context(&searches, &[], &carts, at(5));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].session_id, "a");
        assert_eq!(rows[0].session_intent, SessionIntent::Searching);
        assert_eq!(rows[1].session_id, "b");
        assert_eq!(rows[1].session_intent, SessionIntent::Shopping);
    }
}
