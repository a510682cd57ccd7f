//! Deterministic demo data for local runs.
//!
//! The seed gives every pattern computation something to chew on: repeat
//! orders across months for reorder and behavior, overlapping baskets for
//! associations, branded interactions for preferences, and a pair of fresh
//! sessions for session context.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::DbPool;

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct SeedSummary {
    pub search_events: u32,
    pub interaction_events: u32,
    pub cart_events: u32,
    pub orders: u32,
    pub order_items: u32,
}

struct Seeder<'a> {
    pool: &'a DbPool,
    summary: SeedSummary,
    next_id: u32,
}

impl<'a> Seeder<'a> {
    fn new(pool: &'a DbPool) -> Self {
        Self { pool, summary: SeedSummary::default(), next_id: 0 }
    }

    fn event_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("seed-{prefix}-{:04}", self.next_id)
    }

    async fn search(
        &mut self,
        timestamp: DateTime<Utc>,
        user_id: Option<&str>,
        session_id: &str,
        query: &str,
        result_count: u32,
    ) -> Result<(), sqlx::Error> {
        let event_id = self.event_id("search");
        sqlx::query(
            "INSERT INTO search_events (event_id, timestamp, user_id, session_id, query, result_count, response_time_ms)
             VALUES (?, ?, ?, ?, ?, ?, 35)",
        )
        .bind(event_id)
        .bind(timestamp.to_rfc3339())
        .bind(user_id)
        .bind(session_id)
        .bind(query)
        .bind(result_count)
        .execute(self.pool)
        .await?;
        self.summary.search_events += 1;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn interaction(
        &mut self,
        timestamp: DateTime<Utc>,
        user_id: Option<&str>,
        session_id: &str,
        sku: &str,
        name: &str,
        interaction_type: &str,
        category: &str,
        brand: &str,
        price: f64,
    ) -> Result<(), sqlx::Error> {
        let event_id = self.event_id("interaction");
        sqlx::query(
            "INSERT INTO interaction_events (event_id, timestamp, user_id, session_id, product_sku,
                 product_name, interaction_type, category, brand, price)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event_id)
        .bind(timestamp.to_rfc3339())
        .bind(user_id)
        .bind(session_id)
        .bind(sku)
        .bind(name)
        .bind(interaction_type)
        .bind(category)
        .bind(brand)
        .bind(price)
        .execute(self.pool)
        .await?;
        self.summary.interaction_events += 1;
        Ok(())
    }

    async fn cart(
        &mut self,
        timestamp: DateTime<Utc>,
        user_id: Option<&str>,
        session_id: &str,
        action: &str,
        sku: &str,
        quantity: u32,
        cart_total_after: f64,
    ) -> Result<(), sqlx::Error> {
        let event_id = self.event_id("cart");
        sqlx::query(
            "INSERT INTO cart_events (event_id, timestamp, user_id, session_id, action, product_sku, quantity, cart_total_after)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event_id)
        .bind(timestamp.to_rfc3339())
        .bind(user_id)
        .bind(session_id)
        .bind(action)
        .bind(sku)
        .bind(quantity)
        .bind(cart_total_after)
        .execute(self.pool)
        .await?;
        self.summary.cart_events += 1;
        Ok(())
    }

    async fn order(
        &mut self,
        order_id: &str,
        timestamp: DateTime<Utc>,
        user_id: &str,
        session_id: &str,
        items: &[(&str, &str, u32, f64)],
    ) -> Result<(), sqlx::Error> {
        let order_total: f64 =
            items.iter().map(|(_, _, quantity, price)| f64::from(*quantity) * price).sum();
        sqlx::query(
            "INSERT INTO orders (order_id, timestamp, user_id, session_id, order_total)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(timestamp.to_rfc3339())
        .bind(user_id)
        .bind(session_id)
        .bind(order_total)
        .execute(self.pool)
        .await?;
        self.summary.orders += 1;

        for (seq, (sku, name, quantity, price)) in items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, seq, sku, name, quantity, unit_price)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(seq as i64)
            .bind(sku)
            .bind(name)
            .bind(quantity)
            .bind(price)
            .execute(self.pool)
            .await?;
            self.summary.order_items += 1;
        }
        Ok(())
    }
}

/// Seeds the event tables relative to `now`. Idempotent only on an empty
/// database; reseeding an already seeded one fails on duplicate ids.
pub async fn seed_demo_events(pool: &DbPool, now: DateTime<Utc>) -> Result<SeedSummary, sqlx::Error> {
    let mut seeder = Seeder::new(pool);

    // Alice orders weekly; milk and bread co-occur in every basket.
    for week in 0..10u32 {
        let placed = now - Duration::days(7 * i64::from(week) + 2);
        let order_id = format!("seed-order-alice-{week:02}");
        let session_id = format!("s-alice-w{week:02}");
        seeder
            .order(
                &order_id,
                placed,
                "alice",
                &session_id,
                &[
                    ("sku-milk", "Oat Milk 1L", 2, 3.50),
                    ("sku-bread", "Sourdough Loaf", 1, 4.20),
                    ("sku-eggs", "Free Range Eggs", 1, 5.10),
                ],
            )
            .await?;
    }

    // Bob orders roughly every ten days; coffee rides along with milk.
    for round in 0..6u32 {
        let placed = now - Duration::days(10 * i64::from(round) + 4);
        let order_id = format!("seed-order-bob-{round:02}");
        let session_id = format!("s-bob-r{round:02}");
        seeder
            .order(
                &order_id,
                placed,
                "bob",
                &session_id,
                &[
                    ("sku-milk", "Oat Milk 1L", 1, 3.50),
                    ("sku-coffee", "Dark Roast Beans", 1, 11.90),
                ],
            )
            .await?;
    }

    // Carol is an occasional shopper with a distinct basket.
    for gap in [5i64, 52, 110] {
        let placed = now - Duration::days(gap);
        let order_id = format!("seed-order-carol-{gap:03}");
        seeder
            .order(
                &order_id,
                placed,
                "carol",
                "s-carol",
                &[
                    ("sku-pasta", "Bronze-Cut Penne", 2, 2.80),
                    ("sku-sauce", "Tomato Basil Sauce", 2, 3.40),
                ],
            )
            .await?;
    }

    // Recent branded interactions feed the preference table.
    for day in 0..5i64 {
        let ts = now - Duration::days(day * 3 + 1);
        seeder
            .interaction(
                ts,
                Some("alice"),
                "s-alice-browse",
                "sku-milk",
                "Oat Milk 1L",
                "view",
                "dairy",
                "Fieldworks",
                3.50,
            )
            .await?;
        seeder
            .interaction(
                ts + Duration::minutes(2),
                Some("alice"),
                "s-alice-browse",
                "sku-yogurt",
                "Oat Yogurt",
                "click",
                "dairy",
                "Fieldworks",
                2.90,
            )
            .await?;
    }
    seeder
        .interaction(
            now - Duration::days(2),
            Some("bob"),
            "s-bob-browse",
            "sku-coffee",
            "Dark Roast Beans",
            "purchase",
            "beverages",
            "Ember Roasters",
            11.90,
        )
        .await?;

    // A live shopping session for alice, inside the last day.
    let session_start = now - Duration::hours(2);
    seeder.search(session_start, Some("alice"), "s-alice-live", "oat milk", 14).await?;
    seeder
        .search(session_start + Duration::minutes(3), Some("alice"), "s-alice-live", "granola", 9)
        .await?;
    seeder
        .interaction(
            session_start + Duration::minutes(5),
            Some("alice"),
            "s-alice-live",
            "sku-milk",
            "Oat Milk 1L",
            "view",
            "dairy",
            "Fieldworks",
            3.50,
        )
        .await?;
    seeder
        .cart(
            session_start + Duration::minutes(6),
            Some("alice"),
            "s-alice-live",
            "add",
            "sku-milk",
            2,
            7.00,
        )
        .await?;
    seeder
        .cart(
            session_start + Duration::minutes(8),
            Some("alice"),
            "s-alice-live",
            "add",
            "sku-granola",
            1,
            11.50,
        )
        .await?;

    // An anonymous browser clicking through results.
    let anon_start = now - Duration::hours(5);
    seeder.search(anon_start, None, "s-anon-1", "chocolate", 22).await?;
    for click in 0..6i64 {
        seeder
            .interaction(
                anon_start + Duration::minutes(click + 1),
                None,
                "s-anon-1",
                "sku-choc",
                "Dark Chocolate Bar",
                "click",
                "snacks",
                "Cacao Works",
                3.20,
            )
            .await?;
    }

    Ok(seeder.summary)
}
