//! Bounded-recency reads over the append-only event tables.
//!
//! Each consumer asks for its own fixed window; the store returns events
//! ordered by timestamp. A malformed row (unparseable timestamp, unknown
//! enum value) is skipped and counted, never fatal to the window read, so a
//! single bad record cannot starve a whole refresh.

use async_trait::async_trait;
use basketry_core::domain::event::{
    CartAction, CartEvent, InteractionEvent, InteractionType, OrderEvent, OrderItem, SearchEvent,
};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use thiserror::Error;

use crate::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or a query failed outright.
    /// Transient; callers should retry on their next scheduled tick.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        Self::Unavailable(error.to_string())
    }
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// A window of decoded events plus the count of malformed rows skipped.
#[derive(Clone, Debug)]
pub struct WindowRead<T> {
    pub events: Vec<T>,
    pub skipped: u32,
}

impl<T> WindowRead<T> {
    pub fn new(events: Vec<T>) -> Self {
        Self { events, skipped: 0 }
    }
}

/// Read access to the four event streams. Events are immutable once stored,
/// so concurrent reads from all five pattern computations are safe.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn search_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<SearchEvent>, StoreError>;

    async fn interaction_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<InteractionEvent>, StoreError>;

    /// Keyed variant of [`Self::interaction_events`] for single-user reads.
    async fn interaction_events_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<InteractionEvent>, StoreError>;

    async fn cart_events(&self, since: DateTime<Utc>)
        -> Result<WindowRead<CartEvent>, StoreError>;

    async fn order_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<OrderEvent>, StoreError>;
}

pub struct SqlEventStore {
    pool: DbPool,
}

impl SqlEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for SqlEventStore {
    async fn search_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<SearchEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, timestamp, user_id, session_id, query, result_count, response_time_ms
            FROM search_events
            WHERE timestamp >= ?
            ORDER BY timestamp ASC, event_id ASC
            "#,
        )
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        Ok(collect_window(&rows, "search_events", search_from_row))
    }

    async fn interaction_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<InteractionEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, timestamp, user_id, session_id, product_sku, product_name,
                   interaction_type, category, brand, price
            FROM interaction_events
            WHERE timestamp >= ?
            ORDER BY timestamp ASC, event_id ASC
            "#,
        )
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        Ok(collect_window(&rows, "interaction_events", interaction_from_row))
    }

    async fn interaction_events_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<InteractionEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, timestamp, user_id, session_id, product_sku, product_name,
                   interaction_type, category, brand, price
            FROM interaction_events
            WHERE user_id = ? AND timestamp >= ?
            ORDER BY timestamp ASC, event_id ASC
            "#,
        )
        .bind(user_id)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        Ok(collect_window(&rows, "interaction_events", interaction_from_row))
    }

    async fn cart_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<CartEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, timestamp, user_id, session_id, action, product_sku,
                   quantity, cart_total_after
            FROM cart_events
            WHERE timestamp >= ?
            ORDER BY timestamp ASC, event_id ASC
            "#,
        )
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        Ok(collect_window(&rows, "cart_events", cart_from_row))
    }

    async fn order_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<OrderEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT o.order_id, o.timestamp, o.user_id, o.session_id, o.order_total,
                   i.sku, i.name, i.quantity, i.unit_price
            FROM orders o
            LEFT JOIN order_items i ON i.order_id = o.order_id
            WHERE o.timestamp >= ?
            ORDER BY o.timestamp ASC, o.order_id ASC, i.seq ASC
            "#,
        )
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        let mut events: Vec<OrderEvent> = Vec::new();
        let mut skipped = 0u32;
        let mut bad_order: Option<String> = None;

        for row in &rows {
            let order_id: String = row.try_get("order_id")?;

            if bad_order.as_deref() == Some(order_id.as_str()) {
                continue;
            }

            let is_new_order =
                events.last().map(|event| event.order_id != order_id).unwrap_or(true);
            if is_new_order {
                match order_header_from_row(row) {
                    Ok(event) => {
                        bad_order = None;
                        events.push(event);
                    }
                    Err(error) => {
                        // One malformed order drops all of its item rows.
                        tracing::warn!(
                            table = "orders",
                            order_id = %order_id,
                            error = %error,
                            "skipping malformed order"
                        );
                        skipped += 1;
                        bad_order = Some(order_id);
                        continue;
                    }
                }
            }

            let Some(event) = events.last_mut() else {
                continue;
            };
            match item_from_row(row) {
                Ok(Some(item)) => event.items.push(item),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        table = "order_items",
                        order_id = %event.order_id,
                        error = %error,
                        "skipping malformed order item"
                    );
                    skipped += 1;
                }
            }
        }

        Ok(WindowRead { events, skipped })
    }
}

fn collect_window<T>(
    rows: &[SqliteRow],
    table: &'static str,
    decode: fn(&SqliteRow) -> Result<T, StoreError>,
) -> WindowRead<T> {
    let mut events = Vec::with_capacity(rows.len());
    let mut skipped = 0u32;
    for row in rows {
        match decode(row) {
            Ok(event) => events.push(event),
            Err(error) => {
                tracing::warn!(table, error = %error, "skipping malformed event row");
                skipped += 1;
            }
        }
    }
    WindowRead { events, skipped }
}

fn search_from_row(row: &SqliteRow) -> Result<SearchEvent, StoreError> {
    Ok(SearchEvent {
        event_id: row.try_get("event_id")?,
        timestamp: parse_rfc3339("search event timestamp", &row.try_get::<String, _>("timestamp")?)?,
        user_id: row.try_get("user_id")?,
        session_id: row.try_get("session_id")?,
        query: row.try_get("query")?,
        result_count: decode_count(row, "result_count")?,
        response_time_ms: decode_count(row, "response_time_ms")?,
    })
}

fn interaction_from_row(row: &SqliteRow) -> Result<InteractionEvent, StoreError> {
    let interaction_type_raw: String = row.try_get("interaction_type")?;
    let interaction_type = InteractionType::parse(&interaction_type_raw).ok_or_else(|| {
        StoreError::Decode(format!("unknown interaction_type: {interaction_type_raw}"))
    })?;

    Ok(InteractionEvent {
        event_id: row.try_get("event_id")?,
        timestamp: parse_rfc3339(
            "interaction event timestamp",
            &row.try_get::<String, _>("timestamp")?,
        )?,
        user_id: row.try_get("user_id")?,
        session_id: row.try_get("session_id")?,
        product_sku: row.try_get("product_sku")?,
        product_name: row.try_get("product_name")?,
        interaction_type,
        category: row.try_get("category")?,
        brand: row.try_get("brand")?,
        price: row.try_get("price")?,
    })
}

fn cart_from_row(row: &SqliteRow) -> Result<CartEvent, StoreError> {
    let action_raw: String = row.try_get("action")?;
    let action = CartAction::parse(&action_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown cart action: {action_raw}")))?;

    Ok(CartEvent {
        event_id: row.try_get("event_id")?,
        timestamp: parse_rfc3339("cart event timestamp", &row.try_get::<String, _>("timestamp")?)?,
        user_id: row.try_get("user_id")?,
        session_id: row.try_get("session_id")?,
        action,
        product_sku: row.try_get("product_sku")?,
        quantity: decode_count(row, "quantity")?,
        cart_total_after: row.try_get("cart_total_after")?,
    })
}

fn order_header_from_row(row: &SqliteRow) -> Result<OrderEvent, StoreError> {
    Ok(OrderEvent {
        order_id: row.try_get("order_id")?,
        timestamp: parse_rfc3339("order timestamp", &row.try_get::<String, _>("timestamp")?)?,
        user_id: row.try_get("user_id")?,
        session_id: row.try_get("session_id")?,
        order_total: row.try_get("order_total")?,
        items: Vec::new(),
    })
}

/// `None` for the left-join null row of an order without items.
fn item_from_row(row: &SqliteRow) -> Result<Option<OrderItem>, StoreError> {
    let sku: Option<String> = row.try_get("sku")?;
    let Some(sku) = sku else {
        return Ok(None);
    };

    Ok(Some(OrderItem {
        sku,
        name: row.try_get("name")?,
        quantity: decode_count(row, "quantity")?,
        unit_price: row.try_get("unit_price")?,
    }))
}

fn decode_count(row: &SqliteRow, column: &str) -> Result<u32, StoreError> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw)
        .map_err(|_| StoreError::Decode(format!("negative or oversized {column}: {raw}")))
}

pub(crate) fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        StoreError::Decode(format!("invalid {field} '{value}': {err}"))
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use basketry_core::config::DatabaseConfig;

    use crate::{connect, migrations};

    async fn setup_pool(name: &str) -> DbPool {
        let database = DatabaseConfig {
            url: format!("sqlite:file:{name}?mode=memory&cache=shared"),
            max_connections: 1,
            timeout_secs: 30,
        };
        let pool = connect(&database).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn ts(offset_minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap() + Duration::minutes(offset_minutes)
    }

    async fn insert_search(pool: &DbPool, event_id: &str, timestamp: &str) {
        sqlx::query(
            "INSERT INTO search_events (event_id, timestamp, user_id, session_id, query, result_count, response_time_ms)
             VALUES (?, ?, 'u1', 's1', 'oat milk', 10, 42)",
        )
        .bind(event_id)
        .bind(timestamp)
        .execute(pool)
        .await
        .expect("insert search event");
    }

    #[tokio::test]
    async fn window_reads_are_ordered_and_bounded() {
        let pool = setup_pool("event_store_window").await;

        insert_search(&pool, "e-late", &ts(20).to_rfc3339()).await;
        insert_search(&pool, "e-early", &ts(5).to_rfc3339()).await;
        insert_search(&pool, "e-ancient", &(ts(0) - Duration::days(2)).to_rfc3339()).await;

        let store = SqlEventStore::new(pool.clone());
        let read = store.search_events(ts(0)).await.expect("read window");

        assert_eq!(read.skipped, 0);
        let ids: Vec<&str> = read.events.iter().map(|event| event.event_id.as_str()).collect();
        assert_eq!(ids, vec!["e-early", "e-late"]);

        pool.close().await;
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped_not_fatal() {
        let pool = setup_pool("event_store_malformed").await;

        insert_search(&pool, "e-good", &ts(1).to_rfc3339()).await;
        insert_search(&pool, "e-bad-ts", "not-a-timestamp-sorts-late").await;

        sqlx::query(
            "INSERT INTO interaction_events (event_id, timestamp, user_id, session_id, product_sku,
                 product_name, interaction_type, category, brand, price)
             VALUES ('i-bad', ?, 'u1', 's1', 'sku-1', 'Oat Milk', 'teleport', 'dairy', 'Oatly', 3.5)",
        )
        .bind(ts(2).to_rfc3339())
        .execute(&pool)
        .await
        .expect("insert malformed interaction");
        sqlx::query(
            "INSERT INTO interaction_events (event_id, timestamp, user_id, session_id, product_sku,
                 product_name, interaction_type, category, brand, price)
             VALUES ('i-good', ?, 'u1', 's1', 'sku-1', 'Oat Milk', 'view', 'dairy', 'Oatly', 3.5)",
        )
        .bind(ts(3).to_rfc3339())
        .execute(&pool)
        .await
        .expect("insert valid interaction");

        let store = SqlEventStore::new(pool.clone());

        let searches = store.search_events(ts(0)).await.expect("read searches");
        assert_eq!(searches.events.len(), 1);
        assert_eq!(searches.skipped, 1);

        let interactions = store.interaction_events(ts(0)).await.expect("read interactions");
        assert_eq!(interactions.events.len(), 1);
        assert_eq!(interactions.events[0].event_id, "i-good");
        assert_eq!(interactions.events[0].interaction_type, InteractionType::View);
        assert_eq!(interactions.skipped, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn keyed_interaction_read_filters_by_user() {
        let pool = setup_pool("event_store_keyed").await;

        for (event_id, user_id, minute) in
            [("i-u1-late", Some("u1"), 8), ("i-u1-early", Some("u1"), 2), ("i-u2", Some("u2"), 4), ("i-anon", None, 6)]
        {
            sqlx::query(
                "INSERT INTO interaction_events (event_id, timestamp, user_id, session_id, product_sku,
                     product_name, interaction_type, category, brand, price)
                 VALUES (?, ?, ?, 's1', 'sku-1', 'Oat Milk', 'click', 'dairy', 'Oatly', 3.5)",
            )
            .bind(event_id)
            .bind(ts(minute).to_rfc3339())
            .bind(user_id)
            .execute(&pool)
            .await
            .expect("insert interaction");
        }

        let store = SqlEventStore::new(pool.clone());
        let read = store.interaction_events_for_user("u1", ts(0)).await.expect("keyed read");

        assert_eq!(read.skipped, 0);
        let ids: Vec<&str> = read.events.iter().map(|event| event.event_id.as_str()).collect();
        assert_eq!(ids, vec!["i-u1-early", "i-u1-late"]);

        pool.close().await;
    }

    #[tokio::test]
    async fn orders_reassemble_their_items_in_sequence() {
        let pool = setup_pool("event_store_orders").await;

        for (order_id, minute) in [("o2", 10), ("o1", 5)] {
            sqlx::query(
                "INSERT INTO orders (order_id, timestamp, user_id, session_id, order_total)
                 VALUES (?, ?, 'u1', 's1', 12.5)",
            )
            .bind(order_id)
            .bind(ts(minute).to_rfc3339())
            .execute(&pool)
            .await
            .expect("insert order");
        }
        for (order_id, seq, sku) in [("o1", 0, "milk"), ("o1", 1, "bread"), ("o2", 0, "eggs")] {
            sqlx::query(
                "INSERT INTO order_items (order_id, seq, sku, name, quantity, unit_price)
                 VALUES (?, ?, ?, ?, 2, 3.1)",
            )
            .bind(order_id)
            .bind(seq)
            .bind(sku)
            .bind(sku)
            .execute(&pool)
            .await
            .expect("insert order item");
        }

        let store = SqlEventStore::new(pool.clone());
        let read = store.order_events(ts(0)).await.expect("read orders");

        assert_eq!(read.events.len(), 2);
        assert_eq!(read.events[0].order_id, "o1");
        let skus: Vec<&str> =
            read.events[0].items.iter().map(|item| item.sku.as_str()).collect();
        assert_eq!(skus, vec!["milk", "bread"]);
        assert_eq!(read.events[1].order_id, "o2");
        assert_eq!(read.events[1].items.len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn malformed_order_header_drops_only_that_order() {
        let pool = setup_pool("event_store_bad_order").await;

        sqlx::query(
            "INSERT INTO orders (order_id, timestamp, user_id, session_id, order_total)
             VALUES ('o-bad', 'zzz-not-a-date', 'u1', 's1', 5.0)",
        )
        .execute(&pool)
        .await
        .expect("insert bad order");
        sqlx::query(
            "INSERT INTO orders (order_id, timestamp, user_id, session_id, order_total)
             VALUES ('o-good', ?, 'u1', 's1', 7.0)",
        )
        .bind(ts(1).to_rfc3339())
        .execute(&pool)
        .await
        .expect("insert good order");
        for (order_id, seq) in [("o-bad", 0), ("o-bad", 1), ("o-good", 0)] {
            sqlx::query(
                "INSERT INTO order_items (order_id, seq, sku, name, quantity, unit_price)
                 VALUES (?, ?, 'sku', 'sku', 1, 1.0)",
            )
            .bind(order_id)
            .bind(seq)
            .execute(&pool)
            .await
            .expect("insert item");
        }

        let store = SqlEventStore::new(pool.clone());
        let read = store.order_events(ts(0) - Duration::days(1)).await.expect("read orders");

        assert_eq!(read.events.len(), 1);
        assert_eq!(read.events[0].order_id, "o-good");
        assert_eq!(read.skipped, 1);

        pool.close().await;
    }
}
