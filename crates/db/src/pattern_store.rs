//! Persistence for the derived pattern tables.
//!
//! Every refresh replaces a table wholesale: one transaction deletes the old
//! snapshot and inserts the new rows, so readers always observe a complete
//! snapshot and rows for aged-out behavior disappear on their own.

use async_trait::async_trait;
use basketry_core::domain::pattern::{
    AssociationPattern, PatternKind, PreferencePattern, ReorderPattern, SessionContextPattern,
    SessionIntent, ShoppingBehaviorPattern, ShoppingFrequency,
};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use crate::event_store::{parse_rfc3339, StoreError};
use crate::DbPool;

/// Row count and freshness of one pattern table, for status reporting.
#[derive(Clone, Debug)]
pub struct PatternSnapshotInfo {
    pub kind: PatternKind,
    pub rows: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn replace_preferences(&self, rows: Vec<PreferencePattern>) -> Result<(), StoreError>;
    async fn replace_associations(&self, rows: Vec<AssociationPattern>) -> Result<(), StoreError>;
    async fn replace_reorder(&self, rows: Vec<ReorderPattern>) -> Result<(), StoreError>;
    async fn replace_behavior(&self, rows: Vec<ShoppingBehaviorPattern>)
        -> Result<(), StoreError>;
    async fn replace_session_context(
        &self,
        rows: Vec<SessionContextPattern>,
    ) -> Result<(), StoreError>;

    async fn preferences_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<PreferencePattern>, StoreError>;
    async fn associations_for_product(
        &self,
        product_sku: &str,
    ) -> Result<Vec<AssociationPattern>, StoreError>;
    async fn reorder_for_user(&self, user_id: &str) -> Result<Vec<ReorderPattern>, StoreError>;
    async fn behavior_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<ShoppingBehaviorPattern>, StoreError>;
    async fn session_context(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionContextPattern>, StoreError>;

    async fn snapshot_counts(&self) -> Result<Vec<PatternSnapshotInfo>, StoreError>;
}

pub struct SqlPatternStore {
    pool: DbPool,
}

impl SqlPatternStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PatternStore for SqlPatternStore {
    async fn replace_preferences(&self, rows: Vec<PreferencePattern>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM preference_patterns").execute(&mut *tx).await?;
        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO preference_patterns
                    (user_id, brand, category, total_interactions, interaction_score,
                     preference_score, confidence, last_interaction, active_days,
                     product_variety, last_updated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.user_id)
            .bind(&row.brand)
            .bind(&row.category)
            .bind(row.total_interactions)
            .bind(row.interaction_score)
            .bind(row.preference_score)
            .bind(row.confidence)
            .bind(row.last_interaction.to_rfc3339())
            .bind(row.active_days)
            .bind(row.product_variety)
            .bind(row.last_updated.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace_associations(&self, rows: Vec<AssociationPattern>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM association_patterns").execute(&mut *tx).await?;
        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO association_patterns
                    (product_a, product_b, co_occurrence_count, unique_users,
                     support, confidence, lift, last_updated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.product_a)
            .bind(&row.product_b)
            .bind(row.co_occurrence_count)
            .bind(row.unique_users)
            .bind(row.support)
            .bind(row.confidence)
            .bind(row.lift)
            .bind(row.last_updated.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace_reorder(&self, rows: Vec<ReorderPattern>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM reorder_patterns").execute(&mut *tx).await?;
        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO reorder_patterns
                    (user_id, product_sku, order_count, avg_reorder_days, reorder_variance,
                     min_reorder_days, max_reorder_days, reorder_consistency, avg_quantity,
                     last_order_date, days_since_last_order, reorder_due, reorder_confidence,
                     last_updated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.user_id)
            .bind(&row.product_sku)
            .bind(row.order_count)
            .bind(row.avg_reorder_days)
            .bind(row.reorder_variance)
            .bind(row.min_reorder_days)
            .bind(row.max_reorder_days)
            .bind(row.reorder_consistency)
            .bind(row.avg_quantity)
            .bind(row.last_order_date.to_rfc3339())
            .bind(row.days_since_last_order)
            .bind(i32::from(row.reorder_due))
            .bind(row.reorder_confidence)
            .bind(row.last_updated.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace_behavior(
        &self,
        rows: Vec<ShoppingBehaviorPattern>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM shopping_behavior_patterns").execute(&mut *tx).await?;
        for row in &rows {
            let top_categories = serde_json::to_string(&row.top_categories)
                .map_err(|err| StoreError::Decode(format!("encode top_categories: {err}")))?;
            sqlx::query(
                r#"
                INSERT INTO shopping_behavior_patterns
                    (user_id, total_orders, shopping_days, avg_order_value,
                     order_value_variance, avg_items_per_order, preferred_day_of_week,
                     preferred_hour, avg_days_between_orders, shopping_frequency,
                     top_categories, last_updated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.user_id)
            .bind(row.total_orders)
            .bind(row.shopping_days)
            .bind(row.avg_order_value)
            .bind(row.order_value_variance)
            .bind(row.avg_items_per_order)
            .bind(row.preferred_day_of_week)
            .bind(row.preferred_hour)
            .bind(row.avg_days_between_orders)
            .bind(row.shopping_frequency.as_str())
            .bind(top_categories)
            .bind(row.last_updated.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace_session_context(
        &self,
        rows: Vec<SessionContextPattern>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM session_context_patterns").execute(&mut *tx).await?;
        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO session_context_patterns
                    (session_id, user_id, session_start, session_end, unique_queries,
                     total_searches, products_viewed, clicks, cart_adds, items_added,
                     items_removed, current_cart_total, session_intent, last_updated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.session_id)
            .bind(&row.user_id)
            .bind(row.session_start.to_rfc3339())
            .bind(row.session_end.to_rfc3339())
            .bind(row.unique_queries)
            .bind(row.total_searches)
            .bind(row.products_viewed)
            .bind(row.clicks)
            .bind(row.cart_adds)
            .bind(row.items_added)
            .bind(row.items_removed)
            .bind(row.current_cart_total)
            .bind(row.session_intent.as_str())
            .bind(row.last_updated.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn preferences_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<PreferencePattern>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, brand, category, total_interactions, interaction_score,
                   preference_score, confidence, last_interaction, active_days,
                   product_variety, last_updated
            FROM preference_patterns
            WHERE user_id = ?
            ORDER BY preference_score DESC, brand ASC, category ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(preference_from_row).collect()
    }

    async fn associations_for_product(
        &self,
        product_sku: &str,
    ) -> Result<Vec<AssociationPattern>, StoreError> {
        // Pairs are stored once under canonical ordering, so the product can
        // sit on either side.
        let rows = sqlx::query(
            r#"
            SELECT product_a, product_b, co_occurrence_count, unique_users,
                   support, confidence, lift, last_updated
            FROM association_patterns
            WHERE product_a = ? OR product_b = ?
            ORDER BY lift DESC, product_a ASC, product_b ASC
            "#,
        )
        .bind(product_sku)
        .bind(product_sku)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(association_from_row).collect()
    }

    async fn reorder_for_user(&self, user_id: &str) -> Result<Vec<ReorderPattern>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, product_sku, order_count, avg_reorder_days, reorder_variance,
                   min_reorder_days, max_reorder_days, reorder_consistency, avg_quantity,
                   last_order_date, days_since_last_order, reorder_due, reorder_confidence,
                   last_updated
            FROM reorder_patterns
            WHERE user_id = ?
            ORDER BY reorder_confidence DESC, product_sku ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reorder_from_row).collect()
    }

    async fn behavior_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<ShoppingBehaviorPattern>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, total_orders, shopping_days, avg_order_value,
                   order_value_variance, avg_items_per_order, preferred_day_of_week,
                   preferred_hour, avg_days_between_orders, shopping_frequency,
                   top_categories, last_updated
            FROM shopping_behavior_patterns
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(behavior_from_row).transpose()
    }

    async fn session_context(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionContextPattern>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT session_id, user_id, session_start, session_end, unique_queries,
                   total_searches, products_viewed, clicks, cart_adds, items_added,
                   items_removed, current_cart_total, session_intent, last_updated
            FROM session_context_patterns
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn snapshot_counts(&self) -> Result<Vec<PatternSnapshotInfo>, StoreError> {
        let mut infos = Vec::with_capacity(PatternKind::ALL.len());
        for kind in PatternKind::ALL {
            let table = pattern_table(kind);
            let row =
                sqlx::query(&format!(
                    "SELECT COUNT(*) AS row_count, MAX(last_updated) AS latest FROM {table}"
                ))
                .fetch_one(&self.pool)
                .await?;
            let rows: i64 = row.try_get("row_count")?;
            let latest: Option<String> = row.try_get("latest")?;
            let last_updated = match latest {
                Some(raw) => Some(parse_rfc3339("snapshot last_updated", &raw)?),
                None => None,
            };
            infos.push(PatternSnapshotInfo {
                kind,
                rows: u32::try_from(rows).unwrap_or(u32::MAX),
                last_updated,
            });
        }
        Ok(infos)
    }
}

fn pattern_table(kind: PatternKind) -> &'static str {
    match kind {
        PatternKind::Preference => "preference_patterns",
        PatternKind::Association => "association_patterns",
        PatternKind::Reorder => "reorder_patterns",
        PatternKind::Behavior => "shopping_behavior_patterns",
        PatternKind::SessionContext => "session_context_patterns",
    }
}

fn preference_from_row(row: &SqliteRow) -> Result<PreferencePattern, StoreError> {
    Ok(PreferencePattern {
        user_id: row.try_get("user_id")?,
        brand: row.try_get("brand")?,
        category: row.try_get("category")?,
        total_interactions: decode_count(row, "total_interactions")?,
        interaction_score: row.try_get("interaction_score")?,
        preference_score: row.try_get("preference_score")?,
        confidence: row.try_get("confidence")?,
        last_interaction: parse_rfc3339(
            "last_interaction",
            &row.try_get::<String, _>("last_interaction")?,
        )?,
        active_days: decode_count(row, "active_days")?,
        product_variety: decode_count(row, "product_variety")?,
        last_updated: parse_rfc3339("last_updated", &row.try_get::<String, _>("last_updated")?)?,
    })
}

fn association_from_row(row: &SqliteRow) -> Result<AssociationPattern, StoreError> {
    Ok(AssociationPattern {
        product_a: row.try_get("product_a")?,
        product_b: row.try_get("product_b")?,
        co_occurrence_count: decode_count(row, "co_occurrence_count")?,
        unique_users: decode_count(row, "unique_users")?,
        support: row.try_get("support")?,
        confidence: row.try_get("confidence")?,
        lift: row.try_get("lift")?,
        last_updated: parse_rfc3339("last_updated", &row.try_get::<String, _>("last_updated")?)?,
    })
}

fn reorder_from_row(row: &SqliteRow) -> Result<ReorderPattern, StoreError> {
    let reorder_due: i64 = row.try_get("reorder_due")?;
    Ok(ReorderPattern {
        user_id: row.try_get("user_id")?,
        product_sku: row.try_get("product_sku")?,
        order_count: decode_count(row, "order_count")?,
        avg_reorder_days: row.try_get("avg_reorder_days")?,
        reorder_variance: row.try_get("reorder_variance")?,
        min_reorder_days: row.try_get("min_reorder_days")?,
        max_reorder_days: row.try_get("max_reorder_days")?,
        reorder_consistency: row.try_get("reorder_consistency")?,
        avg_quantity: row.try_get("avg_quantity")?,
        last_order_date: parse_rfc3339(
            "last_order_date",
            &row.try_get::<String, _>("last_order_date")?,
        )?,
        days_since_last_order: row.try_get("days_since_last_order")?,
        reorder_due: reorder_due != 0,
        reorder_confidence: row.try_get("reorder_confidence")?,
        last_updated: parse_rfc3339("last_updated", &row.try_get::<String, _>("last_updated")?)?,
    })
}

fn behavior_from_row(row: &SqliteRow) -> Result<ShoppingBehaviorPattern, StoreError> {
    let frequency_raw: String = row.try_get("shopping_frequency")?;
    let shopping_frequency = ShoppingFrequency::parse(&frequency_raw).ok_or_else(|| {
        StoreError::Decode(format!("unknown shopping_frequency: {frequency_raw}"))
    })?;
    let top_categories_raw: String = row.try_get("top_categories")?;
    let top_categories: Vec<String> = serde_json::from_str(&top_categories_raw)
        .map_err(|err| StoreError::Decode(format!("decode top_categories: {err}")))?;

    Ok(ShoppingBehaviorPattern {
        user_id: row.try_get("user_id")?,
        total_orders: decode_count(row, "total_orders")?,
        shopping_days: decode_count(row, "shopping_days")?,
        avg_order_value: row.try_get("avg_order_value")?,
        order_value_variance: row.try_get("order_value_variance")?,
        avg_items_per_order: row.try_get("avg_items_per_order")?,
        preferred_day_of_week: decode_count(row, "preferred_day_of_week")?,
        preferred_hour: decode_count(row, "preferred_hour")?,
        avg_days_between_orders: row.try_get("avg_days_between_orders")?,
        shopping_frequency,
        top_categories,
        last_updated: parse_rfc3339("last_updated", &row.try_get::<String, _>("last_updated")?)?,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<SessionContextPattern, StoreError> {
    let intent_raw: String = row.try_get("session_intent")?;
    let session_intent = SessionIntent::parse(&intent_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown session_intent: {intent_raw}")))?;

    Ok(SessionContextPattern {
        session_id: row.try_get("session_id")?,
        user_id: row.try_get("user_id")?,
        session_start: parse_rfc3339(
            "session_start",
            &row.try_get::<String, _>("session_start")?,
        )?,
        session_end: parse_rfc3339("session_end", &row.try_get::<String, _>("session_end")?)?,
        unique_queries: decode_count(row, "unique_queries")?,
        total_searches: decode_count(row, "total_searches")?,
        products_viewed: decode_count(row, "products_viewed")?,
        clicks: decode_count(row, "clicks")?,
        cart_adds: decode_count(row, "cart_adds")?,
        items_added: decode_count(row, "items_added")?,
        items_removed: decode_count(row, "items_removed")?,
        current_cart_total: row.try_get("current_cart_total")?,
        session_intent,
        last_updated: parse_rfc3339("last_updated", &row.try_get::<String, _>("last_updated")?)?,
    })
}

fn decode_count(row: &SqliteRow, column: &str) -> Result<u32, StoreError> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw)
        .map_err(|_| StoreError::Decode(format!("negative or oversized {column}: {raw}")))
}
