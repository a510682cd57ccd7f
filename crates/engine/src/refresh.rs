//! One refresh = read the pattern's event window, recompute from scratch,
//! replace the table. Failures leave the previous snapshot untouched.

use std::sync::Arc;
use std::time::Instant;

use basketry_core::domain::pattern::PatternKind;
use basketry_core::patterns::association::{compute_associations, ASSOCIATION_WINDOW_DAYS};
use basketry_core::patterns::behavior::{compute_behavior, BEHAVIOR_WINDOW_DAYS};
use basketry_core::patterns::preference::{compute_preferences, PREFERENCE_WINDOW_DAYS};
use basketry_core::patterns::reorder::{compute_reorder, REORDER_WINDOW_DAYS};
use basketry_core::patterns::session::{compute_session_context, SESSION_WINDOW_HOURS};
use basketry_db::event_store::EventStore;
use basketry_db::pattern_store::PatternStore;
use basketry_db::StoreError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RefreshError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(error) => error.is_retryable(),
        }
    }
}

/// What one completed refresh did, for logs and CLI output.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct RefreshReport {
    pub pattern: PatternKind,
    pub rows: u32,
    pub skipped_events: u32,
    pub elapsed_ms: u64,
}

pub struct RefreshEngine<E, P> {
    events: Arc<E>,
    patterns: Arc<P>,
}

impl<E, P> Clone for RefreshEngine<E, P> {
    fn clone(&self) -> Self {
        Self { events: Arc::clone(&self.events), patterns: Arc::clone(&self.patterns) }
    }
}

impl<E: EventStore, P: PatternStore> RefreshEngine<E, P> {
    pub fn new(events: Arc<E>, patterns: Arc<P>) -> Self {
        Self { events, patterns }
    }

    pub async fn refresh(&self, pattern: PatternKind) -> Result<RefreshReport, RefreshError> {
        self.refresh_at(pattern, Utc::now()).await
    }

    /// Recompute one pattern table as of `now`. `now` is pinned once per
    /// refresh so window bounds and `last_updated` stamps agree.
    pub async fn refresh_at(
        &self,
        pattern: PatternKind,
        now: DateTime<Utc>,
    ) -> Result<RefreshReport, RefreshError> {
        let started = Instant::now();
        let (rows, skipped_events) = match pattern {
            PatternKind::Preference => self.refresh_preferences(now).await?,
            PatternKind::Association => self.refresh_associations(now).await?,
            PatternKind::Reorder => self.refresh_reorder(now).await?,
            PatternKind::Behavior => self.refresh_behavior(now).await?,
            PatternKind::SessionContext => self.refresh_session_context(now).await?,
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let report = RefreshReport { pattern, rows, skipped_events, elapsed_ms };
        tracing::info!(
            pattern = pattern.as_str(),
            rows,
            skipped_events,
            elapsed_ms,
            "pattern refresh complete"
        );
        Ok(report)
    }

    /// Refresh every pattern table once. One pattern failing never stops the
    /// others; the caller gets an outcome per pattern.
    pub async fn refresh_all_at(
        &self,
        now: DateTime<Utc>,
    ) -> Vec<(PatternKind, Result<RefreshReport, RefreshError>)> {
        let mut outcomes = Vec::with_capacity(PatternKind::ALL.len());
        for pattern in PatternKind::ALL {
            let outcome = self.refresh_at(pattern, now).await;
            if let Err(error) = &outcome {
                tracing::error!(
                    pattern = pattern.as_str(),
                    error = %error,
                    retryable = error.is_retryable(),
                    "pattern refresh failed"
                );
            }
            outcomes.push((pattern, outcome));
        }
        outcomes
    }

    pub async fn refresh_all(
        &self,
    ) -> Vec<(PatternKind, Result<RefreshReport, RefreshError>)> {
        self.refresh_all_at(Utc::now()).await
    }

    async fn refresh_preferences(&self, now: DateTime<Utc>) -> Result<(u32, u32), RefreshError> {
        let since = now - Duration::days(PREFERENCE_WINDOW_DAYS);
        let window = self.events.interaction_events(since).await?;
        let rows = compute_preferences(&window.events, now);
        let count = rows.len();
        self.patterns.replace_preferences(rows).await?;
        Ok((as_u32(count), window.skipped))
    }

    async fn refresh_associations(&self, now: DateTime<Utc>) -> Result<(u32, u32), RefreshError> {
        let since = now - Duration::days(ASSOCIATION_WINDOW_DAYS);
        let window = self.events.order_events(since).await?;
        let rows = compute_associations(&window.events, now);
        let count = rows.len();
        self.patterns.replace_associations(rows).await?;
        Ok((as_u32(count), window.skipped))
    }

    async fn refresh_reorder(&self, now: DateTime<Utc>) -> Result<(u32, u32), RefreshError> {
        let since = now - Duration::days(REORDER_WINDOW_DAYS);
        let window = self.events.order_events(since).await?;
        let rows = compute_reorder(&window.events, now);
        let count = rows.len();
        self.patterns.replace_reorder(rows).await?;
        Ok((as_u32(count), window.skipped))
    }

    async fn refresh_behavior(&self, now: DateTime<Utc>) -> Result<(u32, u32), RefreshError> {
        let since = now - Duration::days(BEHAVIOR_WINDOW_DAYS);
        let orders = self.events.order_events(since).await?;
        let interactions = self.events.interaction_events(since).await?;
        let rows = compute_behavior(&orders.events, &interactions.events, now);
        let count = rows.len();
        self.patterns.replace_behavior(rows).await?;
        Ok((as_u32(count), orders.skipped + interactions.skipped))
    }

    async fn refresh_session_context(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(u32, u32), RefreshError> {
        let since = now - Duration::hours(SESSION_WINDOW_HOURS);
        let searches = self.events.search_events(since).await?;
        let interactions = self.events.interaction_events(since).await?;
        let carts = self.events.cart_events(since).await?;
        let rows =
            compute_session_context(&searches.events, &interactions.events, &carts.events, now);
        let count = rows.len();
        self.patterns.replace_session_context(rows).await?;
        Ok((as_u32(count), searches.skipped + interactions.skipped + carts.skipped))
    }
}

fn as_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}
