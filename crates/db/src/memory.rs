//! In-memory store doubles for tests that exercise the refresh pipeline
//! without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use basketry_core::domain::event::{CartEvent, InteractionEvent, OrderEvent, SearchEvent};
use basketry_core::domain::pattern::{
    AssociationPattern, PatternKind, PreferencePattern, ReorderPattern, SessionContextPattern,
    ShoppingBehaviorPattern,
};
use chrono::{DateTime, Utc};

use crate::event_store::{EventStore, StoreError, WindowRead};
use crate::pattern_store::{PatternSnapshotInfo, PatternStore};

#[derive(Default)]
struct EventLog {
    searches: Vec<SearchEvent>,
    interactions: Vec<InteractionEvent>,
    carts: Vec<CartEvent>,
    orders: Vec<OrderEvent>,
}

/// Event store backed by plain vectors. `fail_next` makes the next read
/// return `StoreError::Unavailable` once, for failure-path tests.
#[derive(Default)]
pub struct InMemoryEventStore {
    log: Mutex<EventLog>,
    fail_next: AtomicBool,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_search(&self, event: SearchEvent) {
        self.log.lock().expect("event log lock").searches.push(event);
    }

    pub fn push_interaction(&self, event: InteractionEvent) {
        self.log.lock().expect("event log lock").interactions.push(event);
    }

    pub fn push_cart(&self, event: CartEvent) {
        self.log.lock().expect("event log lock").carts.push(event);
    }

    pub fn push_order(&self, event: OrderEvent) {
        self.log.lock().expect("event log lock").orders.push(event);
    }

    pub fn fail_next_read(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

fn window<T: Clone>(
    events: &[T],
    since: DateTime<Utc>,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
) -> WindowRead<T> {
    let mut selected: Vec<T> =
        events.iter().filter(|event| timestamp(event) >= since).cloned().collect();
    selected.sort_by_key(&timestamp);
    WindowRead::new(selected)
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn search_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<SearchEvent>, StoreError> {
        self.check_failure()?;
        let log = self.log.lock().expect("event log lock");
        Ok(window(&log.searches, since, |event| event.timestamp))
    }

    async fn interaction_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<InteractionEvent>, StoreError> {
        self.check_failure()?;
        let log = self.log.lock().expect("event log lock");
        Ok(window(&log.interactions, since, |event| event.timestamp))
    }

    async fn interaction_events_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<InteractionEvent>, StoreError> {
        self.check_failure()?;
        let log = self.log.lock().expect("event log lock");
        let mut read = window(&log.interactions, since, |event| event.timestamp);
        read.events.retain(|event| event.user_id.as_deref() == Some(user_id));
        Ok(read)
    }

    async fn cart_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<CartEvent>, StoreError> {
        self.check_failure()?;
        let log = self.log.lock().expect("event log lock");
        Ok(window(&log.carts, since, |event| event.timestamp))
    }

    async fn order_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<WindowRead<OrderEvent>, StoreError> {
        self.check_failure()?;
        let log = self.log.lock().expect("event log lock");
        Ok(window(&log.orders, since, |event| event.timestamp))
    }
}

#[derive(Default)]
struct PatternSnapshots {
    preferences: Vec<PreferencePattern>,
    associations: Vec<AssociationPattern>,
    reorder: Vec<ReorderPattern>,
    behavior: Vec<ShoppingBehaviorPattern>,
    sessions: Vec<SessionContextPattern>,
    replace_counts: HashMap<PatternKind, u32>,
}

/// Pattern store double. Snapshots are swapped atomically under one lock,
/// mirroring the transactional replace of the SQL store.
#[derive(Default)]
pub struct InMemoryPatternStore {
    snapshots: RwLock<PatternSnapshots>,
    fail_next: AtomicBool,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_write(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// How many times a table has been replaced, for idempotence checks.
    pub fn replace_count(&self, kind: PatternKind) -> u32 {
        self.snapshots
            .read()
            .expect("snapshot lock")
            .replace_counts
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn preferences(&self) -> Vec<PreferencePattern> {
        self.snapshots.read().expect("snapshot lock").preferences.clone()
    }

    pub fn associations(&self) -> Vec<AssociationPattern> {
        self.snapshots.read().expect("snapshot lock").associations.clone()
    }

    pub fn reorder(&self) -> Vec<ReorderPattern> {
        self.snapshots.read().expect("snapshot lock").reorder.clone()
    }

    pub fn behavior(&self) -> Vec<ShoppingBehaviorPattern> {
        self.snapshots.read().expect("snapshot lock").behavior.clone()
    }

    pub fn sessions(&self) -> Vec<SessionContextPattern> {
        self.snapshots.read().expect("snapshot lock").sessions.clone()
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn record_replace(snapshots: &mut PatternSnapshots, kind: PatternKind) {
        *snapshots.replace_counts.entry(kind).or_insert(0) += 1;
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn replace_preferences(&self, rows: Vec<PreferencePattern>) -> Result<(), StoreError> {
        self.check_failure()?;
        let mut snapshots = self.snapshots.write().expect("snapshot lock");
        snapshots.preferences = rows;
        Self::record_replace(&mut snapshots, PatternKind::Preference);
        Ok(())
    }

    async fn replace_associations(&self, rows: Vec<AssociationPattern>) -> Result<(), StoreError> {
        self.check_failure()?;
        let mut snapshots = self.snapshots.write().expect("snapshot lock");
        snapshots.associations = rows;
        Self::record_replace(&mut snapshots, PatternKind::Association);
        Ok(())
    }

    async fn replace_reorder(&self, rows: Vec<ReorderPattern>) -> Result<(), StoreError> {
        self.check_failure()?;
        let mut snapshots = self.snapshots.write().expect("snapshot lock");
        snapshots.reorder = rows;
        Self::record_replace(&mut snapshots, PatternKind::Reorder);
        Ok(())
    }

    async fn replace_behavior(
        &self,
        rows: Vec<ShoppingBehaviorPattern>,
    ) -> Result<(), StoreError> {
        self.check_failure()?;
        let mut snapshots = self.snapshots.write().expect("snapshot lock");
        snapshots.behavior = rows;
        Self::record_replace(&mut snapshots, PatternKind::Behavior);
        Ok(())
    }

    async fn replace_session_context(
        &self,
        rows: Vec<SessionContextPattern>,
    ) -> Result<(), StoreError> {
        self.check_failure()?;
        let mut snapshots = self.snapshots.write().expect("snapshot lock");
        snapshots.sessions = rows;
        Self::record_replace(&mut snapshots, PatternKind::SessionContext);
        Ok(())
    }

    async fn preferences_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<PreferencePattern>, StoreError> {
        let snapshots = self.snapshots.read().expect("snapshot lock");
        Ok(snapshots
            .preferences
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn associations_for_product(
        &self,
        product_sku: &str,
    ) -> Result<Vec<AssociationPattern>, StoreError> {
        let snapshots = self.snapshots.read().expect("snapshot lock");
        Ok(snapshots
            .associations
            .iter()
            .filter(|row| row.product_a == product_sku || row.product_b == product_sku)
            .cloned()
            .collect())
    }

    async fn reorder_for_user(&self, user_id: &str) -> Result<Vec<ReorderPattern>, StoreError> {
        let snapshots = self.snapshots.read().expect("snapshot lock");
        Ok(snapshots.reorder.iter().filter(|row| row.user_id == user_id).cloned().collect())
    }

    async fn behavior_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<ShoppingBehaviorPattern>, StoreError> {
        let snapshots = self.snapshots.read().expect("snapshot lock");
        Ok(snapshots.behavior.iter().find(|row| row.user_id == user_id).cloned())
    }

    async fn session_context(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionContextPattern>, StoreError> {
        let snapshots = self.snapshots.read().expect("snapshot lock");
        Ok(snapshots.sessions.iter().find(|row| row.session_id == session_id).cloned())
    }

    async fn snapshot_counts(&self) -> Result<Vec<PatternSnapshotInfo>, StoreError> {
        let snapshots = self.snapshots.read().expect("snapshot lock");
        let count = |len: usize| u32::try_from(len).unwrap_or(u32::MAX);
        let latest = |stamps: Vec<DateTime<Utc>>| stamps.into_iter().max();
        Ok(vec![
            PatternSnapshotInfo {
                kind: PatternKind::Preference,
                rows: count(snapshots.preferences.len()),
                last_updated: latest(
                    snapshots.preferences.iter().map(|row| row.last_updated).collect(),
                ),
            },
            PatternSnapshotInfo {
                kind: PatternKind::Association,
                rows: count(snapshots.associations.len()),
                last_updated: latest(
                    snapshots.associations.iter().map(|row| row.last_updated).collect(),
                ),
            },
            PatternSnapshotInfo {
                kind: PatternKind::Reorder,
                rows: count(snapshots.reorder.len()),
                last_updated: latest(
                    snapshots.reorder.iter().map(|row| row.last_updated).collect(),
                ),
            },
            PatternSnapshotInfo {
                kind: PatternKind::Behavior,
                rows: count(snapshots.behavior.len()),
                last_updated: latest(
                    snapshots.behavior.iter().map(|row| row.last_updated).collect(),
                ),
            },
            PatternSnapshotInfo {
                kind: PatternKind::SessionContext,
                rows: count(snapshots.sessions.len()),
                last_updated: latest(
                    snapshots.sessions.iter().map(|row| row.last_updated).collect(),
                ),
            },
        ])
    }
}
