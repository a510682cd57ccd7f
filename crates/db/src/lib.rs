pub mod connection;
pub mod event_store;
pub mod fixtures;
pub mod memory;
pub mod migrations;
pub mod pattern_store;

pub use connection::{connect, DbPool};
pub use event_store::{EventStore, SqlEventStore, StoreError, WindowRead};
pub use fixtures::{seed_demo_events, SeedSummary};
pub use memory::{InMemoryEventStore, InMemoryPatternStore};
pub use pattern_store::{PatternSnapshotInfo, PatternStore, SqlPatternStore};
