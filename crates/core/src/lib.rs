pub mod config;
pub mod domain;
pub mod patterns;
pub mod schedule;

pub use chrono;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::event::{
    CartAction, CartEvent, InteractionEvent, InteractionType, OrderEvent, OrderItem, SearchEvent,
};
pub use domain::pattern::{
    AssociationPattern, PatternKind, PreferencePattern, ReorderPattern, SessionContextPattern,
    SessionIntent, ShoppingBehaviorPattern, ShoppingFrequency,
};
pub use patterns::association::{compute_associations, compute_cart_associations};
pub use patterns::behavior::compute_behavior;
pub use patterns::preference::compute_preferences;
pub use patterns::reorder::compute_reorder;
pub use patterns::session::compute_session_context;
pub use schedule::{CadenceConfig, PatternRun, RunState, ScheduleBoard, ScheduleError};
