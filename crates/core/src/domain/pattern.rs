//! Derived pattern rows, recomputed from a trailing event window on each
//! refresh and replaced wholesale in the pattern store. Each row carries
//! `last_updated`, which is always at or after the newest contributing event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five pattern tables the engine maintains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Preference,
    Association,
    Reorder,
    Behavior,
    SessionContext,
}

impl PatternKind {
    pub const ALL: [PatternKind; 5] = [
        PatternKind::Preference,
        PatternKind::Association,
        PatternKind::Reorder,
        PatternKind::Behavior,
        PatternKind::SessionContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preference => "preference",
            Self::Association => "association",
            Self::Reorder => "reorder",
            Self::Behavior => "behavior",
            Self::SessionContext => "session_context",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preference" => Some(Self::Preference),
            "association" => Some(Self::Association),
            "reorder" => Some(Self::Reorder),
            "behavior" => Some(Self::Behavior),
            "session_context" => Some(Self::SessionContext),
            _ => None,
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per user×brand×category interaction strength with recency boost.
/// Unique by (user_id, brand, category).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreferencePattern {
    pub user_id: String,
    pub brand: String,
    pub category: String,
    pub total_interactions: u32,
    pub interaction_score: f64,
    pub preference_score: f64,
    /// In [0, 1].
    pub confidence: f64,
    pub last_interaction: DateTime<Utc>,
    pub active_days: u32,
    pub product_variety: u32,
    pub last_updated: DateTime<Utc>,
}

/// Basket co-occurrence statistics for one unordered product pair.
/// Stored with `product_a < product_b`; the symmetric ordering never exists.
/// `confidence` is the A→B conditional for the canonical orientation only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssociationPattern {
    pub product_a: String,
    pub product_b: String,
    pub co_occurrence_count: u32,
    pub unique_users: u32,
    pub support: f64,
    pub confidence: f64,
    /// Unbounded; > 1 means the pair co-occurs more than chance.
    pub lift: f64,
    pub last_updated: DateTime<Utc>,
}

/// Purchase-interval statistics and due-date prediction for one
/// (user_id, product_sku). Materialized only with ≥ 2 completed intervals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReorderPattern {
    pub user_id: String,
    pub product_sku: String,
    pub order_count: u32,
    /// Mean gap between consecutive orders, in days.
    pub avg_reorder_days: f64,
    /// Population standard deviation of the gaps, in days.
    pub reorder_variance: f64,
    pub min_reorder_days: f64,
    pub max_reorder_days: f64,
    /// Coefficient of variation of the gaps; `None` when the mean gap is zero.
    pub reorder_consistency: Option<f64>,
    pub avg_quantity: f64,
    pub last_order_date: DateTime<Utc>,
    pub days_since_last_order: f64,
    pub reorder_due: bool,
    /// In [0, 1].
    pub reorder_confidence: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShoppingFrequency {
    Weekly,
    BiWeekly,
    Monthly,
    Occasional,
}

impl ShoppingFrequency {
    /// Bucket an average inter-order gap in days.
    pub fn from_avg_days(avg_days_between_orders: f64) -> Self {
        if avg_days_between_orders <= 7.0 {
            Self::Weekly
        } else if avg_days_between_orders <= 14.0 {
            Self::BiWeekly
        } else if avg_days_between_orders <= 30.0 {
            Self::Monthly
        } else {
            Self::Occasional
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::BiWeekly => "bi-weekly",
            Self::Monthly => "monthly",
            Self::Occasional => "occasional",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "weekly" => Some(Self::Weekly),
            "bi-weekly" => Some(Self::BiWeekly),
            "monthly" => Some(Self::Monthly),
            "occasional" => Some(Self::Occasional),
            _ => None,
        }
    }
}

/// Per-user shopping cadence and habit profile. Unique by user_id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShoppingBehaviorPattern {
    pub user_id: String,
    pub total_orders: u32,
    /// Distinct calendar days with at least one order.
    pub shopping_days: u32,
    pub avg_order_value: f64,
    /// Population standard deviation of order totals.
    pub order_value_variance: f64,
    pub avg_items_per_order: f64,
    /// 0 = Sunday through 6 = Saturday; lowest value wins ties.
    pub preferred_day_of_week: u32,
    /// 0–23; lowest value wins ties.
    pub preferred_hour: u32,
    pub avg_days_between_orders: f64,
    pub shopping_frequency: ShoppingFrequency,
    /// Top-5 purchase categories, count descending then name ascending.
    pub top_categories: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionIntent {
    Shopping,
    Browsing,
    Exploring,
    Searching,
}

impl SessionIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shopping => "shopping",
            Self::Browsing => "browsing",
            Self::Exploring => "exploring",
            Self::Searching => "searching",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "shopping" => Some(Self::Shopping),
            "browsing" => Some(Self::Browsing),
            "exploring" => Some(Self::Exploring),
            "searching" => Some(Self::Searching),
            _ => None,
        }
    }
}

/// Short-lived summary of one active session over the trailing day.
/// Unique by session_id; every session with any event is represented.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionContextPattern {
    pub session_id: String,
    pub user_id: Option<String>,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub unique_queries: u32,
    pub total_searches: u32,
    pub products_viewed: u32,
    pub clicks: u32,
    pub cart_adds: u32,
    pub items_added: u32,
    pub items_removed: u32,
    /// Last known cart total; `None` when the session had no cart events.
    pub current_cart_total: Option<f64>,
    pub session_intent: SessionIntent,
    pub last_updated: DateTime<Utc>,
}
