//! Immutable shopper events, produced externally and read back in bounded
//! recency windows. The engine never mutates these; it only derives patterns
//! from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A search executed against the product catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub session_id: String,
    pub query: String,
    pub result_count: u32,
    pub response_time_ms: u32,
}

/// How a shopper touched a single product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    View,
    Click,
    AddToCart,
    RemoveFromCart,
    Purchase,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Click => "click",
            Self::AddToCart => "add_to_cart",
            Self::RemoveFromCart => "remove_from_cart",
            Self::Purchase => "purchase",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "view" => Some(Self::View),
            "click" => Some(Self::Click),
            "add_to_cart" => Some(Self::AddToCart),
            "remove_from_cart" => Some(Self::RemoveFromCart),
            "purchase" => Some(Self::Purchase),
            _ => None,
        }
    }
}

/// A single product interaction within a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub session_id: String,
    pub product_sku: String,
    pub product_name: String,
    pub interaction_type: InteractionType,
    pub category: String,
    pub brand: String,
    pub price: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartAction {
    Add,
    Remove,
    UpdateQuantity,
    Clear,
}

impl CartAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::UpdateQuantity => "update_quantity",
            Self::Clear => "clear",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "add" => Some(Self::Add),
            "remove" => Some(Self::Remove),
            "update_quantity" => Some(Self::UpdateQuantity),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }
}

/// A cart modification within a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub session_id: String,
    pub action: CartAction,
    pub product_sku: String,
    pub quantity: u32,
    pub cart_total_after: f64,
}

/// One line of a completed order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

/// A completed order with its ordered line items.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub session_id: String,
    pub order_total: f64,
    pub items: Vec<OrderItem>,
}
