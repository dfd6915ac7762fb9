use serde::{Deserialize, Serialize};
use std::fmt;

use super::suit::Suit;

/// Resting order side. Quantity is always 1 (Non-goal: partial fills,
/// quantity > 1 orders), so it carries no amount field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// A single resting order. Lives in exactly one side of one suit's book
/// until matched or cancelled.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub player_id: String,
    pub side: Side,
    pub suit: Suit,
    pub price: u32,
}

/// Public, per-suit best-quote projection used in snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub player_id: String,
    pub price: u32,
}

impl From<&Order> for Quote {
    fn from(o: &Order) -> Self {
        Self {
            player_id: o.player_id.clone(),
            price: o.price,
        }
    }
}
