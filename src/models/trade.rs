use serde::{Deserialize, Serialize};

use super::suit::Suit;

/// A single executed trade, implicit quantity 1. Appended to the ordered
/// trade log for the round; never mutated or removed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub buyer: String,
    pub seller: String,
    pub price: u32,
    pub suit: Suit,
}
