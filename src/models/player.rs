use std::collections::HashMap;

use super::suit::Suit;

/// Starting stake for every player at the beginning of a round.
pub const STARTING_BALANCE: i64 = 350;

/// A seated player. Created on join, mutated only by the engine, destroyed on
/// session reset.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub balance: i64,
    pub hand: HashMap<Suit, u32>,
}

impl Player {
    pub fn new(id: String, name: String) -> Self {
        let mut hand = HashMap::with_capacity(4);
        for suit in Suit::ALL {
            hand.insert(suit, 0);
        }
        Self {
            id,
            name,
            balance: STARTING_BALANCE,
            hand,
        }
    }

    pub fn hand_count(&self, suit: Suit) -> u32 {
        *self.hand.get(&suit).unwrap_or(&0)
    }
}

/// Hand serialized as `{suit: count}` for snapshot responses.
pub fn hand_as_map(hand: &HashMap<Suit, u32>) -> HashMap<String, u32> {
    hand.iter().map(|(s, c)| (s.to_string(), *c)).collect()
}
