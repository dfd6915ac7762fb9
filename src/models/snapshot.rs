use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::order::Quote;
use super::suit::Suit;
use super::trade::Trade;

/// Session lifecycle state. See SPEC_FULL.md §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    Waiting,
    Trading,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarketQuote {
    pub highest_bid: Option<Quote>,
    pub lowest_ask: Option<Quote>,
}

/// Round-end payout summary. Only ever constructed once per round, at the
/// `trading -> completed` transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Results {
    pub goal_suit: Suit,
    pub counts: HashMap<String, u32>,
    pub bonuses: HashMap<String, i64>,
    pub winners: Vec<String>,
    pub share_each: i64,
}

/// A requester-scoped view of the current session. Concealed fields (other
/// players' hands, the goal suit) are omitted until `state == completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: GameState,
    pub time_left: Option<i64>,
    pub pot: i64,
    #[serde(default)]
    pub hand: HashMap<String, u32>,
    pub market: HashMap<Suit, MarketQuote>,
    pub balances: HashMap<String, i64>,
    pub trades: Vec<Trade>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Results>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hands: Option<HashMap<String, HashMap<String, u32>>>,
}
