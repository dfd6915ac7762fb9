//! Session/round state machine, matching, and payout.
//!
//! Semantics are grounded on `examples/original_source/figgie_server/game.py`
//! (reimplemented, not transliterated); structural style (methods returning
//! `Result<T, GameError>`, inline `#[cfg(test)]` modules) follows
//! `src/services/matching/orderbook.rs` / `orchestrator.rs`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::errors::GameError;
use crate::models::order::{Order, Side};
use crate::models::player::Player;
use crate::models::snapshot::{GameState, MarketQuote, Results, Snapshot};
use crate::models::suit::Suit;
use crate::models::trade::Trade;

use super::matching::book::Book;
use super::sink::DurableSink;

#[derive(Debug, Clone, Copy)]
pub struct GameConfig {
    pub players: u8,
    pub trading_duration_secs: u64,
}

/// Outcome of a successful `/action order` call.
pub enum PlaceOutcome {
    Resting { order_id: String },
    Trade(Trade),
}

fn new_hex_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub struct Game {
    config: GameConfig,
    sink: Arc<DurableSink>,

    state: GameState,
    round_id: String,
    player_order: Vec<String>,
    players: HashMap<String, Player>,
    books: HashMap<Suit, Book>,
    trades: Vec<Trade>,
    pot: i64,
    start_time: Option<DateTime<Utc>>,
    suit_counts: Option<HashMap<Suit, u8>>,
    goal_suit: Option<Suit>,
    results: Option<Results>,
    initial_balances: HashMap<String, i64>,
    initial_hands: HashMap<String, HashMap<Suit, u32>>,
}

impl Game {
    pub fn new(config: GameConfig, sink: Arc<DurableSink>) -> Self {
        let mut books = HashMap::with_capacity(4);
        for suit in Suit::ALL {
            books.insert(suit, Book::new());
        }
        Self {
            config,
            sink,
            state: GameState::Waiting,
            round_id: new_hex_id(),
            player_order: Vec::new(),
            players: HashMap::new(),
            books,
            trades: Vec::new(),
            pot: 0,
            start_time: None,
            suit_counts: None,
            goal_suit: None,
            results: None,
            initial_balances: HashMap::new(),
            initial_hands: HashMap::new(),
        }
    }

    pub fn trading_duration_secs(&self) -> u64 {
        self.config.trading_duration_secs
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn current_players(&self) -> usize {
        self.player_order.len()
    }

    /// `completed -> waiting`: drops every player and round artifact.
    /// Preserves nothing between rounds (§4.1).
    fn reset(&mut self) {
        self.state = GameState::Waiting;
        self.round_id = new_hex_id();
        self.player_order.clear();
        self.players.clear();
        for book in self.books.values_mut() {
            book.clear();
        }
        self.trades.clear();
        self.pot = 0;
        self.start_time = None;
        self.suit_counts = None;
        self.goal_suit = None;
        self.results = None;
        self.initial_balances.clear();
        self.initial_hands.clear();
    }

    fn can_start(&self) -> bool {
        self.player_order.len() == self.config.players as usize
    }

    /// `POST /join`.
    pub fn add_player(&mut self, name: &str) -> Result<String, GameError> {
        if name.trim().is_empty() {
            return Err(GameError::NameRequired);
        }
        if self.state == GameState::Completed {
            self.reset();
        }
        if self.state != GameState::Waiting {
            return Err(GameError::CannotJoin);
        }
        if self.player_order.len() >= self.config.players as usize {
            return Err(GameError::GameFull);
        }

        let player_id = new_hex_id();
        self.players
            .insert(player_id.clone(), Player::new(player_id.clone(), name.to_string()));
        self.player_order.push(player_id.clone());
        self.sink.append_player(&player_id, name);

        if self.can_start() {
            self.start_round();
        }
        Ok(player_id)
    }

    /// Deals cards, derives the goal suit, collects ante, and transitions
    /// to `trading` (§4.1).
    fn start_round(&mut self) {
        let mut counts = [8u8, 10, 10, 12];
        counts.shuffle(&mut rand::thread_rng());
        let suit_counts: HashMap<Suit, u8> = Suit::ALL.into_iter().zip(counts).collect();

        let twelve = Suit::ALL.into_iter().find(|s| suit_counts[s] == 12).unwrap();
        let eight = Suit::ALL.into_iter().find(|s| suit_counts[s] == 8).unwrap();
        let goal_suit = Suit::ALL
            .into_iter()
            .find(|s| *s != twelve && s.color() == twelve.color())
            .unwrap();

        self.initial_balances = self
            .players
            .iter()
            .map(|(id, p)| (id.clone(), p.balance))
            .collect();

        let ante = 200 / self.config.players as i64;
        self.pot = ante * self.config.players as i64;
        for player in self.players.values_mut() {
            player.balance -= ante;
            for suit in Suit::ALL {
                player.hand.insert(suit, 0);
            }
        }

        let mut deck: Vec<Suit> = Vec::with_capacity(40);
        for suit in Suit::ALL {
            deck.extend(std::iter::repeat(suit).take(suit_counts[&suit] as usize));
        }
        deck.shuffle(&mut rand::thread_rng());

        let per_player = deck.len() / self.player_order.len();
        for _ in 0..per_player {
            for player_id in &self.player_order {
                if let Some(dealt) = deck.pop() {
                    *self.players.get_mut(player_id).unwrap().hand.entry(dealt).or_insert(0) += 1;
                }
            }
        }

        self.initial_hands = self
            .players
            .iter()
            .map(|(id, p)| (id.clone(), p.hand.clone()))
            .collect();

        self.round_id = new_hex_id();
        self.suit_counts = Some(suit_counts);
        self.goal_suit = Some(goal_suit);
        self.state = GameState::Trading;
        self.start_time = Some(Utc::now());

        self.sink.append_round_start(
            &self.round_id,
            self.config.players,
            self.config.trading_duration_secs,
            goal_suit,
            eight,
            self.start_time.unwrap(),
        );
    }

    /// Computes `time_left` on the 0..240 scale (§4.4), triggering
    /// `trading -> completed` as a side effect if the clock has expired.
    /// Returns `None` when not trading.
    pub fn evaluate_clock(&mut self) -> Option<i64> {
        if self.state != GameState::Trading {
            return None;
        }
        let start = self.start_time.unwrap_or_else(Utc::now);
        let elapsed = (Utc::now() - start).num_milliseconds() as f64 / 1000.0;
        let duration = self.config.trading_duration_secs as f64;
        let raw_time_left = (duration - elapsed).max(0.0);
        if raw_time_left <= 0.0 {
            self.end_round();
            return Some(0);
        }
        Some(((raw_time_left / duration) * 240.0).floor() as i64)
    }

    /// `trading -> completed`. Computes payouts exactly once.
    fn end_round(&mut self) {
        let goal = self.goal_suit.expect("end_round requires a started round");
        let mut counts = HashMap::new();
        let mut bonuses = HashMap::new();
        let mut total_bonus: i64 = 0;
        for (id, player) in &self.players {
            let count = player.hand_count(goal);
            let bonus = 10 * count as i64;
            counts.insert(id.clone(), count);
            bonuses.insert(id.clone(), bonus);
            total_bonus += bonus;
        }
        let remainder = self.pot - total_bonus;
        let max_count = counts.values().copied().max().unwrap_or(0);
        let winners: Vec<String> = counts
            .iter()
            .filter(|(_, &c)| c == max_count)
            .map(|(id, _)| id.clone())
            .collect();
        let share_each = if winners.is_empty() {
            0
        } else {
            remainder / winners.len() as i64
        };

        for (id, bonus) in &bonuses {
            if let Some(player) = self.players.get_mut(id) {
                player.balance += bonus;
            }
        }
        for id in &winners {
            if let Some(player) = self.players.get_mut(id) {
                player.balance += share_each;
            }
        }

        let results = Results {
            goal_suit: goal,
            counts,
            bonuses,
            winners,
            share_each,
        };

        let final_balances: HashMap<String, i64> = self
            .players
            .iter()
            .map(|(id, p)| (id.clone(), p.balance))
            .collect();
        let final_hands: HashMap<String, HashMap<Suit, u32>> = self
            .players
            .iter()
            .map(|(id, p)| (id.clone(), p.hand.clone()))
            .collect();
        let end_time = Utc::now();
        self.sink.append_round_end(
            &self.round_id,
            &results,
            &self.initial_balances,
            &final_balances,
            &self.initial_hands,
            &final_hands,
            end_time,
        );

        self.results = Some(results);
        self.pot = 0;
        self.state = GameState::Completed;
    }

    /// `POST /action {action_type: "order"}` (§4.2).
    pub fn place_order(
        &mut self,
        player_id: &str,
        side_str: &str,
        suit_str: &str,
        price: i64,
    ) -> Result<PlaceOutcome, GameError> {
        let time_remaining = self.evaluate_clock();
        if time_remaining == Some(0) {
            return Err(GameError::RoundEnded);
        }

        let side = parse_side(side_str).ok_or(GameError::InvalidOrderType)?;
        let suit = Suit::from_str(suit_str).map_err(|_| GameError::InvalidSuit)?;
        if price <= 0 {
            return Err(GameError::InvalidPrice);
        }
        let price = price as u32;

        {
            let player = self.players.get(player_id).ok_or(GameError::InvalidPlayerId)?;
            match side {
                Side::Sell if player.hand_count(suit) < 1 => return Err(GameError::NotEnoughCards),
                Side::Buy if player.balance < price as i64 => {
                    return Err(GameError::InsufficientFunds)
                }
                _ => {}
            }
        }

        let book = self.books.get_mut(&suit).unwrap();
        if book.has_duplicate(side, price, player_id) {
            return Err(GameError::DuplicateOrder);
        }

        let crosses_and_self_owned = book.best(side.opposite()).map(|o| {
            let crosses = match side {
                Side::Buy => price >= o.price,
                Side::Sell => price <= o.price,
            };
            (crosses, o.player_id == player_id)
        });

        if let Some((true, true)) = crosses_and_self_owned {
            return Err(GameError::SelfTrade);
        }

        let time_remaining = time_remaining.unwrap_or(0);
        if let Some((true, false)) = crosses_and_self_owned {
            let maker = self.books.get_mut(&suit).unwrap().pop_best(side.opposite()).unwrap();
            let (buyer, seller) = match side {
                Side::Buy => (player_id.to_string(), maker.player_id.clone()),
                Side::Sell => (maker.player_id.clone(), player_id.to_string()),
            };
            let exec_price = maker.price;

            if let Some(seller_p) = self.players.get_mut(&seller) {
                *seller_p.hand.entry(suit).or_insert(0) -= 1;
                seller_p.balance += exec_price as i64;
            }
            if let Some(buyer_p) = self.players.get_mut(&buyer) {
                *buyer_p.hand.entry(suit).or_insert(0) += 1;
                buyer_p.balance -= exec_price as i64;
            }

            let trade = Trade {
                buyer,
                seller,
                price: exec_price,
                suit,
            };
            self.trades.push(trade.clone());
            self.sink.append_trade(&self.round_id, &trade, time_remaining);

            self.clear_all_books(time_remaining);
            return Ok(PlaceOutcome::Trade(trade));
        }

        let order = Order {
            id: new_hex_id(),
            player_id: player_id.to_string(),
            side,
            suit,
            price,
        };
        self.sink.append_order(&self.round_id, &order, time_remaining);
        let order_id = order.id.clone();
        self.books.get_mut(&suit).unwrap().insert(order);
        Ok(PlaceOutcome::Resting { order_id })
    }

    /// Figgie's defining rule: any executed trade clears every live order
    /// in every suit (§4.2, §9).
    fn clear_all_books(&mut self, time_remaining: i64) {
        for book in self.books.values_mut() {
            for order in book.clear() {
                self.sink.append_cancellation(&self.round_id, &order, time_remaining);
            }
        }
    }

    /// `POST /action {action_type: "cancel"}` (§4.2 bulk cancellation).
    pub fn cancel_order(
        &mut self,
        player_id: &str,
        side_str: &str,
        suit_str: &str,
        price: i64,
    ) -> Result<Vec<String>, GameError> {
        let time_remaining = self.evaluate_clock();
        if time_remaining == Some(0) {
            return Err(GameError::RoundEnded);
        }
        let time_remaining = time_remaining.unwrap_or(0);

        let side_filter = match side_str {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            "both" => None,
            _ => return Err(GameError::InvalidOrderType),
        };
        let suit_filter = if suit_str == "all" {
            None
        } else {
            Some(Suit::from_str(suit_str).map_err(|_| GameError::InvalidSuit)?)
        };
        if price < -1 {
            return Err(GameError::InvalidCancelThreshold);
        }

        let suits: Vec<Suit> = match suit_filter {
            Some(s) => vec![s],
            None => Suit::ALL.to_vec(),
        };

        let mut cancelled_ids = Vec::new();
        for suit in suits {
            let book = self.books.get_mut(&suit).unwrap();
            let removed = book.cancel_matching(side_filter, |o| {
                o.player_id == player_id
                    && (price == -1
                        || (o.side == Side::Buy && o.price as i64 >= price)
                        || (o.side == Side::Sell && o.price as i64 <= price))
            });
            for order in removed {
                cancelled_ids.push(order.id.clone());
                self.sink.append_cancellation(&self.round_id, &order, time_remaining);
            }
        }
        Ok(cancelled_ids)
    }

    /// `GET /state?player_id`. Concealed fields are projected per-requester
    /// (§9): other players' hands and the goal suit stay hidden until
    /// `state == completed`.
    pub fn get_state(&mut self, player_id: &str) -> Result<Snapshot, GameError> {
        let time_left = self.evaluate_clock();

        let requester = self
            .players
            .get(player_id)
            .ok_or(GameError::InvalidPlayerId)?;
        let hand = crate::models::player::hand_as_map(&requester.hand);

        let mut market = HashMap::with_capacity(4);
        for suit in Suit::ALL {
            let book = &self.books[&suit];
            market.insert(
                suit,
                MarketQuote {
                    highest_bid: book.best_bid().map(Into::into),
                    lowest_ask: book.best_offer().map(Into::into),
                },
            );
        }

        let balances: HashMap<String, i64> = self
            .players
            .iter()
            .map(|(id, p)| (id.clone(), p.balance))
            .collect();

        let (results, hands) = if self.state == GameState::Completed {
            let hands = self
                .players
                .iter()
                .map(|(id, p)| (id.clone(), crate::models::player::hand_as_map(&p.hand)))
                .collect();
            (self.results.clone(), Some(hands))
        } else {
            (None, None)
        };

        Ok(Snapshot {
            state: self.state,
            time_left,
            pot: self.pot,
            hand,
            market,
            balances,
            trades: self.trades.clone(),
            results,
            hands,
        })
    }
}

fn parse_side(s: &str) -> Option<Side> {
    match s {
        "buy" => Some(Side::Buy),
        "sell" => Some(Side::Sell),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_game(players: u8) -> Game {
        Game::new(
            GameConfig {
                players,
                trading_duration_secs: 120,
            },
            Arc::new(DurableSink::in_memory().unwrap()),
        )
    }

    #[test]
    fn join_starts_round_once_full() {
        let mut game = test_game(4);
        let mut ids = Vec::new();
        for name in ["Alice", "Bob", "Carol", "Dan"] {
            ids.push(game.add_player(name).unwrap());
        }
        assert_eq!(game.state(), GameState::Trading);
        // card conservation: every player's hand sums to 10 per suit dealt total of 40
        let total: u32 = ids
            .iter()
            .map(|id| game.players[id].hand.values().sum::<u32>())
            .sum();
        assert_eq!(total, 40);
    }

    #[test]
    fn join_rejects_empty_name() {
        let mut game = test_game(4);
        assert_eq!(game.add_player("").unwrap_err(), GameError::NameRequired);
        assert_eq!(game.add_player("   ").unwrap_err(), GameError::NameRequired);
    }

    #[test]
    fn join_rejects_once_full() {
        let mut game = test_game(4);
        for name in ["Alice", "Bob", "Carol", "Dan"] {
            game.add_player(name).unwrap();
        }
        // state is now Trading; joining now should be CannotJoin since the
        // state machine doesn't allow joins mid-round.
        assert_eq!(game.add_player("Eve").unwrap_err(), GameError::CannotJoin);
    }

    #[test]
    fn self_trade_is_rejected_scenario_1() {
        let mut game = test_game(4);
        for name in ["Alice", "Bob", "Carol", "Dan"] {
            game.add_player(name).unwrap();
        }
        let alice = game.player_order[0].clone();
        // give alice a spade to sell
        game.players.get_mut(&alice).unwrap().hand.insert(Suit::Spades, 1);

        game.place_order(&alice, "buy", "spades", 30).unwrap();
        let err = game.place_order(&alice, "sell", "spades", 30).unwrap_err();
        assert_eq!(err, GameError::SelfTrade);

        let book = &game.books[&Suit::Spades];
        assert_eq!(book.best_bid().unwrap().price, 30);
        assert!(book.best_offer().is_none());
    }

    #[test]
    fn cross_execution_clears_every_book_scenario_2() {
        let mut game = test_game(4);
        let mut ids = Vec::new();
        for name in ["Alice", "Bob", "Carol", "Dan"] {
            ids.push(game.add_player(name).unwrap());
        }
        let (alice, bob, carol) = (ids[0].clone(), ids[1].clone(), ids[2].clone());
        game.players.get_mut(&bob).unwrap().hand.insert(Suit::Clubs, 1);
        game.players.get_mut(&carol).unwrap().hand.insert(Suit::Spades, 1);

        game.place_order(&alice, "buy", "spades", 30).unwrap();
        game.place_order(&bob, "buy", "clubs", 25).unwrap();

        let alice_balance_before = game.players[&alice].balance;
        let carol_balance_before = game.players[&carol].balance;
        let alice_spades_before = game.players[&alice].hand_count(Suit::Spades);
        let carol_spades_before = game.players[&carol].hand_count(Suit::Spades);

        let outcome = game.place_order(&carol, "sell", "spades", 20).unwrap();
        match outcome {
            PlaceOutcome::Trade(trade) => {
                assert_eq!(trade.buyer, alice);
                assert_eq!(trade.seller, carol);
                assert_eq!(trade.price, 30);
            }
            PlaceOutcome::Resting { .. } => panic!("expected a trade"),
        }

        assert_eq!(game.players[&alice].balance, alice_balance_before - 30);
        assert_eq!(game.players[&carol].balance, carol_balance_before + 30);
        assert_eq!(game.players[&alice].hand_count(Suit::Spades), alice_spades_before + 1);
        assert_eq!(game.players[&carol].hand_count(Suit::Spades), carol_spades_before - 1);

        // clear-all-on-trade: Bob's clubs bid is gone too.
        assert!(game.books[&Suit::Clubs].best_bid().is_none());
        for suit in Suit::ALL {
            assert!(game.books[&suit].is_empty());
        }
    }

    #[test]
    fn fifo_at_equal_price_scenario_3() {
        let mut game = test_game(4);
        let mut ids = Vec::new();
        for name in ["Alice", "Bob", "Carol", "Dan"] {
            ids.push(game.add_player(name).unwrap());
        }
        let (alice, bob, dan) = (ids[0].clone(), ids[1].clone(), ids[3].clone());
        game.players.get_mut(&dan).unwrap().hand.insert(Suit::Hearts, 1);

        game.place_order(&alice, "buy", "hearts", 40).unwrap();
        game.place_order(&bob, "buy", "hearts", 40).unwrap();
        let outcome = game.place_order(&dan, "sell", "hearts", 40).unwrap();
        match outcome {
            PlaceOutcome::Trade(trade) => {
                assert_eq!(trade.seller, dan);
                assert_eq!(trade.buyer, alice);
                assert_eq!(trade.price, 40);
            }
            PlaceOutcome::Resting { .. } => panic!("expected a trade"),
        }
        assert!(game.books[&Suit::Hearts].is_empty());
    }

    #[test]
    fn normalized_time_mapping_scenario_4() {
        let mut game = test_game(4);
        game.state = GameState::Trading;
        game.start_time = Some(Utc::now() - chrono::Duration::seconds(30));
        game.config.trading_duration_secs = 120;
        let time_left = game.evaluate_clock().unwrap();
        assert_eq!(time_left, 180);
    }

    #[test]
    fn payout_scenario_5() {
        let mut game = test_game(4);
        let mut ids = Vec::new();
        for name in ["P1", "P2", "P3", "P4"] {
            ids.push(game.add_player(name).unwrap());
        }
        game.goal_suit = Some(Suit::Clubs);
        game.pot = 200;
        let counts = [3u32, 2, 2, 1];
        for (id, count) in ids.iter().zip(counts) {
            game.players.get_mut(id).unwrap().hand.insert(Suit::Clubs, count);
        }
        let balances_before: Vec<i64> = ids.iter().map(|id| game.players[id].balance).collect();

        game.end_round();

        let results = game.results.clone().unwrap();
        assert_eq!(results.share_each, 120);
        assert_eq!(results.winners, vec![ids[0].clone()]);
        assert_eq!(game.players[&ids[0]].balance, balances_before[0] + 30 + 120);
        assert_eq!(game.players[&ids[1]].balance, balances_before[1] + 20);
        assert_eq!(game.players[&ids[2]].balance, balances_before[2] + 20);
        assert_eq!(game.players[&ids[3]].balance, balances_before[3] + 10);
    }

    #[test]
    fn round_end_transition_on_read_scenario_6() {
        let mut game = test_game(4);
        let mut ids = Vec::new();
        for name in ["Alice", "Bob", "Carol", "Dan"] {
            ids.push(game.add_player(name).unwrap());
        }
        game.config.trading_duration_secs = 120;
        game.start_time = Some(Utc::now() - chrono::Duration::seconds(121));

        let snapshot = game.get_state(&ids[0]).unwrap();
        assert_eq!(snapshot.state, GameState::Completed);
        assert!(snapshot.results.is_some());

        let err = game.place_order(&ids[0], "buy", "spades", 10).unwrap_err();
        assert_eq!(err, GameError::RoundEnded);
    }

    #[test]
    fn place_then_cancel_leaves_state_unchanged() {
        let mut game = test_game(4);
        let mut ids = Vec::new();
        for name in ["Alice", "Bob", "Carol", "Dan"] {
            ids.push(game.add_player(name).unwrap());
        }
        let alice = ids[0].clone();
        let balance_before = game.players[&alice].balance;

        game.place_order(&alice, "buy", "spades", 30).unwrap();
        let cancelled = game.cancel_order(&alice, "both", "all", -1).unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(game.players[&alice].balance, balance_before);
        assert!(game.books[&Suit::Spades].is_empty());
    }

    #[test]
    fn duplicate_order_is_rejected() {
        let mut game = test_game(4);
        let mut ids = Vec::new();
        for name in ["Alice", "Bob", "Carol", "Dan"] {
            ids.push(game.add_player(name).unwrap());
        }
        let alice = ids[0].clone();
        game.place_order(&alice, "buy", "spades", 10).unwrap();
        let err = game.place_order(&alice, "buy", "spades", 10).unwrap_err();
        assert_eq!(err, GameError::DuplicateOrder);
    }

    #[test]
    fn insufficient_funds_and_not_enough_cards() {
        let mut game = test_game(4);
        let mut ids = Vec::new();
        for name in ["Alice", "Bob", "Carol", "Dan"] {
            ids.push(game.add_player(name).unwrap());
        }
        let alice = ids[0].clone();
        let err = game.place_order(&alice, "buy", "spades", 10_000).unwrap_err();
        assert_eq!(err, GameError::InsufficientFunds);
        let err = game.place_order(&alice, "sell", "spades", 10).unwrap_err();
        assert_eq!(err, GameError::NotEnoughCards);
    }

    #[test]
    fn goal_suit_hidden_until_completed() {
        let mut game = test_game(4);
        let mut ids = Vec::new();
        for name in ["Alice", "Bob", "Carol", "Dan"] {
            ids.push(game.add_player(name).unwrap());
        }
        let snapshot = game.get_state(&ids[0]).unwrap();
        assert!(snapshot.results.is_none());
        assert!(snapshot.hands.is_none());
    }
}
