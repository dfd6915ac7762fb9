//! Durable, append-only event sink (§4.7).
//!
//! Embedded and synchronous (`rusqlite`, not the teacher's Postgres/sqlx —
//! see DESIGN.md) so it can be called directly from inside the game's
//! critical section: the persisted write order then matches the observable
//! event order (§5), and there is nothing to bootstrap externally. Every
//! public method swallows its own errors after logging them — a sink
//! failure must never block a trading action (§7).

use std::collections::HashMap;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::models::order::Order;
use crate::models::snapshot::Results;
use crate::models::suit::Suit;
use crate::models::trade::Trade;

pub struct DurableSink {
    conn: Mutex<Connection>,
}

impl DurableSink {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS players (
                player_id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS rounds (
                round_id TEXT PRIMARY KEY,
                players INTEGER NOT NULL,
                duration INTEGER NOT NULL,
                goal_suit TEXT NOT NULL,
                small_suit TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT
            );
            CREATE TABLE IF NOT EXISTS actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                round_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                player_id TEXT NOT NULL,
                side TEXT NOT NULL,
                suit TEXT NOT NULL,
                price INTEGER NOT NULL,
                time_remaining INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                round_id TEXT NOT NULL,
                buyer TEXT NOT NULL,
                seller TEXT NOT NULL,
                suit TEXT NOT NULL,
                price INTEGER NOT NULL,
                time_remaining INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS results (
                round_id TEXT NOT NULL,
                player_id TEXT NOT NULL,
                initial_balance INTEGER NOT NULL,
                final_balance INTEGER NOT NULL,
                initial_hand TEXT NOT NULL,
                final_hand TEXT NOT NULL,
                bonus INTEGER NOT NULL,
                is_winner INTEGER NOT NULL,
                share_each INTEGER NOT NULL,
                PRIMARY KEY (round_id, player_id)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn append_player(&self, player_id: &str, name: &str) {
        let result = self.conn.lock().execute(
            "INSERT OR REPLACE INTO players (player_id, name) VALUES (?1, ?2)",
            params![player_id, name],
        );
        log_result("append_player", result);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append_round_start(
        &self,
        round_id: &str,
        players: u8,
        duration_secs: u64,
        goal_suit: Suit,
        small_suit: Suit,
        start_time: chrono::DateTime<chrono::Utc>,
    ) {
        let result = self.conn.lock().execute(
            "INSERT OR REPLACE INTO rounds (round_id, players, duration, goal_suit, small_suit, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            params![
                round_id,
                players,
                duration_secs,
                goal_suit.as_str(),
                small_suit.as_str(),
                start_time.to_rfc3339(),
            ],
        );
        log_result("append_round_start", result);
    }

    pub fn append_round_end(
        &self,
        round_id: &str,
        results: &Results,
        initial_balances: &HashMap<String, i64>,
        final_balances: &HashMap<String, i64>,
        initial_hands: &HashMap<String, HashMap<Suit, u32>>,
        final_hands: &HashMap<String, HashMap<Suit, u32>>,
        end_time: chrono::DateTime<chrono::Utc>,
    ) {
        let conn = self.conn.lock();
        let update = conn.execute(
            "UPDATE rounds SET end_time = ?1 WHERE round_id = ?2",
            params![end_time.to_rfc3339(), round_id],
        );
        log_result("append_round_end/rounds", update);

        for (player_id, count) in &results.counts {
            let initial_hand = serde_json::to_string(
                &initial_hands.get(player_id).cloned().unwrap_or_default(),
            )
            .unwrap_or_default();
            let final_hand = serde_json::to_string(
                &final_hands.get(player_id).cloned().unwrap_or_default(),
            )
            .unwrap_or_default();
            let is_winner = results.winners.iter().any(|w| w == player_id);
            let result = conn.execute(
                "INSERT OR REPLACE INTO results
                 (round_id, player_id, initial_balance, final_balance, initial_hand, final_hand, bonus, is_winner, share_each)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    round_id,
                    player_id,
                    initial_balances.get(player_id).copied().unwrap_or(0),
                    final_balances.get(player_id).copied().unwrap_or(0),
                    initial_hand,
                    final_hand,
                    results.bonuses.get(player_id).copied().unwrap_or(0),
                    is_winner as i64,
                    if is_winner { results.share_each } else { 0 },
                ],
            );
            log_result("append_round_end/results", result);
            let _ = count; // count is already folded into `results.bonuses`
        }
    }

    pub fn append_order(&self, round_id: &str, order: &Order, time_remaining: i64) {
        self.append_action(round_id, "order", order, time_remaining);
    }

    pub fn append_cancellation(&self, round_id: &str, order: &Order, time_remaining: i64) {
        self.append_action(round_id, "cancellation", order, time_remaining);
    }

    fn append_action(&self, round_id: &str, kind: &str, order: &Order, time_remaining: i64) {
        let result = self.conn.lock().execute(
            "INSERT INTO actions (round_id, kind, player_id, side, suit, price, time_remaining)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                round_id,
                kind,
                order.player_id,
                order.side.to_string(),
                order.suit.as_str(),
                order.price,
                time_remaining,
            ],
        );
        log_result("append_action", result);
    }

    pub fn append_trade(&self, round_id: &str, trade: &Trade, time_remaining: i64) {
        let result = self.conn.lock().execute(
            "INSERT INTO trades (round_id, buyer, seller, suit, price, time_remaining)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                round_id,
                trade.buyer,
                trade.seller,
                trade.suit.as_str(),
                trade.price,
                time_remaining,
            ],
        );
        log_result("append_trade", result);
    }
}

fn log_result(op: &str, result: rusqlite::Result<usize>) {
    if let Err(err) = result {
        tracing::error!("durable sink write failed ({op}): {err}");
    }
}
