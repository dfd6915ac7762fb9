//! Async client runtime: polls `/state`, diffs it against the previous
//! snapshot, and dispatches synthesized events (§4.5).
//!
//! Grounded on `examples/original_source/agents/figgie_interface.py`'s
//! `_process_state` diffing algorithm, rebuilt over `reqwest` +
//! `tokio::time::sleep` in place of the original's blocking `requests` +
//! background `threading.Thread`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::json;

use crate::models::{GameState, Snapshot};

/// Side of a resting quote, used only for `Event::Cancel`'s `side` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSide {
    Bid,
    Offer,
}

#[derive(Debug, Clone)]
pub enum Event {
    Tick(i64),
    Start {
        hand: std::collections::HashMap<String, u32>,
        opponents: HashSet<String>,
    },
    Trade {
        buyer: String,
        seller: String,
        price: u32,
        suit: String,
    },
    Bid {
        player_id: String,
        price: u32,
        suit: String,
    },
    Offer {
        player_id: String,
        price: u32,
        suit: String,
    },
    Cancel {
        side: QuoteSide,
        old_owner: Option<String>,
        old_price: Option<u32>,
        new_owner: Option<String>,
        new_price: Option<u32>,
        suit: String,
    },
}

/// Injectable callback seam; concrete trading strategies are out of scope
/// and are expected to implement this trait themselves.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: Event);
}

#[derive(Clone)]
pub struct FiggieClient {
    http: reqwest::Client,
    server_url: String,
    name: String,
    player_id: Option<String>,
    polling_rate: f64,
    jitter_factor: f64,
    last_snapshot: Option<Snapshot>,
    trade_cursor: usize,
}

impl FiggieClient {
    pub fn new(server_url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("reqwest client"),
            server_url: server_url.into().trim_end_matches('/').to_string(),
            name: name.into(),
            player_id: None,
            polling_rate: 1.0,
            jitter_factor: 0.1,
            last_snapshot: None,
            trade_cursor: 0,
        }
    }

    pub fn with_polling_rate(mut self, polling_rate: f64, jitter_factor: f64) -> Self {
        self.polling_rate = polling_rate;
        self.jitter_factor = jitter_factor;
        self
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub async fn join(&mut self) -> anyhow::Result<()> {
        let resp: serde_json::Value = self
            .http
            .post(format!("{}/join", self.server_url))
            .json(&json!({ "name": self.name }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.player_id = resp
            .get("player_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(())
    }

    async fn fetch_state(&self) -> anyhow::Result<Snapshot> {
        let player_id = self
            .player_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("not joined yet"))?;
        let snapshot = self
            .http
            .get(format!("{}/state", self.server_url))
            .query(&[("player_id", player_id)])
            .send()
            .await?
            .error_for_status()?
            .json::<Snapshot>()
            .await?;
        Ok(snapshot)
    }

    /// Runs the polling loop until `stop` is set. A poll error is logged and
    /// skipped; cursors do not advance on a failed fetch (§4.8).
    pub async fn run(&mut self, handler: Arc<dyn EventHandler>, stop: Arc<AtomicBool>) {
        while !stop.load(Ordering::Relaxed) {
            match self.fetch_state().await {
                Ok(snapshot) => self.process(snapshot, handler.as_ref()),
                Err(err) => tracing::warn!(error = %err, "poll failed, skipping cycle"),
            }

            let jitter = rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor);
            let sleep_secs = (self.polling_rate * (1.0 + jitter)).max(0.0);
            tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;
        }
    }

    fn process(&mut self, snapshot: Snapshot, handler: &dyn EventHandler) {
        if let Some(time_left) = snapshot.time_left {
            handler.handle(Event::Tick(time_left));
        }

        let prev_state = self.last_snapshot.as_ref().map(|s| s.state);
        if snapshot.state == GameState::Trading && prev_state != Some(GameState::Trading) {
            let opponents = snapshot
                .balances
                .keys()
                .filter(|id| Some(id.as_str()) != self.player_id.as_deref())
                .cloned()
                .collect();
            handler.handle(Event::Start {
                hand: snapshot.hand.clone(),
                opponents,
            });
        }

        let new_trades = &snapshot.trades[self.trade_cursor.min(snapshot.trades.len())..];
        if !new_trades.is_empty() {
            // Invalidate the cached market so the upcoming quote diff doesn't
            // re-report the engine's clear-all as explicit cancellations.
            self.last_snapshot = None;
            for trade in new_trades {
                handler.handle(Event::Trade {
                    buyer: trade.buyer.clone(),
                    seller: trade.seller.clone(),
                    price: trade.price,
                    suit: trade.suit.to_string(),
                });
            }
        }
        self.trade_cursor = snapshot.trades.len();

        let empty_market = std::collections::HashMap::new();
        let prev_market = self
            .last_snapshot
            .as_ref()
            .map(|s| &s.market)
            .unwrap_or(&empty_market);

        for suit in crate::models::Suit::ALL {
            let prev = prev_market.get(&suit).cloned().unwrap_or_default();
            let curr = snapshot.market.get(&suit).cloned().unwrap_or_default();
            self.diff_quote(QuoteSide::Bid, &prev.highest_bid, &curr.highest_bid, suit, handler, true);
            self.diff_quote(QuoteSide::Offer, &prev.lowest_ask, &curr.lowest_ask, suit, handler, false);
        }

        self.last_snapshot = Some(snapshot);
    }

    #[allow(clippy::too_many_arguments)]
    fn diff_quote(
        &self,
        side: QuoteSide,
        prev: &Option<crate::models::Quote>,
        curr: &Option<crate::models::Quote>,
        suit: crate::models::Suit,
        handler: &dyn EventHandler,
        improves_on_higher: bool,
    ) {
        let is_self = |q: &crate::models::Quote| Some(q.player_id.as_str()) == self.player_id.as_deref();
        let improved = match (prev, curr) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(p), Some(c)) => {
                if improves_on_higher {
                    c.price > p.price
                } else {
                    c.price < p.price
                }
            }
        };

        if improved {
            if let Some(c) = curr {
                if !is_self(c) {
                    let event = match side {
                        QuoteSide::Bid => Event::Bid {
                            player_id: c.player_id.clone(),
                            price: c.price,
                            suit: suit.to_string(),
                        },
                        QuoteSide::Offer => Event::Offer {
                            player_id: c.player_id.clone(),
                            price: c.price,
                            suit: suit.to_string(),
                        },
                    };
                    handler.handle(event);
                    return;
                }
            }
        }

        let cancelled = match (prev, curr) {
            (Some(_), None) => true,
            (Some(p), Some(c)) => {
                let worse = if improves_on_higher {
                    c.price < p.price
                } else {
                    c.price > p.price
                };
                worse || (c.price == p.price && c.player_id != p.player_id)
            }
            (None, _) => false,
        };

        if cancelled {
            if let Some(p) = prev {
                handler.handle(Event::Cancel {
                    side,
                    old_owner: Some(p.player_id.clone()),
                    old_price: Some(p.price),
                    new_owner: curr.as_ref().map(|c| c.player_id.clone()),
                    new_price: curr.as_ref().map(|c| c.price),
                    suit: suit.to_string(),
                });
            }
        }
    }

    async fn place(&self, order_type: &str, suit: &str, price: i64) -> anyhow::Result<serde_json::Value> {
        let player_id = self
            .player_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("not joined yet"))?;
        let resp = self
            .http
            .post(format!("{}/action", self.server_url))
            .json(&json!({
                "action_type": "order",
                "player_id": player_id,
                "order_type": order_type,
                "suit": suit,
                "price": price,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    pub async fn bid(&self, price: i64, suit: &str) -> anyhow::Result<serde_json::Value> {
        self.place("buy", suit, price).await
    }

    pub async fn offer(&self, price: i64, suit: &str) -> anyhow::Result<serde_json::Value> {
        self.place("sell", suit, price).await
    }

    pub async fn cancel_bids_and_offers(&self, suit: &str) -> anyhow::Result<Vec<String>> {
        let player_id = self
            .player_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("not joined yet"))?;
        let resp: serde_json::Value = self
            .http
            .post(format!("{}/action", self.server_url))
            .json(&json!({
                "action_type": "cancel",
                "player_id": player_id,
                "order_type": "both",
                "suit": suit,
                "price": -1,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp
            .get("canceled")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn cancel_all(&self) -> anyhow::Result<Vec<String>> {
        self.cancel_bids_and_offers("all").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Quote;
    use std::sync::Mutex;

    struct RecordingHandler {
        events: Mutex<Vec<String>>,
    }

    impl EventHandler for RecordingHandler {
        fn handle(&self, event: Event) {
            self.events.lock().unwrap().push(format!("{event:?}"));
        }
    }

    fn client() -> FiggieClient {
        let mut c = FiggieClient::new("http://localhost:8080", "Alice");
        c.player_id = Some("alice-id".to_string());
        c
    }

    #[test]
    fn diff_quote_emits_bid_for_new_best_not_owned_by_self() {
        let c = client();
        let handler = RecordingHandler {
            events: Mutex::new(Vec::new()),
        };
        let curr = Some(Quote {
            player_id: "bob-id".to_string(),
            price: 30,
        });
        c.diff_quote(
            QuoteSide::Bid,
            &None,
            &curr,
            crate::models::Suit::Spades,
            &handler,
            true,
        );
        let events = handler.events.into_inner().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("Bid"));
    }

    #[test]
    fn diff_quote_suppresses_bid_owned_by_self() {
        let c = client();
        let handler = RecordingHandler {
            events: Mutex::new(Vec::new()),
        };
        let curr = Some(Quote {
            player_id: "alice-id".to_string(),
            price: 30,
        });
        c.diff_quote(
            QuoteSide::Bid,
            &None,
            &curr,
            crate::models::Suit::Spades,
            &handler,
            true,
        );
        assert!(handler.events.into_inner().unwrap().is_empty());
    }

    #[test]
    fn diff_quote_emits_cancel_when_bid_removed() {
        let c = client();
        let handler = RecordingHandler {
            events: Mutex::new(Vec::new()),
        };
        let prev = Some(Quote {
            player_id: "bob-id".to_string(),
            price: 30,
        });
        c.diff_quote(
            QuoteSide::Bid,
            &prev,
            &None,
            crate::models::Suit::Spades,
            &handler,
            true,
        );
        let events = handler.events.into_inner().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("Cancel"));
    }
}
