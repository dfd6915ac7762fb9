//! Per-suit order book.
//!
//! A book holds at most one side of resting orders at a time in practice
//! (any crossing order executes immediately and clears every book — see
//! `Game::place_order`), but both sides are modeled so an order can rest
//! when nothing opposes it. Bids are kept price-descending, offers
//! price-ascending, FIFO within a price level; the whole `Game` is already
//! serialized behind one mutex (SPEC_FULL.md §9), so unlike the teacher's
//! concurrent `Orderbook` this type needs no internal locking.

use std::collections::{BTreeMap, VecDeque};

use crate::models::order::{Order, Side};

/// Newtype so bid prices (wanted descending) and ask prices (wanted
/// ascending) can both use a plain `BTreeMap`, which always iterates
/// ascending; bids are read back via `.next_back()`.
pub type Price = u32;

#[derive(Default)]
pub struct Book {
    bids: BTreeMap<Price, VecDeque<Order>>,
    offers: BTreeMap<Price, VecDeque<Order>>,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    fn side_map(&self, side: Side) -> &BTreeMap<Price, VecDeque<Order>> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.offers,
        }
    }

    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<Price, VecDeque<Order>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.offers,
        }
    }

    /// The best bid: highest price, earliest at that price.
    pub fn best_bid(&self) -> Option<&Order> {
        self.bids.iter().next_back().and_then(|(_, q)| q.front())
    }

    /// The best offer: lowest price, earliest at that price.
    pub fn best_offer(&self) -> Option<&Order> {
        self.offers.iter().next().and_then(|(_, q)| q.front())
    }

    pub fn best(&self, side: Side) -> Option<&Order> {
        match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_offer(),
        }
    }

    /// True if `player_id` already has a live order at (side, price).
    pub fn has_duplicate(&self, side: Side, price: Price, player_id: &str) -> bool {
        self.side_map(side)
            .get(&price)
            .map(|q| q.iter().any(|o| o.player_id == player_id))
            .unwrap_or(false)
    }

    /// Insert `order` at its price-sorted position, FIFO among equal prices.
    pub fn insert(&mut self, order: Order) {
        self.side_map_mut(order.side)
            .entry(order.price)
            .or_default()
            .push_back(order);
    }

    /// Remove the best order on `side` (used right before executing a
    /// trade against it).
    pub fn pop_best(&mut self, side: Side) -> Option<Order> {
        let map = self.side_map_mut(side);
        let price = match side {
            Side::Buy => *map.keys().next_back()?,
            Side::Sell => *map.keys().next()?,
        };
        let queue = map.get_mut(&price)?;
        let order = queue.pop_front();
        if queue.is_empty() {
            map.remove(&price);
        }
        order
    }

    /// Remove every live order on both sides, returning them.
    pub fn clear(&mut self) -> Vec<Order> {
        let bids = std::mem::take(&mut self.bids);
        let offers = std::mem::take(&mut self.offers);
        bids.into_values()
            .chain(offers.into_values())
            .flat_map(|q| q.into_iter())
            .collect()
    }

    /// Remove live orders matching a bulk-cancel predicate; returns them.
    pub fn cancel_matching(
        &mut self,
        side: Option<Side>,
        mut predicate: impl FnMut(&Order) -> bool,
    ) -> Vec<Order> {
        let mut cancelled = Vec::new();
        for s in [Side::Buy, Side::Sell] {
            if let Some(only) = side {
                if only != s {
                    continue;
                }
            }
            let map = self.side_map_mut(s);
            let mut empty_prices = Vec::new();
            for (price, queue) in map.iter_mut() {
                let mut kept = VecDeque::with_capacity(queue.len());
                while let Some(o) = queue.pop_front() {
                    if predicate(&o) {
                        cancelled.push(o);
                    } else {
                        kept.push_back(o);
                    }
                }
                *queue = kept;
                if queue.is_empty() {
                    empty_prices.push(*price);
                }
            }
            for price in empty_prices {
                map.remove(&price);
            }
        }
        cancelled
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.offers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::suit::Suit;

    fn order(id: &str, player: &str, side: Side, price: u32) -> Order {
        Order {
            id: id.to_string(),
            player_id: player.to_string(),
            side,
            suit: Suit::Spades,
            price,
        }
    }

    #[test]
    fn best_bid_is_highest_then_earliest() {
        let mut book = Book::new();
        book.insert(order("b1", "alice", Side::Buy, 30));
        book.insert(order("b2", "bob", Side::Buy, 40));
        book.insert(order("b3", "carol", Side::Buy, 40));
        let best = book.best_bid().unwrap();
        assert_eq!(best.price, 40);
        assert_eq!(best.player_id, "bob");
    }

    #[test]
    fn best_offer_is_lowest_then_earliest() {
        let mut book = Book::new();
        book.insert(order("a1", "alice", Side::Sell, 50));
        book.insert(order("a2", "bob", Side::Sell, 20));
        book.insert(order("a3", "carol", Side::Sell, 20));
        let best = book.best_offer().unwrap();
        assert_eq!(best.price, 20);
        assert_eq!(best.player_id, "bob");
    }

    #[test]
    fn duplicate_detection_is_per_player_side_price() {
        let mut book = Book::new();
        book.insert(order("b1", "alice", Side::Buy, 30));
        assert!(book.has_duplicate(Side::Buy, 30, "alice"));
        assert!(!book.has_duplicate(Side::Buy, 30, "bob"));
        assert!(!book.has_duplicate(Side::Sell, 30, "alice"));
    }

    #[test]
    fn clear_empties_both_sides_and_returns_all_orders() {
        let mut book = Book::new();
        book.insert(order("b1", "alice", Side::Buy, 30));
        book.insert(order("a1", "bob", Side::Sell, 50));
        let cleared = book.clear();
        assert_eq!(cleared.len(), 2);
        assert!(book.is_empty());
    }

    #[test]
    fn cancel_matching_respects_predicate() {
        let mut book = Book::new();
        book.insert(order("b1", "alice", Side::Buy, 10));
        book.insert(order("b2", "alice", Side::Buy, 20));
        book.insert(order("a1", "alice", Side::Sell, 5));
        let cancelled = book.cancel_matching(Some(Side::Buy), |o| o.price >= 15);
        assert_eq!(cancelled.iter().map(|o| o.id.as_str()).collect::<Vec<_>>(), vec!["b2"]);
        assert!(book.has_duplicate(Side::Buy, 10, "alice"));
        assert!(!book.has_duplicate(Side::Buy, 20, "alice"));
    }
}
