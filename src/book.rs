//! Level-2 order book snapshots.
//!
//! A `MarketBook` just holds the most recently fetched snapshot for one
//! symbol; mutation is always driven by the exchange core under its single
//! state mutex (see `exchange::CoreState`), so this type carries no locking
//! of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

impl PriceLevel {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }
}

/// A snapshot of one symbol's book at a point in time.
///
/// Bids are sorted descending by price, asks ascending; zero-quantity
/// levels never appear (the feed is expected to omit them, and `from_levels`
/// filters defensively).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub timestamp: DateTime<Utc>,
}

impl BookSnapshot {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Build a snapshot from raw feed levels, dropping non-positive levels
    /// and sorting into the canonical order. Does not validate that the
    /// incoming sides were pre-sorted by the feed.
    pub fn from_levels(
        symbol: impl Into<String>,
        mut bids: Vec<PriceLevel>,
        mut asks: Vec<PriceLevel>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        bids.retain(|l| l.quantity > 0.0 && l.price.is_finite() && l.quantity.is_finite());
        asks.retain(|l| l.quantity > 0.0 && l.price.is_finite() && l.quantity.is_finite());
        bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
        asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
        Self { symbol: symbol.into(), bids, asks, timestamp }
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// A snapshot is crossed if the best bid is at or above the best ask.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }
}

/// Holds the current snapshot for one symbol.
#[derive(Debug, Clone)]
pub struct MarketBook {
    pub symbol: String,
    snapshot: BookSnapshot,
}

impl MarketBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self { snapshot: BookSnapshot::empty(symbol.clone()), symbol }
    }

    /// Atomically replace the held snapshot. Called by the exchange core
    /// after it has fetched a fresh snapshot from the external feed.
    pub fn replace(&mut self, snapshot: BookSnapshot) {
        self.snapshot = snapshot;
    }

    pub fn snapshot(&self) -> &BookSnapshot {
        &self.snapshot
    }

    pub fn mid_price(&self) -> Option<f64> {
        self.snapshot.mid_price()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_levels_sorts_and_filters() {
        let snapshot = BookSnapshot::from_levels(
            "BTC",
            vec![PriceLevel::new(98.0, 5.0), PriceLevel::new(99.0, 5.0), PriceLevel::new(50.0, 0.0)],
            vec![PriceLevel::new(101.0, 5.0), PriceLevel::new(100.0, 5.0)],
            Utc::now(),
        );
        assert_eq!(snapshot.bids, vec![PriceLevel::new(99.0, 5.0), PriceLevel::new(98.0, 5.0)]);
        assert_eq!(snapshot.asks, vec![PriceLevel::new(100.0, 5.0), PriceLevel::new(101.0, 5.0)]);
        assert_eq!(snapshot.mid_price(), Some(99.5));
        assert_eq!(snapshot.spread(), Some(1.0));
        assert!(!snapshot.is_crossed());
    }

    #[test]
    fn empty_side_has_no_mid() {
        let snapshot = BookSnapshot::from_levels("BTC", vec![], vec![PriceLevel::new(100.0, 5.0)], Utc::now());
        assert_eq!(snapshot.mid_price(), None);
        assert_eq!(snapshot.best_bid(), None);
    }

    #[test]
    fn crossed_book_detected() {
        let snapshot = BookSnapshot::from_levels(
            "BTC",
            vec![PriceLevel::new(101.0, 5.0)],
            vec![PriceLevel::new(100.0, 5.0)],
            Utc::now(),
        );
        assert!(snapshot.is_crossed());
    }

    #[test]
    fn market_book_replace_updates_mid() {
        let mut book = MarketBook::new("BTC");
        assert_eq!(book.mid_price(), None);
        book.replace(BookSnapshot::from_levels(
            "BTC",
            vec![PriceLevel::new(99.0, 5.0)],
            vec![PriceLevel::new(100.0, 5.0)],
            Utc::now(),
        ));
        assert_eq!(book.mid_price(), Some(99.5));
    }
}
