//! External collaborator traits.
//!
//! The core consumes these; it never implements a real one. A host wires a
//! live feed or scraper in behind each trait, and `#[cfg(test)]` carries an
//! in-memory fake of each to drive the end-to-end scenario tests. Shaped
//! after the sibling `Venue` trait (`async_trait::async_trait`), since these
//! collaborators need to be swappable, not concrete.

use crate::book::PriceLevel;
use anyhow::Result;
use async_trait::async_trait;

/// Read-only level-2 book source, keyed by the venue's own market id (not
/// necessarily the normalized symbol — see `MarketRegistry`).
#[async_trait]
pub trait OrderBookFeed: Send + Sync {
    async fn get_order_book(&self, market_id: &str) -> Result<(Vec<PriceLevel>, Vec<PriceLevel>)>;
}

#[derive(Debug, Clone)]
pub struct FundingRateQuote {
    pub symbol: String,
    pub rate: f64,
    pub exchange: Option<String>,
}

/// Funding-rate source. The core dedups by normalized symbol and prefers a
/// configured primary exchange when more than one quote names the same
/// symbol.
#[async_trait]
pub trait FundingRateFeed: Send + Sync {
    async fn funding_rates(&self) -> Result<Vec<FundingRateQuote>>;

    /// Exchange name preferred on symbol collisions, if any.
    fn primary_source(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct MarketEntry {
    pub market_id: String,
    pub price_decimals: u32,
    pub qty_decimals: u32,
    pub client_order_index: u32,
}

/// Static `symbol -> market metadata` table, fixed at bootstrap.
pub trait MarketRegistry: Send + Sync {
    fn entry(&self, symbol: &str) -> Option<MarketEntry>;
    fn symbols(&self) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct InvocationRecord {
    pub symbol: String,
    pub side: crate::matching::OrderSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub net_pnl: f64,
    pub closed_at: chrono::DateTime<chrono::Utc>,
    pub auto_trigger: crate::ledger::ExitTrigger,
}

/// Sink for auto-close records only. Normal order placement never writes
/// here.
#[async_trait]
pub trait InvocationJournal: Send + Sync {
    async fn record(&self, record: InvocationRecord);
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct FakeOrderBookFeed {
        pub books: Mutex<HashMap<String, (Vec<PriceLevel>, Vec<PriceLevel>)>>,
    }

    impl FakeOrderBookFeed {
        pub fn set(&self, market_id: &str, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) {
            self.books.lock().insert(market_id.to_string(), (bids, asks));
        }
    }

    #[async_trait]
    impl OrderBookFeed for FakeOrderBookFeed {
        async fn get_order_book(&self, market_id: &str) -> Result<(Vec<PriceLevel>, Vec<PriceLevel>)> {
            Ok(self.books.lock().get(market_id).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    pub struct FakeFundingRateFeed {
        pub rates: Mutex<Vec<FundingRateQuote>>,
    }

    #[async_trait]
    impl FundingRateFeed for FakeFundingRateFeed {
        async fn funding_rates(&self) -> Result<Vec<FundingRateQuote>> {
            Ok(self.rates.lock().clone())
        }
    }

    pub struct FakeMarketRegistry {
        pub entries: HashMap<String, MarketEntry>,
    }

    impl FakeMarketRegistry {
        pub fn single(symbol: &str) -> Self {
            let mut entries = HashMap::new();
            entries.insert(
                symbol.to_string(),
                MarketEntry {
                    market_id: symbol.to_string(),
                    price_decimals: 2,
                    qty_decimals: 4,
                    client_order_index: 0,
                },
            );
            Self { entries }
        }
    }

    impl MarketRegistry for FakeMarketRegistry {
        fn entry(&self, symbol: &str) -> Option<MarketEntry> {
            self.entries.get(symbol).cloned()
        }

        fn symbols(&self) -> Vec<String> {
            self.entries.keys().cloned().collect()
        }
    }

    #[derive(Default)]
    pub struct FakeInvocationJournal {
        pub records: Mutex<Vec<InvocationRecord>>,
    }

    #[async_trait]
    impl InvocationJournal for FakeInvocationJournal {
        async fn record(&self, record: InvocationRecord) {
            self.records.lock().push(record);
        }
    }
}
