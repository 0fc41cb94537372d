//! Demo harness: bootstraps the exchange core with a synthetic feed and
//! places a handful of orders against it. Plain `tracing_subscriber`
//! layered init plus `dotenv`-then-`env::var` wiring, with no web or
//! transport layer attached.

use anyhow::Result;
use async_trait::async_trait;
use perpsim_core::book::PriceLevel;
use perpsim_core::exchange::{ExchangeCore, PlaceOrderRequest, RequestedSide};
use perpsim_core::feeds::{FundingRateFeed, FundingRateQuote, InvocationJournal, InvocationRecord, MarketEntry, MarketRegistry, OrderBookFeed};
use perpsim_core::matching::OrderType;
use perpsim_core::ExchangeConfig;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct StaticBookFeed;

#[async_trait]
impl OrderBookFeed for StaticBookFeed {
    async fn get_order_book(&self, _market_id: &str) -> Result<(Vec<PriceLevel>, Vec<PriceLevel>)> {
        Ok((
            vec![PriceLevel::new(99.0, 5.0), PriceLevel::new(98.0, 5.0)],
            vec![PriceLevel::new(100.0, 5.0), PriceLevel::new(101.0, 5.0)],
        ))
    }
}

struct StaticFundingFeed;

#[async_trait]
impl FundingRateFeed for StaticFundingFeed {
    async fn funding_rates(&self) -> Result<Vec<FundingRateQuote>> {
        Ok(vec![FundingRateQuote { symbol: "BTC".to_string(), rate: 0.0001, exchange: None }])
    }
}

struct FixedRegistry;

impl MarketRegistry for FixedRegistry {
    fn entry(&self, symbol: &str) -> Option<MarketEntry> {
        (symbol == "BTC").then(|| MarketEntry {
            market_id: "BTC-PERP".to_string(),
            price_decimals: 2,
            qty_decimals: 4,
            client_order_index: 0,
        })
    }

    fn symbols(&self) -> Vec<String> {
        vec!["BTC".to_string()]
    }
}

struct LoggingJournal;

#[async_trait]
impl InvocationJournal for LoggingJournal {
    async fn record(&self, record: InvocationRecord) {
        tracing::info!(?record, "auto-close recorded");
    }
}

fn config_from_env() -> ExchangeConfig {
    dotenv::dotenv().ok();

    let initial_capital = std::env::var("PERPSIM_INITIAL_CAPITAL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1000.0);

    let deterministic_seed = std::env::var("PERPSIM_SEED").ok().and_then(|v| v.parse().ok());

    ExchangeConfig { initial_capital, deterministic_seed, ..ExchangeConfig::default() }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config_from_env();

    let core = ExchangeCore::bootstrap(
        config,
        Arc::new(StaticBookFeed),
        Arc::new(StaticFundingFeed),
        Arc::new(FixedRegistry),
        Arc::new(LoggingJournal),
    )
    .await;

    let execution = core.place_order(
        PlaceOrderRequest {
            account_id: None,
            symbol: "BTC".to_string(),
            side: RequestedSide::Buy,
            order_type: OrderType::Market,
            quantity: 2.0,
            limit_price: None,
            leverage: Some(1.0),
            confidence: None,
            exit_plan: None,
        },
        None,
    )?;
    tracing::info!(?execution, "demo order placed");

    let snapshot = core.get_account_snapshot(None);
    tracing::info!(cash_balance = snapshot.cash_balance, equity = snapshot.equity, "account after demo order");
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}
