//! Exchange core: owns books and accounts, orchestrates matching, the
//! refresh/funding/auto-close tick, and event dispatch.
//!
//! A single `parking_lot::Mutex` guards books-and-accounts state for the
//! entire duration of any mutating operation, including the matcher call,
//! so no caller ever observes a torn read across a book refresh or an
//! order placement. The refresh ticker is a `tokio::task` built on
//! `tokio::time::interval`. Feed I/O always happens outside the lock; the
//! lock is only ever taken for the synchronous book-swap / mark / funding /
//! event step, so it is never held across an `.await` point.

use crate::book::{BookSnapshot, MarketBook, PriceLevel};
use crate::config::ExchangeConfig;
use crate::error::SimulatorError;
use crate::events::{AccountEvent, BookEvent, EventBus, TradeEvent};
use crate::feeds::{FundingRateFeed, InvocationJournal, InvocationRecord, MarketRegistry, OrderBookFeed};
use crate::ledger::{AccountLedger, AccountSnapshot, ExitPlan, ExitTrigger, PositionSnapshot};
use crate::matching::{Execution, ExecutionStatus, Matcher, OrderSide, OrderType};
use crate::random::{DeterministicRandom, PlatformRandom, RandomSource};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ACCOUNT_ID: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedSide {
    Buy,
    Sell,
    Long,
    Short,
}

impl RequestedSide {
    fn resolve(self) -> OrderSide {
        match self {
            RequestedSide::Buy | RequestedSide::Long => OrderSide::Buy,
            RequestedSide::Sell | RequestedSide::Short => OrderSide::Sell,
        }
    }
}

impl std::str::FromStr for RequestedSide {
    type Err = SimulatorError;

    /// Parses the raw `side` string a host (RPC layer, UI) receives before
    /// constructing a `PlaceOrderRequest`. `long`/`short` are aliases for
    /// `buy`/`sell`; anything else is rejected.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "buy" => Ok(RequestedSide::Buy),
            "sell" => Ok(RequestedSide::Sell),
            "long" => Ok(RequestedSide::Long),
            "short" => Ok(RequestedSide::Short),
            _ => Err(SimulatorError::UnsupportedOrderSide),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub account_id: Option<String>,
    pub symbol: String,
    pub side: RequestedSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub leverage: Option<f64>,
    pub confidence: Option<f64>,
    pub exit_plan: Option<ExitPlan>,
}

#[derive(Debug, Clone, Default)]
pub struct CloseOptions {
    pub auto_trigger: Option<ExitTrigger>,
}

fn normalize_symbol(raw: &str) -> String {
    let trimmed = raw.trim().to_uppercase();
    trimmed.strip_suffix("USDT").unwrap_or(&trimmed).to_string()
}

fn normalize_account_id(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => DEFAULT_ACCOUNT_ID.to_string(),
    }
}

struct CoreState {
    books: HashMap<String, MarketBook>,
    accounts: HashMap<String, AccountLedger>,
    funding_rates: HashMap<String, f64>,
    last_funding_applied: HashMap<String, DateTime<Utc>>,
    last_funding_refresh: Option<DateTime<Utc>>,
    pending_auto_close: HashSet<String>,
    rng: Box<dyn RandomSource>,
}

pub struct ExchangeCore {
    config: ExchangeConfig,
    book_feed: Arc<dyn OrderBookFeed>,
    funding_feed: Arc<dyn FundingRateFeed>,
    registry: Arc<dyn MarketRegistry>,
    journal: Arc<dyn InvocationJournal>,
    pub events: EventBus,
    state: Mutex<CoreState>,
}

impl ExchangeCore {
    /// Build a fresh core from a fixed market registry, fetch funding rates
    /// once, and start the refresh ticker. Per the design notes, "the
    /// singleton" is a host responsibility — callers that want at-most-one
    /// core per process hold the returned `Arc` behind their own
    /// `OnceCell`/`lazy_static`, not this crate.
    pub async fn bootstrap(
        config: ExchangeConfig,
        book_feed: Arc<dyn OrderBookFeed>,
        funding_feed: Arc<dyn FundingRateFeed>,
        registry: Arc<dyn MarketRegistry>,
        journal: Arc<dyn InvocationJournal>,
    ) -> Arc<Self> {
        let mut books = HashMap::new();
        for symbol in registry.symbols() {
            books.insert(symbol.clone(), MarketBook::new(symbol));
        }

        let funding_rates = fetch_funding_rates(funding_feed.as_ref()).await;

        let rng: Box<dyn RandomSource> = match config.deterministic_seed {
            Some(seed) => Box::new(DeterministicRandom::new(seed)),
            None => Box::new(PlatformRandom),
        };

        let core = Arc::new(Self {
            config: config.clone(),
            book_feed,
            funding_feed,
            registry,
            journal,
            events: EventBus::new(),
            state: Mutex::new(CoreState {
                books,
                accounts: HashMap::new(),
                funding_rates,
                last_funding_applied: HashMap::new(),
                last_funding_refresh: Some(Utc::now()),
                pending_auto_close: HashSet::new(),
                rng,
            }),
        });

        tracing::info!(refresh_interval_ms = config.refresh_interval_ms, "exchange core bootstrapped");

        let ticker_core = core.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(config.refresh_interval_ms));
            loop {
                interval.tick().await;
                ticker_core.refresh_tick().await;
            }
        });

        core
    }

    // ---- ingress operations -------------------------------------------------

    pub fn place_order(&self, request: PlaceOrderRequest, account_id: Option<&str>) -> Result<Execution, SimulatorError> {
        if !self.config.simulation_enabled {
            return Err(SimulatorError::SimulationDisabled);
        }
        if request.symbol.trim().is_empty() {
            return Err(SimulatorError::SymbolRequired);
        }
        if !request.quantity.is_finite() || request.quantity <= 0.0 {
            return Err(SimulatorError::QuantityMustBePositive);
        }
        if request.order_type == OrderType::Limit {
            match request.limit_price {
                Some(p) if p.is_finite() && p > 0.0 => {}
                _ => return Err(SimulatorError::InvalidLimitPrice),
            }
        }

        let symbol = normalize_symbol(&request.symbol);
        let account_id = normalize_account_id(account_id.or(request.account_id.as_deref()));
        let side = request.side.resolve();

        let mut state = self.state.lock();
        tracing::debug!(account_id = %account_id, symbol = %symbol, "placing order");

        let Some(book) = state.books.get(&symbol) else {
            return Ok(Execution::rejected("Unknown market"));
        };
        let snapshot = book.snapshot().clone();

        let match_request = crate::matching::OrderRequest {
            symbol: symbol.clone(),
            side,
            order_type: request.order_type,
            quantity: request.quantity,
            limit_price: request.limit_price,
            leverage: request.leverage,
            confidence: request.confidence,
        };
        let execution = Matcher::match_order(&snapshot, &match_request, &self.config, state.rng.as_mut());

        if execution.status == ExecutionStatus::Rejected || execution.total_quantity <= 0.0 {
            return Ok(execution);
        }

        let account = state.accounts.entry(account_id.clone()).or_insert_with(|| {
            AccountLedger::new(self.config.initial_capital, self.config.quote_currency.clone())
        });

        if !account.preview_affordable(&symbol, side, &execution, request.leverage) {
            return Ok(Execution::rejected("insufficient available cash"));
        }

        let existed_before = account.positions.contains_key(&symbol);
        let realized_before = account.total_realized;

        account.apply_execution(&symbol, side, &execution, request.leverage);
        if let Some(plan) = request.exit_plan {
            account.set_exit_plan(&symbol, Some(plan));
        }
        if let Some(mid) = snapshot.mid_price() {
            account.update_mark(&symbol, mid);
        }

        let realized_delta = account.total_realized - realized_before;
        let gone_or_zero_after = !account.positions.contains_key(&symbol);
        let completed = existed_before && gone_or_zero_after;
        let notional = execution.total_quantity * execution.average_price;
        let leverage = account.positions.get(&symbol).and_then(|p| p.leverage());
        let account_snapshot = account.snapshot();
        let account_value = account_snapshot.equity;

        self.events.emit_trade(TradeEvent {
            account_id: account_id.clone(),
            symbol: symbol.clone(),
            execution: execution.clone(),
            timestamp: Utc::now(),
            realized_pnl: realized_delta,
            notional,
            leverage,
            confidence: request.confidence,
            direction: side,
            completed,
            account_value,
        });
        self.events.emit_account(AccountEvent { account_id, snapshot: account_snapshot });

        Ok(execution)
    }

    pub fn close_positions(
        &self,
        symbols: &[String],
        account_id: Option<&str>,
        options: CloseOptions,
    ) -> HashMap<String, Execution> {
        let account_id = normalize_account_id(account_id);
        let mut results = HashMap::new();

        for raw_symbol in symbols {
            let symbol = normalize_symbol(raw_symbol);
            let existing = {
                let state = self.state.lock();
                state.accounts.get(&account_id).and_then(|a| a.positions.get(&symbol)).map(|p| p.quantity)
            };

            let Some(quantity) = existing.filter(|q| *q != 0.0) else {
                results.insert(symbol, Execution::rejected("no open position"));
                continue;
            };

            let closing_side = if quantity > 0.0 { RequestedSide::Sell } else { RequestedSide::Buy };
            let request = PlaceOrderRequest {
                account_id: Some(account_id.clone()),
                symbol: symbol.clone(),
                side: closing_side,
                order_type: OrderType::Market,
                quantity: quantity.abs(),
                limit_price: None,
                leverage: None,
                confidence: None,
                exit_plan: None,
            };

            tracing::debug!(account_id = %account_id, symbol = %symbol, auto_trigger = ?options.auto_trigger, "closing position");

            match self.place_order(request, Some(&account_id)) {
                Ok(execution) if execution.status != ExecutionStatus::Rejected => {
                    let mut state = self.state.lock();
                    if let Some(account) = state.accounts.get_mut(&account_id) {
                        account.clear_pending_exit(&symbol);
                    }
                    results.insert(symbol, execution);
                }
                Ok(execution) => {
                    if options.auto_trigger.is_some() {
                        tracing::warn!(account_id = %account_id, symbol = %symbol, "auto-close rejected");
                    }
                    let mut state = self.state.lock();
                    if let Some(account) = state.accounts.get_mut(&account_id) {
                        account.clear_pending_exit(&symbol);
                    }
                    results.insert(symbol, execution);
                }
                Err(_) => {
                    let mut state = self.state.lock();
                    if let Some(account) = state.accounts.get_mut(&account_id) {
                        account.clear_pending_exit(&symbol);
                    }
                    results.insert(symbol, Execution::rejected("no open position"));
                }
            }
        }

        results
    }

    pub fn reset_account(&self, account_id: Option<&str>) -> AccountSnapshot {
        let account_id = normalize_account_id(account_id);
        let mut state = self.state.lock();
        let prefix = format!("{account_id}:");
        state.pending_auto_close.retain(|key| !key.starts_with(&prefix));

        let fresh = AccountLedger::new(self.config.initial_capital, self.config.quote_currency.clone());
        let snapshot = fresh.snapshot();
        state.accounts.insert(account_id.clone(), fresh);
        drop(state);

        self.events.emit_account(AccountEvent { account_id, snapshot: snapshot.clone() });
        snapshot
    }

    pub fn set_exit_plan(&self, account_id: Option<&str>, symbol: &str, plan: Option<ExitPlan>) {
        let account_id = normalize_account_id(account_id);
        let symbol = normalize_symbol(symbol);
        let mut state = self.state.lock();
        if let Some(account) = state.accounts.get_mut(&account_id) {
            account.set_exit_plan(&symbol, plan);
        }
    }

    pub fn get_account_snapshot(&self, account_id: Option<&str>) -> AccountSnapshot {
        let account_id = normalize_account_id(account_id);
        let mut state = self.state.lock();
        let account = state
            .accounts
            .entry(account_id)
            .or_insert_with(|| AccountLedger::new(self.config.initial_capital, self.config.quote_currency.clone()));
        account.snapshot()
    }

    pub fn get_open_positions(&self, account_id: Option<&str>) -> Vec<PositionSnapshot> {
        self.get_account_snapshot(account_id).positions
    }

    pub fn get_order_book(&self, symbol: &str) -> Result<BookSnapshot, SimulatorError> {
        let symbol = normalize_symbol(symbol);
        let state = self.state.lock();
        state
            .books
            .get(&symbol)
            .map(|b| b.snapshot().clone())
            .ok_or(SimulatorError::UnknownMarket(symbol))
    }

    // ---- refresh / funding / auto-close tick --------------------------------

    async fn refresh_tick(&self) {
        tracing::debug!("refresh tick start");

        self.maybe_refresh_funding().await;

        let symbols: Vec<String> = {
            let state = self.state.lock();
            state.books.keys().cloned().collect()
        };

        for symbol in &symbols {
            self.refresh_one_book(symbol).await;
        }

        let account_ids: Vec<String> = {
            let state = self.state.lock();
            state.accounts.keys().cloned().collect()
        };

        let mut auto_close_queue: Vec<(String, String, ExitTrigger)> = Vec::new();
        {
            let mut state = self.state.lock();
            for account_id in &account_ids {
                if let Some(account) = state.accounts.get_mut(account_id) {
                    for (symbol, trigger) in account.collect_exit_plan_triggers() {
                        let key = format!("{account_id}:{symbol}");
                        if state.pending_auto_close.insert(key) {
                            auto_close_queue.push((account_id.clone(), symbol, trigger));
                        }
                    }
                }
            }
        }

        for account_id in &account_ids {
            let snapshot = {
                let mut state = self.state.lock();
                state.accounts.get_mut(account_id).map(|a| a.snapshot())
            };
            if let Some(snapshot) = snapshot {
                self.events.emit_account(AccountEvent { account_id: account_id.clone(), snapshot });
            }
        }

        for (account_id, symbol, trigger) in auto_close_queue {
            self.drain_auto_close(&account_id, &symbol, trigger).await;
        }

        tracing::debug!("refresh tick end");
    }

    async fn refresh_one_book(&self, symbol: &str) {
        let market_id = self
            .registry
            .entry(symbol)
            .map(|e| e.market_id)
            .unwrap_or_else(|| symbol.to_string());

        let fetched = self.book_feed.get_order_book(&market_id).await;
        let (bids, asks): (Vec<PriceLevel>, Vec<PriceLevel>) = match fetched {
            Ok(levels) => levels,
            Err(err) => {
                tracing::warn!(symbol = %symbol, error = %err, "order book refresh failed");
                return;
            }
        };

        let snapshot = BookSnapshot::from_levels(symbol, bids, asks, Utc::now());
        let mid = snapshot.mid_price();

        let mut state = self.state.lock();
        if let Some(book) = state.books.get_mut(symbol) {
            book.replace(snapshot.clone());
        }

        if let Some(mid) = mid {
            let elapsed_rates = self.compute_funding_increments(&mut *state, symbol, Utc::now());
            let account_ids: Vec<String> = state.accounts.keys().cloned().collect();
            for account_id in account_ids {
                if let Some(account) = state.accounts.get_mut(&account_id) {
                    account.update_mark(symbol, mid);
                    if let Some(increment) = elapsed_rates {
                        account.apply_funding(symbol, increment);
                    }
                }
            }
        }
        drop(state);

        self.events.emit_book(BookEvent { symbol: symbol.to_string(), snapshot });
    }

    /// Computes the funding increment to apply this tick for `symbol`,
    /// scaled by elapsed wall-clock time so accrual stays continuous and
    /// robust to non-uniform tick spacing. On the first observation for a
    /// symbol, records the timestamp and applies zero so no phantom
    /// funding is charged before a position existed.
    fn compute_funding_increments(&self, state: &mut CoreState, symbol: &str, now: DateTime<Utc>) -> Option<f64> {
        let rate = *state.funding_rates.get(symbol)?;
        let period_ms = self.config.funding_period_ms();

        match state.last_funding_applied.get(symbol).copied() {
            None => {
                state.last_funding_applied.insert(symbol.to_string(), now);
                None
            }
            Some(last) => {
                let elapsed_ms = (now - last).num_milliseconds().max(0) as f64;
                state.last_funding_applied.insert(symbol.to_string(), now);
                if period_ms <= 0.0 {
                    return None;
                }
                Some(rate * (elapsed_ms / period_ms))
            }
        }
    }

    async fn maybe_refresh_funding(&self) {
        let should_refresh = {
            let state = self.state.lock();
            match state.last_funding_refresh {
                None => true,
                Some(last) => {
                    (Utc::now() - last).num_milliseconds() >= self.config.funding_refresh_interval_ms as i64
                }
            }
        };
        if !should_refresh {
            return;
        }

        let rates = fetch_funding_rates(self.funding_feed.as_ref()).await;
        let mut state = self.state.lock();
        state.funding_rates = rates;
        state.last_funding_refresh = Some(Utc::now());
    }

    async fn drain_auto_close(&self, account_id: &str, symbol: &str, trigger: ExitTrigger) {
        let pre_close = {
            let state = self.state.lock();
            state.accounts.get(account_id).and_then(|a| a.positions.get(symbol)).cloned()
        };

        let results = self.close_positions(
            &[symbol.to_string()],
            Some(account_id),
            CloseOptions { auto_trigger: Some(trigger) },
        );

        if let Some(execution) = results.get(symbol) {
            if execution.status != ExecutionStatus::Rejected {
                if let Some(pre) = pre_close {
                    let unrealized = pre.unrealized_pnl();
                    let record = InvocationRecord {
                        symbol: symbol.to_string(),
                        side: if pre.quantity > 0.0 { OrderSide::Sell } else { OrderSide::Buy },
                        quantity: pre.quantity.abs(),
                        entry_price: pre.avg_entry_price,
                        exit_price: execution.average_price,
                        realized_pnl: pre.realized_pnl,
                        unrealized_pnl: unrealized,
                        net_pnl: pre.realized_pnl + unrealized,
                        closed_at: Utc::now(),
                        auto_trigger: trigger,
                    };
                    self.journal.record(record).await;
                }
            }
        }

        let key = format!("{account_id}:{symbol}");
        let mut state = self.state.lock();
        state.pending_auto_close.remove(&key);
    }
}

async fn fetch_funding_rates(feed: &dyn FundingRateFeed) -> HashMap<String, f64> {
    let quotes = match feed.funding_rates().await {
        Ok(quotes) => quotes,
        Err(err) => {
            tracing::warn!(error = %err, "funding rate refresh failed");
            return HashMap::new();
        }
    };

    let primary = feed.primary_source();
    let mut rates: HashMap<String, (f64, bool)> = HashMap::new();
    for quote in quotes {
        let symbol = normalize_symbol(&quote.symbol);
        let is_primary = primary.is_some() && quote.exchange.as_deref() == primary;
        let replace = match rates.get(&symbol) {
            None => true,
            Some((_, existing_is_primary)) => is_primary && !existing_is_primary,
        };
        if replace {
            rates.insert(symbol, (quote.rate, is_primary));
        }
    }
    rates.into_iter().map(|(symbol, (rate, _))| (symbol, rate)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::fakes::{FakeFundingRateFeed, FakeInvocationJournal, FakeMarketRegistry, FakeOrderBookFeed};
    use crate::feeds::FundingRateQuote;

    fn test_config() -> ExchangeConfig {
        ExchangeConfig {
            initial_capital: 1000.0,
            quote_currency: "USDT".to_string(),
            latency: crate::config::LatencyConfig { min_ms: 0, max_ms: 0 },
            slippage: crate::config::SlippageConfig { max_basis_points: 0.0 },
            fees: crate::config::FeeConfig { maker_bps: 2.0, taker_bps: 5.0 },
            deterministic_seed: Some(1),
            funding_period_hours: 8.0,
            funding_refresh_interval_ms: 60_000,
            refresh_interval_ms: 1_000,
            simulation_enabled: true,
        }
    }

    async fn boot(config: ExchangeConfig) -> (Arc<ExchangeCore>, Arc<FakeOrderBookFeed>) {
        let book_feed = Arc::new(FakeOrderBookFeed::default());
        book_feed.set(
            "BTC",
            vec![PriceLevel::new(99.0, 5.0), PriceLevel::new(98.0, 5.0)],
            vec![PriceLevel::new(100.0, 5.0), PriceLevel::new(101.0, 5.0)],
        );
        let funding_feed = Arc::new(FakeFundingRateFeed::default());
        let registry = Arc::new(FakeMarketRegistry::single("BTC"));
        let journal = Arc::new(FakeInvocationJournal::default());
        let core = ExchangeCore::bootstrap(config, book_feed.clone(), funding_feed, registry, journal).await;
        core.refresh_one_book("BTC").await;
        (core, book_feed)
    }

    fn market_buy(symbol: &str, quantity: f64) -> PlaceOrderRequest {
        PlaceOrderRequest {
            account_id: None,
            symbol: symbol.to_string(),
            side: RequestedSide::Buy,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            leverage: Some(1.0),
            confidence: None,
            exit_plan: None,
        }
    }

    #[tokio::test]
    async fn scenario_1_market_long_fully_filled() {
        let (core, _) = boot(test_config()).await;
        let execution = core.place_order(market_buy("BTC", 2.0), None).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Filled);
        let snapshot = core.get_account_snapshot(None);
        assert!((snapshot.cash_balance - 799.90).abs() < 1e-9);
    }

    #[tokio::test]
    async fn scenario_4_insufficient_cash_rejected() {
        let mut config = test_config();
        config.initial_capital = 100.0;
        let (core, _) = boot(config).await;
        let execution = core.place_order(market_buy("BTC", 5.0), None).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Rejected);
        assert_eq!(execution.reason.as_deref(), Some("insufficient available cash"));
        let snapshot = core.get_account_snapshot(None);
        assert_eq!(snapshot.cash_balance, 100.0);
    }

    #[tokio::test]
    async fn unknown_symbol_is_rejected_for_close() {
        let (core, _) = boot(test_config()).await;
        let results = core.close_positions(&["BTC".into()], None, CloseOptions::default());
        assert_eq!(results["BTC"].status, ExecutionStatus::Rejected);
        assert_eq!(results["BTC"].reason.as_deref(), Some("no open position"));
    }

    #[tokio::test]
    async fn reset_account_is_idempotent() {
        let (core, _) = boot(test_config()).await;
        core.place_order(market_buy("BTC", 2.0), None).unwrap();
        let first = core.reset_account(None);
        let second = core.reset_account(None);
        assert_eq!(first.cash_balance, second.cash_balance);
        assert!(second.positions.is_empty());
    }

    #[tokio::test]
    async fn symbol_normalization_strips_quote_suffix() {
        let (core, _) = boot(test_config()).await;
        let execution = core.place_order(market_buy("btcusdt", 2.0), None).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Filled);
    }

    #[tokio::test]
    async fn scenario_5_stop_trigger_auto_closes() {
        let (core, book_feed) = boot(test_config()).await;
        core.place_order(market_buy("BTC", 1.0), None).unwrap();
        core.set_exit_plan(None, "BTC", Some(ExitPlan { stop: Some(95.0), target: None, invalidation: None }));

        book_feed.set("BTC", vec![PriceLevel::new(93.0, 5.0)], vec![PriceLevel::new(94.0, 5.0)]);
        core.refresh_tick().await;

        let snapshot = core.get_account_snapshot(None);
        assert!(snapshot.positions.is_empty());
    }

    #[tokio::test]
    async fn scenario_6_funding_accrual() {
        let mut config = test_config();
        config.funding_period_hours = 8.0;
        let book_feed = Arc::new(FakeOrderBookFeed::default());
        book_feed.set("BTC", vec![PriceLevel::new(999.0, 10.0)], vec![PriceLevel::new(1000.0, 10.0)]);
        let funding_feed = Arc::new(FakeFundingRateFeed::default());
        funding_feed.rates.lock().push(FundingRateQuote { symbol: "BTC".into(), rate: 0.0001, exchange: None });
        let registry = Arc::new(FakeMarketRegistry::single("BTC"));
        let journal = Arc::new(FakeInvocationJournal::default());
        let core = ExchangeCore::bootstrap(config, book_feed.clone(), funding_feed.clone(), registry, journal).await;
        core.refresh_one_book("BTC").await;

        core.place_order(
            PlaceOrderRequest {
                account_id: None,
                symbol: "BTC".into(),
                side: RequestedSide::Buy,
                order_type: OrderType::Market,
                quantity: 10.0,
                limit_price: None,
                leverage: Some(1.0),
                confidence: None,
                exit_plan: None,
            },
            None,
        )
        .unwrap();

        {
            let mut state = core.state.lock();
            state.last_funding_applied.insert("BTC".to_string(), Utc::now() - chrono::Duration::seconds(60));
            state.funding_rates.insert("BTC".to_string(), 0.0001);
        }
        core.refresh_one_book("BTC").await;

        let snapshot = core.get_account_snapshot(None);
        assert!(snapshot.total_funding_pnl.abs() > 0.0);
        assert!(snapshot.total_funding_pnl < 0.0);
    }

    #[tokio::test]
    async fn place_order_rejected_while_simulation_disabled() {
        let mut config = test_config();
        config.simulation_enabled = false;
        let (core, _) = boot(config).await;
        let err = core.place_order(market_buy("BTC", 2.0), None).unwrap_err();
        assert_eq!(err, SimulatorError::SimulationDisabled);
    }

    #[test]
    fn requested_side_parses_aliases_and_rejects_unknown() {
        use std::str::FromStr;
        assert_eq!(RequestedSide::from_str("buy").unwrap(), RequestedSide::Buy);
        assert_eq!(RequestedSide::from_str("LONG").unwrap(), RequestedSide::Long);
        assert_eq!(RequestedSide::from_str(" short ").unwrap(), RequestedSide::Short);
        assert_eq!(RequestedSide::from_str("sideways").unwrap_err(), SimulatorError::UnsupportedOrderSide);
    }
}
