//! Typed pub/sub event bus.
//!
//! One listener set per event kind, synchronous delivery, and a
//! catch-and-log wrapper around each listener invocation so a subscriber's
//! panic cannot destabilize the emitter.

use crate::book::BookSnapshot;
use crate::ledger::AccountSnapshot;
use crate::matching::{Execution, OrderSide};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Book,
    Trade,
    Account,
}

/// Pushed to subscribers unscoped; forwarded to everyone interested in the symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookEvent {
    pub symbol: String,
    pub snapshot: BookSnapshot,
}

/// Subscribers that want account scoping filter on `account_id` themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub account_id: String,
    pub symbol: String,
    #[serde(rename = "result")]
    pub execution: Execution,
    pub timestamp: DateTime<Utc>,
    pub realized_pnl: f64,
    pub notional: f64,
    pub leverage: Option<f64>,
    pub confidence: Option<f64>,
    pub direction: OrderSide,
    pub completed: bool,
    pub account_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEvent {
    pub account_id: String,
    pub snapshot: AccountSnapshot,
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Default)]
struct ListenerSets {
    book: Mutex<Vec<Listener<BookEvent>>>,
    trade: Mutex<Vec<Listener<TradeEvent>>>,
    account: Mutex<Vec<Listener<AccountEvent>>>,
}

/// Typed pub/sub over `{book, trade, account}`. Delivery is synchronous in
/// the emitter's calling context.
#[derive(Default)]
pub struct EventBus {
    listeners: ListenerSets,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_book(&self, listener: impl Fn(&BookEvent) + Send + Sync + 'static) {
        self.listeners.book.lock().unwrap().push(Arc::new(listener));
    }

    pub fn on_trade(&self, listener: impl Fn(&TradeEvent) + Send + Sync + 'static) {
        self.listeners.trade.lock().unwrap().push(Arc::new(listener));
    }

    pub fn on_account(&self, listener: impl Fn(&AccountEvent) + Send + Sync + 'static) {
        self.listeners.account.lock().unwrap().push(Arc::new(listener));
    }

    pub fn emit_book(&self, event: BookEvent) {
        Self::dispatch(&self.listeners.book, &event);
    }

    pub fn emit_trade(&self, event: TradeEvent) {
        Self::dispatch(&self.listeners.trade, &event);
    }

    pub fn emit_account(&self, event: AccountEvent) {
        Self::dispatch(&self.listeners.account, &event);
    }

    fn dispatch<T>(set: &Mutex<Vec<Listener<T>>>, event: &T) {
        let listeners: Vec<_> = set.lock().unwrap().clone();
        for listener in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            if outcome.is_err() {
                tracing::warn!("event listener panicked; emitter continuing");
            }
        }
    }

    pub fn book_listener_count(&self) -> usize {
        self.listeners.book.lock().unwrap().len()
    }

    pub fn trade_listener_count(&self) -> usize {
        self.listeners.trade.lock().unwrap().len()
    }

    pub fn account_listener_count(&self) -> usize {
        self.listeners.account.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{Execution, ExecutionStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dummy_execution() -> Execution {
        Execution {
            fills: vec![],
            average_price: 0.0,
            total_quantity: 0.0,
            total_fees: 0.0,
            status: ExecutionStatus::Rejected,
            reason: None,
        }
    }

    #[test]
    fn book_listener_receives_event() {
        let bus = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let r = received.clone();
        bus.on_book(move |_event| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit_book(BookEvent { symbol: "BTC".into(), snapshot: BookSnapshot::empty("BTC") });
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_does_not_stop_emission() {
        let bus = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        bus.on_trade(|_event| panic!("boom"));
        let r = received.clone();
        bus.on_trade(move |_event| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit_trade(TradeEvent {
            account_id: "default".into(),
            symbol: "BTC".into(),
            execution: dummy_execution(),
            timestamp: Utc::now(),
            realized_pnl: 0.0,
            notional: 0.0,
            leverage: None,
            confidence: None,
            direction: OrderSide::Buy,
            completed: false,
            account_value: 0.0,
        });
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trade_event_serializes_execution_under_result_key() {
        let event = TradeEvent {
            account_id: "default".into(),
            symbol: "BTC".into(),
            execution: dummy_execution(),
            timestamp: Utc::now(),
            realized_pnl: 0.0,
            notional: 0.0,
            leverage: None,
            confidence: None,
            direction: OrderSide::Buy,
            completed: false,
            account_value: 0.0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"result\":"));
        assert!(!json.contains("\"execution\":"));
    }

    #[test]
    fn account_event_serializes_as_camel_case_json() {
        let event = AccountEvent {
            account_id: "default".into(),
            snapshot: crate::ledger::AccountLedger::new(1000.0, "USDT").snapshot(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"accountId\":\"default\""));
        assert!(json.contains("\"cashBalance\":1000"));
    }

    #[test]
    fn multiple_listeners_all_fire() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = count.clone();
            bus.on_account(move |_e| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.emit_account(AccountEvent {
            account_id: "default".into(),
            snapshot: crate::ledger::AccountLedger::new(1000.0, "USDT").snapshot(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
