//! In-process perpetual-futures exchange simulator.
//!
//! Embeddable matching engine, account ledger, and refresh/funding/auto-close
//! scheduler for an autonomous trading platform to rehearse strategies
//! against simulated derivative markets without touching a live venue.

pub mod book;
pub mod config;
pub mod error;
pub mod events;
pub mod exchange;
pub mod feeds;
pub mod ledger;
pub mod matching;
pub mod random;

pub use config::ExchangeConfig;
pub use error::SimulatorError;
pub use events::{AccountEvent, BookEvent, EventBus, EventKind, TradeEvent};
pub use exchange::ExchangeCore;
pub use ledger::{AccountLedger, AccountSnapshot, Position, PositionSnapshot};
pub use matching::{Execution, ExecutionStatus, Fill, Matcher, OrderRequest, OrderSide, OrderType};
pub use random::RandomSource;
