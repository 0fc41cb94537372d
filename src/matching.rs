//! Pure matcher: resolves an order against a book snapshot into fills.
//!
//! No I/O, no shared state — `Matcher::match_order` takes everything it
//! needs as arguments and returns a value describing the outcome. Keeping
//! the book-walk, slippage/latency sampling, and fee calculation in one
//! pure function makes the matcher trivial to test against a fixed RNG
//! seed without touching any resting order-book state.

use crate::config::ExchangeConfig;
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub leverage: Option<f64>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub quantity: f64,
    pub price: f64,
    pub maker: bool,
    pub fee: f64,
    pub slippage_bps: f64,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Filled,
    Partial,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub fills: Vec<Fill>,
    pub average_price: f64,
    pub total_quantity: f64,
    pub total_fees: f64,
    pub status: ExecutionStatus,
    pub reason: Option<String>,
}

impl Execution {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            fills: Vec::new(),
            average_price: 0.0,
            total_quantity: 0.0,
            total_fees: 0.0,
            status: ExecutionStatus::Rejected,
            reason: Some(reason.into()),
        }
    }

    fn from_fills(fills: Vec<Fill>, requested_quantity: f64, reason: Option<String>) -> Self {
        let total_quantity: f64 = fills.iter().map(|f| f.quantity).sum();
        let total_fees: f64 = fills.iter().map(|f| f.fee).sum();
        let average_price = if total_quantity > 0.0 {
            fills.iter().map(|f| f.price * f.quantity).sum::<f64>() / total_quantity
        } else {
            0.0
        };
        let status = if total_quantity <= 0.0 {
            ExecutionStatus::Rejected
        } else if total_quantity + 1e-9 < requested_quantity {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Filled
        };
        Self { fills, average_price, total_quantity, total_fees, status, reason }
    }
}

pub struct Matcher;

impl Matcher {
    /// `match(book, order, config, rng) -> execution`. Pure; no I/O.
    pub fn match_order(
        book: &crate::book::BookSnapshot,
        order: &OrderRequest,
        config: &ExchangeConfig,
        rng: &mut dyn RandomSource,
    ) -> Execution {
        match order.order_type {
            OrderType::Market => Self::match_market(book, order, config, rng),
            OrderType::Limit => Self::match_limit(book, order, config, rng),
        }
    }

    fn opposite_levels<'a>(
        book: &'a crate::book::BookSnapshot,
        side: OrderSide,
    ) -> &'a [crate::book::PriceLevel] {
        match side {
            OrderSide::Buy => &book.asks,
            OrderSide::Sell => &book.bids,
        }
    }

    fn match_market(
        book: &crate::book::BookSnapshot,
        order: &OrderRequest,
        config: &ExchangeConfig,
        rng: &mut dyn RandomSource,
    ) -> Execution {
        let levels = Self::opposite_levels(book, order.side);
        if levels.is_empty() {
            return Execution::rejected("no liquidity available");
        }

        let mut remaining = order.quantity;
        let mut fills = Vec::new();

        for level in levels {
            if remaining <= 0.0 {
                break;
            }
            let exec_qty = remaining.min(level.quantity);
            let slippage_bps = rng.uniform(0.0, config.slippage.max_basis_points);
            let adjusted_price = match order.side {
                OrderSide::Buy => level.price * (1.0 + slippage_bps * 1e-4),
                OrderSide::Sell => level.price * (1.0 - slippage_bps * 1e-4),
            };
            let latency_ms =
                rng.uniform(config.latency.min_ms as f64, config.latency.max_ms as f64) as u64;
            let fee = exec_qty * adjusted_price * config.fees.taker_bps * 1e-4;

            fills.push(Fill {
                quantity: exec_qty,
                price: adjusted_price,
                maker: false,
                fee,
                slippage_bps,
                latency_ms,
            });
            remaining -= exec_qty;
        }

        let reason = if remaining > 1e-9 {
            Some("insufficient book depth".to_string())
        } else {
            None
        };
        Execution::from_fills(fills, order.quantity, reason)
    }

    fn match_limit(
        book: &crate::book::BookSnapshot,
        order: &OrderRequest,
        config: &ExchangeConfig,
        rng: &mut dyn RandomSource,
    ) -> Execution {
        let Some(limit_price) = order.limit_price else {
            return Execution::rejected("limit order missing limitPrice");
        };

        let crosses = match order.side {
            OrderSide::Buy => book.best_ask().map(|a| limit_price >= a.price).unwrap_or(false),
            OrderSide::Sell => book.best_bid().map(|b| limit_price <= b.price).unwrap_or(false),
        };

        if crosses {
            return Self::match_market(book, order, config, rng);
        }

        let latency_ms =
            rng.uniform(config.latency.min_ms as f64, config.latency.max_ms as f64) as u64;
        let fee = order.quantity * limit_price * config.fees.maker_bps * 1e-4;
        let fill = Fill {
            quantity: order.quantity,
            price: limit_price,
            maker: true,
            fee,
            slippage_bps: 0.0,
            latency_ms,
        };
        Execution::from_fills(vec![fill], order.quantity, None)
    }
}
