//! Account ledger: cash, positions, margin, realized/funding PnL.
//!
//! Position and margin bookkeeping uses weighted-average entry price and
//! proportional margin release on reducing trades. Affordability checks
//! never mutate the live ledger directly: a preview clones the ledger,
//! applies the candidate execution to the clone, and checks the clone's
//! solvency before the real apply is allowed to happen.

use crate::matching::{Execution, OrderSide};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const CASH_EPSILON: f64 = 1e-6;
const DUST_THRESHOLD: f64 = 1e-6;
const REALIZED_DUST_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitTrigger {
    Stop,
    Target,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitPlan {
    pub stop: Option<f64>,
    pub target: Option<f64>,
    pub invalidation: Option<String>,
}

impl ExitPlan {
    /// Which trigger, if any, fires at the given mark for a position whose
    /// signed quantity is `quantity`. Stop takes priority over target when
    /// both boundaries are breached in the same tick.
    fn triggered_at(&self, quantity: f64, mark: f64) -> Option<ExitTrigger> {
        let is_long = quantity > 0.0;
        if let Some(stop) = self.stop {
            let breached = if is_long { mark <= stop } else { mark >= stop };
            if breached {
                return Some(ExitTrigger::Stop);
            }
        }
        if let Some(target) = self.target {
            let breached = if is_long { mark >= target } else { mark <= target };
            if breached {
                return Some(ExitTrigger::Target);
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct Position {
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub realized_pnl: f64,
    pub mark_price: f64,
    pub margin: f64,
    pub exit_plan: Option<ExitPlan>,
    pub auto_close_pending: bool,
}

impl Position {
    fn new(mark_price: f64) -> Self {
        Self {
            quantity: 0.0,
            avg_entry_price: 0.0,
            realized_pnl: 0.0,
            mark_price,
            margin: 0.0,
            exit_plan: None,
            auto_close_pending: false,
        }
    }

    fn is_empty(&self) -> bool {
        self.quantity == 0.0 && self.realized_pnl.abs() < REALIZED_DUST_THRESHOLD
    }

    pub fn unrealized_pnl(&self) -> f64 {
        if self.quantity > 0.0 {
            (self.mark_price - self.avg_entry_price) * self.quantity
        } else if self.quantity < 0.0 {
            (self.avg_entry_price - self.mark_price) * self.quantity.abs()
        } else {
            0.0
        }
    }

    pub fn notional(&self) -> f64 {
        self.quantity.abs() * self.mark_price
    }

    pub fn leverage(&self) -> Option<f64> {
        if self.margin > 0.0 {
            Some(self.notional() / self.margin)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub avg_entry: f64,
    pub realized: f64,
    pub unrealized: f64,
    pub mark: f64,
    pub margin: f64,
    pub notional: f64,
    pub leverage: Option<f64>,
    pub exit_plan: Option<ExitPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub cash_balance: f64,
    pub available_cash: f64,
    pub borrowed_balance: f64,
    pub equity: f64,
    pub margin_balance: f64,
    pub quote_currency: String,
    pub positions: Vec<PositionSnapshot>,
    pub total_realized_pnl: f64,
    pub total_unrealized_pnl: f64,
    pub total_funding_pnl: f64,
}

#[derive(Debug, Clone)]
pub struct AccountLedger {
    pub cash_balance: f64,
    pub quote_currency: String,
    pub positions: HashMap<String, Position>,
    pub total_realized: f64,
    pub total_fees: f64,
    pub total_funding: f64,
}

impl AccountLedger {
    pub fn new(initial_capital: f64, quote_currency: impl Into<String>) -> Self {
        Self {
            cash_balance: initial_capital,
            quote_currency: quote_currency.into(),
            positions: HashMap::new(),
            total_realized: 0.0,
            total_fees: 0.0,
            total_funding: 0.0,
        }
    }

    pub fn gross_position_value(&self) -> f64 {
        self.positions.values().map(|p| p.mark_price * p.quantity).sum()
    }

    pub fn equity(&self) -> f64 {
        self.cash_balance + self.gross_position_value()
    }

    pub fn margin_balance(&self) -> f64 {
        self.positions.values().map(|p| p.margin.max(0.0)).sum()
    }

    pub fn borrowed_balance(&self) -> f64 {
        (-self.cash_balance).max(0.0)
    }

    pub fn available_cash(&self) -> f64 {
        (self.equity() - self.margin_balance()).max(0.0)
    }

    pub fn is_solvent(&self) -> bool {
        self.equity() + CASH_EPSILON >= self.margin_balance()
    }

    /// Dry-run an execution against a clone and report whether the account
    /// would remain solvent. The real ledger is never touched here.
    pub fn preview_affordable(
        &self,
        symbol: &str,
        side: OrderSide,
        execution: &Execution,
        leverage: Option<f64>,
    ) -> bool {
        let mut clone = self.clone();
        clone.apply_execution(symbol, side, execution, leverage);
        clone.is_solvent()
    }

    fn effective_leverage(&self, symbol: &str, requested: Option<f64>) -> f64 {
        if let Some(lev) = requested {
            if lev.is_finite() && lev > 0.0 {
                return lev.max(1.0);
            }
        }
        if let Some(position) = self.positions.get(symbol) {
            if position.quantity != 0.0 && position.margin > 0.0 {
                let ref_price = if position.avg_entry_price > 0.0 {
                    position.avg_entry_price
                } else {
                    position.mark_price
                };
                return (position.quantity.abs() * ref_price) / position.margin;
            }
        }
        1.0
    }

    /// Apply a resolved execution's fills to this ledger.
    pub fn apply_execution(
        &mut self,
        symbol: &str,
        side: OrderSide,
        execution: &Execution,
        leverage: Option<f64>,
    ) {
        if execution.fills.is_empty() {
            return;
        }
        let leverage = self.effective_leverage(symbol, leverage);
        let direction = match side {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        };

        for fill in &execution.fills {
            let signed_qty = direction * fill.quantity;
            let notional = fill.quantity * fill.price;

            self.cash_balance -= signed_qty * fill.price + fill.fee;

            let position = self
                .positions
                .entry(symbol.to_string())
                .or_insert_with(|| Position::new(fill.price));

            let same_sign = position.quantity == 0.0
                || position.quantity.signum() == signed_qty.signum();

            if same_sign {
                let prior_abs = position.quantity.abs();
                let new_abs = prior_abs + signed_qty.abs();
                position.avg_entry_price = if new_abs > 0.0 {
                    (position.avg_entry_price * prior_abs + fill.price * signed_qty.abs()) / new_abs
                } else {
                    fill.price
                };
                position.quantity += signed_qty;
                position.margin += notional / leverage;
            } else {
                let existing_abs = position.quantity.abs();
                let closing_qty = existing_abs.min(signed_qty.abs());

                position.margin -= position.margin * closing_qty / existing_abs;

                let realized = if position.quantity > 0.0 {
                    (fill.price - position.avg_entry_price) * closing_qty
                } else {
                    (position.avg_entry_price - fill.price) * closing_qty
                };
                position.realized_pnl += realized;
                self.total_realized += realized;

                let new_quantity = position.quantity + signed_qty;
                if new_quantity == 0.0 {
                    position.margin = 0.0;
                    position.avg_entry_price = 0.0;
                } else if new_quantity.signum() != position.quantity.signum() {
                    position.avg_entry_price = fill.price;
                    position.margin = new_quantity.abs() * fill.price / leverage;
                }
                position.quantity = new_quantity;
            }

            position.mark_price = fill.price;
            if position.margin.abs() < DUST_THRESHOLD {
                position.margin = 0.0;
            }

            self.total_fees += fill.fee;
        }

        if let Some(position) = self.positions.get(symbol) {
            if position.is_empty() {
                self.positions.remove(symbol);
            }
        }
    }

    pub fn update_mark(&mut self, symbol: &str, price: f64) {
        if let Some(position) = self.positions.get_mut(symbol) {
            position.mark_price = price;
        }
    }

    /// Apply funding for one symbol at the given effective rate (already
    /// scaled for elapsed time — see `exchange::funding`). No-op for
    /// zero/non-finite rates or symbols with no open position.
    pub fn apply_funding(&mut self, symbol: &str, effective_rate: f64) {
        if effective_rate == 0.0 || !effective_rate.is_finite() {
            return;
        }
        let Some(position) = self.positions.get_mut(symbol) else { return };
        if position.quantity == 0.0 || !position.mark_price.is_finite() || position.mark_price <= 0.0 {
            return;
        }
        let notional = position.quantity.abs() * position.mark_price;
        let funding_pnl = -position.quantity.signum() * notional * effective_rate;

        self.cash_balance += funding_pnl;
        position.realized_pnl += funding_pnl;
        self.total_realized += funding_pnl;
        self.total_funding += funding_pnl;
    }

    pub fn set_exit_plan(&mut self, symbol: &str, plan: Option<ExitPlan>) {
        if let Some(position) = self.positions.get_mut(symbol) {
            position.exit_plan = plan;
            position.auto_close_pending = false;
        }
    }

    /// One entry per position whose exit plan crosses at the current mark
    /// and which is not already pending. Marks emitted positions pending so
    /// a later scan in the same tick does not re-emit them.
    pub fn collect_exit_plan_triggers(&mut self) -> Vec<(String, ExitTrigger)> {
        let mut triggers = Vec::new();
        for (symbol, position) in self.positions.iter_mut() {
            if position.auto_close_pending || position.quantity == 0.0 {
                continue;
            }
            let Some(plan) = &position.exit_plan else { continue };
            if let Some(trigger) = plan.triggered_at(position.quantity, position.mark_price) {
                position.auto_close_pending = true;
                triggers.push((symbol.clone(), trigger));
            }
        }
        triggers
    }

    pub fn clear_pending_exit(&mut self, symbol: &str) {
        if let Some(position) = self.positions.get_mut(symbol) {
            position.auto_close_pending = false;
        }
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        let mut positions: Vec<PositionSnapshot> = self
            .positions
            .iter()
            .map(|(symbol, position)| PositionSnapshot {
                symbol: symbol.clone(),
                side: if position.quantity >= 0.0 { OrderSide::Buy } else { OrderSide::Sell },
                quantity: position.quantity.abs(),
                avg_entry: position.avg_entry_price,
                realized: position.realized_pnl,
                unrealized: position.unrealized_pnl(),
                mark: position.mark_price,
                margin: position.margin,
                notional: position.notional(),
                leverage: position.leverage(),
                exit_plan: position.exit_plan.clone(),
            })
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let total_unrealized = self.positions.values().map(|p| p.unrealized_pnl()).sum();

        AccountSnapshot {
            cash_balance: self.cash_balance,
            available_cash: self.available_cash(),
            borrowed_balance: self.borrowed_balance(),
            equity: self.equity(),
            margin_balance: self.margin_balance(),
            quote_currency: self.quote_currency.clone(),
            positions,
            total_realized_pnl: self.total_realized,
            total_unrealized_pnl: total_unrealized,
            total_funding_pnl: self.total_funding,
        }
    }
}
