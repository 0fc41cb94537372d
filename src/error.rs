//! Ingress validation errors.
//!
//! Matcher and affordability rejections are not modeled here — those are
//! `Execution { status: Rejected, .. }` values on the `Ok` path (see
//! `matching::Execution`). This enum only covers malformed requests that
//! never reach the matcher at all.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SimulatorError {
    SymbolRequired,
    QuantityMustBePositive,
    InvalidLimitPrice,
    UnsupportedOrderSide,
    SimulationDisabled,
    UnknownMarket(String),
}

impl fmt::Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorError::SymbolRequired => write!(f, "Symbol is required"),
            SimulatorError::QuantityMustBePositive => write!(f, "Quantity must be positive"),
            SimulatorError::InvalidLimitPrice => write!(f, "limitPrice must be a valid number"),
            SimulatorError::UnsupportedOrderSide => write!(f, "Unsupported order side"),
            SimulatorError::SimulationDisabled => write!(f, "Simulation mode is disabled"),
            SimulatorError::UnknownMarket(symbol) => write!(f, "Unknown market: {symbol}"),
        }
    }
}

impl std::error::Error for SimulatorError {}
