//! Simulator configuration.
//!
//! Env loading is a host concern (see `bin/demo.rs` for the pattern this
//! crate expects a host to follow); `ExchangeConfig` itself stays a plain
//! struct with sane defaults that can be overridden field by field.

#[derive(Debug, Clone)]
pub struct LatencyConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self { min_ms: 5, max_ms: 50 }
    }
}

#[derive(Debug, Clone)]
pub struct SlippageConfig {
    pub max_basis_points: f64,
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self { max_basis_points: 10.0 }
    }
}

#[derive(Debug, Clone)]
pub struct FeeConfig {
    pub maker_bps: f64,
    pub taker_bps: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self { maker_bps: 2.0, taker_bps: 5.0 }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub initial_capital: f64,
    pub quote_currency: String,
    pub latency: LatencyConfig,
    pub slippage: SlippageConfig,
    pub fees: FeeConfig,
    /// Present ⇒ deterministic RNG seeded with this value; absent ⇒ platform RNG.
    pub deterministic_seed: Option<u64>,
    pub funding_period_hours: f64,
    pub funding_refresh_interval_ms: u64,
    pub refresh_interval_ms: u64,
    /// Global kill switch. `placeOrder` rejects with `SimulationDisabled`
    /// while this is `false`; the refresh/funding/auto-close tick keeps
    /// running regardless, since it has its own host-level pause point.
    pub simulation_enabled: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            initial_capital: 1000.0,
            quote_currency: "USDT".to_string(),
            latency: LatencyConfig::default(),
            slippage: SlippageConfig::default(),
            fees: FeeConfig::default(),
            deterministic_seed: None,
            funding_period_hours: 8.0,
            funding_refresh_interval_ms: 60_000,
            refresh_interval_ms: 1_000,
            simulation_enabled: true,
        }
    }
}

impl ExchangeConfig {
    pub fn funding_period_ms(&self) -> f64 {
        self.funding_period_hours * 3_600_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_finite_and_sane() {
        let cfg = ExchangeConfig::default();
        assert!(cfg.initial_capital > 0.0);
        assert!(cfg.latency.max_ms >= cfg.latency.min_ms);
        assert!(cfg.fees.taker_bps >= cfg.fees.maker_bps);
        assert!(cfg.deterministic_seed.is_none());
    }

    #[test]
    fn funding_period_conversion() {
        let cfg = ExchangeConfig {
            funding_period_hours: 8.0,
            ..ExchangeConfig::default()
        };
        assert_eq!(cfg.funding_period_ms(), 8.0 * 3_600_000.0);
    }
}
