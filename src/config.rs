use crate::error::{AdvisorError, Result};
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

static RAYON_INIT: OnceLock<()> = OnceLock::new();

/// Annual trading days for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Default simulated horizon: ten trading years.
pub const RANDOM_WALK_HORIZON: usize = 2520;

pub const REBALANCE_HIGH: f64 = 1.1;
pub const REBALANCE_LOW: f64 = 0.9;

/// Allocations below this weight are dropped before initialization.
pub const MIN_RETAINED_WEIGHT: f64 = 0.001;

/// Random weight vectors drawn per combination for the feasible-set cloud.
pub const RANDOM_PORTFOLIOS: usize = 2500;

/// Prefix of environment variables that override configuration.
pub const ENV_PREFIX: &str = "ROBOADVISOR_";

pub fn init_cpu_parallelism(requested: Option<usize>) {
    RAYON_INIT.get_or_init(|| {
        let num_threads = requested.unwrap_or_else(num_cpus::get).max(1);
        match ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
            Ok(_) => info!("Initialized Rayon thread pool with {} threads", num_threads),
            Err(e) => warn!(
                "Rayon thread pool already initialized or unavailable ({}). Using existing configuration.",
                e
            ),
        }
    });
}

/// Every knob of the optimizer and the rebalancing simulator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub portfolio_size: usize,
    /// Advisory only; carried through to reports.
    pub risk_tolerance: f64,
    pub max_pos: f64,
    pub min_pos: f64,
    /// Analyse only the first N combinations in enumeration order.
    pub max_combinations: Option<usize>,
    pub trade_cost: f64,
    pub starting_cash: f64,
    pub rebalance_high: f64,
    pub rebalance_low: f64,
    pub fractional_units: bool,
    pub monte_carlo_iterations: usize,
    pub random_walk_horizon: usize,
    pub seed: Option<u64>,
    pub random_portfolios: usize,
    pub min_retained_weight: f64,
    pub worker_threads: Option<usize>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            portfolio_size: 5,
            risk_tolerance: 5.0,
            max_pos: 1.0,
            min_pos: 0.0,
            max_combinations: None,
            trade_cost: 5.0,
            starting_cash: 20_000.0,
            rebalance_high: REBALANCE_HIGH,
            rebalance_low: REBALANCE_LOW,
            fractional_units: true,
            monte_carlo_iterations: 1,
            random_walk_horizon: RANDOM_WALK_HORIZON,
            seed: None,
            random_portfolios: RANDOM_PORTFOLIOS,
            min_retained_weight: MIN_RETAINED_WEIGHT,
            worker_threads: None,
        }
    }
}

impl AdvisorConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: AdvisorConfig = serde_json::from_str(&raw)?;
        info!("Loaded configuration from {}", path.display());
        Ok(cfg)
    }

    /// Applies `ROBOADVISOR_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Applies overrides from `lookup`, keyed by upper-case field name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PORTFOLIO_SIZE") {
            self.portfolio_size = parse_value("PORTFOLIO_SIZE", &v)?;
        }
        if let Some(v) = lookup("RISK_TOLERANCE") {
            self.risk_tolerance = parse_value("RISK_TOLERANCE", &v)?;
        }
        if let Some(v) = lookup("MAX_POS") {
            self.max_pos = parse_value("MAX_POS", &v)?;
        }
        if let Some(v) = lookup("MIN_POS") {
            self.min_pos = parse_value("MIN_POS", &v)?;
        }
        if let Some(v) = lookup("MAX_COMBINATIONS") {
            self.max_combinations = Some(parse_value("MAX_COMBINATIONS", &v)?);
        }
        if let Some(v) = lookup("TRADE_COST") {
            self.trade_cost = parse_value("TRADE_COST", &v)?;
        }
        if let Some(v) = lookup("STARTING_CASH") {
            self.starting_cash = parse_value("STARTING_CASH", &v)?;
        }
        if let Some(v) = lookup("REBALANCE_HIGH") {
            self.rebalance_high = parse_value("REBALANCE_HIGH", &v)?;
        }
        if let Some(v) = lookup("REBALANCE_LOW") {
            self.rebalance_low = parse_value("REBALANCE_LOW", &v)?;
        }
        if let Some(v) = lookup("FRACTIONAL_UNITS") {
            self.fractional_units = parse_value("FRACTIONAL_UNITS", &v)?;
        }
        if let Some(v) = lookup("MONTE_CARLO_ITERATIONS") {
            self.monte_carlo_iterations = parse_value("MONTE_CARLO_ITERATIONS", &v)?;
        }
        if let Some(v) = lookup("RANDOM_WALK_HORIZON") {
            self.random_walk_horizon = parse_value("RANDOM_WALK_HORIZON", &v)?;
        }
        if let Some(v) = lookup("SEED") {
            self.seed = Some(parse_value("SEED", &v)?);
        }
        if let Some(v) = lookup("RANDOM_PORTFOLIOS") {
            self.random_portfolios = parse_value("RANDOM_PORTFOLIOS", &v)?;
        }
        if let Some(v) = lookup("MIN_RETAINED_WEIGHT") {
            self.min_retained_weight = parse_value("MIN_RETAINED_WEIGHT", &v)?;
        }
        if let Some(v) = lookup("WORKER_THREADS") {
            self.worker_threads = Some(parse_value("WORKER_THREADS", &v)?);
        }
        Ok(())
    }

    /// Fixes the run's seed, drawing and logging one when none is configured,
    /// so every random stream of the run can be replayed.
    pub fn resolve_seed(&mut self) -> u64 {
        match self.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                info!("No seed configured; using {}", seed);
                self.seed = Some(seed);
                seed
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let k = self.portfolio_size;
        if k < 1 {
            return Err(config_error("portfolio_size must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.min_pos) || !(0.0..=1.0).contains(&self.max_pos) {
            return Err(config_error(format!(
                "position bounds must lie in [0, 1], got [{}, {}]",
                self.min_pos, self.max_pos
            )));
        }
        if self.max_pos < self.min_pos {
            return Err(config_error(format!(
                "max_pos {} is below min_pos {}",
                self.max_pos, self.min_pos
            )));
        }
        if (k as f64) * self.max_pos < 1.0 - 1e-9 || (k as f64) * self.min_pos > 1.0 + 1e-9 {
            return Err(config_error(format!(
                "bounds [{}, {}] cannot sum to 1 across {} assets",
                self.min_pos, self.max_pos, k
            )));
        }
        if !(self.trade_cost >= 0.0) {
            return Err(config_error("trade_cost must be >= 0"));
        }
        if !(self.starting_cash > 0.0) {
            return Err(config_error("starting_cash must be > 0"));
        }
        if !(self.rebalance_high > 1.0 && self.rebalance_low < 1.0 && self.rebalance_low > 0.0) {
            return Err(config_error(format!(
                "rebalance band must satisfy high > 1.0 > low > 0, got high={} low={}",
                self.rebalance_high, self.rebalance_low
            )));
        }
        if self.monte_carlo_iterations < 1 {
            return Err(config_error("monte_carlo_iterations must be >= 1"));
        }
        if self.random_walk_horizon < 1 {
            return Err(config_error("random_walk_horizon must be >= 1"));
        }
        if !(0.0..1.0).contains(&self.min_retained_weight) {
            return Err(config_error("min_retained_weight must lie in [0, 1)"));
        }
        if self.max_combinations == Some(0) {
            return Err(config_error("max_combinations must be >= 1 when set"));
        }
        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> AdvisorError {
    AdvisorError::Configuration(msg.into())
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    trimmed
        .parse::<T>()
        .map_err(|_| config_error(format!("{}{}: cannot parse '{}'", ENV_PREFIX, key, trimmed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AdvisorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.random_walk_horizon, 2520);
        assert_eq!(cfg.rebalance_high, 1.1);
        assert_eq!(cfg.rebalance_low, 0.9);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let cfg = AdvisorConfig {
            max_pos: 0.2,
            min_pos: 0.3,
            ..AdvisorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(AdvisorError::Configuration(_))));

        // Five assets capped at 15% cannot be fully invested.
        let cfg = AdvisorConfig {
            max_pos: 0.15,
            ..AdvisorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(AdvisorError::Configuration(_))));
    }

    #[test]
    fn test_invalid_band_rejected() {
        let cfg = AdvisorConfig {
            rebalance_high: 1.0,
            ..AdvisorConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = AdvisorConfig {
            rebalance_low: 0.0,
            ..AdvisorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_negative_trade_cost_and_cash_rejected() {
        let cfg = AdvisorConfig {
            trade_cost: -1.0,
            ..AdvisorConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = AdvisorConfig {
            starting_cash: 0.0,
            ..AdvisorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("PORTFOLIO_SIZE", "3"),
            ("MAX_POS", "0.5"),
            ("FRACTIONAL_UNITS", "false"),
            ("SEED", "42"),
        ]
        .into_iter()
        .collect();

        let mut cfg = AdvisorConfig::default();
        cfg.apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(cfg.portfolio_size, 3);
        assert_eq!(cfg.max_pos, 0.5);
        assert!(!cfg.fractional_units);
        assert_eq!(cfg.seed, Some(42));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_unparseable_override_is_configuration_error() {
        let mut cfg = AdvisorConfig::default();
        let result = cfg.apply_overrides(|key| {
            (key == "TRADE_COST").then(|| "five".to_string())
        });
        assert!(matches!(result, Err(AdvisorError::Configuration(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: AdvisorConfig =
            serde_json::from_str(r#"{"portfolio_size": 2, "max_pos": 0.7}"#).unwrap();
        assert_eq!(cfg.portfolio_size, 2);
        assert_eq!(cfg.max_pos, 0.7);
        assert_eq!(cfg.starting_cash, 20_000.0);
    }

    #[test]
    fn test_resolve_seed_is_sticky() {
        let mut cfg = AdvisorConfig::default();
        let seed = cfg.resolve_seed();
        assert_eq!(cfg.seed, Some(seed));
        assert_eq!(cfg.resolve_seed(), seed);

        let mut fixed = AdvisorConfig {
            seed: Some(42),
            ..AdvisorConfig::default()
        };
        assert_eq!(fixed.resolve_seed(), 42);
    }
}
