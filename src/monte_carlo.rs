//! Monte Carlo driver for the rebalancing simulator.
//!
//! Every trial starts from the same initialized [`Portfolio`], draws its own
//! price paths and runs the rebalancing engine over them. Trials share no
//! mutable state, so they run on the rayon pool. Each trial gets its own
//! `StdRng` seeded from a master generator, which keeps results identical
//! for a given seed regardless of thread scheduling.

use crate::config::{AdvisorConfig, TRADING_DAYS};
use crate::error::{AdvisorError, Result};
use crate::portfolio::Portfolio;
use crate::rebalancer::{RebalancePolicy, SimulationRecord, run_trial};
use crate::simulation::simulate_paths;
use crate::statistics::mean_std;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Configuration for a Monte Carlo run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of independent trials.
    pub trials: usize,
    /// Simulated steps per trial.
    pub horizon: usize,
    /// Random seed for reproducibility (None picks one from the clock).
    pub seed: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            trials: 1,
            horizon: crate::config::RANDOM_WALK_HORIZON,
            seed: None,
        }
    }
}

impl MonteCarloConfig {
    pub fn from_config(config: &AdvisorConfig) -> Self {
        Self {
            trials: config.monte_carlo_iterations,
            horizon: config.random_walk_horizon,
            seed: config.seed,
        }
    }

    pub fn with_trials(mut self, n: usize) -> Self {
        self.trials = n;
        self
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(12345)
        })
    }
}

/// Aggregates across trials. Standard deviations are sample (n - 1) and 0
/// for a single trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub trials: usize,
    pub horizon_years: f64,
    pub rebalance_high: f64,
    pub rebalance_low: f64,
    pub terminal_value_mean: f64,
    pub terminal_value_std: f64,
    pub trade_count_mean: f64,
    pub trade_count_std: f64,
    pub trade_cost_mean: f64,
    pub trade_cost_std: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub seed: u64,
    pub records: Vec<SimulationRecord>,
    pub summary: MonteCarloSummary,
}

impl MonteCarloResult {
    pub fn terminal_values(&self) -> Vec<f64> {
        self.records
            .iter()
            .filter_map(SimulationRecord::terminal_value)
            .collect()
    }
}

/// Runs one simulated trial of `portfolio` under `policy` with `rng`.
pub fn simulate_once(
    portfolio: &Portfolio,
    policy: &RebalancePolicy,
    horizon: usize,
    rng: &mut StdRng,
) -> Result<SimulationRecord> {
    let path = simulate_paths(&portfolio.assets, horizon, rng)?;
    Ok(run_trial(portfolio, &path, policy))
}

pub fn run_monte_carlo(
    portfolio: &Portfolio,
    policy: &RebalancePolicy,
    config: &MonteCarloConfig,
) -> Result<MonteCarloResult> {
    if config.trials < 1 {
        return Err(AdvisorError::Configuration(
            "Monte Carlo needs at least one trial".to_string(),
        ));
    }
    if config.horizon < 1 {
        return Err(AdvisorError::Configuration(
            "Monte Carlo horizon must be at least one step".to_string(),
        ));
    }

    let start = Instant::now();
    let seed = config.resolve_seed();
    info!(
        "Running {} Monte Carlo trials over {} steps (seed {})",
        config.trials, config.horizon, seed
    );

    let mut master = StdRng::seed_from_u64(seed);
    let trial_seeds: Vec<u64> = (0..config.trials).map(|_| master.next_u64()).collect();

    let records: Vec<SimulationRecord> = trial_seeds
        .par_iter()
        .map(|&trial_seed| {
            let mut rng = StdRng::seed_from_u64(trial_seed);
            simulate_once(portfolio, policy, config.horizon, &mut rng)
        })
        .collect::<Result<Vec<_>>>()?;

    let summary = summarize(&records, policy, config.horizon);
    info!(
        "Monte Carlo finished in {:.2} seconds: mean terminal value {:.2}",
        start.elapsed().as_secs_f64(),
        summary.terminal_value_mean
    );

    Ok(MonteCarloResult {
        seed,
        records,
        summary,
    })
}

pub fn summarize(
    records: &[SimulationRecord],
    policy: &RebalancePolicy,
    horizon: usize,
) -> MonteCarloSummary {
    let terminal: Vec<f64> = records
        .iter()
        .filter_map(SimulationRecord::terminal_value)
        .collect();
    let trades: Vec<f64> = records.iter().map(|r| r.total_trades() as f64).collect();
    let costs: Vec<f64> = records.iter().map(SimulationRecord::total_trade_cost).collect();

    let (terminal_value_mean, terminal_value_std) = mean_std(&terminal);
    let (trade_count_mean, trade_count_std) = mean_std(&trades);
    let (trade_cost_mean, trade_cost_std) = mean_std(&costs);

    MonteCarloSummary {
        trials: records.len(),
        horizon_years: horizon as f64 / TRADING_DAYS,
        rebalance_high: policy.high,
        rebalance_low: policy.low,
        terminal_value_mean,
        terminal_value_std,
        trade_count_mean,
        trade_count_std,
        trade_cost_mean,
        trade_cost_std,
    }
}
