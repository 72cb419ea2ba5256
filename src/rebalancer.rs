use crate::config::AdvisorConfig;
use crate::portfolio::{Portfolio, UnitMode};
use crate::simulation::SimulationPath;
use crate::statistics::mean_std;
use serde::{Deserialize, Serialize};

/// Fixed-band rebalancing rule with a flat per-trade cost.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RebalancePolicy {
    pub high: f64,
    pub low: f64,
    pub trade_cost: f64,
    pub unit_mode: UnitMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl RebalancePolicy {
    pub fn from_config(config: &AdvisorConfig) -> Self {
        Self {
            high: config.rebalance_high,
            low: config.rebalance_low,
            trade_cost: config.trade_cost,
            unit_mode: UnitMode::from_fractional(config.fractional_units),
        }
    }

    /// Side to trade for a current/target weight ratio. Both band edges are
    /// strict: a ratio exactly on an edge holds.
    pub fn signal(&self, weight_ratio: f64) -> Option<TradeSide> {
        if weight_ratio > self.high {
            Some(TradeSide::Sell)
        } else if weight_ratio < self.low {
            Some(TradeSide::Buy)
        } else {
            None
        }
    }
}

/// Mutable per-trial state. Each trial owns its own copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub holdings: Vec<f64>,
    pub cash: f64,
    pub step: usize,
}

impl SimulationState {
    pub fn from_portfolio(portfolio: &Portfolio) -> Self {
        Self {
            holdings: portfolio.holdings.clone(),
            cash: portfolio.cash,
            step: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub step: usize,
    pub asset: usize,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    /// Signed change of the cash balance caused by the trade.
    pub cash_delta: f64,
}

/// What one step observed before trading and which trades it executed.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    pub portfolio_value: f64,
    pub weights: Vec<f64>,
    pub weight_ratios: Vec<f64>,
    pub target_values: Vec<f64>,
    pub trades: Vec<TradeRecord>,
}

impl StepOutcome {
    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }
}

/// Values the portfolio at `prices` and rebalances every asset that left
/// its band. Assets are handled independently in index order, so a sale
/// earlier in the pass funds a purchase later in the same step.
pub fn rebalance_step(
    state: &mut SimulationState,
    prices: &[f64],
    target_weights: &[f64],
    policy: &RebalancePolicy,
) -> StepOutcome {
    state.step += 1;
    let n = target_weights.len();

    let portfolio_value: f64 = state
        .holdings
        .iter()
        .zip(prices)
        .map(|(h, p)| h * p)
        .sum::<f64>()
        + state.cash;

    if !(portfolio_value > 0.0) {
        return StepOutcome {
            portfolio_value,
            weights: vec![0.0; n],
            weight_ratios: vec![0.0; n],
            target_values: vec![0.0; n],
            trades: Vec::new(),
        };
    }

    let weights: Vec<f64> = state
        .holdings
        .iter()
        .zip(prices)
        .map(|(h, p)| h * p / portfolio_value)
        .collect();
    let weight_ratios: Vec<f64> = weights
        .iter()
        .zip(target_weights)
        .map(|(w, t)| w / t)
        .collect();
    let target_values: Vec<f64> = target_weights.iter().map(|t| t * portfolio_value).collect();

    let cost = policy.trade_cost;
    let mut trades = Vec::new();

    for i in 0..n {
        let price = prices[i];
        let position_value = state.holdings[i] * price;

        match policy.signal(weight_ratios[i]) {
            Some(TradeSide::Sell) => {
                let target_sell = position_value - target_values[i];
                let units = policy.unit_mode.units(target_sell - cost, price);
                let cash_delta = match policy.unit_mode {
                    // The floor already absorbed the trade cost.
                    UnitMode::Whole if units >= 1.0 => units * price,
                    UnitMode::Whole => continue,
                    // Sizes below the cost go negative and still trade.
                    UnitMode::Fractional => units * price - cost,
                };
                state.holdings[i] -= units;
                state.cash += cash_delta;
                trades.push(TradeRecord {
                    step: state.step,
                    asset: i,
                    side: TradeSide::Sell,
                    quantity: units,
                    price,
                    cash_delta,
                });
            }
            Some(TradeSide::Buy) => {
                let target_buy = target_values[i] - position_value;
                let units = policy.unit_mode.units(target_buy - cost, price);
                let spend = units * price;
                if state.cash < spend - (cost + 1.0) {
                    continue;
                }
                let cash_delta = -(spend + cost);
                state.holdings[i] += units;
                state.cash += cash_delta;
                trades.push(TradeRecord {
                    step: state.step,
                    asset: i,
                    side: TradeSide::Buy,
                    quantity: units,
                    price,
                    cash_delta,
                });
            }
            None => {}
        }
    }

    StepOutcome {
        portfolio_value,
        weights,
        weight_ratios,
        target_values,
        trades,
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Per-trial record
// ──────────────────────────────────────────────────────────────────────────────

/// Step-by-step history of one trial. Values and weights are observed
/// before the step's trades; holdings and cash after them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub tickers: Vec<String>,
    pub target_weights: Vec<f64>,
    pub trade_cost: f64,
    pub values: Vec<f64>,
    pub weights: Vec<Vec<f64>>,
    pub holdings: Vec<Vec<f64>>,
    pub cash: Vec<f64>,
    pub trade_counts: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CashSummary {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightMetrics {
    pub ticker: String,
    pub target: f64,
    pub stdev: f64,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
}

impl SimulationRecord {
    pub fn steps(&self) -> usize {
        self.values.len()
    }

    pub fn terminal_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn total_trades(&self) -> usize {
        self.trade_counts.iter().sum()
    }

    pub fn total_trade_cost(&self) -> f64 {
        self.total_trades() as f64 * self.trade_cost
    }

    pub fn cash_summary(&self) -> Option<CashSummary> {
        if self.cash.is_empty() {
            return None;
        }
        let (mean, _) = mean_std(&self.cash);
        Some(CashSummary {
            max: self.cash.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min: self.cash.iter().copied().fold(f64::INFINITY, f64::min),
            mean,
        })
    }

    pub fn weight_metrics(&self) -> Vec<WeightMetrics> {
        self.tickers
            .iter()
            .enumerate()
            .map(|(i, ticker)| {
                let trace: Vec<f64> = self.weights.iter().map(|w| w[i]).collect();
                let (mean, stdev) = mean_std(&trace);
                WeightMetrics {
                    ticker: ticker.clone(),
                    target: self.target_weights[i],
                    stdev,
                    max: trace.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    min: trace.iter().copied().fold(f64::INFINITY, f64::min),
                    mean,
                }
            })
            .collect()
    }
}

/// Runs the rebalancing engine over every step of `path`, starting from a
/// fresh copy of `portfolio`.
pub fn run_trial(
    portfolio: &Portfolio,
    path: &SimulationPath,
    policy: &RebalancePolicy,
) -> SimulationRecord {
    let targets = portfolio.target_weights();
    let horizon = path.horizon();
    let mut state = SimulationState::from_portfolio(portfolio);

    let mut record = SimulationRecord {
        tickers: portfolio.tickers(),
        target_weights: targets.clone(),
        trade_cost: policy.trade_cost,
        values: Vec::with_capacity(horizon),
        weights: Vec::with_capacity(horizon),
        holdings: Vec::with_capacity(horizon),
        cash: Vec::with_capacity(horizon),
        trade_counts: Vec::with_capacity(horizon),
    };

    for t in 1..=horizon {
        let prices = path.prices_at(t);
        let outcome = rebalance_step(&mut state, &prices, &targets, policy);
        record.values.push(outcome.portfolio_value);
        record.trade_counts.push(outcome.trade_count());
        record.weights.push(outcome.weights);
        record.holdings.push(state.holdings.clone());
        record.cash.push(state.cash);
    }

    record
}
