use crate::config::AdvisorConfig;
use crate::data::display_ticker;
use crate::error::Result;
use crate::monte_carlo::{MonteCarloResult, MonteCarloSummary};
use crate::optimizer::{Objective, OptimizationResult, PortfolioStats};
use crate::portfolio::Portfolio;
use crate::ranking::RankedPortfolios;
use crate::rebalancer::{CashSummary, SimulationRecord, WeightMetrics};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

const RULE_TOP: &str = "╔════════════════════════════════════════════════════════════╗";
const RULE_MID: &str = "╠════════════════════════════════════════════════════════════╣";
const RULE_END: &str = "╚════════════════════════════════════════════════════════════╝";

// ──────────────────────────────────────────────────────────────────────────────
// Text report
// ──────────────────────────────────────────────────────────────────────────────

/// Box of the best portfolio for every objective, weights as percentages.
pub fn format_best_portfolios(ranked: &RankedPortfolios) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE_TOP);
    let _ = writeln!(out, "║ {:<58} ║", "Optimal Portfolios");
    for objective in Objective::ALL {
        let _ = writeln!(out, "{}", RULE_MID);
        let Some(best) = ranked.best(objective) else {
            let _ = writeln!(out, "║ {:<58} ║", format!("{}: nothing analysed", objective.label()));
            continue;
        };
        let _ = writeln!(out, "║ {:<58} ║", objective.label());
        write_stats(&mut out, &best.stats);
        let _ = writeln!(out, "║ {:<58} ║", "  Symbol      Weight");
        for (ticker, weight) in best.allocation() {
            let _ = writeln!(
                out,
                "║ {:<58} ║",
                format!("  {:<10} {:>7.2}%", display_ticker(&ticker), weight * 100.0)
            );
        }
        if !best.converged {
            let _ = writeln!(out, "║ {:<58} ║", "  (solver stopped before convergence)");
        }
    }
    let _ = writeln!(out, "{}", RULE_END);
    out
}

fn write_stats(out: &mut String, stats: &PortfolioStats) {
    let _ = writeln!(
        out,
        "║ {:<58} ║",
        format!("  Expected Annual Return : {:>+8.2}%", stats.expected_return * 100.0)
    );
    let _ = writeln!(
        out,
        "║ {:<58} ║",
        format!("  Annual Volatility      : {:>8.2}%", stats.volatility * 100.0)
    );
    let _ = writeln!(
        out,
        "║ {:<58} ║",
        format!("  Sharpe Ratio           : {:>8.2}", stats.sharpe)
    );
}

/// Starting holdings of the initialized portfolio.
pub fn format_portfolio(portfolio: &Portfolio) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE_TOP);
    let _ = writeln!(out, "║ {:<58} ║", "Initial Portfolio");
    let _ = writeln!(out, "{}", RULE_MID);
    let _ = writeln!(out, "║ {:<58} ║", "  Symbol    Target     Units        Price");
    for (asset, units) in portfolio.assets.iter().zip(portfolio.holdings.iter()) {
        let _ = writeln!(
            out,
            "║ {:<58} ║",
            format!(
                "  {:<8} {:>6.2}%  {:>9.4}  ${:>10.2}",
                display_ticker(&asset.ticker),
                asset.target_weight * 100.0,
                units,
                asset.last_price
            )
        );
    }
    let _ = writeln!(out, "{}", RULE_MID);
    let _ = writeln!(
        out,
        "║ {:<58} ║",
        format!("  Starting cash ${:.2}, remaining ${:.4}", portfolio.starting_cash, portfolio.cash)
    );
    let _ = writeln!(out, "{}", RULE_END);
    out
}

/// Statistics of a single trial.
pub fn format_simulation(record: &SimulationRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE_TOP);
    let _ = writeln!(out, "║ {:<58} ║", "Rebalancing Simulation");
    let _ = writeln!(out, "{}", RULE_MID);
    if let Some(value) = record.terminal_value() {
        let _ = writeln!(out, "║ {:<58} ║", format!("  Terminal value     : ${:.2}", value));
    }
    let _ = writeln!(
        out,
        "║ {:<58} ║",
        format!(
            "  Trades             : {} (cost ${:.2})",
            record.total_trades(),
            record.total_trade_cost()
        )
    );
    if let Some(CashSummary { max, min, mean }) = record.cash_summary() {
        let _ = writeln!(
            out,
            "║ {:<58} ║",
            format!("  Cash max/min/mean  : {:.2} / {:.2} / {:.2}", max, min, mean)
        );
    }
    let _ = writeln!(out, "{}", RULE_MID);
    let _ = writeln!(out, "║ {:<58} ║", "  Symbol   Target  Mean    Stdev   Max     Min");
    for WeightMetrics {
        ticker,
        target,
        stdev,
        max,
        min,
        mean,
    } in record.weight_metrics()
    {
        let _ = writeln!(
            out,
            "║ {:<58} ║",
            format!(
                "  {:<7} {:>6.4} {:>6.4} {:>6.4} {:>6.4} {:>6.4}",
                display_ticker(&ticker),
                target,
                mean,
                stdev,
                max,
                min
            )
        );
    }
    let _ = writeln!(out, "{}", RULE_END);
    out
}

pub fn format_monte_carlo(summary: &MonteCarloSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE_TOP);
    let _ = writeln!(out, "║ {:<58} ║", "Monte Carlo Summary");
    let _ = writeln!(out, "{}", RULE_MID);
    let _ = writeln!(
        out,
        "║ {:<58} ║",
        format!(
            "  {} trials over {:.1} years, band [{:.2}, {:.2}]",
            summary.trials, summary.horizon_years, summary.rebalance_low, summary.rebalance_high
        )
    );
    let _ = writeln!(
        out,
        "║ {:<58} ║",
        format!(
            "  Terminal value : {:>12.2} ± {:.2}",
            summary.terminal_value_mean, summary.terminal_value_std
        )
    );
    let _ = writeln!(
        out,
        "║ {:<58} ║",
        format!(
            "  Trades         : {:>12.2} ± {:.2}",
            summary.trade_count_mean, summary.trade_count_std
        )
    );
    let _ = writeln!(
        out,
        "║ {:<58} ║",
        format!(
            "  Trade costs    : {:>12.2} ± {:.2}",
            summary.trade_cost_mean, summary.trade_cost_std
        )
    );
    let _ = writeln!(out, "{}", RULE_END);
    out
}

// ──────────────────────────────────────────────────────────────────────────────
// JSON export
// ──────────────────────────────────────────────────────────────────────────────

/// Everything a run produced, as written by `--output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorReport {
    pub config: AdvisorConfig,
    pub best: Vec<OptimizationResult>,
    pub ranked: RankedPortfolios,
    pub portfolio: Portfolio,
    pub monte_carlo_seed: u64,
    pub monte_carlo: MonteCarloSummary,
    /// Per-trial terminal values.
    pub terminal_values: Vec<f64>,
    /// Feasible-set scatter of the chosen combination.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub random_portfolios: Vec<PortfolioStats>,
}

impl AdvisorReport {
    pub fn new(
        config: &AdvisorConfig,
        ranked: &RankedPortfolios,
        portfolio: &Portfolio,
        monte_carlo: &MonteCarloResult,
    ) -> Self {
        Self {
            config: config.clone(),
            best: Objective::ALL
                .iter()
                .filter_map(|o| ranked.best(*o).cloned())
                .collect(),
            ranked: ranked.clone(),
            portfolio: portfolio.clone(),
            monte_carlo_seed: monte_carlo.seed,
            monte_carlo: monte_carlo.summary.clone(),
            terminal_values: monte_carlo.terminal_values(),
            random_portfolios: Vec::new(),
        }
    }

    pub fn with_random_portfolios(mut self, cloud: Vec<PortfolioStats>) -> Self {
        self.random_portfolios = cloud;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        info!("Saved report to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinations::Combinations;
    use crate::monte_carlo::{MonteCarloConfig, run_monte_carlo};
    use crate::optimizer::OptimizationSet;
    use crate::portfolio::{AssetProfile, UnitMode};
    use crate::rebalancer::RebalancePolicy;

    fn result(objective: Objective, weights: Vec<f64>, sharpe: f64) -> OptimizationResult {
        OptimizationResult {
            combination: Combinations::new(2, 2).unwrap().next().unwrap(),
            tickers: vec!["VTI".into(), "BND".into()],
            objective,
            weights,
            stats: PortfolioStats {
                expected_return: 0.08,
                volatility: 0.12,
                sharpe,
            },
            converged: true,
            iterations: 12,
        }
    }

    fn ranked() -> RankedPortfolios {
        RankedPortfolios::from_set(&OptimizationSet {
            sharpe: vec![result(Objective::MaxSharpe, vec![0.6, 0.4], 0.67)],
            max_return: vec![result(Objective::MaxReturn, vec![1.0, 0.0], 0.5)],
            min_volatility: vec![result(Objective::MinVolatility, vec![0.1, 0.9], 0.4)],
        })
    }

    fn portfolio() -> Portfolio {
        Portfolio::initialize(
            vec![
                AssetProfile {
                    ticker: "VTI".into(),
                    last_price: 200.0,
                    daily_mean: 0.0003,
                    daily_vol: 0.01,
                    target_weight: 0.6,
                },
                AssetProfile {
                    ticker: "BND".into(),
                    last_price: 75.0,
                    daily_mean: 0.0001,
                    daily_vol: 0.003,
                    target_weight: 0.4,
                },
            ],
            10_000.0,
            5.0,
            UnitMode::Whole,
        )
        .unwrap()
    }

    #[test]
    fn test_best_portfolio_box_lists_weights_as_percentages() {
        let text = format_best_portfolios(&ranked());
        assert!(text.contains("Sharpe Ratio"));
        assert!(text.contains("Minimal Volatility"));
        assert!(text.contains("60.00%"));
        assert!(text.contains("90.00%"));
        assert!(text.starts_with(RULE_TOP));
        assert!(text.trim_end().ends_with(RULE_END));
    }

    #[test]
    fn test_rows_share_box_width() {
        let text = format_best_portfolios(&ranked());
        let width = RULE_TOP.chars().count();
        for line in text.lines() {
            assert_eq!(line.chars().count(), width, "misaligned row: {}", line);
        }
    }

    #[test]
    fn test_report_json_export() {
        let p = portfolio();
        let policy = RebalancePolicy {
            high: 1.1,
            low: 0.9,
            trade_cost: 5.0,
            unit_mode: UnitMode::Whole,
        };
        let mc = run_monte_carlo(
            &p,
            &policy,
            &MonteCarloConfig::default().with_trials(2).with_horizon(30).with_seed(5),
        )
        .unwrap();

        let report = AdvisorReport::new(&AdvisorConfig::default(), &ranked(), &p, &mc);
        assert_eq!(report.best.len(), 3);
        assert_eq!(report.terminal_values.len(), 2);

        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["monte_carlo_seed"], 5);
        assert_eq!(value["monte_carlo"]["trials"], 2);
        assert_eq!(value["best"][0]["objective"], "MaxSharpe");
        assert!(value.get("random_portfolios").is_none());

        let text = format_monte_carlo(&mc.summary);
        assert!(text.contains("2 trials"));
        let text = format_simulation(&mc.records[0]);
        assert!(text.contains("VTI"));
        assert!(format_portfolio(&p).contains("BND"));
    }
}
