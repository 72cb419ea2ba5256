use crate::data::PricePanel;
use crate::error::{AdvisorError, Result};
use crate::optimizer::{OptimizationResult, round_to};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Whether holdings may be fractional or must be whole units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitMode {
    Whole,
    Fractional,
}

impl UnitMode {
    pub fn from_fractional(fractional: bool) -> Self {
        if fractional {
            UnitMode::Fractional
        } else {
            UnitMode::Whole
        }
    }

    /// Units purchasable with `amount` at `price`.
    pub fn units(&self, amount: f64, price: f64) -> f64 {
        match self {
            UnitMode::Whole => (amount / price).floor(),
            UnitMode::Fractional => amount / price,
        }
    }
}

/// Starting point for one retained asset: last observed price, historical
/// daily log-return mean and volatility, and its target weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetProfile {
    pub ticker: String,
    pub last_price: f64,
    /// Daily log-return mean, rounded to 5 decimals.
    pub daily_mean: f64,
    /// Daily log-return sample standard deviation, rounded to 5 decimals.
    pub daily_vol: f64,
    pub target_weight: f64,
}

/// Profiles for every asset of `chosen` whose weight reaches `min_weight`.
///
/// Retained weights are carried over as-is; they are not rescaled to sum
/// to 1 after the drop.
pub fn asset_profiles(
    panel: &PricePanel,
    chosen: &OptimizationResult,
    min_weight: f64,
) -> Result<Vec<AssetProfile>> {
    let mut profiles = Vec::new();
    for (&index, &weight) in chosen.combination.indices().iter().zip(chosen.weights.iter()) {
        let series = panel.assets().get(index).ok_or_else(|| {
            AdvisorError::Data(format!("asset index {} outside price panel", index))
        })?;
        if weight < min_weight {
            debug!("Dropping {} (weight {:.4})", series.ticker, weight);
            continue;
        }
        let (mean, vol) = series.stats();
        profiles.push(AssetProfile {
            ticker: series.ticker.clone(),
            last_price: series.last_price(),
            daily_mean: round_to(mean, 5),
            daily_vol: round_to(vol, 5),
            target_weight: weight,
        });
    }

    if profiles.is_empty() {
        return Err(AdvisorError::Data(format!(
            "no asset of {:?} reaches the minimum weight {}",
            chosen.tickers, min_weight
        )));
    }
    Ok(profiles)
}

/// Initialized discrete portfolio: the common starting state of every trial.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Portfolio {
    pub assets: Vec<AssetProfile>,
    pub holdings: Vec<f64>,
    pub cash: f64,
    pub starting_cash: f64,
    pub trade_cost: f64,
    pub unit_mode: UnitMode,
}

impl Portfolio {
    /// Buys each asset's allocation (less one trade cost) at its last price.
    pub fn initialize(
        assets: Vec<AssetProfile>,
        starting_cash: f64,
        trade_cost: f64,
        unit_mode: UnitMode,
    ) -> Result<Self> {
        if assets.is_empty() {
            return Err(AdvisorError::Data("cannot initialize an empty portfolio".to_string()));
        }
        if let Some(bad) = assets.iter().find(|a| !(a.last_price > 0.0)) {
            return Err(AdvisorError::Data(format!(
                "{}: invalid starting price {}",
                bad.ticker, bad.last_price
            )));
        }

        let mut cash = starting_cash;
        let mut holdings = Vec::with_capacity(assets.len());
        for asset in &assets {
            let allocated_capital = round_to(asset.target_weight * starting_cash, 4);
            // An allocation below the trade cost yields a short position.
            let units = unit_mode.units(allocated_capital - trade_cost, asset.last_price);
            cash = round_to(cash - units * asset.last_price, 4);
            holdings.push(round_to(units, 4));
        }

        info!("Cash balance after portfolio initialization: {:.4}", cash);
        Ok(Self {
            assets,
            holdings,
            cash,
            starting_cash,
            trade_cost,
            unit_mode,
        })
    }

    pub fn tickers(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.ticker.clone()).collect()
    }

    pub fn target_weights(&self) -> Vec<f64> {
        self.assets.iter().map(|a| a.target_weight).collect()
    }

    pub fn starting_prices(&self) -> Vec<f64> {
        self.assets.iter().map(|a| a.last_price).collect()
    }

    pub fn value_at(&self, prices: &[f64]) -> f64 {
        self.holdings
            .iter()
            .zip(prices.iter())
            .map(|(h, p)| h * p)
            .sum::<f64>()
            + self.cash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinations::Combinations;
    use crate::data::AssetSeries;
    use crate::optimizer::{Objective, PortfolioStats};
    use chrono::NaiveDate;

    fn profile(ticker: &str, price: f64, weight: f64) -> AssetProfile {
        AssetProfile {
            ticker: ticker.to_string(),
            last_price: price,
            daily_mean: 0.0003,
            daily_vol: 0.01,
            target_weight: weight,
        }
    }

    #[test]
    fn test_whole_unit_initialization() {
        let portfolio = Portfolio::initialize(
            vec![profile("AAA", 100.0, 0.6), profile("BBB", 50.0, 0.4)],
            1000.0,
            5.0,
            UnitMode::Whole,
        )
        .unwrap();
        assert_eq!(portfolio.holdings, vec![5.0, 7.0]);
        assert!((portfolio.cash - 150.0).abs() < 1e-9);
        assert!((portfolio.value_at(&[100.0, 50.0]) - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_fractional_initialization() {
        let portfolio = Portfolio::initialize(
            vec![profile("AAA", 100.0, 0.6), profile("BBB", 50.0, 0.4)],
            1000.0,
            5.0,
            UnitMode::Fractional,
        )
        .unwrap();
        assert!((portfolio.holdings[0] - 5.95).abs() < 1e-9);
        assert!((portfolio.holdings[1] - 7.9).abs() < 1e-9);
        // Only the two trade costs stay in cash.
        assert!((portfolio.cash - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_allocation_below_trade_cost_goes_short() {
        let portfolio = Portfolio::initialize(
            vec![profile("AAA", 100.0, 0.998), profile("BBB", 100.0, 0.002)],
            1000.0,
            5.0,
            UnitMode::Fractional,
        )
        .unwrap();
        // (2 - 5) / 100 units, and the short sale credits cash.
        assert!((portfolio.holdings[0] - 9.93).abs() < 1e-9);
        assert!((portfolio.holdings[1] + 0.03).abs() < 1e-9);
        assert!((portfolio.cash - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_asset_profiles_drop_small_weights_without_renormalizing() {
        let dates = (1..=4)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let panel = PricePanel::new(
            dates,
            vec![
                AssetSeries {
                    ticker: "AAA".to_string(),
                    prices: vec![10.0, 10.5, 10.2, 10.8],
                },
                AssetSeries {
                    ticker: "BBB".to_string(),
                    prices: vec![20.0, 19.5, 19.9, 20.4],
                },
                AssetSeries {
                    ticker: "CCC".to_string(),
                    prices: vec![30.0, 30.3, 30.9, 31.0],
                },
            ],
        )
        .unwrap();
        let chosen = OptimizationResult {
            combination: Combinations::new(3, 3).unwrap().next().unwrap(),
            tickers: vec!["AAA".into(), "BBB".into(), "CCC".into()],
            objective: Objective::MaxSharpe,
            weights: vec![0.6, 0.0004, 0.3996],
            stats: PortfolioStats {
                expected_return: 0.1,
                volatility: 0.1,
                sharpe: 1.0,
            },
            converged: true,
            iterations: 10,
        };

        let profiles = asset_profiles(&panel, &chosen, 0.001).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].ticker, "AAA");
        assert_eq!(profiles[1].ticker, "CCC");
        assert_eq!(profiles[0].target_weight, 0.6);
        assert_eq!(profiles[1].target_weight, 0.3996);
        assert_eq!(profiles[1].last_price, 31.0);

        let (mean, vol) = panel.assets()[0].stats();
        assert_eq!(profiles[0].daily_mean, round_to(mean, 5));
        assert_eq!(profiles[0].daily_vol, round_to(vol, 5));
    }

    #[test]
    fn test_empty_portfolio_is_data_error() {
        let result = Portfolio::initialize(Vec::new(), 1000.0, 5.0, UnitMode::Whole);
        assert!(matches!(result, Err(AdvisorError::Data(_))));
    }
}
