use crate::combinations::AssetCombination;
use crate::config::TRADING_DAYS;
use crate::data::PricePanel;
use crate::error::{AdvisorError, Result};
use serde::{Deserialize, Serialize};

/// Annualized return/covariance inputs for one asset combination.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReturnCovPackage {
    pub combination: AssetCombination,
    pub tickers: Vec<String>,
    /// Annualized mean daily log return per asset.
    pub mean_returns: Vec<f64>,
    /// Annualized sample covariance of daily log returns.
    pub covariance: Vec<Vec<f64>>,
}

/// Daily log returns for the whole universe, computed once and sliced per
/// combination.
pub struct StatisticsEngine<'a> {
    panel: &'a PricePanel,
    log_returns: Vec<Vec<f64>>,
    daily_means: Vec<f64>,
}

impl<'a> StatisticsEngine<'a> {
    pub fn new(panel: &'a PricePanel) -> Result<Self> {
        let mut log_returns = Vec::with_capacity(panel.len());
        let mut daily_means = Vec::with_capacity(panel.len());

        for asset in panel.assets() {
            let returns = asset.log_returns();
            if returns.iter().any(|r| !r.is_finite()) {
                return Err(AdvisorError::Data(format!(
                    "{}: non-finite log return",
                    asset.ticker
                )));
            }
            let mean = returns.iter().sum::<f64>() / returns.len() as f64;
            log_returns.push(returns);
            daily_means.push(mean);
        }

        Ok(Self {
            panel,
            log_returns,
            daily_means,
        })
    }

    /// Annualized mean and covariance for the assets of `combination`.
    pub fn package(&self, combination: &AssetCombination) -> Result<ReturnCovPackage> {
        let idx = combination.indices();
        if let Some(&bad) = idx.iter().find(|&&i| i >= self.log_returns.len()) {
            return Err(AdvisorError::Data(format!(
                "asset index {} outside universe of {}",
                bad,
                self.log_returns.len()
            )));
        }

        let mean_returns: Vec<f64> = idx
            .iter()
            .map(|&i| self.daily_means[i] * TRADING_DAYS)
            .collect();

        let n = idx.len();
        let mut covariance = vec![vec![0.0; n]; n];
        for a in 0..n {
            for b in a..n {
                let c = sample_covariance(
                    &self.log_returns[idx[a]],
                    self.daily_means[idx[a]],
                    &self.log_returns[idx[b]],
                    self.daily_means[idx[b]],
                ) * TRADING_DAYS;
                covariance[a][b] = c;
                covariance[b][a] = c;
            }
        }

        if mean_returns.iter().any(|m| m.is_nan())
            || covariance.iter().flatten().any(|c| c.is_nan())
        {
            return Err(AdvisorError::Data(format!(
                "NaN in derived statistics for {:?}",
                idx
            )));
        }

        Ok(ReturnCovPackage {
            combination: combination.clone(),
            tickers: idx
                .iter()
                .map(|&i| self.panel.ticker(i).to_string())
                .collect(),
            mean_returns,
            covariance,
        })
    }
}

/// Mean and sample standard deviation; the deviation is 0 below two values.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

fn sample_covariance(x: &[f64], mean_x: f64, y: &[f64], mean_y: f64) -> f64 {
    let n = x.len();
    if n < 2 {
        return f64::NAN;
    }
    let sum: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(a, b)| (a - mean_x) * (b - mean_y))
        .sum();
    sum / (n as f64 - 1.0)
}
