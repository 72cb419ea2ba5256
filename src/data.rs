use crate::error::{AdvisorError, Result};
use crate::statistics::mean_std;
use chrono::{Duration, NaiveDate};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// One column of a raw price table. `None` marks a missing observation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawSeries {
    pub ticker: String,
    pub prices: Vec<Option<f64>>,
}

/// Price table as handed over by a market-data collaborator.
///
/// Rows are dates, columns are tickers. Columns may contain gaps; call
/// [`PriceTable::clean`] to obtain a gap-free [`PricePanel`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceTable {
    pub dates: Vec<NaiveDate>,
    pub series: Vec<RawSeries>,
}

/// Ticker plus its chronological, gap-free price sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetSeries {
    pub ticker: String,
    pub prices: Vec<f64>,
}

/// Aligned, gap-free price panel. Every series has one price per date.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PricePanel {
    dates: Vec<NaiveDate>,
    assets: Vec<AssetSeries>,
}

impl PriceTable {
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let table: PriceTable = serde_json::from_str(&raw)?;
        info!(
            "Loaded price table from {} ({} dates, {} assets)",
            path.display(),
            table.dates.len(),
            table.series.len()
        );
        Ok(table)
    }

    /// Drops every date on which any asset is missing a price and validates
    /// what remains.
    pub fn clean(&self) -> Result<PricePanel> {
        if self.series.is_empty() {
            return Err(AdvisorError::Data("price table has no assets".to_string()));
        }
        for column in &self.series {
            if column.prices.len() != self.dates.len() {
                return Err(AdvisorError::Data(format!(
                    "{}: {} prices for {} dates",
                    column.ticker,
                    column.prices.len(),
                    self.dates.len()
                )));
            }
        }

        let complete_rows: Vec<usize> = (0..self.dates.len())
            .filter(|&row| {
                self.series
                    .iter()
                    .all(|column| column.prices[row].is_some_and(|p| !p.is_nan()))
            })
            .collect();

        let dropped = self.dates.len() - complete_rows.len();
        if dropped > 0 {
            debug!("Dropped {} incomplete rows from price table", dropped);
        }

        let dates = complete_rows.iter().map(|&row| self.dates[row]).collect();
        let assets = self
            .series
            .iter()
            .map(|column| AssetSeries {
                ticker: column.ticker.clone(),
                prices: complete_rows
                    .iter()
                    .filter_map(|&row| column.prices[row])
                    .collect(),
            })
            .collect();

        PricePanel::new(dates, assets)
    }
}

impl PricePanel {
    pub fn new(dates: Vec<NaiveDate>, assets: Vec<AssetSeries>) -> Result<Self> {
        if assets.is_empty() {
            return Err(AdvisorError::Data("price panel has no assets".to_string()));
        }
        if dates.len() < 2 {
            return Err(AdvisorError::Data(format!(
                "need at least 2 aligned prices, got {}",
                dates.len()
            )));
        }
        for asset in &assets {
            if asset.prices.len() != dates.len() {
                return Err(AdvisorError::Data(format!(
                    "{}: {} prices for {} dates",
                    asset.ticker,
                    asset.prices.len(),
                    dates.len()
                )));
            }
            if let Some(bad) = asset.prices.iter().find(|p| !p.is_finite() || **p <= 0.0) {
                return Err(AdvisorError::Data(format!(
                    "{}: invalid price {}",
                    asset.ticker, bad
                )));
            }
        }
        Ok(Self { dates, assets })
    }

    /// Mock panel of geometric random walks, one per ticker.
    pub fn synthetic<R: Rng + ?Sized>(tickers: &[&str], days: usize, rng: &mut R) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(2015, 1, 2)
            .ok_or_else(|| AdvisorError::Data("invalid synthetic start date".to_string()))?;
        let dates = (0..days).map(|d| start + Duration::days(d as i64)).collect();

        let mut assets = Vec::with_capacity(tickers.len());
        for (i, ticker) in tickers.iter().enumerate() {
            let drift = 0.0002 + 0.0001 * i as f64;
            let volatility = 0.008 + 0.002 * (i % 5) as f64;
            let shocks = Normal::new(drift, volatility)
                .map_err(|e| AdvisorError::Data(format!("{}: {}", ticker, e)))?;

            let mut price = 50.0 + 25.0 * i as f64;
            let mut prices = Vec::with_capacity(days);
            for _ in 0..days {
                prices.push(price);
                price *= shocks.sample(rng).exp();
            }
            assets.push(AssetSeries {
                ticker: ticker.to_string(),
                prices,
            });
        }

        Self::new(dates, assets)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn assets(&self) -> &[AssetSeries] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn ticker(&self, index: usize) -> &str {
        &self.assets[index].ticker
    }
}

impl AssetSeries {
    pub fn last_price(&self) -> f64 {
        self.prices.last().copied().unwrap_or(f64::NAN)
    }

    pub fn log_returns(&self) -> Vec<f64> {
        self.prices
            .windows(2)
            .map(|w| (w[1] / w[0]).ln())
            .collect()
    }

    /// Daily log-return mean and sample standard deviation.
    pub fn stats(&self) -> (f64, f64) {
        mean_std(&self.log_returns())
    }
}

/// Strips a provider suffix from a column label: `"SPY_Adj_Close"` -> `"SPY"`.
pub fn display_ticker(label: &str) -> &str {
    label.split('_').next().unwrap_or(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_clean_drops_incomplete_rows() {
        let table = PriceTable {
            dates: vec![day(1), day(2), day(3), day(4)],
            series: vec![
                RawSeries {
                    ticker: "AAA".to_string(),
                    prices: vec![Some(10.0), None, Some(11.0), Some(12.0)],
                },
                RawSeries {
                    ticker: "BBB".to_string(),
                    prices: vec![Some(20.0), Some(21.0), Some(22.0), None],
                },
            ],
        };

        let panel = table.clean().unwrap();
        assert_eq!(panel.dates(), &[day(1), day(3)]);
        assert_eq!(panel.assets()[0].prices, vec![10.0, 11.0]);
        assert_eq!(panel.assets()[1].prices, vec![20.0, 22.0]);
    }

    #[test]
    fn test_clean_rejects_too_short_panel() {
        let table = PriceTable {
            dates: vec![day(1), day(2)],
            series: vec![RawSeries {
                ticker: "AAA".to_string(),
                prices: vec![Some(10.0), None],
            }],
        };
        assert!(matches!(table.clean(), Err(AdvisorError::Data(_))));
    }

    #[test]
    fn test_non_positive_price_is_data_error() {
        let result = PricePanel::new(
            vec![day(1), day(2)],
            vec![AssetSeries {
                ticker: "AAA".to_string(),
                prices: vec![10.0, 0.0],
            }],
        );
        assert!(matches!(result, Err(AdvisorError::Data(_))));
    }

    #[test]
    fn test_log_returns_and_stats() {
        let series = AssetSeries {
            ticker: "AAA".to_string(),
            prices: vec![100.0, 110.0, 99.0],
        };
        let returns = series.log_returns();
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - (1.1f64).ln()).abs() < 1e-12);
        assert!((returns[1] - (0.9f64).ln()).abs() < 1e-12);

        let (mean, std) = series.stats();
        let expected_mean = ((1.1f64).ln() + (0.9f64).ln()) / 2.0;
        assert!((mean - expected_mean).abs() < 1e-12);
        assert!(std > 0.0);
    }

    #[test]
    fn test_synthetic_panel_is_reproducible() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        let p1 = PricePanel::synthetic(&["AAA", "BBB"], 50, &mut a).unwrap();
        let p2 = PricePanel::synthetic(&["AAA", "BBB"], 50, &mut b).unwrap();
        assert_eq!(p1.assets(), p2.assets());
        assert_eq!(p1.dates().len(), 50);
    }

    #[test]
    fn test_display_ticker() {
        assert_eq!(display_ticker("SPY_Adj_Close"), "SPY");
        assert_eq!(display_ticker("GLD"), "GLD");
    }
}
