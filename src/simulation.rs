use crate::error::{AdvisorError, Result};
use crate::portfolio::AssetProfile;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Simulated price paths, one per asset, each `horizon + 1` long with the
/// last historical price at index 0.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationPath {
    pub prices: Vec<Vec<f64>>,
}

impl SimulationPath {
    pub fn horizon(&self) -> usize {
        self.prices.first().map_or(0, |p| p.len().saturating_sub(1))
    }

    /// Prices of every asset at step `t`.
    pub fn prices_at(&self, t: usize) -> Vec<f64> {
        self.prices.iter().map(|path| path[t]).collect()
    }
}

/// Draws one multiplicative random walk per asset:
/// `price[t] = price[t-1] * (1 + e_t)`, `e_t ~ N(daily_mean, daily_vol)`.
pub fn simulate_paths<R: Rng + ?Sized>(
    assets: &[AssetProfile],
    horizon: usize,
    rng: &mut R,
) -> Result<SimulationPath> {
    let mut prices = Vec::with_capacity(assets.len());
    for asset in assets {
        // Normal::new only rejects a non-finite deviation.
        if !asset.daily_mean.is_finite() || !asset.daily_vol.is_finite() || asset.daily_vol < 0.0 {
            return Err(AdvisorError::Data(format!(
                "{}: invalid return mean {} or vol {}",
                asset.ticker, asset.daily_mean, asset.daily_vol
            )));
        }
        let innovations = Normal::new(asset.daily_mean, asset.daily_vol).map_err(|e| {
            AdvisorError::Data(format!(
                "{}: cannot draw returns with mean {} and vol {} ({})",
                asset.ticker, asset.daily_mean, asset.daily_vol, e
            ))
        })?;

        let mut path = Vec::with_capacity(horizon + 1);
        path.push(asset.last_price);
        let mut price = asset.last_price;
        for _ in 0..horizon {
            price *= 1.0 + innovations.sample(rng);
            path.push(price);
        }
        prices.push(path);
    }
    Ok(SimulationPath { prices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn profile(ticker: &str, price: f64, mean: f64, vol: f64) -> AssetProfile {
        AssetProfile {
            ticker: ticker.to_string(),
            last_price: price,
            daily_mean: mean,
            daily_vol: vol,
            target_weight: 0.5,
        }
    }

    #[test]
    fn test_path_shape_and_start() {
        let assets = vec![profile("AAA", 100.0, 0.0003, 0.01), profile("BBB", 40.0, 0.0, 0.02)];
        let mut rng = StdRng::seed_from_u64(1);
        let path = simulate_paths(&assets, 2520, &mut rng).unwrap();
        assert_eq!(path.prices.len(), 2);
        assert_eq!(path.horizon(), 2520);
        assert_eq!(path.prices_at(0), vec![100.0, 40.0]);
    }

    #[test]
    fn test_zero_volatility_follows_multiplicative_recurrence() {
        let assets = vec![profile("AAA", 100.0, 0.01, 0.0)];
        let mut rng = StdRng::seed_from_u64(1);
        let path = simulate_paths(&assets, 3, &mut rng).unwrap();
        let expected = [100.0, 101.0, 102.01, 103.0301];
        for (got, want) in path.prices[0].iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_same_seed_same_paths() {
        let assets = vec![profile("AAA", 100.0, 0.0003, 0.01)];
        let a = simulate_paths(&assets, 100, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = simulate_paths(&assets, 100, &mut StdRng::seed_from_u64(9)).unwrap();
        let c = simulate_paths(&assets, 100, &mut StdRng::seed_from_u64(10)).unwrap();
        assert_eq!(a.prices, b.prices);
        assert_ne!(a.prices, c.prices);
    }

    #[test]
    fn test_invalid_volatility_is_data_error() {
        let assets = vec![profile("AAA", 100.0, 0.0, -0.5)];
        let result = simulate_paths(&assets, 10, &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(AdvisorError::Data(_))));

        for (mean, vol) in [(f64::NAN, 0.01), (0.0, f64::INFINITY), (0.0, f64::NAN)] {
            let assets = vec![profile("AAA", 100.0, mean, vol)];
            let result = simulate_paths(&assets, 10, &mut StdRng::seed_from_u64(1));
            assert!(matches!(result, Err(AdvisorError::Data(_))), "{} / {}", mean, vol);
        }
    }
}
