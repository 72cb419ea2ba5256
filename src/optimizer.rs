use crate::combinations::{AssetCombination, Combinations};
use crate::config::AdvisorConfig;
use crate::data::PricePanel;
use crate::error::{AdvisorError, Result};
use crate::statistics::{ReturnCovPackage, StatisticsEngine};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

// ──────────────────────────────────────────────────────────────────────────────
// Portfolio statistics
// ──────────────────────────────────────────────────────────────────────────────

/// Annualized return, volatility and Sharpe ratio (risk-free rate 0).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
}

pub fn portfolio_return(weights: &[f64], means: &[f64]) -> f64 {
    weights.iter().zip(means.iter()).map(|(w, r)| w * r).sum()
}

pub fn portfolio_variance(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    let n = weights.len();
    let mut var = 0.0;
    for i in 0..n {
        for j in 0..n {
            var += weights[i] * weights[j] * cov[i][j];
        }
    }
    var
}

pub fn portfolio_stats(weights: &[f64], means: &[f64], cov: &[Vec<f64>]) -> PortfolioStats {
    let expected_return = portfolio_return(weights, means);
    let volatility = portfolio_variance(weights, cov).max(0.0).sqrt();
    let sharpe = if volatility > 1e-12 {
        expected_return / volatility
    } else {
        0.0
    };
    PortfolioStats {
        expected_return,
        volatility,
        sharpe,
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Objectives and bounds
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Objective {
    MaxSharpe,
    MaxReturn,
    MinVolatility,
}

impl Objective {
    pub const ALL: [Objective; 3] = [
        Objective::MaxSharpe,
        Objective::MaxReturn,
        Objective::MinVolatility,
    ];

    /// Only the Sharpe objective honours the configured position bounds; the
    /// other two always run on [0, 1].
    pub fn bounds(&self, config: &AdvisorConfig) -> WeightBounds {
        match self {
            Objective::MaxSharpe => WeightBounds::new(config.min_pos, config.max_pos),
            Objective::MaxReturn | Objective::MinVolatility => WeightBounds::new(0.0, 1.0),
        }
    }

    /// Scalar value to minimize.
    pub fn evaluate(&self, weights: &[f64], package: &ReturnCovPackage) -> f64 {
        let stats = portfolio_stats(weights, &package.mean_returns, &package.covariance);
        match self {
            Objective::MaxSharpe => -stats.sharpe,
            Objective::MaxReturn => -stats.expected_return,
            Objective::MinVolatility => stats.volatility,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Objective::MaxSharpe => "Sharpe Ratio",
            Objective::MaxReturn => "Pure Return",
            Objective::MinVolatility => "Minimal Volatility",
        }
    }
}

/// Per-asset box bounds shared by every weight.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub lower: f64,
    pub upper: f64,
}

impl WeightBounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, w: f64, tolerance: f64) -> bool {
        w >= self.lower - tolerance && w <= self.upper + tolerance
    }

    fn check_feasible(&self, n: usize) -> Result<()> {
        let n = n as f64;
        if self.lower > self.upper || n * self.lower > 1.0 + 1e-9 || n * self.upper < 1.0 - 1e-9 {
            return Err(AdvisorError::Configuration(format!(
                "bounds [{}, {}] admit no fully invested portfolio of {} assets",
                self.lower, self.upper, n
            )));
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Solver: projected gradient with Armijo backtracking
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Relative objective change treated as converged.
    pub f_tolerance: f64,
    /// Largest per-weight move treated as stationary.
    pub x_tolerance: f64,
    /// Central-difference step for the numerical gradient.
    pub gradient_step: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            f_tolerance: 1e-12,
            x_tolerance: 1e-10,
            gradient_step: 1e-7,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Solution {
    pub weights: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

const ARMIJO_C: f64 = 1e-4;
const MAX_STEP: f64 = 1e4;
const MIN_STEP: f64 = 1e-16;

/// Minimizes `f` over `{w : lower <= w_i <= upper, sum(w) = 1}`.
///
/// Each iteration takes a gradient step, projects it back onto the feasible
/// set and backtracks until the Armijo condition holds.
pub fn minimize<F>(f: F, start: &[f64], bounds: WeightBounds, settings: &SolverSettings) -> Result<Solution>
where
    F: Fn(&[f64]) -> f64,
{
    bounds.check_feasible(start.len())?;

    let mut x = project_onto_capped_simplex(start, bounds);
    let mut fx = f(&x);
    let mut step: f64 = 1.0;

    for iteration in 1..=settings.max_iterations {
        let grad = numerical_gradient(&f, &x, settings.gradient_step);

        let mut trial = (step * 2.0).min(MAX_STEP);
        let (candidate, f_candidate) = loop {
            let shifted: Vec<f64> = x.iter().zip(&grad).map(|(xi, gi)| xi - trial * gi).collect();
            let candidate = project_onto_capped_simplex(&shifted, bounds);

            let max_move = candidate
                .iter()
                .zip(&x)
                .map(|(c, xi)| (c - xi).abs())
                .fold(0.0, f64::max);
            if max_move < settings.x_tolerance {
                return Ok(Solution {
                    weights: x,
                    value: fx,
                    iterations: iteration,
                    converged: true,
                });
            }

            let directional: f64 = candidate
                .iter()
                .zip(&x)
                .zip(&grad)
                .map(|((c, xi), gi)| gi * (c - xi))
                .sum();
            let fc = f(&candidate);
            if fc <= fx + ARMIJO_C * directional {
                break (candidate, fc);
            }

            trial *= 0.5;
            if trial < MIN_STEP {
                // No descent available at machine precision.
                return Ok(Solution {
                    weights: x,
                    value: fx,
                    iterations: iteration,
                    converged: true,
                });
            }
        };

        let improvement = fx - f_candidate;
        x = candidate;
        fx = f_candidate;
        step = trial;

        if improvement.abs() <= settings.f_tolerance * (1.0 + fx.abs()) {
            return Ok(Solution {
                weights: x,
                value: fx,
                iterations: iteration,
                converged: true,
            });
        }
    }

    Ok(Solution {
        weights: x,
        value: fx,
        iterations: settings.max_iterations,
        converged: false,
    })
}

fn numerical_gradient<F>(f: &F, x: &[f64], h: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut nudged = x.to_vec();
    (0..x.len())
        .map(|i| {
            nudged[i] = x[i] + h;
            let up = f(&nudged);
            nudged[i] = x[i] - h;
            let down = f(&nudged);
            nudged[i] = x[i];
            (up - down) / (2.0 * h)
        })
        .collect()
}

/// Euclidean projection onto the box-constrained simplex.
///
/// Finds the shift `tau` with `sum(clamp(v_i - tau, lower, upper)) = 1` by
/// bisection; the sum is monotone in `tau`.
pub fn project_onto_capped_simplex(v: &[f64], bounds: WeightBounds) -> Vec<f64> {
    let clamp_sum = |tau: f64| -> f64 {
        v.iter()
            .map(|vi| (vi - tau).clamp(bounds.lower, bounds.upper))
            .sum()
    };

    let v_min = v.iter().copied().fold(f64::INFINITY, f64::min);
    let v_max = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut lo = v_min - bounds.upper;
    let mut hi = v_max - bounds.lower;

    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if clamp_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-15 {
            break;
        }
    }

    let tau = 0.5 * (lo + hi);
    v.iter()
        .map(|vi| (vi - tau).clamp(bounds.lower, bounds.upper))
        .collect()
}

// ──────────────────────────────────────────────────────────────────────────────
// Per-combination optimization
// ──────────────────────────────────────────────────────────────────────────────

/// Optimal allocation of one combination under one objective.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub combination: AssetCombination,
    pub tickers: Vec<String>,
    pub objective: Objective,
    /// Rounded to 4 decimals.
    pub weights: Vec<f64>,
    /// Recomputed from the rounded weights.
    pub stats: PortfolioStats,
    pub converged: bool,
    pub iterations: usize,
}

impl OptimizationResult {
    pub fn allocation(&self) -> Vec<(String, f64)> {
        self.tickers
            .iter()
            .cloned()
            .zip(self.weights.iter().copied())
            .collect()
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Solves `objective` for one package from the equal-weight start.
/// Non-convergence is logged and flagged, never retried.
pub fn optimize_package(
    package: &ReturnCovPackage,
    objective: Objective,
    bounds: WeightBounds,
    settings: &SolverSettings,
) -> Result<OptimizationResult> {
    let k = package.mean_returns.len();
    let start = vec![1.0 / k as f64; k];

    let solution = minimize(|w| objective.evaluate(w, package), &start, bounds, settings)?;
    if !solution.converged {
        warn!(
            "{:?} did not converge for {:?} after {} iterations",
            objective, package.tickers, solution.iterations
        );
    }

    let weights: Vec<f64> = solution.weights.iter().map(|w| round_to(*w, 4)).collect();
    let stats = portfolio_stats(&weights, &package.mean_returns, &package.covariance);

    Ok(OptimizationResult {
        combination: package.combination.clone(),
        tickers: package.tickers.clone(),
        objective,
        weights,
        stats,
        converged: solution.converged,
        iterations: solution.iterations,
    })
}

/// Results for every analysed combination, in enumeration order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OptimizationSet {
    pub sharpe: Vec<OptimizationResult>,
    pub max_return: Vec<OptimizationResult>,
    pub min_volatility: Vec<OptimizationResult>,
}

impl OptimizationSet {
    pub fn results(&self, objective: Objective) -> &[OptimizationResult] {
        match objective {
            Objective::MaxSharpe => &self.sharpe,
            Objective::MaxReturn => &self.max_return,
            Objective::MinVolatility => &self.min_volatility,
        }
    }
}

/// Builds the return/covariance package for every combination to analyse.
pub fn build_packages(panel: &PricePanel, config: &AdvisorConfig) -> Result<Vec<ReturnCovPackage>> {
    let combos = Combinations::new(panel.len(), config.portfolio_size)?;
    let total = combos.total();
    let limit = config.max_combinations.unwrap_or(total).min(total);
    info!("Number of unique asset combinations: {}", total);
    info!("Analyzing {} of {} asset combinations...", limit, total);

    let engine = StatisticsEngine::new(panel)?;
    let selected: Vec<AssetCombination> = combos.take(limit).collect();
    selected.par_iter().map(|combo| engine.package(combo)).collect()
}

/// Runs all three objectives over every package.
pub fn optimize_packages(
    packages: &[ReturnCovPackage],
    config: &AdvisorConfig,
    settings: &SolverSettings,
) -> Result<OptimizationSet> {
    let start = Instant::now();

    let per_package: Vec<[OptimizationResult; 3]> = packages
        .par_iter()
        .map(|package| {
            Ok([
                optimize_package(
                    package,
                    Objective::MaxSharpe,
                    Objective::MaxSharpe.bounds(config),
                    settings,
                )?,
                optimize_package(
                    package,
                    Objective::MaxReturn,
                    Objective::MaxReturn.bounds(config),
                    settings,
                )?,
                optimize_package(
                    package,
                    Objective::MinVolatility,
                    Objective::MinVolatility.bounds(config),
                    settings,
                )?,
            ])
        })
        .collect::<Result<Vec<_>>>()?;

    let mut set = OptimizationSet::default();
    for [sharpe, ret, vol] in per_package {
        set.sharpe.push(sharpe);
        set.max_return.push(ret);
        set.min_volatility.push(vol);
    }

    let unconverged = Objective::ALL
        .iter()
        .map(|o| set.results(*o).iter().filter(|r| !r.converged).count())
        .sum::<usize>();
    debug!("{} optimizations flagged as non-converged", unconverged);
    info!(
        "Optimized {} combinations in {:.2} seconds",
        packages.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(set)
}

// ──────────────────────────────────────────────────────────────────────────────
// Random-portfolio cloud
// ──────────────────────────────────────────────────────────────────────────────

/// Generates a random weight vector that sums to 1.0, using Dirichlet(1) sampling.
pub fn generate_random_weights(n: usize, rng: &mut impl rand::Rng) -> Vec<f64> {
    use rand_distr::{Distribution, Exp1};
    let raw: Vec<f64> = (0..n).map(|_| Exp1.sample(rng)).collect();
    let sum: f64 = raw.iter().sum();
    raw.iter().map(|v| v / sum).collect()
}

/// Statistics of `iterations` uniformly random fully-invested portfolios.
pub fn simulate_random_portfolios(
    package: &ReturnCovPackage,
    iterations: usize,
    rng: &mut impl rand::Rng,
) -> Vec<PortfolioStats> {
    let n = package.mean_returns.len();
    (0..iterations)
        .map(|_| {
            let weights = generate_random_weights(n, &mut *rng);
            portfolio_stats(&weights, &package.mean_returns, &package.covariance)
        })
        .collect()
}
