use crate::optimizer::{Objective, OptimizationResult, OptimizationSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::info;

/// Stable ordering for `objective`: Sharpe and return descending, volatility
/// ascending. Ties keep enumeration order.
pub fn rank(results: &[OptimizationResult], objective: Objective) -> Vec<OptimizationResult> {
    let mut ranked = results.to_vec();
    ranked.sort_by(|a, b| compare(a, b, objective));
    ranked
}

fn compare(a: &OptimizationResult, b: &OptimizationResult, objective: Objective) -> Ordering {
    match objective {
        Objective::MaxSharpe => b.stats.sharpe.total_cmp(&a.stats.sharpe),
        Objective::MaxReturn => b.stats.expected_return.total_cmp(&a.stats.expected_return),
        Objective::MinVolatility => a.stats.volatility.total_cmp(&b.stats.volatility),
    }
}

/// Every objective's results, best first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankedPortfolios {
    pub sharpe: Vec<OptimizationResult>,
    pub max_return: Vec<OptimizationResult>,
    pub min_volatility: Vec<OptimizationResult>,
}

impl RankedPortfolios {
    pub fn from_set(set: &OptimizationSet) -> Self {
        let ranked = Self {
            sharpe: rank(&set.sharpe, Objective::MaxSharpe),
            max_return: rank(&set.max_return, Objective::MaxReturn),
            min_volatility: rank(&set.min_volatility, Objective::MinVolatility),
        };
        for objective in Objective::ALL {
            if let Some(best) = ranked.best(objective) {
                info!(
                    "Best {} portfolio: {:?} (return {:.4}, vol {:.4}, sharpe {:.4})",
                    objective.label(),
                    best.allocation(),
                    best.stats.expected_return,
                    best.stats.volatility,
                    best.stats.sharpe
                );
            }
        }
        ranked
    }

    pub fn ranked(&self, objective: Objective) -> &[OptimizationResult] {
        match objective {
            Objective::MaxSharpe => &self.sharpe,
            Objective::MaxReturn => &self.max_return,
            Objective::MinVolatility => &self.min_volatility,
        }
    }

    /// Rank 0 for `objective`, if anything was analysed.
    pub fn best(&self, objective: Objective) -> Option<&OptimizationResult> {
        self.ranked(objective).first()
    }
}
