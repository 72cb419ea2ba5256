//! Combinatorial mean-variance portfolio optimizer with a threshold
//! rebalancing simulator.
//!
//! The pipeline enumerates every k-asset combination of a price panel,
//! solves three constrained allocations per combination, ranks them, turns
//! the best Sharpe portfolio into discrete holdings and replays it over
//! simulated price paths with band rebalancing and Monte Carlo trials.

pub mod combinations;
pub mod config;
pub mod data;
pub mod error;
pub mod monte_carlo;
pub mod optimizer;
pub mod portfolio;
pub mod ranking;
pub mod rebalancer;
pub mod report;
pub mod simulation;
pub mod statistics;

pub use config::AdvisorConfig;
pub use error::{AdvisorError, Result};
