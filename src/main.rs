use anyhow::{Context, bail};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use roboadvisor::config::{self, AdvisorConfig};
use roboadvisor::data::{PricePanel, PriceTable};
use roboadvisor::monte_carlo::{MonteCarloConfig, run_monte_carlo};
use roboadvisor::optimizer::{
    Objective, SolverSettings, build_packages, optimize_packages, simulate_random_portfolios,
};
use roboadvisor::portfolio::{Portfolio, UnitMode, asset_profiles};
use roboadvisor::ranking::RankedPortfolios;
use roboadvisor::rebalancer::RebalancePolicy;
use roboadvisor::report::{self, AdvisorReport};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Trading days of synthetic history generated for `--demo`.
const DEMO_DAYS: usize = 756;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "RoboAdvisor: combinatorial mean-variance optimization with rebalancing simulation",
    after_help = "EXAMPLES:
    # Optimize a price table and simulate the best Sharpe portfolio
    cargo run --release -- --prices prices.json --size 3

    # Synthetic demo universe, 100 Monte Carlo trials, JSON export
    cargo run --release -- --demo SPY,TLT,GLD,VNQ,EFA --size 3 --iterations 100 --output report.json"
)]
struct Args {
    /// Price table JSON: {\"dates\": [...], \"series\": [{\"ticker\", \"prices\"}]}
    #[arg(long, conflicts_with = "demo")]
    prices: Option<PathBuf>,

    /// Run on a synthetic universe of these comma-separated tickers
    #[arg(long)]
    demo: Option<String>,

    /// Configuration JSON (defaults apply for missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Assets per portfolio
    #[arg(long)]
    size: Option<usize>,

    /// Upper weight bound for the Sharpe objective
    #[arg(long)]
    max_pos: Option<f64>,

    /// Lower weight bound for the Sharpe objective
    #[arg(long)]
    min_pos: Option<f64>,

    /// Starting cash for the simulated portfolio
    #[arg(long)]
    cash: Option<f64>,

    /// Sell when an asset's weight exceeds this multiple of its target
    #[arg(long)]
    rebalance_high: Option<f64>,

    /// Buy when an asset's weight falls below this multiple of its target
    #[arg(long)]
    rebalance_low: Option<f64>,

    /// Flat cost charged per trade
    #[arg(long)]
    trade_cost: Option<f64>,

    /// Allow fractional units (true|false)
    #[arg(long)]
    fractional: Option<bool>,

    /// Monte Carlo trials
    #[arg(long)]
    iterations: Option<usize>,

    /// Simulated trading days per trial
    #[arg(long)]
    horizon: Option<usize>,

    /// Random seed for reproducible simulations
    #[arg(long)]
    seed: Option<u64>,

    /// Analyse only the first N combinations
    #[arg(long)]
    max_combinations: Option<usize>,

    /// Worker threads for the rayon pool (default: all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Write the full JSON report here
    #[arg(long)]
    output: Option<PathBuf>,
}

impl Args {
    fn apply(&self, cfg: &mut AdvisorConfig) {
        if let Some(v) = self.size {
            cfg.portfolio_size = v;
        }
        if let Some(v) = self.max_pos {
            cfg.max_pos = v;
        }
        if let Some(v) = self.min_pos {
            cfg.min_pos = v;
        }
        if let Some(v) = self.cash {
            cfg.starting_cash = v;
        }
        if let Some(v) = self.rebalance_high {
            cfg.rebalance_high = v;
        }
        if let Some(v) = self.rebalance_low {
            cfg.rebalance_low = v;
        }
        if let Some(v) = self.trade_cost {
            cfg.trade_cost = v;
        }
        if let Some(v) = self.fractional {
            cfg.fractional_units = v;
        }
        if let Some(v) = self.iterations {
            cfg.monte_carlo_iterations = v;
        }
        if let Some(v) = self.horizon {
            cfg.random_walk_horizon = v;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.max_combinations.is_some() {
            cfg.max_combinations = self.max_combinations;
        }
        if self.threads.is_some() {
            cfg.worker_threads = self.threads;
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<AdvisorConfig> {
    let mut cfg = match &args.config {
        Some(path) => AdvisorConfig::from_json_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => AdvisorConfig::default(),
    };
    cfg.apply_env()?;
    args.apply(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

fn load_panel(args: &Args, cfg: &AdvisorConfig, seed: u64) -> anyhow::Result<PricePanel> {
    if let Some(path) = &args.prices {
        let table = PriceTable::load_json(path)
            .with_context(|| format!("failed to load prices from {}", path.display()))?;
        return Ok(table.clean()?);
    }
    if let Some(list) = &args.demo {
        let tickers: Vec<String> = list
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if tickers.len() < cfg.portfolio_size {
            bail!(
                "--demo needs at least {} tickers for portfolios of that size",
                cfg.portfolio_size
            );
        }
        let refs: Vec<&str> = tickers.iter().map(String::as_str).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        info!(
            "Generating {} days of synthetic prices for {:?} (seed {})",
            DEMO_DAYS, refs, seed
        );
        return Ok(PricePanel::synthetic(&refs, DEMO_DAYS, &mut rng)?);
    }
    bail!("either --prices <FILE> or --demo <TICKERS> is required")
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roboadvisor=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let mut cfg = load_config(&args)?;
    let seed = cfg.resolve_seed();
    config::init_cpu_parallelism(cfg.worker_threads);

    let panel = load_panel(&args, &cfg, seed)?;
    if panel.len() < cfg.portfolio_size {
        bail!(
            "portfolio size {} exceeds the {} assets available",
            cfg.portfolio_size,
            panel.len()
        );
    }

    let settings = SolverSettings::default();
    let packages = build_packages(&panel, &cfg)?;
    let set = optimize_packages(&packages, &cfg, &settings)?;
    let ranked = RankedPortfolios::from_set(&set);
    println!("{}", report::format_best_portfolios(&ranked));

    let best = ranked
        .best(Objective::MaxSharpe)
        .context("no portfolio was optimized")?;
    let profiles = asset_profiles(&panel, best, cfg.min_retained_weight)?;
    let portfolio = Portfolio::initialize(
        profiles,
        cfg.starting_cash,
        cfg.trade_cost,
        UnitMode::from_fractional(cfg.fractional_units),
    )?;
    println!("{}", report::format_portfolio(&portfolio));

    let policy = RebalancePolicy::from_config(&cfg);
    let mc = run_monte_carlo(&portfolio, &policy, &MonteCarloConfig::from_config(&cfg))?;
    if let Some(first) = mc.records.first() {
        println!("{}", report::format_simulation(first));
    }
    println!("{}", report::format_monte_carlo(&mc.summary));

    if let Some(path) = &args.output {
        let mut export = AdvisorReport::new(&cfg, &ranked, &portfolio, &mc);
        match packages.iter().find(|p| p.combination == best.combination) {
            Some(package) => {
                let mut rng = StdRng::seed_from_u64(mc.seed);
                let cloud = simulate_random_portfolios(package, cfg.random_portfolios, &mut rng);
                export = export.with_random_portfolios(cloud);
            }
            None => warn!("No statistics package for {:?}; skipping random portfolios", best.tickers),
        }
        export
            .write_json(path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    println!();
    println!("⚠  Educational use only. Not financial advice.");
    Ok(())
}
