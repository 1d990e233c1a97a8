use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rbk_config::{report_unknown_keys, UnknownKeyPolicy};
use rbk_execution::apply_orders;
use rbk_host::{MarketData, MemoryHost};
use rbk_risk::DefaultRiskModel;
use rbk_schemas::{InstrumentId, TargetOrderRequest};
use rbk_strategy::{Accrual, DepositStrategy, Evaluation, RiskBudgetStrategy};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "rbk")]
#[command(about = "Risk-budget allocator harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run one risk-budget evaluation and print the outcome as JSON
    Evaluate {
        #[command(flatten)]
        input: WorldArgs,

        /// Prices CSV (`instrument_id,kind,date,value`) replacing the world's series
        #[arg(long)]
        prices: Option<String>,

        /// Send the resulting orders to the in-memory book
        #[arg(long, default_value_t = false)]
        apply: bool,
    },

    /// Accrue and commit one NAV for a cash-accrual strategy
    Accrue {
        #[command(flatten)]
        input: WorldArgs,
    },
}

#[derive(clap::Args)]
struct WorldArgs {
    /// World snapshot JSON
    #[arg(long)]
    world: String,

    /// Layered config paths in merge order; replaces the portfolio's stored config
    #[arg(long = "config")]
    config_paths: Vec<String>,

    /// Fail on unknown config keys instead of warning
    #[arg(long, default_value_t = false)]
    strict_config: bool,

    /// Strategy instrument id
    #[arg(long)]
    strategy: u64,

    /// Evaluation date (YYYY-MM-DD)
    #[arg(long)]
    date: NaiveDate,
}

#[derive(Serialize)]
struct EvaluateOutput<'a> {
    strategy: InstrumentId,
    date: NaiveDate,
    config_hash: Option<String>,
    evaluation: &'a Evaluation,
    applied: usize,
}

#[derive(Serialize)]
struct AccrueOutput {
    strategy: InstrumentId,
    config_hash: Option<String>,
    accrual: Accrual,
}

fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = rbk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Evaluate { input, prices, apply } => {
            let (mut host, config_hash) = load_host(&input, prices.as_deref())?;
            let strategy = RiskBudgetStrategy::load(&host, InstrumentId(input.strategy), &DefaultRiskModel)?;

            let evaluation = strategy.evaluate(&host, input.date)?;
            let applied = if apply {
                send(&mut host, evaluation.orders())?
            } else {
                0
            };

            let out = EvaluateOutput {
                strategy: InstrumentId(input.strategy),
                date: input.date,
                config_hash,
                evaluation: &evaluation,
                applied,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Commands::Accrue { input } => {
            let (mut host, config_hash) = load_host(&input, None)?;
            let instrument = host.instrument(InstrumentId(input.strategy))?;
            let deposit = DepositStrategy::new(instrument)?;
            let accrual = deposit.accrue(&mut host, input.date)?;

            let out = AccrueOutput {
                strategy: InstrumentId(input.strategy),
                config_hash,
                accrual,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}

fn init_tracing() {
    // stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// World snapshot, optional price overlay, optional layered config for the
/// strategy's portfolio. Returns the host and the config hash when config
/// files were given.
fn load_host(input: &WorldArgs, prices: Option<&str>) -> Result<(MemoryHost, Option<String>)> {
    let world = rbk_host::load_world_json(&input.world)?;
    let mut host = MemoryHost::from_world(world).context("world snapshot is inconsistent")?;

    if let Some(path) = prices {
        let rows = rbk_host::load_prices_csv(path)?;
        host.apply_prices(rows)
            .with_context(|| format!("invalid prices csv: {path}"))?;
    }

    if input.config_paths.is_empty() {
        return Ok((host, None));
    }

    let path_refs: Vec<&str> = input.config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = rbk_config::load_layered_yaml(&path_refs)?;
    let policy = if input.strict_config {
        UnknownKeyPolicy::Fail
    } else {
        UnknownKeyPolicy::Warn
    };
    report_unknown_keys(&loaded.config_json, policy)?;

    let instrument = host.instrument(InstrumentId(input.strategy))?;
    let portfolio = instrument
        .portfolio
        .with_context(|| format!("instrument {} owns no portfolio", instrument.id))?;
    host.set_config(portfolio, loaded.dated()?);

    tracing::info!(config_hash = %loaded.config_hash, %portfolio, "config applied");
    Ok((host, Some(loaded.config_hash)))
}

fn send(host: &mut MemoryHost, orders: &[TargetOrderRequest]) -> Result<usize> {
    apply_orders(host, orders).context("host rejected a target order")
}
