//! Swap Cycler CLI
//!
//! Command-line interface for running the self-recovering swap cycling agent.

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use swap_cycler::chain::{decimals_or_default, ChainClient};
use swap_cycler::config::env_vars;
use swap_cycler::engine::{GasBudgetEstimator, GasSource};
use swap_cycler::tokens::format_units;
use swap_cycler::wallet::SecureWallet;
use swap_cycler::{Config, CycleRunner, Error, Result, RpcChainClient};
use tokio::sync::watch;
use tracing::Instrument;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "swap-cycler")]
#[command(about = "Self-recovering buy/sell cycling agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop until Ctrl-C
    Run {
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Dry run - don't submit transactions, just log what would happen
        #[arg(long)]
        dry_run: bool,

        /// Account to evaluate in a dry run when PRIVATE_KEY is not set
        #[arg(long)]
        address: Option<Address>,
    },

    /// Show the effective configuration
    Config,

    /// Show base and target token balances
    Balances {
        /// Account to inspect (defaults to the PRIVATE_KEY address)
        #[arg(long)]
        address: Option<Address>,
    },

    /// Show the gas ceilings the next cycle would use
    Gas,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            max_cycles,
            dry_run,
            address,
        } => run_agent(config, max_cycles, dry_run, address).await?,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Balances { address } => show_balances(config, address).await?,
        Commands::Gas => show_gas(config).await?,
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Signing client when PRIVATE_KEY is set, otherwise a read-only client for `fallback`
fn connect(
    config: &Config,
    fallback: Option<Address>,
    require_signer: bool,
) -> Result<RpcChainClient> {
    let rpc = config.rpc_config();
    tracing::info!(host = %rpc.host(), "Connecting to RPC");

    match SecureWallet::from_env(env_vars::PRIVATE_KEY) {
        Ok(wallet) => {
            tracing::info!(address = %wallet.address(), "Loaded wallet from PRIVATE_KEY");
            RpcChainClient::connect(&rpc, &wallet)
        }
        Err(e) if require_signer => Err(e),
        Err(e) => match fallback {
            Some(address) => {
                tracing::info!(address = %address, "Using read-only client");
                RpcChainClient::connect_read_only(&rpc, address)
            }
            None => Err(Error::InvalidArgument(format!(
                "{} (or pass --address for read-only use)",
                e
            ))),
        },
    }
}

async fn run_agent(
    config: Config,
    max_cycles: Option<u64>,
    dry_run: bool,
    address: Option<Address>,
) -> Result<()> {
    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("run", run_id = %run_id);

    async move {
        let client = connect(&config, address, !dry_run)?;
        if let Some(chain_id) = config.chain_id {
            client.verify_chain_id(chain_id).await?;
            tracing::info!(chain_id, "Chain id verified");
        }

        let chain: Arc<dyn ChainClient> = Arc::new(client);
        let mut runner = CycleRunner::from_config(chain, &config)
            .await?
            .with_dry_run(dry_run);

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            tracing::info!("Ctrl-C received, stopping after the current cycle");
            let _ = stop_tx.send(true);
        });

        let summary = runner.run(stop_rx, max_cycles).await;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok::<(), Error>(())
    }
    .instrument(span)
    .await
}

async fn show_balances(config: Config, address: Option<Address>) -> Result<()> {
    let client = connect(&config, address, false)?;
    let owner = client.signer();

    for (label, token) in [
        ("base", config.trading.base_token),
        ("target", config.trading.target_token),
    ] {
        let decimals = decimals_or_default(&client, token).await;
        let balance = client.balance_of(token, owner).await?;
        let allowance = client
            .allowance(token, owner, config.trading.router)
            .await?;
        println!(
            "{:<6} {}  balance {}  router allowance {}",
            label,
            token,
            format_units(balance, decimals),
            format_units(allowance, decimals)
        );
    }
    Ok(())
}

async fn show_gas(config: Config) -> Result<()> {
    let client = RpcChainClient::connect_read_only(&config.rpc_config(), Address::ZERO)?;
    let estimator = GasBudgetEstimator::new(config.gas);
    let budget = estimator.estimate(&client).await;

    match budget.source {
        GasSource::Block { number, gas_limit } => {
            println!("Block {} gas limit: {}", number, gas_limit);
        }
        GasSource::Fallback => println!("Block gas limit unavailable, using fallback"),
    }
    println!("Swap gas ceiling:     {}", budget.working);
    println!("Approval gas ceiling: {}", estimator.approval_ceiling(&budget));
    Ok(())
}
