//! peg-risk
//!
//! stETH/ETH basis VaR report and Curve USDC/crvUSD tooling for an anvil
//! mainnet fork (`anvil --fork-url "$ALCHEMY_MAINNET_URL"`).

use clap::{Parser, Subcommand};
use ethers::types::Address;
use peg_risk::{
    client::DuneClient,
    config::{parse_address, Config},
    curve::CurvePool,
    report::run_basis_var,
    risk::RiskParams,
    rpc::{self, ForkAdmin, HttpProvider},
    utils::{format_amount, format_pct},
};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "peg-risk")]
#[command(about = "stETH/ETH basis VaR and Curve USDC/crvUSD fork tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "peg-risk.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the 14d historical VaR of the stETH/ETH basis and write the chart
    Var {
        /// Rolling lookback in days
        #[arg(long)]
        window: Option<usize>,
        /// Left-tail quantile (0.01 = 99% VaR)
        #[arg(long)]
        quantile: Option<f64>,
        /// Change horizon in days
        #[arg(long)]
        lag: Option<usize>,
        /// Directory for the HTML chart
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Show Curve USDC/crvUSD pool balances on the local fork
    InspectPool {
        /// Read from the upstream mainnet RPC (ALCHEMY_MAINNET_URL) instead
        #[arg(long)]
        mainnet: bool,
    },
    /// Show the raw LP balance of a holder
    LpBalance {
        /// Holder address (defaults to the configured LP whale)
        #[arg(long)]
        holder: Option<String>,
    },
    /// Single-sided USDC withdrawal from an impersonated LP holder
    Withdraw {
        /// Holder address (defaults to the configured LP whale)
        #[arg(long)]
        holder: Option<String>,
        /// Fraction of the LP balance to burn
        #[arg(long)]
        fraction: Option<f64>,
        /// Allowed slippage in basis points
        #[arg(long)]
        slippage_bps: Option<u32>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Var {
            window,
            quantile,
            lag,
            output_dir,
        } => {
            if let Some(w) = window {
                config.risk.window = w;
            }
            if let Some(q) = quantile {
                config.risk.quantile = q;
            }
            if let Some(l) = lag {
                config.risk.change_lag = l;
            }
            if let Some(dir) = output_dir {
                config.risk.output_dir = dir;
            }
            config.validate()?;
            run_var(&config).await
        }
        Commands::InspectPool { mainnet } => inspect_pool(&config, mainnet).await,
        Commands::LpBalance { holder } => lp_balance(&config, holder.as_deref()).await,
        Commands::Withdraw {
            holder,
            fraction,
            slippage_bps,
        } => {
            if let Some(f) = fraction {
                config.withdraw.fraction = f;
            }
            if let Some(bps) = slippage_bps {
                config.withdraw.slippage_bps = bps;
            }
            config.validate()?;
            withdraw(&config, holder.as_deref()).await
        }
    }
}

async fn run_var(config: &Config) -> anyhow::Result<()> {
    let (api_key, query_id) = config.dune_credentials()?;
    let source = DuneClient::new(&config.dune, api_key, query_id)?;
    let params = RiskParams::from(&config.risk);

    let report = run_basis_var(&source, params, &config.risk.output_path()).await?;
    let summary = report.summary;
    let conf = params.confidence_pct();

    println!(
        "=== stETH/ETH {}-Day {}% Historical VaR ({}d lookback) ===",
        params.change_lag, conf, params.window
    );
    println!("Latest date:             {}", summary.date.date_naive());
    println!(
        "Current basis:           {} (stETH vs ETH)",
        format_pct(summary.basis_pct, true)
    );
    println!(
        "{}d {}% VaR (magnitude): {}",
        params.change_lag,
        conf,
        format_pct(summary.var_pct, false)
    );
    println!();
    println!("Interactive chart saved to: {}", report.chart_path.display());
    Ok(())
}

type Fork = (CurvePool<HttpProvider>, ForkAdmin<HttpProvider>);

async fn connect_pool(config: &Config) -> anyhow::Result<Fork> {
    let provider = rpc::connect_local(&config.rpc).await?;
    println!("Connected to local fork: {}", config.rpc.fork_url);
    let pool = CurvePool::new(provider.clone(), &config.curve)?;
    Ok((pool, ForkAdmin::new(provider)))
}

fn resolve_holder(config: &Config, holder: Option<&str>) -> anyhow::Result<Address> {
    let holder = holder.unwrap_or(&config.curve.lp_whale);
    Ok(parse_address("holder", holder)?)
}

async fn inspect_pool(config: &Config, mainnet: bool) -> anyhow::Result<()> {
    let pool = if mainnet {
        let provider = rpc::connect_mainnet(&config.rpc).await?;
        println!("Connected to mainnet RPC");
        CurvePool::new(provider, &config.curve)?
    } else {
        connect_pool(config).await?.0
    };
    let balances = pool.balances().await?;

    println!("\nCurve USDC/crvUSD Pool Balances:");
    println!("  USDC:   {}", format_amount(balances.usdc, 2));
    println!("  crvUSD: {}", format_amount(balances.crvusd, 2));
    Ok(())
}

async fn lp_balance(config: &Config, holder: Option<&str>) -> anyhow::Result<()> {
    let holder = resolve_holder(config, holder)?;
    let (pool, _) = connect_pool(config).await?;
    let raw = pool.lp_balance(holder).await?;

    println!("LP holder: {:?}", holder);
    println!("LP balance (raw smallest units): {}", raw);
    Ok(())
}

async fn withdraw(config: &Config, holder: Option<&str>) -> anyhow::Result<()> {
    let holder = resolve_holder(config, holder)?;
    let (pool, admin) = connect_pool(config).await?;

    let balances = pool.balances().await?;
    println!(
        "Pool balances  →  USDC: {}   crvUSD: {}",
        format_amount(balances.usdc, 2),
        format_amount(balances.crvusd, 2)
    );

    println!("\nLP whale: {:?}", holder);
    println!("LP balance (raw smallest units): {}", pool.lp_balance(holder).await?);

    let fraction = Decimal::try_from(config.withdraw.fraction)?;
    let report = pool
        .withdraw_usdc_single_sided(&admin, holder, fraction, config.withdraw.slippage_bps)
        .await?;

    println!("\nWithdrew single-sided USDC from Curve pool:");
    println!("  Tx:               {:?}", report.tx_hash);
    println!("  LP burned:        {}", format_amount(report.lp_burned, 6));
    println!("  Expected USDC:    {}", format_amount(report.expected_usdc, 2));
    println!("  Minimum USDC:     {}", format_amount(report.min_usdc, 2));
    println!("  USDC before:      {}", format_amount(report.usdc_before, 2));
    println!("  USDC after:       {}", format_amount(report.usdc_after, 2));
    println!("  USDC received:    {}", format_amount(report.received(), 2));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_pool_mainnet_flag() {
        let cli = Cli::try_parse_from(["peg-risk", "inspect-pool", "--mainnet"]).unwrap();
        assert!(matches!(cli.command, Commands::InspectPool { mainnet: true }));

        let cli = Cli::try_parse_from(["peg-risk", "inspect-pool"]).unwrap();
        assert!(matches!(cli.command, Commands::InspectPool { mainnet: false }));
        assert_eq!(cli.config, "peg-risk.toml");
    }
}
