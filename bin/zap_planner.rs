//! # Zap Planner
//!
//! Read-only planning against a live chain: how a deposit would be split, which routes the
//! swaps would take and what the position legs would receive. Nothing is sent.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin zap_planner -- preview --pool 0x... --tick-lower -1000 --tick-upper 1000 --amount 1000
//! cargo run --bin zap_planner -- routes --asset0 0x... --asset1 0x...
//! cargo run --bin zap_planner -- tick 887272
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ethers::prelude::{Address, Http, Provider};
use mig_zap_sdk::adapters::EvmBackend;
use mig_zap_sdk::collaborators::{Collaborators, TokenLedger};
use mig_zap_sdk::router::LegRoute;
use mig_zap_sdk::types::conversions::{decimal_to_u256, u256_to_decimal};
use mig_zap_sdk::{v3_math, PositionLifecycleManager, Settings};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "zap_planner", about = "Plan single-asset range position entries")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "Config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Allocation, routes and projected amounts for an open
    Preview {
        #[arg(long)]
        pool: Address,
        #[arg(long, allow_hyphen_values = true)]
        tick_lower: i32,
        #[arg(long, allow_hyphen_values = true)]
        tick_upper: i32,
        /// Deposit amount in whole units of the deposit asset
        #[arg(long)]
        amount: String,
    },
    /// Routes from the deposit asset into a pair, and back
    Routes {
        #[arg(long)]
        asset0: Address,
        #[arg(long)]
        asset1: Address,
    },
    /// sqrt price and price at a tick
    Tick {
        #[arg(allow_hyphen_values = true)]
        tick: i32,
    },
}

fn describe_leg(leg: &LegRoute) -> String {
    match leg {
        LegRoute::NotRequired => "not required".dimmed().to_string(),
        LegRoute::Missing => "NO ROUTE".red().bold().to_string(),
        LegRoute::Found(route) => {
            let hops: Vec<String> = route
                .tokens
                .iter()
                .zip(route.tick_spacings.iter().map(Some).chain(std::iter::once(None)))
                .map(|(token, spacing)| match spacing {
                    Some(s) => format!("{:?} -[{}]->", token, s),
                    None => format!("{:?}", token),
                })
                .collect();
            hops.join(" ").green().to_string()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    #[cfg(feature = "observability")]
    {
        tracing_subscriber::fmt().json().init();
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .install()
            .context("failed to install prometheus exporter")?;
    }
    #[cfg(not(feature = "observability"))]
    env_logger::init();

    let cli = Cli::parse();

    if let Command::Tick { tick } = cli.command {
        let sqrt_price = v3_math::get_sqrt_ratio_at_tick(tick)?;
        println!("{} {}", "tick".bold(), tick);
        println!("  sqrtPriceX96: {}", sqrt_price);
        println!("  price (raw token1 per token0): {:.12}", v3_math::tick_to_price(tick));
        return Ok(());
    }

    let settings = Settings::from_path(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config))?;
    println!("✅ Settings loaded from {}", cli.config);

    let provider = Provider::<Http>::try_from(settings.rpc.http_url.as_str())
        .context("invalid rpc.http_url")?;
    let backend = Arc::new(EvmBackend::new(
        Arc::new(provider),
        settings.rpc.operator,
        settings.contracts.clone(),
    ));
    let has_quoter = backend.has_quoter();
    let mut collaborators = Collaborators::from_backend(backend.clone(), settings.rpc.operator);
    if !has_quoter {
        collaborators = collaborators.without_quoter();
    }
    let manager = PositionLifecycleManager::new(collaborators, &settings);
    let deposit_asset = manager.deposit_asset();
    let deposit_decimals = backend.decimals(deposit_asset).await?;

    match cli.command {
        Command::Preview {
            pool,
            tick_lower,
            tick_upper,
            amount,
        } => {
            let amount = Decimal::from_str(&amount).context("invalid --amount")?;
            let amount_in = decimal_to_u256(amount, deposit_decimals)?;
            let preview = manager
                .preview_open(pool, tick_lower, tick_upper, amount_in)
                .await?;

            let decimals0 = backend.decimals(preview.pool.token0).await?;
            let decimals1 = backend.decimals(preview.pool.token1).await?;

            println!("\n{}", "Open preview".bold());
            println!(
                "  pool {:?} (spacing {}), current tick {}",
                pool, preview.pool.tick_spacing, preview.pool_state.tick
            );
            println!(
                "  allocation: {} / {} (deposit units)",
                u256_to_decimal(preview.allocation.value0, deposit_decimals)?,
                u256_to_decimal(preview.allocation.value1, deposit_decimals)?
            );
            println!("  route0: {}", describe_leg(&preview.routes.route0));
            println!("  route1: {}", describe_leg(&preview.routes.route1));
            for (label, expected, decimals) in [
                ("token0", preview.expected0, decimals0),
                ("token1", preview.expected1, decimals1),
            ] {
                match expected {
                    Some(value) => println!("  expected {}: {}", label, u256_to_decimal(value, decimals)?),
                    None => println!("  expected {}: {}", label, "unroutable".red()),
                }
            }
            println!("  status: {}", preview.routes.status);
        }
        Command::Routes { asset0, asset1 } => {
            let finder = manager.route_finder();
            let into0 = finder.resolve_leg(deposit_asset, asset0).await?;
            let into1 = finder.resolve_leg(deposit_asset, asset1).await?;
            let close = finder.find_route_for_close(asset0, asset1).await?;

            println!("\n{}", "Routes".bold());
            println!("  deposit -> asset0: {}", describe_leg(&into0));
            println!("  deposit -> asset1: {}", describe_leg(&into1));
            println!("  asset0 -> deposit: {}", describe_leg(&close.route0));
            println!("  asset1 -> deposit: {}", describe_leg(&close.route1));
            println!("  close status: {}", close.status);

            let metrics = finder.cache_metrics();
            println!(
                "  pool lookups: {} hits / {} misses ({} cached)",
                metrics.hits, metrics.misses, metrics.cache_size
            );
        }
        Command::Tick { .. } => {}
    }

    Ok(())
}
