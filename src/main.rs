// src/main.rs
use crate::config::{AppConfig, Mode, Overrides};
use crate::connectors::binance::BinanceClient;
use crate::connectors::stream::BinanceStream;
use crate::connectors::traits::ExchangeClient;
use crate::core::engine::{fetch_bootstrap_account, EngineOutcome, TradingEngine};
use crate::core::retry::BootstrapRetry;
use crate::errors::TraderError;
use crate::strategies::swing::TradingStateMachine;
use crate::strategies::tracer::TickerTracer;
use crate::strategies::traits::Strategy;
use anyhow::Context;
use clap::Parser;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;
mod connectors;
mod core;
mod errors;
mod logging;
mod strategies;
#[cfg(test)]
mod testing;
mod types;
mod utils;

#[derive(Parser, Debug)]
#[command(name = "swing-trader")]
#[command(version)]
#[command(about = "Timer-driven swing trading bot for Binance spot pairs", long_about = None)]
struct Args {
    /// Path to a configuration file (default: ./Settings.toml if present)
    #[arg(long)]
    config: Option<String>,

    #[arg(short = 'k', long)]
    api_key: Option<String>,

    #[arg(short = 's', long)]
    secret_key: Option<String>,

    /// Asset to trade, e.g. ETH
    #[arg(short = 'c', long)]
    symbol: Option<String>,

    /// Exchange pair (default: symbol + settlement asset)
    #[arg(long)]
    pair: Option<String>,

    /// Seconds to hold a position before selling
    #[arg(long)]
    trade_period: Option<u64>,

    /// Upper bound, in seconds, of the random pause between trades
    #[arg(long)]
    wait_period: Option<u64>,

    /// Absolute price move, in percent, that closes a position early
    #[arg(long)]
    price_trigger: Option<Decimal>,

    /// Order size in settlement-asset notional
    #[arg(long)]
    quantity: Option<Decimal>,

    /// trade or trace
    #[arg(long)]
    mode: Option<String>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            api_key: self.api_key.clone(),
            secret_key: self.secret_key.clone(),
            symbol: self.symbol.clone(),
            pair: self.pair.clone(),
            trade_period_secs: self.trade_period,
            wait_period_secs: self.wait_period,
            price_trigger_percent: self.price_trigger,
            quantity: self.quantity,
            mode: self.mode.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

struct ShutdownSignals {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            sigterm: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        tokio::select! {
            _ = ctrl_c() => {}
            _ = self.sigterm.recv() => {}
        }
        #[cfg(not(unix))]
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// First signal asks the loop to stop; a second one while stopping exits at once.
fn spawn_signal_listener(cancel: CancellationToken) -> std::io::Result<()> {
    let mut signals = ShutdownSignals::new()?;
    tokio::spawn(async move {
        signals.recv().await;
        warn!("Shutdown requested, stopping after the current pass");
        cancel.cancel();

        signals.recv().await;
        error!("Second shutdown signal, exiting immediately");
        std::process::exit(130);
    });
    Ok(())
}

async fn drive<S: Strategy>(
    strategy: S,
    feed: BinanceStream,
    client: Arc<dyn ExchangeClient>,
    pair: &str,
    retry: BootstrapRetry,
    cancel: CancellationToken,
) -> anyhow::Result<EngineOutcome> {
    let mut engine = TradingEngine::new(strategy, feed, client, pair, retry, cancel);
    match engine.connect().await {
        Ok(()) => {}
        Err(TraderError::Cancelled { .. }) => return Ok(EngineOutcome::Stopped),
        Err(e) => {
            return Err(e).with_context(|| format!("ticker subscription for {} failed", pair))
        }
    }
    Ok(engine.run().await?)
}

async fn run(config: AppConfig, cancel: CancellationToken) -> anyhow::Result<EngineOutcome> {
    let mode = config.mode()?;
    let params = config.strategy_parameters()?;
    let retry = config.bootstrap_retry()?;

    info!("========================================");
    info!("  Swing trader v{}", env!("CARGO_PKG_VERSION"));
    info!("  Mode     : {:?}", mode);
    info!("  Pair     : {}", params.pair);
    info!(
        "  Trigger  : {}%  Trade: {:?}  Wait: {:?}  Quantity: {}",
        params.price_trigger_percent, params.trade_period, params.wait_period, params.quantity
    );
    info!("  REST     : {}", config.exchange.rest_url);
    info!("========================================");

    let client: Arc<dyn ExchangeClient> = Arc::new(BinanceClient::new(
        config.exchange.rest_url.clone(),
        config.exchange.api_key.clone(),
        &config.exchange.secret_key,
        config.exchange.recv_window_ms,
    )?);

    let account =
        match fetch_bootstrap_account(client.as_ref(), &params.symbol, &retry, &cancel).await {
            Ok(account) => account,
            Err(TraderError::Cancelled { .. }) => return Ok(EngineOutcome::Stopped),
            Err(e) => return Err(e).context("bootstrap failed"),
        };

    let feed = BinanceStream::new(config.exchange.ws_url.clone(), config.service_interval());
    match mode {
        Mode::Trade => {
            let strategy = TradingStateMachine::new(params.clone(), client.clone(), account);
            drive(strategy, feed, client, &params.pair, retry, cancel).await
        }
        Mode::Trace => {
            let strategy = TickerTracer::new(params.pair.as_str());
            drive(strategy, feed, client, &params.pair, retry, cancel).await
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref(), &args.overrides())
        .context("failed to load configuration")?;
    let guard = logging::init(&config.logging.level, config.logging.directory.as_deref())?;

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone())?;

    match run(config, cancel).await {
        Ok(EngineOutcome::Stopped) => {
            info!("Stopped.");
            Ok(())
        }
        Ok(outcome) => {
            error!("Trading ended on its own: {:?}", outcome);
            drop(guard);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Fatal: {:#}", e);
            Err(e)
        }
    }
}
