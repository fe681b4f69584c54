// src/config.rs

use crate::core::retry::BootstrapRetry;
use crate::errors::{Result, TraderError};
use crate::types::StrategyParameters;
use config::{Config, Environment, File, Source};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Longest accepted trade or wait period: one day.
pub const MAX_PERIOD_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub secret_key: String,
    pub rest_url: String,
    pub ws_url: String,
    pub settlement_asset: String,
    pub recv_window_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    pub symbol: String,
    pub pair: Option<String>,
    pub trade_period_secs: u64,
    pub wait_period_secs: u64,
    pub price_trigger_percent: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapConfig {
    pub attempts: u32,
    pub delay_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub service_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run the swing state machine and place orders.
    Trade,
    /// Only log the ticker stream.
    Trace,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub mode: String,
    pub exchange: ExchangeConfig,
    pub strategy: StrategyConfig,
    pub bootstrap: BootstrapConfig,
    pub feed: FeedConfig,
    pub logging: LoggingConfig,
}

/// Values given on the command line. Each one wins over every other layer.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub symbol: Option<String>,
    pub pair: Option<String>,
    pub trade_period_secs: Option<u64>,
    pub wait_period_secs: Option<u64>,
    pub price_trigger_percent: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub mode: Option<String>,
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Defaults, then `Settings.toml` (or `path`), then `APP_*` variables, then `overrides`.
    pub fn load(path: Option<&str>, overrides: &Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_source(File::with_name(path), overrides)?,
            None => Self::from_source(File::with_name("Settings").required(false), overrides)?,
        };

        if config.exchange.api_key.is_empty() {
            config.exchange.api_key = std::env::var("BINANCE_API_KEY").unwrap_or_default();
        }
        if config.exchange.secret_key.is_empty() {
            config.exchange.secret_key = std::env::var("BINANCE_SECRET_KEY").unwrap_or_default();
        }
        Ok(config)
    }

    fn from_source<S>(file: S, overrides: &Overrides) -> Result<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        let builder = Config::builder()
            .set_default("mode", "trade")?
            .set_default("exchange.api_key", "")?
            .set_default("exchange.secret_key", "")?
            .set_default("exchange.rest_url", "https://testnet.binance.vision")?
            .set_default("exchange.ws_url", "wss://stream.binance.com:9443")?
            .set_default("exchange.settlement_asset", "BNB")?
            .set_default("strategy.symbol", "")?
            .set_default("strategy.trade_period_secs", 0_i64)?
            .set_default("strategy.wait_period_secs", 0_i64)?
            .set_default("strategy.price_trigger_percent", "0")?
            .set_default("strategy.quantity", "0")?
            .set_default("bootstrap.attempts", 5_i64)?
            .set_default("bootstrap.delay_secs", 5_i64)?
            .set_default("feed.service_interval_ms", 1000_i64)?
            .set_default("logging.level", "info")?
            .add_source(file)
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_override_option("exchange.api_key", overrides.api_key.clone())?
            .set_override_option("exchange.secret_key", overrides.secret_key.clone())?
            .set_override_option("strategy.symbol", overrides.symbol.clone())?
            .set_override_option("strategy.pair", overrides.pair.clone())?
            .set_override_option(
                "strategy.trade_period_secs",
                overrides.trade_period_secs.map(|v| v.to_string()),
            )?
            .set_override_option(
                "strategy.wait_period_secs",
                overrides.wait_period_secs.map(|v| v.to_string()),
            )?
            .set_override_option(
                "strategy.price_trigger_percent",
                overrides.price_trigger_percent.map(|v| v.to_string()),
            )?
            .set_override_option("strategy.quantity", overrides.quantity.map(|v| v.to_string()))?
            .set_override_option("mode", overrides.mode.clone())?
            .set_override_option("logging.level", overrides.log_level.clone())?;

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn mode(&self) -> Result<Mode> {
        match self.mode.to_lowercase().as_str() {
            "trade" => Ok(Mode::Trade),
            "trace" => Ok(Mode::Trace),
            other => Err(TraderError::Validation(format!(
                "Invalid mode: {}. Must be 'trade' or 'trace'",
                other
            ))),
        }
    }

    pub fn bootstrap_retry(&self) -> Result<BootstrapRetry> {
        if self.bootstrap.attempts == 0 {
            return Err(TraderError::Validation(
                "bootstrap.attempts must be greater than zero".to_string(),
            ));
        }
        Ok(BootstrapRetry::new(
            self.bootstrap.attempts,
            Duration::from_secs(self.bootstrap.delay_secs),
        ))
    }

    pub fn service_interval(&self) -> Duration {
        Duration::from_millis(self.feed.service_interval_ms.max(1))
    }

    pub fn validate_credentials(&self) -> Result<()> {
        if self.exchange.api_key.trim().is_empty() {
            return Err(TraderError::Validation("api key is not set".to_string()));
        }
        if self.exchange.secret_key.trim().is_empty() {
            return Err(TraderError::Validation("secret key is not set".to_string()));
        }
        Ok(())
    }

    /// Checks every operator-facing value and builds the strategy input.
    pub fn strategy_parameters(&self) -> Result<StrategyParameters> {
        self.validate_credentials()?;

        let strategy = &self.strategy;
        let symbol = strategy.symbol.trim().to_uppercase();
        let settlement_asset = self.exchange.settlement_asset.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(TraderError::Validation("symbol is not set".to_string()));
        }
        if settlement_asset.is_empty() {
            return Err(TraderError::Validation(
                "settlement asset is not set".to_string(),
            ));
        }
        if symbol == settlement_asset {
            return Err(TraderError::Validation(format!(
                "symbol {} cannot be the settlement asset",
                symbol
            )));
        }
        for (name, secs) in [
            ("trade period", strategy.trade_period_secs),
            ("wait period", strategy.wait_period_secs),
        ] {
            if secs == 0 || secs > MAX_PERIOD_SECS {
                return Err(TraderError::Validation(format!(
                    "{} must be between 1 and {} seconds, got {}",
                    name, MAX_PERIOD_SECS, secs
                )));
            }
        }
        if strategy.price_trigger_percent <= Decimal::ZERO {
            return Err(TraderError::Validation(
                "price trigger percent must be greater than zero".to_string(),
            ));
        }
        if strategy.quantity <= Decimal::ZERO {
            return Err(TraderError::Validation(
                "quantity must be greater than zero".to_string(),
            ));
        }

        // balances are reported per asset, so the pair must be exactly symbol + settlement
        let pair = format!("{}{}", symbol, settlement_asset);
        if let Some(configured) = strategy.pair.as_deref().map(str::trim) {
            if !configured.is_empty() && !configured.eq_ignore_ascii_case(&pair) {
                return Err(TraderError::Validation(format!(
                    "pair {} does not trade {} against {} (expected {})",
                    configured.to_uppercase(),
                    symbol,
                    settlement_asset,
                    pair
                )));
            }
        }

        Ok(StrategyParameters {
            symbol,
            settlement_asset,
            pair,
            price_trigger_percent: strategy.price_trigger_percent,
            trade_period: Duration::from_secs(strategy.trade_period_secs),
            wait_period: Duration::from_secs(strategy.wait_period_secs),
            quantity: strategy.quantity,
        })
    }
}
