// src/types.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One streamed 24h-ticker update. Only `last_price` drives decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub last_price: Decimal,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub free: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CommissionRates {
    pub maker: Decimal,
    pub taker: Decimal,
    pub buyer: Decimal,
    pub seller: Decimal,
}

/// Point-in-time copy of the account. Held by value; never mutated after parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountSnapshot {
    pub maker_commission: u64,
    pub taker_commission: u64,
    pub buyer_commission: u64,
    pub seller_commission: u64,
    pub commission_rates: CommissionRates,
    pub can_trade: bool,
    pub can_withdraw: bool,
    pub can_deposit: bool,
    pub brokered: bool,
    pub require_self_trade_prevention: bool,
    pub update_time: u64,
    pub account_type: String,
    pub balances: HashMap<String, Balance>,
    pub permissions: Vec<String>,
}

impl AccountSnapshot {
    /// Missing assets read as a zero balance.
    pub fn balance(&self, asset: &str) -> Balance {
        self.balances.get(asset).copied().unwrap_or_default()
    }

    pub fn has_asset(&self, asset: &str) -> bool {
        self.balances
            .keys()
            .any(|name| name.eq_ignore_ascii_case(asset))
    }

    pub fn dump(&self) {
        info!("==== Account information ====");
        info!(
            "  commissions : maker={} taker={} buyer={} seller={}",
            self.maker_commission,
            self.taker_commission,
            self.buyer_commission,
            self.seller_commission
        );
        let rates = &self.commission_rates;
        info!(
            "  commission rates : maker={} taker={} buyer={} seller={}",
            rates.maker, rates.taker, rates.buyer, rates.seller
        );
        info!(
            "  can_trade={} can_withdraw={} can_deposit={} brokered={} require_stp={}",
            self.can_trade,
            self.can_withdraw,
            self.can_deposit,
            self.brokered,
            self.require_self_trade_prevention
        );
        info!(
            "  account_type='{}' update_time={}",
            self.account_type, self.update_time
        );

        let mut assets: Vec<_> = self
            .balances
            .iter()
            .filter(|(_, b)| !b.free.is_zero() || !b.locked.is_zero())
            .collect();
        assets.sort_by(|a, b| a.0.cmp(b.0));
        info!("  balances ({} non-zero):", assets.len());
        for (asset, b) in assets {
            info!("    {:<8} free={} locked={}", asset, b.free, b.locked);
        }
        info!("  permissions : {}", self.permissions.join(", "));
    }
}

/// Acceptance receipt of an order. Carries no fill price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
}

/// One entry of the exchange's order history for a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub side: Side,
    pub status: String,
    pub executed_qty: Decimal,
    pub quote_qty: Decimal,
    pub time: u64,
}

/// Validated, immutable strategy input. Built by `AppConfig::strategy_parameters`.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParameters {
    /// Traded (base) asset, upper-case.
    pub symbol: String,
    /// Quote asset the notional is expressed in.
    pub settlement_asset: String,
    /// Exchange pair identifier, e.g. `ETHBNB`.
    pub pair: String,
    pub price_trigger_percent: Decimal,
    pub trade_period: Duration,
    pub wait_period: Duration,
    pub quantity: Decimal,
}
