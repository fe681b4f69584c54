// src/connectors/messages.rs
use crate::errors::{Result, TraderError};
use crate::types::{AccountSnapshot, Balance, CommissionRates, OrderRecord, OrderResult, Side, Tick};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// 24h rolling ticker from wss://stream.binance.com:9443/ws/<pair>@ticker
/// Short field names mirror the stream payload; the informational
/// open/high/low/volume fields are not decoded.
#[derive(Debug, Deserialize)]
pub struct BinanceTickerEvent {
    #[serde(rename = "e")]
    pub event_type: String, // "24hrTicker"

    #[serde(rename = "E")]
    pub event_time: u64,

    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price_change: Decimal,

    #[serde(rename = "P", with = "rust_decimal::serde::str")]
    pub price_change_percent: Decimal,

    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    pub last_price: Decimal,
}

impl From<BinanceTickerEvent> for Tick {
    fn from(event: BinanceTickerEvent) -> Self {
        Tick {
            symbol: event.symbol,
            last_price: event.last_price,
            price_change: event.price_change,
            price_change_percent: event.price_change_percent,
            timestamp: event.event_time,
        }
    }
}

/// Decodes one stream frame. Anything that is not a ticker event is a protocol error.
pub fn parse_ticker(text: &str) -> Result<Tick> {
    let event: BinanceTickerEvent = serde_json::from_str(text)
        .map_err(|e| TraderError::Protocol(format!("bad ticker frame: {}", e)))?;
    if event.event_type != "24hrTicker" {
        return Err(TraderError::Protocol(format!(
            "unexpected event type '{}'",
            event.event_type
        )));
    }
    if event.last_price <= Decimal::ZERO {
        return Err(TraderError::Protocol(format!(
            "non-positive last price {} for {}",
            event.last_price, event.symbol
        )));
    }
    Ok(event.into())
}

/// `{code, msg}` body the REST API returns instead of data.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

/// Turns an HTTP status + body into either the payload or an exchange error.
pub fn decode_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T> {
    if let Ok(err) = serde_json::from_str::<ApiErrorBody>(body) {
        return Err(TraderError::Exchange {
            status,
            code: err.code,
            msg: err.msg,
        });
    }
    if !(200..300).contains(&status) {
        return Err(TraderError::Exchange {
            status,
            code: -1,
            msg: body.chars().take(256).collect(),
        });
    }
    serde_json::from_str(body).map_err(|e| TraderError::Protocol(format!("bad response: {}", e)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfoResponse {
    #[serde(default)]
    pub maker_commission: u64,
    #[serde(default)]
    pub taker_commission: u64,
    #[serde(default)]
    pub buyer_commission: u64,
    #[serde(default)]
    pub seller_commission: u64,
    #[serde(default)]
    pub commission_rates: Option<CommissionRatesPayload>,
    pub can_trade: bool,
    pub can_withdraw: bool,
    pub can_deposit: bool,
    #[serde(default)]
    pub brokered: bool,
    #[serde(default)]
    pub require_self_trade_prevention: bool,
    #[serde(default)]
    pub update_time: u64,
    #[serde(default)]
    pub account_type: String,
    pub balances: Vec<BalancePayload>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommissionRatesPayload {
    #[serde(with = "rust_decimal::serde::str")]
    pub maker: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub taker: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub buyer: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub seller: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct BalancePayload {
    pub asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub free: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub locked: Decimal,
}

impl From<AccountInfoResponse> for AccountSnapshot {
    fn from(resp: AccountInfoResponse) -> Self {
        let commission_rates = resp
            .commission_rates
            .map(|r| CommissionRates {
                maker: r.maker,
                taker: r.taker,
                buyer: r.buyer,
                seller: r.seller,
            })
            .unwrap_or_default();

        AccountSnapshot {
            maker_commission: resp.maker_commission,
            taker_commission: resp.taker_commission,
            buyer_commission: resp.buyer_commission,
            seller_commission: resp.seller_commission,
            commission_rates,
            can_trade: resp.can_trade,
            can_withdraw: resp.can_withdraw,
            can_deposit: resp.can_deposit,
            brokered: resp.brokered,
            require_self_trade_prevention: resp.require_self_trade_prevention,
            update_time: resp.update_time,
            account_type: resp.account_type,
            balances: resp
                .balances
                .into_iter()
                .map(|b| {
                    (
                        b.asset.to_uppercase(),
                        Balance {
                            free: b.free,
                            locked: b.locked,
                        },
                    )
                })
                .collect(),
            permissions: resp.permissions,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAckResponse {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
}

impl From<OrderAckResponse> for OrderResult {
    fn from(resp: OrderAckResponse) -> Self {
        OrderResult {
            symbol: resp.symbol,
            order_id: resp.order_id,
            client_order_id: resp.client_order_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHistoryEntry {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub side: Side,
    pub status: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub executed_qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub cummulative_quote_qty: Decimal,
    pub time: u64,
}

impl From<OrderHistoryEntry> for OrderRecord {
    fn from(entry: OrderHistoryEntry) -> Self {
        OrderRecord {
            symbol: entry.symbol,
            order_id: entry.order_id,
            client_order_id: entry.client_order_id,
            side: entry.side,
            status: entry.status,
            executed_qty: entry.executed_qty,
            quote_qty: entry.cummulative_quote_qty,
            time: entry.time,
        }
    }
}
