// src/connectors/traits.rs
use crate::errors::Result;
use crate::types::{AccountSnapshot, OrderRecord, OrderResult, Side, Tick};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

/// Authenticated account and order operations. No retries happen in here.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn fetch_account(&self) -> Result<AccountSnapshot>;

    /// Immediate market order sized in quote-asset notional.
    async fn place_market_order(
        &self,
        pair: &str,
        side: Side,
        quote_quantity: Decimal,
    ) -> Result<OrderResult>;

    async fn fetch_order_history(&self, pair: &str, limit: u16) -> Result<Vec<OrderRecord>>;
}

/// Cooperative ticker feed. Ticks are only delivered from inside `service()`.
#[async_trait]
pub trait MarketDataFeed: Send {
    async fn open(&mut self) -> Result<()>;

    /// Every call creates an independent subscription; ticks for `pair`
    /// are pushed into `sender` during `service()`.
    async fn subscribe_ticker(
        &mut self,
        pair: &str,
        sender: mpsc::UnboundedSender<Tick>,
    ) -> Result<()>;

    /// Waits up to one service interval for socket activity and dispatches
    /// whatever arrived. Malformed frames are logged and dropped.
    async fn service(&mut self);

    /// False once the stream for `pair` closed or was never opened.
    fn is_subscribed(&self, pair: &str) -> bool;
}
