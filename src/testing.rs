// src/testing.rs
//! Scripted collaborators for unit tests.
use crate::connectors::traits::{ExchangeClient, MarketDataFeed};
use crate::errors::{Result, TraderError};
use crate::types::{
    AccountSnapshot, Balance, OrderRecord, OrderResult, Side, StrategyParameters, Tick,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub fn params() -> StrategyParameters {
    StrategyParameters {
        symbol: "ETH".to_string(),
        settlement_asset: "BNB".to_string(),
        pair: "ETHBNB".to_string(),
        price_trigger_percent: dec!(0.25),
        trade_period: Duration::from_secs(30),
        wait_period: Duration::from_secs(15),
        quantity: dec!(0.001),
    }
}

pub fn tick(price: Decimal) -> Tick {
    Tick {
        symbol: "ETHBNB".to_string(),
        last_price: price,
        price_change: Decimal::ZERO,
        price_change_percent: Decimal::ZERO,
        timestamp: 0,
    }
}

pub fn exchange_error() -> TraderError {
    TraderError::Exchange {
        status: 400,
        code: -2010,
        msg: "insufficient balance".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub pair: String,
    pub side: Side,
    pub quote_quantity: Decimal,
}

#[derive(Default)]
struct ClientState {
    balances: Vec<(String, Decimal)>,
    fill_price: Decimal,
    fee: Decimal,
    order_failures: VecDeque<bool>,
    account_failures: VecDeque<bool>,
    history_fails: bool,
    orders: Vec<PlacedOrder>,
    account_calls: u32,
    history_calls: u32,
    next_order_id: u64,
}

/// Exchange stub with deterministic fills: a BUY of `q` quote spends `q` of the
/// settlement asset and credits `q / fill_price` of the symbol, minus `fee` of
/// the settlement asset per order; SELL is the mirror image.
#[derive(Clone)]
pub struct StubClient {
    state: Arc<Mutex<ClientState>>,
}

impl StubClient {
    pub fn new() -> Self {
        let state = ClientState {
            balances: vec![("BNB".to_string(), dec!(10)), ("ETH".to_string(), dec!(1))],
            fill_price: dec!(100),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with_fee(self, fee: Decimal) -> Self {
        self.state.lock().fee = fee;
        self
    }

    /// Scripts the outcome of upcoming orders (`true` = rejected). Unscripted orders succeed.
    pub fn fail_orders(&self, script: &[bool]) {
        self.state.lock().order_failures.extend(script.iter().copied());
    }

    /// Scripts the outcome of upcoming account fetches (`true` = transport failure).
    pub fn fail_accounts(&self, script: &[bool]) {
        self.state.lock().account_failures.extend(script.iter().copied());
    }

    pub fn fail_history(&self) {
        self.state.lock().history_fails = true;
    }

    pub fn set_fill_price(&self, price: Decimal) {
        self.state.lock().fill_price = price;
    }

    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.state.lock().orders.clone()
    }

    pub fn account_calls(&self) -> u32 {
        self.state.lock().account_calls
    }

    pub fn history_calls(&self) -> u32 {
        self.state.lock().history_calls
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        let state = self.state.lock();
        snapshot_of(&state.balances)
    }
}

fn snapshot_of(balances: &[(String, Decimal)]) -> AccountSnapshot {
    let mut snapshot = AccountSnapshot {
        can_trade: true,
        account_type: "SPOT".to_string(),
        ..Default::default()
    };
    for (asset, free) in balances {
        snapshot.balances.insert(
            asset.clone(),
            Balance {
                free: *free,
                locked: Decimal::ZERO,
            },
        );
    }
    snapshot
}

fn adjust(balances: &mut [(String, Decimal)], asset: &str, delta: Decimal) {
    if let Some(entry) = balances.iter_mut().find(|(name, _)| name == asset) {
        entry.1 += delta;
    }
}

#[async_trait]
impl ExchangeClient for StubClient {
    async fn fetch_account(&self) -> Result<AccountSnapshot> {
        let mut state = self.state.lock();
        state.account_calls += 1;
        if state.account_failures.pop_front().unwrap_or(false) {
            return Err(TraderError::Protocol("connection reset".to_string()));
        }
        Ok(snapshot_of(&state.balances))
    }

    async fn place_market_order(
        &self,
        pair: &str,
        side: Side,
        quote_quantity: Decimal,
    ) -> Result<OrderResult> {
        let mut state = self.state.lock();
        state.orders.push(PlacedOrder {
            pair: pair.to_string(),
            side,
            quote_quantity,
        });
        if state.order_failures.pop_front().unwrap_or(false) {
            return Err(exchange_error());
        }

        let base = quote_quantity / state.fill_price;
        let fee = state.fee;
        match side {
            Side::Buy => {
                adjust(&mut state.balances, "BNB", -quote_quantity - fee);
                adjust(&mut state.balances, "ETH", base);
            }
            Side::Sell => {
                adjust(&mut state.balances, "BNB", quote_quantity - fee);
                adjust(&mut state.balances, "ETH", -base);
            }
        }

        state.next_order_id += 1;
        Ok(OrderResult {
            symbol: pair.to_string(),
            order_id: state.next_order_id,
            client_order_id: format!("swing-{}", state.next_order_id),
        })
    }

    async fn fetch_order_history(&self, pair: &str, limit: u16) -> Result<Vec<OrderRecord>> {
        let mut state = self.state.lock();
        state.history_calls += 1;
        if state.history_fails {
            return Err(exchange_error());
        }
        Ok(state
            .orders
            .iter()
            .enumerate()
            .filter(|(_, o)| o.pair == pair)
            .take(limit as usize)
            .map(|(idx, o)| OrderRecord {
                symbol: o.pair.clone(),
                order_id: idx as u64 + 1,
                client_order_id: format!("swing-{}", idx + 1),
                side: o.side,
                status: "FILLED".to_string(),
                executed_qty: Decimal::ZERO,
                quote_qty: o.quote_quantity,
                time: 0,
            })
            .collect())
    }
}

#[derive(Default)]
struct FeedState {
    opened: bool,
    subscribe_failures: VecDeque<bool>,
    subscribes: u32,
    services: u32,
    /// Ticks delivered on the n-th `service()` call (1-based).
    script: VecDeque<(u32, Tick)>,
    drop_subscription_on: Option<u32>,
    sender: Option<mpsc::UnboundedSender<Tick>>,
}

/// Feed stub. `service()` sleeps briefly and replays scripted ticks.
#[derive(Clone, Default)]
pub struct StubFeed {
    state: Arc<Mutex<FeedState>>,
    pub interval: Duration,
}

impl StubFeed {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Arc::default(),
            interval,
        }
    }

    pub fn fail_subscribes(&self, script: &[bool]) {
        self.state.lock().subscribe_failures.extend(script.iter().copied());
    }

    pub fn push_tick(&self, on_service: u32, tick: Tick) {
        self.state.lock().script.push_back((on_service, tick));
    }

    pub fn drop_subscription_on(&self, on_service: u32) {
        self.state.lock().drop_subscription_on = Some(on_service);
    }

    pub fn subscribes(&self) -> u32 {
        self.state.lock().subscribes
    }

    pub fn services(&self) -> u32 {
        self.state.lock().services
    }
}

#[async_trait]
impl MarketDataFeed for StubFeed {
    async fn open(&mut self) -> Result<()> {
        self.state.lock().opened = true;
        Ok(())
    }

    async fn subscribe_ticker(
        &mut self,
        _pair: &str,
        sender: mpsc::UnboundedSender<Tick>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        assert!(state.opened, "subscribe before open");
        state.subscribes += 1;
        if state.subscribe_failures.pop_front().unwrap_or(false) {
            return Err(TraderError::Protocol("handshake failed".to_string()));
        }
        state.sender = Some(sender);
        Ok(())
    }

    async fn service(&mut self) {
        tokio::time::sleep(self.interval).await;
        let mut state = self.state.lock();
        state.services += 1;
        let current = state.services;
        if state.drop_subscription_on == Some(current) {
            state.sender = None;
            state.drop_subscription_on = None;
        }
        while state.script.front().map(|(n, _)| *n <= current).unwrap_or(false) {
            let (_, tick) = state.script.pop_front().expect("checked front");
            if let Some(sender) = &state.sender {
                let _ = sender.send(tick);
            }
        }
    }

    fn is_subscribed(&self, _pair: &str) -> bool {
        self.state.lock().sender.is_some()
    }
}
