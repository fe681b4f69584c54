// src/strategies/swing.rs
use crate::connectors::traits::ExchangeClient;
use crate::errors::Result;
use crate::strategies::traits::Strategy;
use crate::types::{AccountSnapshot, Side, StrategyParameters, Tick};
use crate::utils::precision::{balance_delta, price_delta};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How long to wait for the first price once trading is started.
pub const PRICE_UPDATE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    /// Waiting for the first price from the feed.
    WaitForPrice,
    /// Between trades; the deadline opens the next position.
    Wait,
    /// Position open; closed by the deadline or by the price trigger.
    Trading,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Start,
    PriceUpdated(Decimal),
    Timeout,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    UserAbort,
    /// An event other than `Start` reached `Init`.
    NotStarted,
    PriceTimeout,
    BuyFailed,
    SellFailed,
    /// The next deadline does not fit the clock.
    TimerOverflow,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Timed swing strategy: buy after a random settle delay, sell on timer or
/// when price moves past the trigger, wait, repeat. Fails closed.
pub struct TradingStateMachine {
    params: StrategyParameters,
    client: Arc<dyn ExchangeClient>,
    state: State,
    deadline: Instant,
    stop_reason: Option<StopReason>,
    price_start: Decimal,
    price_last: Decimal,
    account_start: AccountSnapshot,
    account_last: AccountSnapshot,
    completed_trades: u32,
    rng: StdRng,
}

impl TradingStateMachine {
    pub fn new(
        params: StrategyParameters,
        client: Arc<dyn ExchangeClient>,
        account: AccountSnapshot,
    ) -> Self {
        Self::with_rng(params, client, account, StdRng::from_entropy())
    }

    pub fn with_rng(
        params: StrategyParameters,
        client: Arc<dyn ExchangeClient>,
        account: AccountSnapshot,
        rng: StdRng,
    ) -> Self {
        Self {
            params,
            client,
            state: State::Init,
            deadline: Instant::now() + PRICE_UPDATE_TIMEOUT,
            stop_reason: None,
            price_start: Decimal::ZERO,
            price_last: Decimal::ZERO,
            account_start: account.clone(),
            account_last: account,
            completed_trades: 0,
            rng,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> State {
        self.state
    }

    #[cfg(test)]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    #[cfg(test)]
    pub fn price_start(&self) -> Decimal {
        self.price_start
    }

    #[cfg(test)]
    pub fn price_last(&self) -> Decimal {
        self.price_last
    }

    #[cfg(test)]
    pub fn account_start(&self) -> &AccountSnapshot {
        &self.account_start
    }

    #[cfg(test)]
    pub fn account_last(&self) -> &AccountSnapshot {
        &self.account_last
    }

    #[cfg(test)]
    pub fn completed_trades(&self) -> u32 {
        self.completed_trades
    }

    pub async fn handle_event(&mut self, event: Event) {
        match (self.state, event) {
            (State::Stopped, _) => {}

            (State::Init, Event::Start) => {
                info!(
                    "Starting '{}': pair={} symbol={} settlement={} quantity={} trigger={}% trade_period={:?} wait_period={:?}",
                    self.name(),
                    self.params.pair,
                    self.params.symbol,
                    self.params.settlement_asset,
                    self.params.quantity,
                    self.params.price_trigger_percent,
                    self.params.trade_period,
                    self.params.wait_period
                );
                self.transition(State::WaitForPrice, PRICE_UPDATE_TIMEOUT);
            }
            (State::Init, Event::Stop) => self.stop(StopReason::UserAbort),
            (State::Init, other) => {
                warn!("{:?} before start, giving up", other);
                self.stop(StopReason::NotStarted);
            }

            (State::WaitForPrice, Event::PriceUpdated(price)) => {
                self.price_last = price;
                let delay = self.settle_delay();
                info!(
                    "Price for '{}' obtained: {}. Waiting {:?} before trading...",
                    self.params.pair, price, delay
                );
                self.transition(State::Wait, delay);
            }
            (State::WaitForPrice, Event::Timeout) => {
                error!(
                    "No price for '{}' within {:?}, giving up",
                    self.params.pair, PRICE_UPDATE_TIMEOUT
                );
                self.stop(StopReason::PriceTimeout);
            }
            (State::WaitForPrice, Event::Stop) => {
                info!("Stop waiting for price by user");
                self.stop(StopReason::UserAbort);
            }

            (State::Wait, Event::Timeout) => {
                self.price_start = self.price_last;
                info!("Start trading at {}", self.price_start);
                if self.action_buy().await {
                    self.transition(State::Trading, self.params.trade_period);
                } else {
                    self.stop(StopReason::BuyFailed);
                }
            }
            (State::Wait, Event::PriceUpdated(price)) => self.price_last = price,
            (State::Wait, Event::Stop) => {
                info!("Stop waiting by user");
                self.stop(StopReason::UserAbort);
            }

            (State::Trading, Event::Timeout) => {
                info!("Stop trading by timeout");
                self.close_position().await;
            }
            (State::Trading, Event::PriceUpdated(price)) => {
                self.price_last = price;
                let Some((delta, delta_pct)) = price_delta(self.price_start, price) else {
                    warn!("No usable start price ({}), trigger disabled", self.price_start);
                    return;
                };
                debug!(
                    "price={} ({}) price-delta={} price-delta-percent={:.4}%",
                    price,
                    direction(price, self.price_start),
                    delta,
                    delta_pct
                );
                if delta_pct.abs() > self.params.price_trigger_percent {
                    info!(
                        "Stop trading by price trigger: {:.4}% beyond {}%",
                        delta_pct, self.params.price_trigger_percent
                    );
                    self.close_position().await;
                }
            }
            (State::Trading, Event::Stop) => {
                warn!(
                    "Stop trading by user; the position opened at {} is left as is",
                    self.price_start
                );
                self.stop(StopReason::UserAbort);
            }

            (state, event) => debug!("Ignoring {:?} in {}", event, state),
        }
    }

    async fn close_position(&mut self) {
        if self.action_sell().await {
            info!(
                "Waiting {:?} before trading again...",
                self.params.wait_period
            );
            self.transition(State::Wait, self.params.wait_period);
        } else {
            self.stop(StopReason::SellFailed);
        }
    }

    /// Uniform jitter in `[0, wait_period)`.
    fn settle_delay(&mut self) -> Duration {
        let bound = self.params.wait_period.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.gen_range(0..bound))
    }

    fn transition(&mut self, next: State, timeout: Duration) {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            error!("Cannot arm a {:?} timer for {}", timeout, next);
            self.stop(StopReason::TimerOverflow);
            return;
        };
        debug!("{} -> {} (timeout {:?})", self.state, next, timeout);
        self.state = next;
        self.deadline = deadline;
    }

    fn stop(&mut self, reason: StopReason) {
        match reason {
            StopReason::UserAbort => info!("{} -> Stopped ({:?})", self.state, reason),
            _ => error!("{} -> Stopped ({:?}). Trading halted.", self.state, reason),
        }
        self.state = State::Stopped;
        self.stop_reason = Some(reason);
    }

    async fn action_buy(&self) -> bool {
        match self.place(Side::Buy).await {
            Ok(()) => true,
            Err(e) => {
                error!("Buy {} of '{}' failed: {}", self.params.quantity, self.params.pair, e);
                false
            }
        }
    }

    /// Closes the position, then refreshes the account and reports balance changes.
    async fn action_sell(&mut self) -> bool {
        if let Err(e) = self.place(Side::Sell).await {
            error!("Sell {} of '{}' failed: {}", self.params.quantity, self.params.pair, e);
            return false;
        }

        match self.client.fetch_account().await {
            Ok(account) => {
                self.completed_trades += 1;
                self.report_balances(&account);
                self.account_last = account;
                true
            }
            Err(e) => {
                error!("Account refresh after selling '{}' failed: {}", self.params.pair, e);
                false
            }
        }
    }

    async fn place(&self, side: Side) -> Result<()> {
        let order = self
            .client
            .place_market_order(&self.params.pair, side, self.params.quantity)
            .await?;
        info!(
            "✅ {} {} accepted: order_id={} client_id={}",
            side, order.symbol, order.order_id, order.client_order_id
        );
        Ok(())
    }

    fn report_balances(&self, account: &AccountSnapshot) {
        for asset in [&self.params.settlement_asset, &self.params.symbol] {
            let balance = account.balance(asset);
            info!(
                "Balance {:<6} free={} | since last trade: {} | since start: {}",
                asset,
                balance.free,
                signed(balance_delta(asset, &self.account_last, account)),
                signed(balance_delta(asset, &self.account_start, account))
            );
        }
        info!("Round trips completed: {}", self.completed_trades);
    }
}

fn direction(value: Decimal, reference: Decimal) -> &'static str {
    match value.cmp(&reference) {
        std::cmp::Ordering::Greater => "up",
        std::cmp::Ordering::Less => "down",
        std::cmp::Ordering::Equal => "flat",
    }
}

fn signed(value: Decimal) -> String {
    if value.is_sign_negative() {
        value.to_string()
    } else {
        format!("+{}", value)
    }
}

#[async_trait]
impl Strategy for TradingStateMachine {
    fn name(&self) -> &str {
        "timed-swing"
    }

    async fn on_start(&mut self) {
        self.handle_event(Event::Start).await;
    }

    async fn on_tick(&mut self, tick: &Tick) {
        if !tick.symbol.eq_ignore_ascii_case(&self.params.pair) {
            warn!("Tick for '{}' ignored, trading '{}'", tick.symbol, self.params.pair);
            return;
        }
        self.handle_event(Event::PriceUpdated(tick.last_price)).await;
    }

    async fn on_timeout(&mut self) {
        self.handle_event(Event::Timeout).await;
    }

    async fn on_stop(&mut self) {
        self.handle_event(Event::Stop).await;
    }

    fn deadline(&self) -> Option<Instant> {
        (self.state != State::Stopped).then_some(self.deadline)
    }

    fn is_stopped(&self) -> bool {
        self.state == State::Stopped
    }

    fn failed(&self) -> bool {
        !matches!(self.stop_reason, None | Some(StopReason::UserAbort))
    }
}
