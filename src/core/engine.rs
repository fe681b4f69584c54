// src/core/engine.rs
use crate::connectors::binance::is_own_order;
use crate::connectors::traits::{ExchangeClient, MarketDataFeed};
use crate::core::retry::BootstrapRetry;
use crate::errors::{Result, TraderError};
use crate::strategies::traits::Strategy;
use crate::types::{AccountSnapshot, Tick};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const ORDER_HISTORY_LIMIT: u16 = 20;

/// Why the service loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    /// Operator asked to stop.
    Stopped,
    /// The strategy stopped on its own after a failure.
    Halted,
    /// The ticker subscription could not be restored.
    FeedLost,
}

/// Fetches the starting account under the bootstrap retry policy and checks
/// that `symbol` is held by the account.
pub async fn fetch_bootstrap_account(
    client: &dyn ExchangeClient,
    symbol: &str,
    retry: &BootstrapRetry,
    cancel: &CancellationToken,
) -> Result<AccountSnapshot> {
    let mut attempts = retry.begin("fetch_account").cancel_on(cancel);
    let account = loop {
        match client.fetch_account().await {
            Ok(account) => {
                attempts.succeeded();
                break account;
            }
            Err(e) => attempts.failed(e).await?,
        }
    };
    account.dump();

    if !account.has_asset(symbol) {
        return Err(TraderError::Validation(format!(
            "symbol '{}' is not available to trade on this account",
            symbol
        )));
    }
    if !account.can_trade {
        warn!("Account reports can_trade=false, orders will likely be rejected");
    }
    Ok(account)
}

/// Single-task service loop: pump the feed, forward ticks, then check the timer.
pub struct TradingEngine<S, F> {
    strategy: S,
    feed: F,
    client: Arc<dyn ExchangeClient>,
    pair: String,
    retry: BootstrapRetry,
    ticker_sender: mpsc::UnboundedSender<Tick>,
    ticker_receiver: mpsc::UnboundedReceiver<Tick>,
    cancel: CancellationToken,
}

impl<S, F> TradingEngine<S, F>
where
    S: Strategy,
    F: MarketDataFeed,
{
    pub fn new(
        strategy: S,
        feed: F,
        client: Arc<dyn ExchangeClient>,
        pair: impl Into<String>,
        retry: BootstrapRetry,
        cancel: CancellationToken,
    ) -> Self {
        let (ticker_sender, ticker_receiver) = mpsc::unbounded_channel();
        Self {
            strategy,
            feed,
            client,
            pair: pair.into(),
            retry,
            ticker_sender,
            ticker_receiver,
            cancel,
        }
    }

    #[cfg(test)]
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Opens the feed and subscribes to the pair's ticker.
    pub async fn connect(&mut self) -> Result<()> {
        self.feed.open().await?;
        self.subscribe().await
    }

    async fn subscribe(&mut self) -> Result<()> {
        let mut attempts = self.retry.begin("subscribe_ticker").cancel_on(&self.cancel);
        loop {
            match self
                .feed
                .subscribe_ticker(&self.pair, self.ticker_sender.clone())
                .await
            {
                Ok(()) => {
                    attempts.succeeded();
                    return Ok(());
                }
                Err(e) => attempts.failed(e).await?,
            }
        }
    }

    pub async fn run(&mut self) -> Result<EngineOutcome> {
        info!(
            "Engine loop running. Strategy: {} Pair: {}",
            self.strategy.name(),
            self.pair
        );
        self.strategy.on_start().await;

        let mut outcome = EngineOutcome::Stopped;
        while !self.cancel.is_cancelled() && !self.strategy.is_stopped() {
            self.feed.service().await;

            // ticks that arrived in this pass go first, then the timer
            while let Ok(tick) = self.ticker_receiver.try_recv() {
                self.strategy.on_tick(&tick).await;
            }
            if let Some(deadline) = self.strategy.deadline() {
                if Instant::now() >= deadline {
                    self.strategy.on_timeout().await;
                }
            }

            if !self.strategy.is_stopped() && !self.feed.is_subscribed(&self.pair) {
                warn!("Ticker subscription for {} lost, re-subscribing", self.pair);
                match self.subscribe().await {
                    Ok(()) => {}
                    Err(TraderError::Cancelled { .. }) => break,
                    Err(e) => {
                        error!("Re-subscribing {} failed: {}", self.pair, e);
                        outcome = EngineOutcome::FeedLost;
                        break;
                    }
                }
            }
        }

        if outcome == EngineOutcome::Stopped && self.strategy.failed() {
            outcome = EngineOutcome::Halted;
        }
        info!("Leaving the service loop ({:?})", outcome);
        self.strategy.on_stop().await;
        self.report_orders().await;
        Ok(outcome)
    }

    async fn report_orders(&self) {
        match self
            .client
            .fetch_order_history(&self.pair, ORDER_HISTORY_LIMIT)
            .await
        {
            Ok(orders) => {
                let own: Vec<_> = orders
                    .iter()
                    .filter(|o| is_own_order(&o.client_order_id))
                    .collect();
                info!("Recent orders placed by this bot on {}: {}", self.pair, own.len());
                for o in own {
                    info!(
                        "  #{} {} {} executed={} quote={} status={}",
                        o.order_id, o.side, o.symbol, o.executed_qty, o.quote_qty, o.status
                    );
                }
            }
            Err(e) => warn!("Order history for {} unavailable: {}", self.pair, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::swing::{State, TradingStateMachine};
    use crate::testing::{params, tick, StubClient, StubFeed};
    use crate::types::Side;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const INTERVAL: Duration = Duration::from_millis(2);

    fn retry() -> BootstrapRetry {
        BootstrapRetry::new(5, Duration::from_millis(1))
    }

    #[derive(Default)]
    struct RecordingStrategy {
        events: Vec<String>,
        deadline: Option<Instant>,
        stopped: bool,
        fail_on_timeout: bool,
        stop_after_ticks: Option<usize>,
    }

    #[async_trait]
    impl Strategy for RecordingStrategy {
        fn name(&self) -> &str {
            "recording"
        }

        async fn on_start(&mut self) {
            self.events.push("start".to_string());
        }

        async fn on_tick(&mut self, tick: &Tick) {
            if self.stopped {
                return;
            }
            self.events.push(format!("tick {}", tick.last_price));
            let ticks = self.events.iter().filter(|e| e.starts_with("tick")).count();
            if self.stop_after_ticks == Some(ticks) {
                self.stopped = true;
            }
        }

        async fn on_timeout(&mut self) {
            self.events.push("timeout".to_string());
            self.deadline = None;
            if self.fail_on_timeout {
                self.stopped = true;
            }
        }

        async fn on_stop(&mut self) {
            self.events.push("stop".to_string());
            self.stopped = true;
        }

        fn deadline(&self) -> Option<Instant> {
            self.deadline
        }

        fn is_stopped(&self) -> bool {
            self.stopped
        }

        fn failed(&self) -> bool {
            self.fail_on_timeout
        }
    }

    async fn engine<S: Strategy>(
        strategy: S,
        feed: &StubFeed,
        client: &StubClient,
        cancel: CancellationToken,
    ) -> TradingEngine<S, StubFeed> {
        let mut engine = TradingEngine::new(
            strategy,
            feed.clone(),
            Arc::new(client.clone()),
            "ETHBNB",
            retry(),
            cancel,
        );
        engine.connect().await.unwrap();
        engine
    }

    fn cancel_after(cancel: &CancellationToken, after: Duration) {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            cancel.cancel();
        });
    }

    #[tokio::test]
    async fn test_bootstrap_account_survives_four_failures() {
        let client = StubClient::new();
        client.fail_accounts(&[true, true, true, true]);
        let account = fetch_bootstrap_account(&client, "ETH", &retry(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(client.account_calls(), 5);
        assert_eq!(account, client.snapshot());
    }

    #[tokio::test]
    async fn test_bootstrap_account_exhausted() {
        let client = StubClient::new();
        client.fail_accounts(&[true; 5]);
        let result =
            fetch_bootstrap_account(&client, "ETH", &retry(), &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(TraderError::BootstrapExhausted { attempts: 5, .. })
        ));
        assert_eq!(client.account_calls(), 5);
        assert!(client.orders().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_unknown_symbol() {
        let client = StubClient::new();
        let result =
            fetch_bootstrap_account(&client, "DOGE", &retry(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(TraderError::Validation(_))));
        // not retried
        assert_eq!(client.account_calls(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_stops_retrying_once_cancelled() {
        let client = StubClient::new();
        client.fail_accounts(&[true; 5]);
        let slow = BootstrapRetry::new(5, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(10));

        let started = std::time::Instant::now();
        let result = fetch_bootstrap_account(&client, "ETH", &slow, &cancel).await;
        assert!(matches!(result, Err(TraderError::Cancelled { .. })));
        assert_eq!(client.account_calls(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_during_resubscribe_is_an_operator_stop() {
        let client = StubClient::new();
        let feed = StubFeed::new(INTERVAL);
        feed.drop_subscription_on(1);
        feed.fail_subscribes(&[false, true, true, true, true, true]);
        let cancel = CancellationToken::new();
        let mut engine = TradingEngine::new(
            RecordingStrategy::default(),
            feed.clone(),
            Arc::new(client.clone()),
            "ETHBNB",
            BootstrapRetry::new(5, Duration::from_secs(60)),
            cancel.clone(),
        );
        engine.connect().await.unwrap();
        cancel_after(&cancel, Duration::from_millis(20));

        assert_eq!(engine.run().await.unwrap(), EngineOutcome::Stopped);
        assert_eq!(feed.subscribes(), 2);
        assert_eq!(engine.strategy().events.last().map(String::as_str), Some("stop"));
    }

    #[tokio::test]
    async fn test_subscribe_retried_then_exhausted() {
        let client = StubClient::new();
        let feed = StubFeed::new(INTERVAL);
        feed.fail_subscribes(&[true, true]);
        engine(RecordingStrategy::default(), &feed, &client, CancellationToken::new()).await;
        assert_eq!(feed.subscribes(), 3);

        let feed = StubFeed::new(INTERVAL);
        feed.fail_subscribes(&[true; 5]);
        let mut engine = TradingEngine::new(
            RecordingStrategy::default(),
            feed.clone(),
            Arc::new(client.clone()),
            "ETHBNB",
            retry(),
            CancellationToken::new(),
        );
        assert!(matches!(
            engine.connect().await,
            Err(TraderError::BootstrapExhausted { .. })
        ));
        assert!(engine.strategy().events.is_empty());
    }

    #[tokio::test]
    async fn test_tick_delivered_before_timeout_in_same_pass() {
        let client = StubClient::new();
        let feed = StubFeed::new(INTERVAL);
        feed.push_tick(1, tick(dec!(100)));
        let strategy = RecordingStrategy {
            deadline: Some(Instant::now()),
            stop_after_ticks: None,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(20));

        let mut engine = engine(strategy, &feed, &client, cancel).await;
        let outcome = engine.run().await.unwrap();
        assert_eq!(outcome, EngineOutcome::Stopped);
        assert_eq!(
            &engine.strategy().events[..3],
            &["start".to_string(), "tick 100".to_string(), "timeout".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cancel_synthesizes_single_stop() {
        let client = StubClient::new();
        let feed = StubFeed::new(INTERVAL);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut engine = engine(RecordingStrategy::default(), &feed, &client, cancel).await;
        assert_eq!(engine.run().await.unwrap(), EngineOutcome::Stopped);
        assert_eq!(engine.strategy().events, vec!["start", "stop"]);
        assert_eq!(feed.services(), 0);
        assert_eq!(client.history_calls(), 1);
    }

    #[tokio::test]
    async fn test_strategy_failure_halts_loop() {
        let client = StubClient::new();
        client.fail_history();
        let feed = StubFeed::new(INTERVAL);
        let strategy = RecordingStrategy {
            deadline: Some(Instant::now()),
            fail_on_timeout: true,
            ..Default::default()
        };
        let mut engine = engine(strategy, &feed, &client, CancellationToken::new()).await;
        assert_eq!(engine.run().await.unwrap(), EngineOutcome::Halted);
        assert_eq!(feed.services(), 1);
    }

    #[tokio::test]
    async fn test_lost_subscription_is_restored() {
        let client = StubClient::new();
        let feed = StubFeed::new(INTERVAL);
        feed.drop_subscription_on(2);
        feed.push_tick(4, tick(dec!(7)));
        let strategy = RecordingStrategy {
            stop_after_ticks: Some(1),
            ..Default::default()
        };
        let mut engine = engine(strategy, &feed, &client, CancellationToken::new()).await;
        let outcome = engine.run().await.unwrap();

        assert_eq!(feed.subscribes(), 2);
        assert_eq!(outcome, EngineOutcome::Stopped);
        assert!(engine.strategy().events.contains(&"tick 7".to_string()));
    }

    #[tokio::test]
    async fn test_unrecoverable_feed_ends_run() {
        let client = StubClient::new();
        let feed = StubFeed::new(INTERVAL);
        feed.drop_subscription_on(1);
        feed.fail_subscribes(&[false, true, true, true, true, true]);
        let mut engine = engine(RecordingStrategy::default(), &feed, &client, CancellationToken::new()).await;
        assert_eq!(engine.run().await.unwrap(), EngineOutcome::FeedLost);
        assert_eq!(engine.strategy().events.last().map(String::as_str), Some("stop"));
    }

    #[tokio::test]
    async fn test_swing_round_trip_through_engine() {
        let client = StubClient::new();
        let feed = StubFeed::new(INTERVAL);
        feed.push_tick(1, tick(dec!(100.0)));
        // each pass takes at least INTERVAL, so by pass 15 the <20ms settle delay is over
        feed.push_tick(15, tick(dec!(100.30)));

        let mut p = params();
        p.wait_period = Duration::from_millis(20);
        p.trade_period = Duration::from_secs(5);
        let account = fetch_bootstrap_account(&client, &p.symbol, &retry(), &CancellationToken::new())
            .await
            .unwrap();
        let machine = TradingStateMachine::with_rng(
            p,
            Arc::new(client.clone()),
            account,
            StdRng::seed_from_u64(1),
        );

        let cancel = CancellationToken::new();
        let mut engine = engine(machine, &feed, &client, cancel.clone()).await;
        let handle = tokio::spawn(async move {
            let outcome = engine.run().await;
            (outcome, engine)
        });
        for _ in 0..1000 {
            if client.orders().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        let (outcome, engine) = handle.await.unwrap();

        assert_eq!(outcome.unwrap(), EngineOutcome::Stopped);
        assert_eq!(engine.strategy().state(), State::Stopped);
        let sides: Vec<Side> = client.orders().iter().map(|o| o.side).collect();
        assert!(sides.len() >= 2, "orders: {:?}", sides);
        assert_eq!(&sides[..2], &[Side::Buy, Side::Sell]);
        assert!(engine.strategy().completed_trades() >= 1);
    }
}
