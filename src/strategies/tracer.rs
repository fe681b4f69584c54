// src/strategies/tracer.rs
use crate::strategies::traits::Strategy;
use crate::types::Tick;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::info;

/// Observation only: logs every tick against the previous one. Never trades.
pub struct TickerTracer {
    pair: String,
    previous: Option<Tick>,
    ticks_seen: u64,
    stopped: bool,
}

impl TickerTracer {
    pub fn new(pair: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            previous: None,
            ticks_seen: 0,
            stopped: false,
        }
    }

    #[cfg(test)]
    pub fn ticks_seen(&self) -> u64 {
        self.ticks_seen
    }
}

fn marker(current: Decimal, previous: Option<Decimal>) -> &'static str {
    match previous {
        Some(prev) if current > prev => "▲",
        Some(prev) if current < prev => "▼",
        _ => "=",
    }
}

/// One-line summary of a tick with up/down markers versus the previous tick.
pub fn describe(tick: &Tick, previous: Option<&Tick>) -> String {
    format!(
        "'{}' lastPrice={} {} priceChange={} {} priceChangePercent={}% {}",
        tick.symbol,
        tick.last_price,
        marker(tick.last_price, previous.map(|p| p.last_price)),
        tick.price_change,
        marker(tick.price_change, previous.map(|p| p.price_change)),
        tick.price_change_percent,
        marker(tick.price_change_percent, previous.map(|p| p.price_change_percent)),
    )
}

#[async_trait]
impl Strategy for TickerTracer {
    fn name(&self) -> &str {
        "ticker-tracer"
    }

    async fn on_start(&mut self) {
        info!("Tracing ticker for '{}'", self.pair);
    }

    async fn on_tick(&mut self, tick: &Tick) {
        if self.stopped {
            return;
        }
        self.ticks_seen += 1;
        info!("Ticker : {}", describe(tick, self.previous.as_ref()));
        self.previous = Some(tick.clone());
    }

    async fn on_timeout(&mut self) {}

    async fn on_stop(&mut self) {
        if !self.stopped {
            info!("Tracing stopped after {} ticks", self.ticks_seen);
        }
        self.stopped = true;
    }

    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn failed(&self) -> bool {
        false
    }
}
