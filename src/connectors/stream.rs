// src/connectors/stream.rs
use crate::connectors::messages::parse_ticker;
use crate::connectors::traits::MarketDataFeed;
use crate::errors::{Result, TraderError};
use crate::types::Tick;
use async_trait::async_trait;
use futures_util::{FutureExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Stream path for a pair's 24h ticker.
pub fn ticker_stream_path(pair: &str) -> String {
    format!("/ws/{}@ticker", pair.to_lowercase())
}

struct Subscription {
    pair: String,
    stream: WsStream,
    sender: mpsc::UnboundedSender<Tick>,
}

/// Ticker feed over one websocket per subscription. Owns the sockets; never spawns tasks.
pub struct BinanceStream {
    ws_url: String,
    base_url: Option<Url>,
    service_interval: Duration,
    subscriptions: Vec<Subscription>,
}

impl BinanceStream {
    pub fn new(ws_url: impl Into<String>, service_interval: Duration) -> Self {
        Self {
            ws_url: ws_url.into(),
            base_url: None,
            service_interval,
            subscriptions: Vec::new(),
        }
    }
}

/// Feeds one frame to the subscriber. Returns false when the socket should be dropped.
fn dispatch(sub: &Subscription, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            match parse_ticker(&text) {
                Ok(tick) => {
                    if sub.sender.send(tick).is_err() {
                        warn!("Ticker consumer for {} is gone", sub.pair);
                    }
                }
                // dropped, the feed keeps going
                Err(e) => error!("{}: {} '{}'", sub.pair, e, text),
            }
            true
        }
        Message::Close(frame) => {
            info!("WebSocket for {} closed by peer: {:?}", sub.pair, frame);
            false
        }
        _ => true,
    }
}

#[async_trait]
impl MarketDataFeed for BinanceStream {
    async fn open(&mut self) -> Result<()> {
        let url = Url::parse(&self.ws_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TraderError::Validation(format!(
                "websocket url must be ws:// or wss://, got '{}'",
                self.ws_url
            )));
        }
        info!("Market data feed ready at {}", url);
        self.base_url = Some(url);
        Ok(())
    }

    async fn subscribe_ticker(
        &mut self,
        pair: &str,
        sender: mpsc::UnboundedSender<Tick>,
    ) -> Result<()> {
        let base = self.base_url.as_ref().ok_or_else(|| {
            TraderError::Validation("feed must be opened before subscribing".to_string())
        })?;
        let url = base.join(&ticker_stream_path(pair))?;

        info!("Subscribing to {}", url);
        let (stream, _) = connect_async(url.as_str()).await?;
        info!("WebSocket connected for {}", pair);

        self.subscriptions.push(Subscription {
            pair: pair.to_string(),
            stream,
            sender,
        });
        Ok(())
    }

    async fn service(&mut self) {
        let deadline = Instant::now() + self.service_interval;
        if self.subscriptions.is_empty() {
            tokio::time::sleep_until(deadline).await;
            return;
        }

        let mut closed = Vec::new();
        for (idx, sub) in self.subscriptions.iter_mut().enumerate() {
            let mut next = match timeout_at(deadline, sub.stream.next()).await {
                Err(_) => continue, // idle for the whole interval
                Ok(frame) => frame,
            };
            loop {
                let keep = match next {
                    Some(Ok(message)) => dispatch(sub, message),
                    Some(Err(e)) => {
                        error!("WebSocket error for {}: {}", sub.pair, e);
                        false
                    }
                    None => false,
                };
                if !keep {
                    closed.push(idx);
                    break;
                }
                // drain frames that are already buffered, without waiting
                match sub.stream.next().now_or_never() {
                    Some(frame) => next = frame,
                    None => break,
                }
            }
        }

        for idx in closed.into_iter().rev() {
            let sub = self.subscriptions.remove(idx);
            warn!("Subscription for {} removed", sub.pair);
        }
    }

    fn is_subscribed(&self, pair: &str) -> bool {
        self.subscriptions.iter().any(|s| s.pair == pair)
    }
}
