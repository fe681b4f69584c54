// src/strategies/traits.rs
use crate::types::Tick;
use async_trait::async_trait;
use tokio::time::Instant;

/// Event sink driven by the engine. Calls are strictly serialized.
#[async_trait]
pub trait Strategy: Send {
    fn name(&self) -> &str;

    async fn on_start(&mut self);

    async fn on_tick(&mut self, tick: &Tick);

    async fn on_timeout(&mut self);

    async fn on_stop(&mut self);

    /// When the engine must next call `on_timeout`. `None` means no timer is armed.
    fn deadline(&self) -> Option<Instant>;

    fn is_stopped(&self) -> bool;

    /// Stopped on its own because of a failure or an abandoned wait.
    fn failed(&self) -> bool;
}
