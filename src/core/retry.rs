// src/core/retry.rs
use crate::errors::{Result, TraderError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fixed-delay, bounded retry for the one-time bootstrap calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl BootstrapRetry {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Starts counting attempts for one operation.
    ///
    /// ```ignore
    /// let mut attempts = retry.begin("fetch_account");
    /// let account = loop {
    ///     match client.fetch_account().await {
    ///         Ok(account) => break account,
    ///         Err(e) => attempts.failed(e).await?,
    ///     }
    /// };
    /// ```
    pub fn begin(&self, operation: &str) -> RetryAttempts {
        RetryAttempts {
            operation: operation.to_string(),
            max: self.attempts,
            left: self.attempts,
            delay: self.delay,
            cancel: None,
        }
    }
}

#[derive(Debug)]
pub struct RetryAttempts {
    operation: String,
    max: u32,
    left: u32,
    delay: Duration,
    cancel: Option<CancellationToken>,
}

impl RetryAttempts {
    /// Gives up with `Cancelled` as soon as `cancel` fires, instead of
    /// sleeping out the remaining attempts.
    pub fn cancel_on(mut self, cancel: &CancellationToken) -> Self {
        self.cancel = Some(cancel.clone());
        self
    }

    fn cancelled(&self) -> TraderError {
        warn!("{} abandoned, shutdown requested", self.operation);
        TraderError::Cancelled {
            operation: self.operation.clone(),
        }
    }

    /// Records a failed attempt. Sleeps and returns `Ok` while attempts
    /// remain, otherwise returns `BootstrapExhausted`.
    pub async fn failed(&mut self, err: TraderError) -> Result<()> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(self.cancelled());
        }
        self.left = self.left.saturating_sub(1);
        if self.left == 0 {
            error!(
                "{} failed: {}. No attempts left ({} made).",
                self.operation, err, self.max
            );
            return Err(TraderError::BootstrapExhausted {
                operation: self.operation.clone(),
                attempts: self.max,
            });
        }

        error!(
            "{} failed: {}. Next attempt in {:?}, {} attempts left.",
            self.operation, err, self.delay, self.left
        );
        match &self.cancel {
            Some(cancel) => {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => Ok(()),
                    _ = cancel.cancelled() => Err(self.cancelled()),
                }
            }
            None => {
                tokio::time::sleep(self.delay).await;
                Ok(())
            }
        }
    }

    pub fn used(&self) -> u32 {
        self.max - self.left
    }

    pub fn succeeded(&self) {
        if self.left < self.max {
            info!(
                "{} succeeded after {} failed attempt(s)",
                self.operation,
                self.used()
            );
        }
    }
}
