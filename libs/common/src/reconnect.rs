//! Reconnection helper
//!
//! Retries a connect function forever with a constant delay between
//! attempts. The first attempt of a series runs immediately.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ReconnectError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

#[derive(Debug)]
pub struct ReconnectHelper {
    delay: Duration,
    current_attempt: u32,
}

impl ReconnectHelper {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            current_attempt: 0,
        }
    }

    /// Attempts made in the current series; 0 once connected
    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Run one attempt, sleeping first unless it is the first of a series
    pub async fn execute_reconnect<F, Fut, E>(
        &mut self,
        mut connect_fn: F,
    ) -> Result<(), ReconnectError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        self.current_attempt = self.current_attempt.saturating_add(1);

        if self.current_attempt > 1 {
            debug!(
                "Waiting {:?} before attempt {}",
                self.delay, self.current_attempt
            );
            tokio::time::sleep(self.delay).await;
        }

        match connect_fn().await {
            Ok(()) => {
                info!("Connected after {} attempt(s)", self.current_attempt);
                self.current_attempt = 0;
                Ok(())
            },
            Err(e) => {
                warn!("Connect attempt {} failed: {}", self.current_attempt, e);
                Err(ReconnectError::ConnectionFailed(e.to_string()))
            },
        }
    }
}
