//! Link Session
//!
//! Owns the single connection to the controller. State moves
//! `Disconnected -> Connecting -> Connected` and drops back to `Disconnected`
//! on any I/O error. Requests are serialized by an async mutex around the
//! transport. Reconnection is the job of [`run_supervisor`], which retries
//! forever with a fixed delay.

use std::sync::Arc;
use std::time::Duration;

use common::ReconnectHelper;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::transport::ModbusTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Diagnostic counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub connect_attempts: u64,
    pub successful_connects: u64,
    pub read_failures: u64,
    pub write_failures: u64,
}

pub struct LinkSession {
    transport: AsyncMutex<Box<dyn ModbusTransport>>,
    /// Coil asserted right after connecting to put the controller in run mode
    enable_coil: Option<u16>,
    state: watch::Sender<LinkState>,
    stats: Mutex<LinkStats>,
}

impl LinkSession {
    pub fn new<T: ModbusTransport>(transport: T, enable_coil: Option<u16>) -> Self {
        let (state, _) = watch::channel(LinkState::Disconnected);
        Self {
            transport: AsyncMutex::new(Box::new(transport)),
            enable_coil,
            state,
            stats: Mutex::new(LinkStats::default()),
        }
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats.lock().clone()
    }

    fn set_state(&self, next: LinkState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                debug!("Link state {:?} -> {:?}", current, next);
                *current = next;
                true
            }
        });
    }

    /// Open the transport and run the enable-coil handshake
    ///
    /// On failure the session is left `Disconnected`; retrying is up to the
    /// caller.
    pub async fn connect(&self) -> Result<(), LinkError> {
        let mut transport = self.transport.lock().await;
        self.stats.lock().connect_attempts += 1;
        self.set_state(LinkState::Connecting);

        let result = async {
            transport.connect().await?;
            if let Some(coil) = self.enable_coil {
                transport.write_single_coil(coil, true).await?;
            }
            Ok::<(), LinkError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.stats.lock().successful_connects += 1;
                self.set_state(LinkState::Connected);
                info!("Link connected to {}", transport.peer());
                Ok(())
            },
            Err(e) => {
                transport.disconnect().await;
                self.set_state(LinkState::Disconnected);
                Err(e)
            },
        }
    }

    /// Read `count` holding registers starting at `address`
    ///
    /// Fails without retrying; a transport error drops the link.
    pub async fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>, LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        let mut transport = self.transport.lock().await;
        match transport.read_holding_registers(address, count).await {
            Ok(words) => Ok(words),
            Err(e) => {
                self.stats.lock().read_failures += 1;
                warn!("Read of {} register(s) at {} failed: {}", count, address, e);
                transport.disconnect().await;
                self.set_state(LinkState::Disconnected);
                Err(e)
            },
        }
    }

    pub async fn write_coil(&self, address: u16, value: bool) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        let mut transport = self.transport.lock().await;
        match transport.write_single_coil(address, value).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.stats.lock().write_failures += 1;
                warn!("Write of coil {} failed: {}", address, e);
                transport.disconnect().await;
                self.set_state(LinkState::Disconnected);
                Err(e)
            },
        }
    }

    pub async fn disconnect(&self) {
        self.transport.lock().await.disconnect().await;
        self.set_state(LinkState::Disconnected);
    }
}

/// Keep the link up until `cancel` fires
///
/// Connects immediately, then after every failure waits `retry_delay` and
/// tries again, with no attempt limit. Once connected it sleeps until the
/// session reports `Disconnected` and starts over.
pub async fn run_supervisor(
    session: Arc<LinkSession>,
    retry_delay: Duration,
    cancel: CancellationToken,
) {
    let mut helper = ReconnectHelper::new(retry_delay);
    let mut state_rx = session.subscribe();

    loop {
        if session.is_connected() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                dropped = async {
                    state_rx.wait_for(|s| *s == LinkState::Disconnected).await.is_ok()
                } => {
                    if !dropped {
                        break;
                    }
                },
            }
            warn!("Link lost, reconnecting");
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = helper.execute_reconnect(|| session.connect()) => {
                if let Err(e) = result {
                    debug!("Link still down after {} attempt(s): {}", helper.current_attempt(), e);
                }
            },
        }
    }

    session.disconnect().await;
    info!("Link supervisor stopped");
}
