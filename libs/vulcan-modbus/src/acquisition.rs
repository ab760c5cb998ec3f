//! Acquisition Loop
//!
//! Samples pressure and temperature once per period and hands each
//! [`Reading`] to a [`ReadingSink`]. A failed read, decode or submit is logged
//! and the tick skipped; nothing short of `stop()` ends the loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SharedClock;
use errors::VulcanResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{decode_float32_words, decode_single, IntFormat, WordOrder};
use crate::link::LinkSession;

/// Controller register layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterMap {
    /// D0
    pub pressure_address: u16,
    pub pressure_format: IntFormat,
    /// D4, two registers
    pub temperature_address: u16,
    pub temperature_word_order: WordOrder,
    /// M0, asserted at connect time
    pub enable_coil: u16,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            pressure_address: 4096,
            pressure_format: IntFormat::Uint16,
            temperature_address: 4100,
            temperature_word_order: WordOrder::LowWordFirst,
            enable_coil: 2048,
        }
    }
}

/// One sample of the press
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temperature: f64,
    pub pressure: i32,
    pub timestamp: DateTime<Utc>,
}

/// Ingestion collaborator
#[async_trait]
pub trait ReadingSink: Send + Sync + 'static {
    async fn submit(&self, reading: &Reading) -> VulcanResult<()>;
}

struct Sampler {
    session: Arc<LinkSession>,
    registers: RegisterMap,
    sink: Arc<dyn ReadingSink>,
    clock: SharedClock,
}

impl Sampler {
    async fn sample(&self) -> VulcanResult<Reading> {
        let map = &self.registers;
        let pressure_words = self.session.read_registers(map.pressure_address, 1).await?;
        let temperature_words = self
            .session
            .read_registers(map.temperature_address, 2)
            .await?;

        let pressure = decode_single(&pressure_words, map.pressure_format)?;
        let temperature = decode_float32_words(&temperature_words, map.temperature_word_order)?;

        Ok(Reading {
            temperature,
            pressure,
            timestamp: self.clock.now(),
        })
    }

    async fn tick(&self) -> VulcanResult<Option<Reading>> {
        if !self.session.is_connected() {
            return Ok(None);
        }
        let reading = self.sample().await?;
        self.sink.submit(&reading).await?;
        Ok(Some(reading))
    }

    async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {},
            }

            match self.tick().await {
                Ok(Some(reading)) => debug!(
                    "Reading: temperature={:.2} pressure={}",
                    reading.temperature, reading.pressure
                ),
                Ok(None) => debug!("Link down, tick skipped"),
                Err(e) => warn!("Acquisition tick failed: {}", e),
            }
        }
    }
}

pub struct AcquisitionLoop {
    sampler: Arc<Sampler>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl AcquisitionLoop {
    pub fn new(
        session: Arc<LinkSession>,
        registers: RegisterMap,
        sink: Arc<dyn ReadingSink>,
        clock: SharedClock,
    ) -> Self {
        Self {
            sampler: Arc::new(Sampler {
                session,
                registers,
                sink,
                clock,
            }),
            task: Mutex::new(None),
        }
    }

    /// Run a single tick now
    ///
    /// `Ok(None)` means the link was down and nothing was read.
    pub async fn tick(&self) -> VulcanResult<Option<Reading>> {
        self.sampler.tick().await
    }

    /// Spawn the periodic task; returns false if it is already running
    pub fn start(&self, period: Duration) -> bool {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("Acquisition loop already running");
            return false;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.sampler.clone().run(period, cancel.clone()));
        *task = Some((cancel, handle));
        info!("Acquisition loop started, period {:?}", period);
        true
    }

    /// Stop the periodic task, letting an in-flight tick finish
    pub async fn stop(&self) {
        let running = self.task.lock().take();
        if let Some((cancel, handle)) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!("Acquisition task ended abnormally: {}", e);
            }
            info!("Acquisition loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }
}
