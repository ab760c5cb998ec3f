//! Modbus transport abstraction
//!
//! [`ModbusTransport`] is the only seam that touches the network, so link and
//! acquisition logic run against scripted transports in tests.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;
use tracing::debug;

use crate::error::LinkError;

/// Raw register/coil access to one controller
#[async_trait]
pub trait ModbusTransport: Send + 'static {
    /// Open the connection and select the unit address
    async fn connect(&mut self) -> Result<(), LinkError>;

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, LinkError>;

    async fn write_single_coil(&mut self, address: u16, value: bool) -> Result<(), LinkError>;

    /// Drop the connection; later calls fail until `connect` succeeds again
    async fn disconnect(&mut self);

    /// Human-readable peer, for logs
    fn peer(&self) -> String;
}

/// TCP endpoint of the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpEndpoint {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// Applies to connect and to every request
    pub timeout_ms: u64,
}

impl Default for TcpEndpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 1,
            timeout_ms: 3000,
        }
    }
}

/// tokio-modbus TCP client
pub struct TcpTransport {
    endpoint: TcpEndpoint,
    ctx: Option<Context>,
}

impl TcpTransport {
    pub fn new(endpoint: TcpEndpoint) -> Self {
        Self {
            endpoint,
            ctx: None,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint.timeout_ms)
    }

    // Borrows only the endpoint: `Context` is not `Sync`, so holding
    // `&self` across the await would make the future non-`Send`.
    async fn with_timeout<T, F>(endpoint: &TcpEndpoint, fut: F) -> Result<T, LinkError>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        match timeout(Duration::from_millis(endpoint.timeout_ms), fut).await {
            Ok(result) => result.map_err(LinkError::from),
            Err(_) => Err(LinkError::Timeout {
                addr: endpoint_peer(endpoint),
                timeout_ms: endpoint.timeout_ms,
            }),
        }
    }
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    async fn connect(&mut self) -> Result<(), LinkError> {
        self.ctx = None;

        let peer = self.peer();
        let socket_addr = Self::with_timeout(&self.endpoint, tokio::net::lookup_host(peer.clone()))
            .await?
            .next()
            .ok_or_else(|| LinkError::Address(peer.clone()))?;

        debug!("Connecting to Modbus TCP server at {}", socket_addr);
        let mut ctx = Self::with_timeout(&self.endpoint, tcp::connect(socket_addr)).await?;
        ctx.set_slave(Slave(self.endpoint.unit_id));
        self.ctx = Some(ctx);
        Ok(())
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, LinkError> {
        let timeout_ms = self.endpoint.timeout_ms;
        let peer = self.peer();
        let ctx = self.ctx.as_mut().ok_or(LinkError::NotConnected)?;
        match timeout(
            Duration::from_millis(timeout_ms),
            ctx.read_holding_registers(address, count),
        )
        .await
        {
            Ok(result) => result.map_err(LinkError::from),
            Err(_) => Err(LinkError::Timeout {
                addr: peer,
                timeout_ms,
            }),
        }
    }

    async fn write_single_coil(&mut self, address: u16, value: bool) -> Result<(), LinkError> {
        let timeout_ms = self.endpoint.timeout_ms;
        let peer = self.peer();
        let ctx = self.ctx.as_mut().ok_or(LinkError::NotConnected)?;
        match timeout(
            Duration::from_millis(timeout_ms),
            ctx.write_single_coil(address, value),
        )
        .await
        {
            Ok(result) => result.map_err(LinkError::from),
            Err(_) => Err(LinkError::Timeout {
                addr: peer,
                timeout_ms,
            }),
        }
    }

    async fn disconnect(&mut self) {
        if self.ctx.take().is_some() {
            debug!("Disconnected from Modbus TCP server {}", self.peer());
        }
    }

    fn peer(&self) -> String {
        endpoint_peer(&self.endpoint)
    }
}

fn endpoint_peer(endpoint: &TcpEndpoint) -> String {
    format!("{}:{}", endpoint.host, endpoint.port)
}
