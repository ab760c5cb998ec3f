//! HTTP ingestion sink
//!
//! Posts each reading as `{temperature, pressure, timestamp}` to the backend,
//! which stores it and pushes it to dashboards.

use std::time::Duration;

use async_trait::async_trait;
use errors::{VulcanError, VulcanResult};
use tracing::trace;
use vulcan_modbus::{Reading, ReadingSink};

use crate::config::IngestConfig;

pub struct HttpReadingSink {
    client: reqwest::Client,
    url: String,
}

impl HttpReadingSink {
    pub fn new(config: &IngestConfig) -> VulcanResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| VulcanError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl ReadingSink for HttpReadingSink {
    async fn submit(&self, reading: &Reading) -> VulcanResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(reading)
            .send()
            .await
            .map_err(|e| VulcanError::Delivery(format!("POST {}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VulcanError::Delivery(format!(
                "POST {} returned {}",
                self.url, status
            )));
        }
        trace!("Reading delivered to {}", self.url);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one request with `status_line`, returning the raw request text
    async fn one_shot_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api/data", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut request = String::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.push_str(&String::from_utf8_lossy(&buf[..n]));
                if n == 0 || request.ends_with('}') {
                    break;
                }
            }
            let response = format!("{}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status_line);
            socket.write_all(response.as_bytes()).await.unwrap();
            request
        });
        (url, handle)
    }

    fn reading() -> Reading {
        Reading {
            temperature: 158.25,
            pressure: 142,
            timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_posts_reading_json() {
        let (url, server) = one_shot_server("HTTP/1.1 200 OK").await;
        let sink = HttpReadingSink::new(&IngestConfig {
            url,
            timeout_ms: 2000,
        })
        .unwrap();

        sink.submit(&reading()).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/data"));
        assert!(request.contains("\"temperature\":158.25"));
        assert!(request.contains("\"pressure\":142"));
        assert!(request.contains("\"timestamp\":\"2023-11-14T22:13:20Z\""));
    }

    #[tokio::test]
    async fn test_non_success_status_is_delivery_error() {
        let (url, server) = one_shot_server("HTTP/1.1 503 Service Unavailable").await;
        let sink = HttpReadingSink::new(&IngestConfig {
            url,
            timeout_ms: 2000,
        })
        .unwrap();

        let err = sink.submit(&reading()).await.unwrap_err();
        assert!(matches!(err, VulcanError::Delivery(_)));
        server.await.unwrap();
    }
}
