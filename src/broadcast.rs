// src/broadcast.rs
//
// Edge-triggered count transport. The counter publishes only when the
// occupancy count actually changed; this client delivers each update as a
// JSON POST and tracks consecutive delivery failures. Once the configured
// failure limit is reached the send returns an error so the caller can take
// the transport out of service. Restarts belong to process supervision,
// not to the counter.

use crate::types::BroadcastConfig;
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

/// Body of one count update.
#[derive(Debug, Clone, Serialize)]
pub struct CountUpdate {
    /// Correlation id for downstream deduplication.
    pub event_id: String,
    pub board_id: u32,
    pub count: u32,
    pub timestamp_ms: f64,
}

pub struct CountBroadcaster {
    http_client: reqwest::Client,
    url: String,
    board_id: u32,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    total_delivered: u64,
    total_failed: u64,
}

impl CountBroadcaster {
    pub fn new(config: &BroadcastConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            url: config.url.clone(),
            board_id: config.board_id,
            max_consecutive_failures: config.max_consecutive_failures,
            consecutive_failures: 0,
            total_delivered: 0,
            total_failed: 0,
        })
    }

    /// Deliver one count update.
    ///
    /// Individual delivery failures are logged and absorbed; the error
    /// path fires only when `max_consecutive_failures` deliveries in a row
    /// have failed and the transport should be considered down.
    pub async fn publish(&mut self, count: u32, timestamp_ms: f64) -> Result<()> {
        let update = CountUpdate {
            event_id: uuid::Uuid::new_v4().to_string(),
            board_id: self.board_id,
            count,
            timestamp_ms,
        };

        let delivered = match self
            .http_client
            .post(&self.url)
            .json(&update)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!("📡 Count {} delivered ({})", count, update.event_id);
                true
            }
            Ok(response) => {
                warn!(
                    "📡 Count sink returned {} for count {}",
                    response.status(),
                    count
                );
                false
            }
            Err(e) => {
                warn!("📡 Delivery failed for count {}: {}", count, e);
                false
            }
        };

        if delivered {
            self.consecutive_failures = 0;
            self.total_delivered += 1;
            return Ok(());
        }

        self.consecutive_failures += 1;
        self.total_failed += 1;
        if self.consecutive_failures >= self.max_consecutive_failures {
            anyhow::bail!(
                "count sink unreachable: {} consecutive delivery failures",
                self.consecutive_failures
            );
        }
        Ok(())
    }

    pub fn total_delivered(&self) -> u64 {
        self.total_delivered
    }

    pub fn total_failed(&self) -> u64 {
        self.total_failed
    }
}
