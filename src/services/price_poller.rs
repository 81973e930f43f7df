use crate::price_source::PriceSource;
use crate::websocket::WebSocketServer;
use anyhow::Context;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time;
use tracing::{info, warn};

/// Polls the price source and pushes changes to `ticker` subscribers
pub struct PricePoller {
    prices: Arc<dyn PriceSource>,
    ws_server: Arc<WebSocketServer>,
    poll_interval: Duration,
    last_price: RwLock<Option<Decimal>>,
}

impl PricePoller {
    /// Create a new price poller
    pub fn new(prices: Arc<dyn PriceSource>, ws_server: Arc<WebSocketServer>) -> Self {
        Self {
            prices,
            ws_server,
            poll_interval: Duration::from_secs(5), // Default: 5 seconds
            last_price: RwLock::new(None),
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start polling
    pub async fn start(self) {
        let mut interval = time::interval(self.poll_interval);
        info!("Price poller started, polling every {:?}", self.poll_interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.poll_once().await {
                warn!("Price poll failed: {:#}", e);
            }
        }
    }

    /// Fetch once and broadcast if the price moved. Returns whether a
    /// broadcast went out.
    pub async fn poll_once(&self) -> anyhow::Result<bool> {
        let price = self
            .prices
            .get_price()
            .await
            .context("fetching ticker price")?;

        {
            let mut last = self.last_price.write().await;
            if *last == Some(price) {
                return Ok(false);
            }
            *last = Some(price);
        }

        self.ws_server.broadcast_price_update(price).await;
        Ok(true)
    }
}
