//! Binance spot ticker client.

use super::PriceSource;
use crate::config::TickerConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;

/// Body of `GET /api/v3/ticker/price?symbol=...`
#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    symbol: Option<String>,
    price: String,
}

/// Price source backed by the Binance public ticker endpoint
pub struct BinanceTicker {
    client: Client,
    url: String,
}

impl BinanceTicker {
    pub fn new(config: &TickerConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build ticker client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Parse a ticker body into a strictly positive price
fn parse_ticker(body: &str) -> AppResult<Decimal> {
    let ticker: TickerResponse = serde_json::from_str(body)
        .map_err(|e| AppError::ExternalService(format!("Malformed ticker response: {}", e)))?;

    let price = Decimal::from_str(ticker.price.trim()).map_err(|e| {
        AppError::ExternalService(format!("Invalid ticker price {:?}: {}", ticker.price, e))
    })?;

    if price <= Decimal::ZERO {
        return Err(AppError::ExternalService(format!(
            "Non-positive ticker price {} for {}",
            price,
            ticker.symbol.as_deref().unwrap_or("unknown symbol")
        )));
    }

    Ok(price)
}

#[async_trait]
impl PriceSource for BinanceTicker {
    async fn get_price(&self) -> AppResult<Decimal> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Ticker request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalService(format!(
                "Ticker responded with {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::ExternalService(format!("Failed to read ticker body: {}", e)))?;

        let price = parse_ticker(&body)?;
        debug!("Fetched ticker price {}", price);
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ticker() {
        let price = parse_ticker(r#"{"symbol":"BTCUSDT","price":"67123.45000000"}"#).unwrap();
        assert_eq!(price, Decimal::new(6712345, 2));
    }

    #[test]
    fn test_parse_ticker_rejects_garbage() {
        assert!(matches!(
            parse_ticker(r#"{"symbol":"BTCUSDT","price":"n/a"}"#),
            Err(AppError::ExternalService(_))
        ));
        assert!(matches!(
            parse_ticker(r#"{"code":-1121,"msg":"Invalid symbol."}"#),
            Err(AppError::ExternalService(_))
        ));
        assert!(matches!(
            parse_ticker(r#"{"symbol":"BTCUSDT","price":"0.00000000"}"#),
            Err(AppError::ExternalService(_))
        ));
    }

    #[test]
    fn test_ticker_uses_configured_url() {
        let config = TickerConfig {
            url: "http://localhost:9999/ticker".to_string(),
            ..TickerConfig::default()
        };
        let ticker = BinanceTicker::new(&config).unwrap();
        assert_eq!(ticker.url(), "http://localhost:9999/ticker");
    }
}
