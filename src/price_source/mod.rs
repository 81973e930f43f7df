//! Current price of the tracked asset.

pub mod binance;

pub use binance::BinanceTicker;

use crate::error::AppResult;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Supplies the latest price on demand. No caching: every call is a fresh
/// fetch.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_price(&self) -> AppResult<Decimal>;
}
