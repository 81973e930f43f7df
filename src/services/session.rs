//! Stable player-session contract for transport bindings.
//!
//! Every operation returns `Ok(ApiResponse)` for both success and domain
//! failures (bad input, unknown player, state conflicts). Only
//! infrastructure failures come back as `Err`.

use crate::error::AppResult;
use crate::models::{Guess, Player};
use crate::services::GuessEngine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Uniform `{data, error}` result shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Asset price as it appears on the wire: a plain JSON number
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(#[serde(with = "rust_decimal::serde::float")] pub Decimal);

fn capture<T>(operation: &str, result: AppResult<T>) -> AppResult<ApiResponse<T>> {
    match result {
        Ok(data) => Ok(ApiResponse::data(data)),
        Err(err) if err.is_domain() => Ok(ApiResponse::error(err.to_string())),
        Err(err) => {
            error!("{} failed: {}", operation, err);
            Err(err)
        }
    }
}

/// Thin facade over the guess engine
pub struct SessionService {
    engine: Arc<GuessEngine>,
}

impl SessionService {
    pub fn new(engine: Arc<GuessEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<GuessEngine> {
        &self.engine
    }

    pub async fn create_player(&self) -> AppResult<ApiResponse<Player>> {
        capture("create_player", self.engine.create_player().await)
    }

    /// `data` is `null` for an unknown player
    pub async fn get_player(&self, player_id: &str) -> AppResult<ApiResponse<Option<Player>>> {
        capture("get_player", self.engine.get_player(player_id).await)
    }

    pub async fn make_guess(
        &self,
        player_id: &str,
        direction: &str,
    ) -> AppResult<ApiResponse<Guess>> {
        let result = self.engine.make_guess(player_id, direction).await;
        capture("make_guess", result.map(Guess::Pending))
    }

    pub async fn resolve_guess(&self, player_id: &str) -> AppResult<ApiResponse<Guess>> {
        let result = self.engine.resolve_guess(player_id).await;
        capture("resolve_guess", result.map(Guess::Resolved))
    }

    pub async fn get_price(&self) -> AppResult<ApiResponse<Price>> {
        capture("get_price", self.engine.get_price().await.map(Price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(ApiResponse::data(Price(Decimal::new(50000, 0)))).unwrap();
        assert_eq!(ok, serde_json::json!({"data": 50000.0, "error": null}));

        let err = serde_json::to_value(ApiResponse::<Player>::error("missing playerId")).unwrap();
        assert_eq!(err, serde_json::json!({"data": null, "error": "missing playerId"}));
    }

    #[test]
    fn test_capture_splits_domain_and_infra() {
        let domain = capture::<()>("op", Err(AppError::Conflict("cooldown not passed".into())));
        assert_eq!(
            domain.unwrap(),
            ApiResponse::error("cooldown not passed".to_string())
        );

        let infra = capture::<()>("op", Err(AppError::ExternalService("down".into())));
        assert!(infra.is_err());
    }
}
