//! Typed error kinds for the engine (§7) and the HTTP mapping they carry.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Every error kind the engine can return, grouped per SPEC_FULL.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GameError {
    // Validation
    #[error("name required")]
    NameRequired,
    #[error("invalid player_id")]
    InvalidPlayerId,
    #[error("invalid order_type")]
    InvalidOrderType,
    #[error("invalid suit")]
    InvalidSuit,
    #[error("invalid price")]
    InvalidPrice,
    #[error("invalid cancel threshold")]
    InvalidCancelThreshold,

    // Lifecycle
    #[error("cannot join")]
    CannotJoin,
    #[error("game full")]
    GameFull,
    #[error("trading not active")]
    TradingNotActive,
    #[error("round ended")]
    RoundEnded,

    // Business
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("not enough cards")]
    NotEnoughCards,
    #[error("duplicate order")]
    DuplicateOrder,
    #[error("self trade")]
    SelfTrade,
}

impl GameError {
    /// The kebab-case error kind returned over the wire.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::NameRequired => "name-required",
            GameError::InvalidPlayerId => "invalid-player-id",
            GameError::InvalidOrderType => "invalid-order-type",
            GameError::InvalidSuit => "invalid-suit",
            GameError::InvalidPrice => "invalid-price",
            GameError::InvalidCancelThreshold => "invalid-cancel-threshold",
            GameError::CannotJoin => "cannot-join",
            GameError::GameFull => "game-full",
            GameError::TradingNotActive => "trading-not-active",
            GameError::RoundEnded => "round-ended",
            GameError::InsufficientFunds => "insufficient-funds",
            GameError::NotEnoughCards => "not-enough-cards",
            GameError::DuplicateOrder => "duplicate-order",
            GameError::SelfTrade => "self-trade",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Error envelope returned by every 400 response. Success responses are the
/// literal JSON shapes from SPEC_FULL.md §6, not wrapped in this envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub error: ApiError,
}

/// HTTP-facing application error. All `GameError` variants map to 400 per
/// §7; `AppError::internal` is reserved for sink/config failures that are
/// never supposed to surface to a well-behaved client.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn internal(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal-error", message)
    }
}

impl From<GameError> for AppError {
    fn from(err: GameError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.code(), &err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            success: false,
            error: ApiError {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}
