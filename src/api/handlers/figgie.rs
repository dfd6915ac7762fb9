//! Marketplace HTTP handlers (§6). Success bodies are the literal JSON
//! shapes SPEC_FULL.md names; only error paths go through `AppError`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, GameError};
use crate::models::{GameState, Snapshot, Trade};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub player_id: String,
}

pub async fn join(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    let mut game = state.game.lock();
    let player_id = game.add_player(&req.name)?;
    tracing::info!(player_id, "player joined");
    Ok(Json(JoinResponse { player_id }))
}

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub player_id: String,
}

pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StateQuery>,
) -> Result<Json<Snapshot>, AppError> {
    let mut game = state.game.lock();
    let snapshot = game.get_state(&query.player_id)?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action_type", rename_all = "lowercase")]
pub enum ActionRequest {
    Order {
        player_id: String,
        order_type: String,
        suit: String,
        price: i64,
    },
    Cancel {
        player_id: String,
        order_type: String,
        suit: String,
        price: i64,
    },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ActionResponse {
    Order {
        success: bool,
        order_id: String,
    },
    Trade {
        success: bool,
        trade: Trade,
    },
    Cancel {
        success: bool,
        canceled: Vec<String>,
    },
}

pub async fn action(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let mut game = state.game.lock();

    // The "trading not active" gate is checked once here, at the dispatch
    // boundary, before any engine method runs (matches the upstream HTTP
    // layer, not the engine's own time gate).
    if game.state() != GameState::Trading {
        return Err(GameError::TradingNotActive.into());
    }

    match req {
        ActionRequest::Order {
            player_id,
            order_type,
            suit,
            price,
        } => {
            let outcome = game.place_order(&player_id, &order_type, &suit, price)?;
            let response = match outcome {
                crate::services::game::PlaceOutcome::Resting { order_id } => {
                    ActionResponse::Order {
                        success: true,
                        order_id,
                    }
                }
                crate::services::game::PlaceOutcome::Trade(trade) => {
                    ActionResponse::Trade {
                        success: true,
                        trade,
                    }
                }
            };
            Ok(Json(response))
        }
        ActionRequest::Cancel {
            player_id,
            order_type,
            suit,
            price,
        } => {
            let canceled = game.cancel_order(&player_id, &order_type, &suit, price)?;
            Ok(Json(ActionResponse::Cancel {
                success: true,
                canceled,
            }))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: GameState,
    pub current_players: usize,
    pub trading_duration: u64,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let game = state.game.lock();
    Json(StatusResponse {
        state: game.state(),
        current_players: game.current_players(),
        trading_duration: game.trading_duration_secs(),
    })
}

pub async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_request_deserializes_from_json() {
        let req: JoinRequest = serde_json::from_str(r#"{"name":"Alice"}"#).unwrap();
        assert_eq!(req.name, "Alice");
    }

    #[test]
    fn action_request_tags_on_action_type() {
        let order: ActionRequest = serde_json::from_str(
            r#"{"action_type":"order","player_id":"p1","order_type":"buy","suit":"spades","price":30}"#,
        )
        .unwrap();
        match order {
            ActionRequest::Order { price, .. } => assert_eq!(price, 30),
            ActionRequest::Cancel { .. } => panic!("expected an order action"),
        }

        let cancel: ActionRequest = serde_json::from_str(
            r#"{"action_type":"cancel","player_id":"p1","order_type":"both","suit":"all","price":-1}"#,
        )
        .unwrap();
        match cancel {
            ActionRequest::Cancel { price, .. } => assert_eq!(price, -1),
            ActionRequest::Order { .. } => panic!("expected a cancel action"),
        }
    }
}
