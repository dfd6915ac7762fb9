use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::api::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/join", post(handlers::join))
        .route("/state", get(handlers::get_state))
        .route("/action", post(handlers::action))
        .route("/status", get(handlers::status))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use parking_lot::Mutex;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::services::game::{Game, GameConfig};
    use crate::services::sink::DurableSink;

    fn test_state() -> Arc<AppState> {
        let sink = Arc::new(DurableSink::in_memory().unwrap());
        let game = Game::new(
            GameConfig {
                players: 4,
                trading_duration_secs: 120,
            },
            sink,
        );
        Arc::new(AppState {
            game: Mutex::new(game),
            config: AppConfig {
                players: 4,
                trading_duration_secs: 120,
                bind_addr: "0.0.0.0".into(),
                port: 8080,
                sink_path: ":memory:".into(),
            },
        })
    }

    #[tokio::test]
    async fn health_is_ok_without_touching_game() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_waiting_with_no_players() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn join_then_state_round_trips_player_id() {
        let app = create_router(test_state());

        let join_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/join")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"Alice"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(join_response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(join_response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let player_id = parsed["player_id"].as_str().unwrap().to_string();

        let state_response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/state?player_id={player_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(state_response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn state_for_unknown_player_is_rejected() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/state?player_id=nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
