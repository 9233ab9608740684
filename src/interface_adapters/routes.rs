use crate::interface_adapters::handlers::{confirm_deposit, get_balance, health};
use crate::interface_adapters::net::ws_handler;
use crate::interface_adapters::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

// Build the HTTP router for the game server endpoints.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/balance/{user_id}", get(get_balance))
        .route("/deposits", post(confirm_deposit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::LedgerError;
    use crate::domain::ports::{BalanceLedger, Clock, DiceRoller, LedgerUpdate};
    use crate::domain::{DICE_COUNT, Symbol};
    use crate::use_cases::{PresenceMap, RoomDeps, RoomEvent, RoomRegistry, RoomSettings};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    struct MemoryLedger {
        balances: Mutex<HashMap<i64, i64>>,
    }

    impl MemoryLedger {
        fn with_balances(entries: &[(i64, i64)]) -> Arc<Self> {
            Arc::new(Self {
                balances: Mutex::new(entries.iter().copied().collect()),
            })
        }
    }

    #[async_trait]
    impl BalanceLedger for MemoryLedger {
        async fn fetch_balance(&self, user_id: i64) -> Result<i64, LedgerError> {
            self.balances
                .lock()
                .expect("balances mutex poisoned")
                .get(&user_id)
                .copied()
                .ok_or(LedgerError::UserNotFound)
        }

        async fn apply_transaction(&self, update: LedgerUpdate) -> Result<i64, LedgerError> {
            let mut balances = self.balances.lock().expect("balances mutex poisoned");
            if !balances.contains_key(&update.user_id) {
                return Err(LedgerError::UserNotFound);
            }
            balances.insert(update.user_id, update.new_balance_cents);
            Ok(update.new_balance_cents)
        }
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now_epoch_millis(&self) -> u64 {
            0
        }
    }

    struct FixedDice;

    impl DiceRoller for FixedDice {
        fn roll(&self) -> [Symbol; DICE_COUNT] {
            [Symbol::Crown; DICE_COUNT]
        }
    }

    fn state_with_ledger(ledger: Arc<MemoryLedger>) -> Arc<AppState> {
        let registry = Arc::new(RoomRegistry::new(
            RoomSettings {
                command_channel_capacity: 16,
                events_broadcast_capacity: 64,
            },
            RoomDeps {
                ledger: ledger.clone(),
                clock: Arc::new(FixedClock),
                dice: Arc::new(FixedDice),
                betting_window: Duration::from_secs(30),
            },
        ));
        Arc::new(AppState {
            registry,
            presence: Arc::new(PresenceMap::new()),
            ledger,
        })
    }

    fn json_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should collect");
        serde_json::from_slice(&bytes).expect("body should be json")
    }

    #[tokio::test]
    async fn when_health_is_requested_then_status_ok() {
        let app = app(state_with_ledger(MemoryLedger::with_balances(&[])));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn when_balance_user_exists_then_balance_is_returned() {
        let app = app(state_with_ledger(MemoryLedger::with_balances(&[(
            7, 100_000,
        )])));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/balance/7")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["balance_cents"], 100_000);
    }

    #[tokio::test]
    async fn when_balance_user_is_unknown_then_not_found() {
        let app = app(state_with_ledger(MemoryLedger::with_balances(&[])));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/balance/99")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn when_deposit_amount_is_invalid_then_bad_request() {
        let app = app(state_with_ledger(MemoryLedger::with_balances(&[(
            7, 100_000,
        )])));
        let response = app
            .oneshot(json_request(
                "/deposits",
                r#"{"user_id":7,"amount_cents":-500,"reference":"pay-1"}"#,
            ))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn when_deposit_succeeds_then_balance_grows_and_session_is_notified() {
        let ledger = MemoryLedger::with_balances(&[(7, 100_000)]);
        let state = state_with_ledger(ledger);
        let (session_tx, mut session_rx) = tokio::sync::mpsc::channel(4);
        state.presence.bind(7, "session-a".to_string(), session_tx).await;

        let response = app(state)
            .oneshot(json_request(
                "/deposits",
                r#"{"user_id":7,"amount_cents":25000,"reference":"pay-1"}"#,
            ))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["balance_cents"], 125_000);

        let event = session_rx.recv().await.expect("session should be notified");
        let RoomEvent::BalanceUpdated { balance_cents, .. } = event else {
            panic!("expected BalanceUpdated, got {event:?}");
        };
        assert_eq!(balance_cents, 125_000);
    }

    #[tokio::test]
    async fn when_deposit_user_is_unknown_then_not_found() {
        let app = app(state_with_ledger(MemoryLedger::with_balances(&[])));
        let response = app
            .oneshot(json_request(
                "/deposits",
                r#"{"user_id":42,"amount_cents":1000,"reference":"pay-2"}"#,
            ))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn when_route_does_not_exist_then_not_found() {
        let app = app(state_with_ledger(MemoryLedger::with_balances(&[])));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/unknown")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
