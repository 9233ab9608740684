// HTTP handlers: liveness, balance reads, and the deposit-confirmation
// surface the payment collaborator calls after capturing funds externally.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::errors::LedgerError;
use crate::domain::ports::{LedgerUpdate, TransactionKind};
use crate::frameworks::config;
use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::state::AppState;
use crate::use_cases::RoomEvent;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub user_id: i64,
    pub amount_cents: i64,
    // External payment reference recorded in the transaction description.
    pub reference: String,
}

fn ledger_status(error: LedgerError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, message) = match error {
        LedgerError::UserNotFound => (StatusCode::NOT_FOUND, "user not found"),
        LedgerError::InvalidBalance => (StatusCode::BAD_REQUEST, "invalid balance"),
        LedgerError::Storage => (StatusCode::SERVICE_UNAVAILABLE, "ledger unavailable"),
    };
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

#[tracing::instrument(name = "get_balance", skip_all, fields(user_id))]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<BalanceResponse>, (StatusCode, Json<ErrorResponse>)> {
    let balance_cents = state
        .ledger
        .fetch_balance(user_id)
        .await
        .map_err(ledger_status)?;
    Ok(Json(BalanceResponse { balance_cents }))
}

#[tracing::instrument(name = "confirm_deposit", skip_all, fields(user_id = body.user_id))]
pub async fn confirm_deposit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DepositRequest>,
) -> Result<Json<BalanceResponse>, (StatusCode, Json<ErrorResponse>)> {
    if body.amount_cents <= 0 || body.amount_cents > config::MAX_DEPOSIT_CENTS {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid deposit amount".to_string(),
            }),
        ));
    }

    let current = state
        .ledger
        .fetch_balance(body.user_id)
        .await
        .map_err(ledger_status)?;
    let balance_cents = state
        .ledger
        .apply_transaction(LedgerUpdate {
            user_id: body.user_id,
            new_balance_cents: current + body.amount_cents,
            kind: TransactionKind::Deposit,
            amount_cents: body.amount_cents,
            description: format!("deposit {}", body.reference),
        })
        .await
        .map_err(ledger_status)?;

    tracing::info!(amount_cents = body.amount_cents, "deposit confirmed");

    // Push the new balance to the user's live session, if any.
    if let Some(session) = state.presence.resolve(body.user_id).await {
        let _ = session
            .send(RoomEvent::BalanceUpdated {
                balance_cents,
                message: Some("Funds added to your account".to_string()),
            })
            .await;
    }

    Ok(Json(BalanceResponse { balance_cents }))
}
