use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contracts::{
    ActivationOutcome, ApiError, BalanceSnapshot, BalanceView, CompletionOutcome, CreditOutcome,
    CreditRequest, CreditSource, ErrorCode, LedgerEntry, PurchaseFact, RewardEventType,
    RewardSession, SpeedToken, TokenSource, SCHEMA_VERSION_V1,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::info;

use crate::{wall_clock_ms, EconomyApi, EngineError, IdentityVerifier};

const DEFAULT_LEDGER_PAGE_SIZE: usize = 100;
const MAX_LEDGER_PAGE_SIZE: usize = 500;

include!("error.rs");
include!("state.rs");
include!("routes/credit.rs");
include!("routes/tokens.rs");
include!("routes/rewards.rs");
include!("routes/balance.rs");
include!("routes/purchases.rs");
include!("routes/maintenance.rs");
include!("util.rs");

pub async fn serve(
    addr: SocketAddr,
    api: EconomyApi,
    verifier: Arc<dyn IdentityVerifier + Send + Sync>,
) -> Result<(), ServerError> {
    let state = AppState::new(api, verifier);
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "economy api listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/balance", get(get_balance_view))
        .route("/api/v1/ledger", get(get_ledger))
        .route("/api/v1/credit", post(post_credit))
        .route("/api/v1/tokens", get(get_tokens))
        .route("/api/v1/tokens/grant", post(post_grant))
        .route("/api/v1/tokens/activate", post(post_activate))
        .route("/api/v1/rewards/start", post(post_start_reward))
        .route("/api/v1/rewards/complete", post(post_complete_reward))
        .route("/api/v1/purchases/verified", post(post_purchase))
        .route("/api/v1/maintenance/sweep_sessions", post(post_sweep_sessions))
        .route("/api/v1/maintenance/reconcile", post(post_reconcile))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests;
