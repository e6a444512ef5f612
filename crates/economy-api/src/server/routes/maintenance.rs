#[derive(Debug, Serialize)]
struct SweepResponse {
    schema_version: String,
    swept: u64,
}

#[derive(Debug, Deserialize)]
struct ReconcileBody {
    user_id: String,
}

#[derive(Debug, Serialize)]
struct ReconcileResponse {
    schema_version: String,
    balance: BalanceSnapshot,
}

async fn post_sweep_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, HttpApiError> {
    let _operator = require_identity(&headers, &state)?;

    let now_ms = wall_clock_ms();
    let mut api = state.inner.lock().await;
    let swept = api
        .sweep_expired_sessions(now_ms)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(SweepResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        swept,
    }))
}

async fn post_reconcile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ReconcileBody>,
) -> Result<Json<ReconcileResponse>, HttpApiError> {
    let _operator = require_identity(&headers, &state)?;

    if body.user_id.trim().is_empty() {
        return Err(HttpApiError::invalid_query(
            "user_id must not be empty",
            None,
        ));
    }

    let now_ms = wall_clock_ms();
    let mut api = state.inner.lock().await;
    let balance = api
        .reconcile_snapshot(&body.user_id, now_ms)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(ReconcileResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        balance,
    }))
}
