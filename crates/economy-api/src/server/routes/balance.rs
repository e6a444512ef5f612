#[derive(Debug, Deserialize)]
struct BalanceQuery {
    client_sent_at_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LedgerQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LedgerResponse {
    schema_version: String,
    user_id: String,
    entries: Vec<LedgerEntry>,
}

async fn get_balance_view(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceView>, HttpApiError> {
    let user_id = require_identity(&headers, &state)?;

    let received_at_ms = wall_clock_ms();
    let mut api = state.inner.lock().await;
    let mut view = api
        .get_balance(&user_id, query.client_sent_at_ms, received_at_ms)
        .map_err(HttpApiError::from_engine)?;
    drop(api);

    // Stamp the respond time last so the client sees the true turnaround.
    view.clock.server_responded_at_ms = wall_clock_ms();

    Ok(Json(view))
}

async fn get_ledger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerResponse>, HttpApiError> {
    let user_id = require_identity(&headers, &state)?;
    let limit = bounded_page(query.limit);

    let api = state.inner.lock().await;
    let entries = api
        .list_ledger_entries(&user_id, limit)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(LedgerResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        user_id,
        entries,
    }))
}
