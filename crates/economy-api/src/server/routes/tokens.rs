#[derive(Debug, Deserialize)]
struct GrantTokenBody {
    duration_minutes: i64,
    source: TokenSource,
}

#[derive(Debug, Serialize)]
struct TokenListResponse {
    schema_version: String,
    user_id: String,
    tokens: Vec<SpeedToken>,
    expired_count: u64,
}

async fn post_grant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GrantTokenBody>,
) -> Result<Json<SpeedToken>, HttpApiError> {
    let user_id = require_identity(&headers, &state)?;

    let now_ms = wall_clock_ms();
    let mut api = state.inner.lock().await;
    let token = api
        .grant_token(&user_id, body.duration_minutes, body.source, now_ms)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(token))
}

async fn post_activate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ActivationOutcome>, HttpApiError> {
    let user_id = require_identity(&headers, &state)?;

    let now_ms = wall_clock_ms();
    let mut api = state.inner.lock().await;
    let outcome = api
        .activate_token(&user_id, now_ms)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(outcome))
}

async fn get_tokens(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TokenListResponse>, HttpApiError> {
    let user_id = require_identity(&headers, &state)?;

    let now_ms = wall_clock_ms();
    let api = state.inner.lock().await;
    let tokens = api
        .list_tokens(&user_id)
        .map_err(HttpApiError::from_engine)?;
    let expired_count = api
        .expired_token_count(&user_id, now_ms)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(TokenListResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        user_id,
        tokens,
        expired_count,
    }))
}
