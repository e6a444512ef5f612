#[derive(Debug, Deserialize)]
struct CreditBody {
    delta_coins: i64,
    delta_lives: i64,
    source: CreditSource,
    idempotency_key: String,
    correlation_id: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

async fn post_credit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreditBody>,
) -> Result<Json<CreditOutcome>, HttpApiError> {
    let user_id = require_identity(&headers, &state)?;

    let request = CreditRequest {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        user_id,
        delta_coins: body.delta_coins,
        delta_lives: body.delta_lives,
        source: body.source,
        idempotency_key: body.idempotency_key,
        correlation_id: body.correlation_id,
        metadata: body.metadata,
    };

    let now_ms = wall_clock_ms();
    let mut api = state.inner.lock().await;
    let outcome = api
        .credit(&request, now_ms)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(outcome))
}
