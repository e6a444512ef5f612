#[derive(Debug, Deserialize)]
struct StartRewardBody {
    event_type: RewardEventType,
    original_reward: i64,
}

#[derive(Debug, Deserialize)]
struct CompleteRewardBody {
    session_id: String,
    #[serde(default)]
    watched_item_ids: Vec<String>,
}

async fn post_start_reward(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StartRewardBody>,
) -> Result<Json<RewardSession>, HttpApiError> {
    let user_id = require_identity(&headers, &state)?;

    let now_ms = wall_clock_ms();
    let mut api = state.inner.lock().await;
    let session = api
        .start_reward_session(&user_id, body.event_type, body.original_reward, now_ms)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(session))
}

async fn post_complete_reward(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CompleteRewardBody>,
) -> Result<Json<CompletionOutcome>, HttpApiError> {
    // Completion is keyed by the session id, not the caller, so retries
    // from any device converge; identity still gates the surface.
    let _user_id = require_identity(&headers, &state)?;

    let now_ms = wall_clock_ms();
    let mut api = state.inner.lock().await;
    let outcome = api
        .complete_reward_session(&body.session_id, &body.watched_item_ids, now_ms)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(outcome))
}
