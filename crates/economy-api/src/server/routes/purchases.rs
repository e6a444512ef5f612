async fn post_purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(fact): Json<PurchaseFact>,
) -> Result<Json<CreditOutcome>, HttpApiError> {
    // The bearer authenticates the reporting service; the fact itself
    // names the user, as verified upstream by the payment collaborator.
    let _reporter = require_identity(&headers, &state)?;

    let now_ms = wall_clock_ms();
    let mut api = state.inner.lock().await;
    let outcome = api
        .apply_purchase(&fact, now_ms)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(outcome))
}
