fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("3600"),
    );
}

fn require_identity(headers: &HeaderMap, state: &AppState) -> Result<String, HttpApiError> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let Some(token) = bearer else {
        return Err(HttpApiError::unauthorized());
    };

    state
        .verifier
        .resolve(token)
        .ok_or_else(HttpApiError::unauthorized)
}

fn bounded_page(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_LEDGER_PAGE_SIZE)
        .max(1)
        .min(MAX_LEDGER_PAGE_SIZE)
}
