#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            error: ApiError::new(
                ErrorCode::Unauthorized,
                "bearer credential missing or unknown",
                None,
            ),
        }
    }

    fn invalid_query(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::ValidationFailed, message, details),
        }
    }

    fn from_engine(err: EngineError) -> Self {
        match err {
            EngineError::Rejected(error) => Self {
                status: status_for(error.error_code),
                error,
            },
            EngineError::Store(store_error) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                error: ApiError::new(
                    ErrorCode::StoreUnavailable,
                    "store operation failed; safe to retry with the same key",
                    Some(store_error.to_string()),
                ),
            },
        }
    }
}

fn status_for(error_code: ErrorCode) -> StatusCode {
    match error_code {
        ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::ActiveTokenExists
        | ErrorCode::InsufficientWatched
        | ErrorCode::SessionExpired => StatusCode::CONFLICT,
        ErrorCode::NoUnusedTokens | ErrorCode::NoItemsAvailable | ErrorCode::SessionNotFound => {
            StatusCode::NOT_FOUND
        }
        ErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
