use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Rate limited, retry later")]
    RateLimited,

    #[error("Invalid code")]
    InvalidCode,

    #[error("No secret enrolled")]
    NoSecretEnrolled,

    #[error("Provisioning payload already viewed, regenerate to get a new one")]
    SecretAlreadyViewed,

    #[error("Unknown member")]
    UnknownMember,

    #[error("Unknown exception")]
    UnknownException,

    #[error("Exception already resolved")]
    InvalidTransition,

    #[error("Store error: {0}")]
    Database(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidCode => StatusCode::UNAUTHORIZED,
            AppError::NoSecretEnrolled
            | AppError::SecretAlreadyViewed
            | AppError::InvalidTransition => StatusCode::CONFLICT,
            AppError::UnknownMember | AppError::UnknownException => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Infrastructure faults are logged with detail server-side; the
        // caller only learns that the request failed.
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{self}");
            return (status, "Internal error".to_string()).into_response();
        }

        (status, self.to_string()).into_response()
    }
}
