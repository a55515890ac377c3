//! Maps `exchange_core::domain::ExchangeError` (plus this layer's own
//! request-shape failures) onto HTTP status codes, in the teacher crate's
//! `AppError` style.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use exchange_core::domain::ExchangeError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Core(ExchangeError),
    /// A request body or query string failed `serde` deserialization
    /// before it ever reached a validator.
    BadRequest(String),
}

impl From<ExchangeError> for AppError {
    fn from(err: ExchangeError) -> Self {
        AppError::Core(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Core(ExchangeError::BrokerNotFound) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Core(ExchangeError::SymbolNotFound) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Core(ExchangeError::OrderNotFound) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Core(ExchangeError::WebhookNotFound) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Core(ExchangeError::OrderNotCancellable) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Core(ExchangeError::NoLiquidity) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Core(ExchangeError::BrokerAlreadyExists) => (StatusCode::CONFLICT, self.to_string()),
            AppError::Core(ExchangeError::InsufficientBalance) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::Core(ExchangeError::InsufficientHoldings) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::Core(ExchangeError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Core(err) => write!(f, "{err}"),
            AppError::BadRequest(msg) => write!(f, "{msg}"),
        }
    }
}
