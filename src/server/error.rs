//! HTTP error mapping.
//!
//! Error kinds surfaced to callers: 401 on authentication failure, 402 with
//! an x402 body (JSON or HTML paywall) on payment problems, 400 on constraint
//! violations, 500 with a generic detail on server faults. Internal error
//! chains are logged server-side and never leak into response bodies.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;

use crate::auth::AuthError;
use crate::index::IndexError;
use crate::ledger::LedgerError;
use crate::services::index::IndexServiceError;
use crate::types::ErrorResponse;

use super::x402::{paywall_html, PaymentChallenge};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing Authorization header")]
    MissingAuthorization,
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    BadRequest(String),
    #[error("payment required")]
    PaymentRequired(Box<PaymentChallenge>),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    IndexService(#[from] IndexServiceError),
    /// Post-settlement divergence and other faults that must page an
    /// operator; the message is logged, never returned.
    #[error("{0}")]
    Internal(String),
}

impl From<Box<PaymentChallenge>> for ApiError {
    fn from(challenge: Box<PaymentChallenge>) -> Self {
        ApiError::PaymentRequired(challenge)
    }
}

impl IntoResponse for PaymentChallenge {
    fn into_response(self) -> Response {
        if self.browser {
            let html = paywall_html(&self.body, self.asset_decimals);
            (StatusCode::PAYMENT_REQUIRED, Html(html)).into_response()
        } else {
            (StatusCode::PAYMENT_REQUIRED, Json(self.body)).into_response()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::MissingAuthorization => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    detail: "Missing Authorization header".to_string(),
                }),
            )
                .into_response(),
            ApiError::Auth(error) => {
                let detail = format!("Authentication failed: {error}");
                (StatusCode::UNAUTHORIZED, Json(ErrorResponse { detail })).into_response()
            }
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { detail })).into_response()
            }
            ApiError::PaymentRequired(challenge) => challenge.into_response(),
            ApiError::Index(error) => internal(&error),
            ApiError::Ledger(error) => internal(&error),
            ApiError::IndexService(error) => internal(&error),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "internal server error");
                generic_500()
            }
        }
    }
}

fn internal<E: std::error::Error>(error: &E) -> Response {
    tracing::error!(error = %error, source = ?error.source(), "internal server error");
    generic_500()
}

fn generic_500() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            detail: "Internal server error".to_string(),
        }),
    )
        .into_response()
}
