//! Error types for the payment service.
//!
//! - [`Error`] — start-up failures (configuration, HTTP client, server bind).
//! - [`PaymentError`] — per-request failures, convertible into a structured
//!   JSON response with an explicit `status` field.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the service binary.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file could not be resolved, read, or parsed.
    #[error("config: {0}")]
    Config(String),

    /// Outbound provider client could not be constructed.
    #[error("provider: {0}")]
    Provider(String),

    /// Server bind or runtime error.
    #[error("server: {0}")]
    Server(String),
}

impl Error {
    /// Configuration error with a plain message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Configuration error wrapping an underlying cause.
    pub fn config_with(context: impl AsRef<str>, cause: impl std::fmt::Display) -> Self {
        Self::Config(format!("{}: {cause}", context.as_ref()))
    }
}

/// Failure of a single payment operation.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The merchant has no usable payment credential.
    #[error("merchant '{merchant_id}' has no payment credential configured")]
    CredentialMissing {
        /// Merchant that was looked up.
        merchant_id: String,
    },

    /// Every cart item was dropped during validation.
    #[error("no valid items left in the cart")]
    NoValidItems,

    /// The provider could not be reached or answered with an unreadable body.
    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider answered with a structured rejection.
    #[error("payment provider rejected the request ({status}): {reason}")]
    ProviderRejected {
        /// HTTP status code returned by the provider.
        status: u16,
        /// First cause or message reported by the provider.
        reason: String,
    },

    /// No order with the given identifier exists.
    #[error("order '{0}' not found")]
    OrderNotFound(String),

    /// The inbound request failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The order or credential store failed.
    #[error("store: {0}")]
    Store(String),
}

impl PaymentError {
    /// Wire code reported in the `code` field of error responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CredentialMissing { .. } => "missing_credential",
            Self::NoValidItems => "no_valid_items",
            Self::ProviderUnavailable(_) | Self::ProviderRejected { .. } => "provider_error",
            Self::OrderNotFound(_) => "order_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Store(_) => "store_error",
        }
    }

    /// HTTP status used when the error reaches the client.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::CredentialMissing { .. } | Self::NoValidItems | Self::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::OrderNotFound(_) => StatusCode::NOT_FOUND,
            Self::ProviderUnavailable(_) | Self::ProviderRejected { .. } | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether a later attempt of the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_) | Self::Store(_))
    }

    /// Human-readable reason shown to the shopper.
    ///
    /// Provider failures are collapsed into a generic retry hint; the full
    /// payload is only logged.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::ProviderUnavailable(_) | Self::ProviderRejected { .. } => {
                "payment provider error, please try again later".to_owned()
            }
            Self::Store(_) => "internal error, please try again later".to_owned(),
            other => other.to_string(),
        }
    }
}

/// JSON body for every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    code: &'static str,
    message: String,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        match &self {
            Self::ProviderUnavailable(_) | Self::ProviderRejected { .. } | Self::Store(_) => {
                tracing::error!(error = %self, code = self.code(), "payment operation failed");
            }
            _ => tracing::info!(error = %self, code = self.code(), "payment request refused"),
        }
        let body = ErrorBody {
            status: "error",
            code: self.code(),
            message: self.public_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
