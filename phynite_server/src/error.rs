//! Error responses for the HTTP routes

use crate::{db::StoreError, session::TokenError};
use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use phynite_common::{ErrorBody, FieldErrors};

/// Which upstream operation failed, for the public error code and message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamOp {
    CheckEmail,
    CheckWebsite,
    Checkout,
    Products,
}

impl UpstreamOp {
    fn code(&self) -> &'static str {
        match self {
            UpstreamOp::CheckEmail | UpstreamOp::CheckWebsite => "api_error",
            UpstreamOp::Checkout => "checkout_error",
            UpstreamOp::Products => "products_error",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            UpstreamOp::CheckEmail => "Unable to verify email. Please try again.",
            UpstreamOp::CheckWebsite => "Unable to verify website. Please try again.",
            UpstreamOp::Checkout => "Unable to create checkout session. Please try again.",
            UpstreamOp::Products => "Unable to fetch pricing information.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { code: &'static str, message: String, errors: FieldErrors },

    #[error("Submission rejected")]
    Rejected(FieldErrors),

    #[error("Too many requests")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Upstream {0:?} failed")]
    Upstream(UpstreamOp),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Origin not allowed")]
    Forbidden,

    #[error("Unauthorized")]
    AdminUnauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn validation(code: &'static str, errors: FieldErrors) -> Self {
        ApiError::Validation {
            code,
            message: errors.to_string(),
            errors,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::Rejected(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Token(_) | ApiError::AdminUnauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let (code, message, errors) = match self {
            ApiError::Validation { code, message, errors } => {
                (*code, message.clone(), Some(errors.clone().into_map()))
            }
            ApiError::Rejected(errors) => (
                "submission_rejected",
                "Your submission could not be processed.".to_string(),
                Some(errors.clone().into_map()),
            ),
            ApiError::RateLimited { .. } => (
                "rate_limit_exceeded",
                "Too many requests. Please try again later.".to_string(),
                None,
            ),
            ApiError::Upstream(op) => (op.code(), op.message().to_string(), None),
            ApiError::Token(e) => ("invalid_session", e.to_string(), None),
            ApiError::Forbidden => (
                "forbidden_origin",
                "Requests from this site are not allowed.".to_string(),
                None,
            ),
            ApiError::AdminUnauthorized => ("unauthorized", "Unauthorized".to_string(), None),
            ApiError::Store(_) => ("internal_error", "Internal server error".to_string(), None),
        };

        ErrorBody {
            success: false,
            code: code.to_string(),
            message,
            errors,
        }
    }
}

/// Undecodable request bodies get the same 400 shape as field validation
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected request body");
        let message = match rejection {
            JsonRejection::JsonDataError(_) => "Request body has missing or invalid fields.",
            JsonRejection::MissingJsonContentType(_) => "Expected a JSON request body.",
            _ => "Request body is not valid JSON.",
        };
        let mut errors = FieldErrors::new();
        errors.add("body", message);
        ApiError::validation("validation_error", errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Store(e) = &self {
            tracing::error!("Storage error: {}", e);
        }

        let mut response = (self.status(), Json(self.body())).into_response();
        if let ApiError::RateLimited {
            retry_after_secs: Some(secs),
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
