//! Phynite Common - Shared wire types for the signup service
//!
//! This crate contains the request/response shapes, the typed settings
//! record and the form validation rules used by both the server and CLI.

pub mod settings;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use settings::{Environment, FormStyle, Settings};
pub use validation::{FieldErrors, Plan, ValidatedSignup};

/// Body for `POST /v1/signup/check-email`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckEmailRequest {
    #[serde(default)]
    pub email: String,
}

/// Body for `POST /v1/signup/check-website`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckWebsiteRequest {
    #[serde(default)]
    pub website: String,
}

/// Result of an email or website existence check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistenceResponse {
    pub success: bool,
    pub exists: bool,
    #[serde(default)]
    pub message: String,
}

/// A signup form submission as posted by the browser.
///
/// Every field is defaulted so that a missing field surfaces as a
/// field-level validation error instead of a JSON decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupSubmission {
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub accept_terms: bool,
    /// Honeypot field, hidden from humans
    #[serde(default, rename = "website_confirm")]
    pub website_confirm: String,
    /// Milliseconds between form render and submission, as measured by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

/// Response for a created checkout session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub session_id: String,
    pub message: String,
}

/// Form session issued to the browser when the form renders
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// Value for the [`constants::SESSION_TOKEN_HEADER`] header
    pub token: String,
    /// Unix milliseconds at which the token was issued
    pub issued_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_publishable_key: Option<String>,
}

/// Result of the upstream connectivity test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Result of a rate-limit table cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub removed: u64,
}

/// Uniform error body returned by every route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

/// Constants shared by server and CLI
pub mod constants {
    /// Header carrying the signed form-session token
    pub const SESSION_TOKEN_HEADER: &str = "X-Signup-Token";

    /// Header carrying the upstream API key
    pub const API_KEY_HEADER: &str = "X-API-Key";

    /// Prefix for public signup routes
    pub const SIGNUP_PREFIX: &str = "/v1/signup";

    /// Prefix for admin routes
    pub const ADMIN_PREFIX: &str = "/v1/admin";

    /// Upstream base URL used in production and staging
    pub const PRODUCTION_API_URL: &str = "https://api.phynitesolutions.com";

    /// Upstream base URL used in local development
    pub const DEVELOPMENT_API_URL: &str = "http://localhost:4000";

    /// Submissions faster than this are treated as automated
    pub const MIN_FORM_ELAPSED_MS: u64 = 2000;

    /// Default attempts per minute per IP
    pub const DEFAULT_RATE_LIMIT: u32 = 5;

    /// Bounds for the configurable rate limit
    pub const MIN_RATE_LIMIT: u32 = 1;
    pub const MAX_RATE_LIMIT: u32 = 60;

    /// Placeholder written to logs in place of personal data
    pub const REDACTED: &str = "[REDACTED]";
}
