//! Client for the upstream Stewie billing/user API
//!
//! Every call carries the API key from the settings record. Failures of any
//! kind are returned as [`ProxyError`]; nothing is retried.

use chrono::{DateTime, SecondsFormat, Utc};
use phynite_common::{
    constants::{API_KEY_HEADER, REDACTED},
    ExistenceResponse, Settings, ValidatedSignup,
};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;

/// Timeout for proxied calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the admin connectivity test
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("API key not configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Invalid response from API: {0}")]
    InvalidResponse(String),
}

#[derive(Clone)]
pub struct StewieClient {
    http: Client,
}

impl StewieClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("PhyniteSignupService/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    async fn request(
        &self,
        settings: &Settings,
        method: Method,
        path: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ProxyError> {
        if !settings.has_api_key() {
            return Err(ProxyError::NotConfigured);
        }

        let url = format!("{}{}", settings.api_base_url(), path);

        if settings.enable_logging {
            tracing::info!(
                method = %method,
                url = %url,
                body = %body.as_ref().map(redacted).unwrap_or_default(),
                "Upstream request"
            );
        }

        let mut request = self
            .http
            .request(method, &url)
            .header(API_KEY_HEADER, settings.api_key.trim())
            .timeout(timeout);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "Upstream request failed");
            ProxyError::Transport(e)
        })?;

        let status = response.status();
        let text = response.text().await?;

        if settings.enable_logging {
            let logged = match serde_json::from_str::<Value>(&text) {
                Ok(value) => redacted(&value),
                Err(_) => text.chars().take(500).collect(),
            };
            tracing::info!(status = status.as_u16(), response = %logged, "Upstream response");
        }

        if !status.is_success() {
            return Err(ProxyError::Status {
                status: status.as_u16(),
                message: error_message(status.as_u16(), &text),
            });
        }

        serde_json::from_str(&text).map_err(|e| ProxyError::InvalidResponse(e.to_string()))
    }

    /// Whether an account already uses this email
    pub async fn check_email(&self, settings: &Settings, email: &str) -> Result<ExistenceResponse, ProxyError> {
        let response = self
            .request(
                settings,
                Method::POST,
                "/v1/users/signup-existence-check",
                Some(json!({ "email": email })),
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(existence(&response, "user_exists"))
    }

    /// Whether the website is already registered
    pub async fn check_website(&self, settings: &Settings, website: &str) -> Result<ExistenceResponse, ProxyError> {
        let response = self
            .request(
                settings,
                Method::POST,
                "/v1/users/signup-existence-check",
                Some(json!({ "website": website })),
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(existence(&response, "website_exists"))
    }

    /// Create a checkout session and return its id
    pub async fn create_checkout(
        &self,
        settings: &Settings,
        signup: &ValidatedSignup,
        now: DateTime<Utc>,
    ) -> Result<String, ProxyError> {
        let body = json!({
            "website": signup.website,
            "firstName": signup.first_name,
            "lastName": signup.last_name,
            "email": signup.email,
            "planId": signup.plan.as_str(),
            "acceptTerms": true,
            "tosAcceptedAt": now.to_rfc3339_opts(SecondsFormat::Secs, true),
        });

        let response = self
            .request(settings, Method::POST, "/v1/billing/checkout", Some(body), REQUEST_TIMEOUT)
            .await?;

        response
            .get("sessionId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ProxyError::InvalidResponse("missing sessionId".to_string()))
    }

    /// Subscription products (the `data` member of the upstream response)
    pub async fn products(&self, settings: &Settings) -> Result<Value, ProxyError> {
        let mut response = self
            .request(settings, Method::GET, "/v1/billing/products", None, REQUEST_TIMEOUT)
            .await?;
        Ok(response
            .get_mut("data")
            .map(Value::take)
            .unwrap_or_else(|| json!([])))
    }

    /// Upstream health check, with the shorter connectivity timeout
    pub async fn health(&self, settings: &Settings) -> Result<Value, ProxyError> {
        self.request(settings, Method::GET, "/v1/billing/health", None, HEALTH_TIMEOUT)
            .await
    }
}

fn existence(response: &Value, flag: &str) -> ExistenceResponse {
    let data = response.get("data");
    ExistenceResponse {
        success: true,
        exists: data
            .and_then(|d| d.get(flag))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        message: data
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

/// Message from an upstream error body: `message`, then `error`, then a generic one
pub fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| format!("API request failed with status {}", status))
}

/// Replace every email-bearing member with a placeholder
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, member) in map.iter_mut() {
                if key.to_ascii_lowercase().contains("email") {
                    *member = Value::String(REDACTED.to_string());
                } else {
                    redact(member);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

fn redacted(value: &Value) -> String {
    let mut copy = value.clone();
    redact(&mut copy);
    copy.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStewie;
    use chrono::TimeZone;
    use phynite_common::Plan;

    fn signup(email: &str) -> ValidatedSignup {
        ValidatedSignup {
            website: "https://example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            plan: Plan::Monthly,
        }
    }

    #[test]
    fn test_redact_nested_emails() {
        let mut value = json!({
            "email": "a@b.com",
            "data": { "clientEmail": "c@d.com", "plan": "monthly" },
            "items": [{ "email": "e@f.com" }]
        });
        redact(&mut value);
        assert_eq!(value["email"], REDACTED);
        assert_eq!(value["data"]["clientEmail"], REDACTED);
        assert_eq!(value["data"]["plan"], "monthly");
        assert_eq!(value["items"][0]["email"], REDACTED);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(400, r#"{"message":"Nope","error":"X"}"#), "Nope");
        assert_eq!(error_message(400, r#"{"error":"EMAIL_EXISTS"}"#), "EMAIL_EXISTS");
        assert_eq!(error_message(503, "<html>"), "API request failed with status 503");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_not_configured() {
        let client = StewieClient::new().unwrap();
        let settings = Settings::default();
        assert!(matches!(
            client.health(&settings).await,
            Err(ProxyError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_existence_checks() {
        let mock = MockStewie::start().await;
        let client = StewieClient::new().unwrap();
        let settings = mock.settings();

        assert!(client.check_email(&settings, "existing@example.com").await.unwrap().exists);
        assert!(!client.check_email(&settings, "new@example.com").await.unwrap().exists);
        assert!(client.check_website(&settings, "https://existing.com").await.unwrap().exists);
        assert!(!client.check_website(&settings, "https://fresh.io").await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_checkout() {
        let mock = MockStewie::start().await;
        let client = StewieClient::new().unwrap();
        let settings = mock.settings();
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

        let session = client
            .create_checkout(&settings, &signup("ada@example.com"), now)
            .await
            .unwrap();
        assert!(session.starts_with("cs_test_"));

        let body = mock.last_checkout().unwrap();
        assert_eq!(body["tosAcceptedAt"], "2025-01-02T03:04:05Z");
        assert_eq!(body["planId"], "monthly");

        match client.create_checkout(&settings, &signup("existing@example.com"), now).await {
            Err(ProxyError::Status { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "This email is already registered with Phynite Analytics");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_api_key_is_status_error() {
        let mock = MockStewie::start().await;
        let client = StewieClient::new().unwrap();
        let settings = Settings {
            api_key: "wrong".to_string(),
            ..mock.settings()
        };
        assert!(matches!(
            client.products(&settings).await,
            Err(ProxyError::Status { status: 401, .. })
        ));
    }
}
