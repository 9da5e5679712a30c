//! Public signup routes
//!
//! Every user-initiated call carries the form-session token. Calls that
//! reach the upstream API are rate limited per client IP; checkout
//! submissions are screened for bots first.

use crate::{
    abuse::{ip, screen, RateLimitConfig, Verdict},
    error::{ApiError, UpstreamOp},
    routes::{
        extract::{AdminAuth, ClientIp},
        AppState,
    },
    stewie::ProxyError,
};
use axum::{
    extract::State,
    http::{header, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use phynite_common::{
    constants::SESSION_TOKEN_HEADER,
    validation::{validate_email, validate_submission, validate_website},
    CheckEmailRequest, CheckWebsiteRequest, CheckoutResponse, ExistenceResponse, FieldErrors,
    SessionResponse, Settings, SignupSubmission, TestConnectionResponse,
};
use serde_json::Value;

/// Build the signup router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/session", get(issue_session))
        .route("/check-email", post(check_email))
        .route("/check-website", post(check_website))
        .route("/create-checkout", post(create_checkout))
        .route("/get-products", get(get_products))
        .route("/test-connection", get(test_connection))
}

/// Issue a form-session token when the form renders
async fn issue_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, ApiError> {
    let settings = state.settings.load().await?;
    check_origin(&settings, &headers)?;

    let now = Utc::now();
    Ok(Json(SessionResponse {
        token: state.signer.issue(now),
        issued_at: now.timestamp_millis(),
        stripe_publishable_key: settings.publishable_key().map(str::to_string),
    }))
}

/// Whether an account already uses this email
async fn check_email(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    WithRejection(Json(request), _): WithRejection<Json<CheckEmailRequest>, ApiError>,
) -> Result<Json<ExistenceResponse>, ApiError> {
    let now = Utc::now();
    let settings = state.settings.load().await?;
    check_origin(&settings, &headers)?;
    verify_session(&state, &headers, now)?;
    enforce_rate_limit(&state, &settings, &ip, now).await?;

    let email = validate_email(&request.email)
        .map_err(|message| field_error("invalid_email", "email", message))?;

    let response = state
        .stewie
        .check_email(&settings, &email)
        .await
        .map_err(|e| upstream_failed(UpstreamOp::CheckEmail, e))?;

    Ok(Json(response))
}

/// Whether the website is already registered
async fn check_website(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    WithRejection(Json(request), _): WithRejection<Json<CheckWebsiteRequest>, ApiError>,
) -> Result<Json<ExistenceResponse>, ApiError> {
    let now = Utc::now();
    let settings = state.settings.load().await?;
    check_origin(&settings, &headers)?;
    verify_session(&state, &headers, now)?;
    enforce_rate_limit(&state, &settings, &ip, now).await?;

    let website = validate_website(&request.website)
        .map_err(|message| field_error("invalid_website", "website", message))?;

    let response = state
        .stewie
        .check_website(&settings, &website)
        .await
        .map_err(|e| upstream_failed(UpstreamOp::CheckWebsite, e))?;

    Ok(Json(response))
}

/// Screen, validate and forward a signup; returns the checkout session id
async fn create_checkout(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    WithRejection(Json(mut submission), _): WithRejection<Json<SignupSubmission>, ApiError>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let now = Utc::now();
    let settings = state.settings.load().await?;
    check_origin(&settings, &headers)?;
    let issued_at = verify_session(&state, &headers, now)?;

    if submission.elapsed_ms.is_none() {
        submission.elapsed_ms = Some((now - issued_at).num_milliseconds().max(0) as u64);
    }

    let verdict = screen(&submission);
    if let Verdict::Reject(reasons) = &verdict {
        let codes: Vec<&str> = reasons.iter().map(|r| r.code()).collect();
        tracing::warn!(event = "submission_rejected", ip = %ip, reasons = ?codes, "Rejected signup submission");
        return Err(ApiError::Rejected(verdict.field_errors()));
    }

    enforce_rate_limit(&state, &settings, &ip, now).await?;

    let signup = validate_submission(&submission)
        .map_err(|errors| ApiError::validation("validation_error", errors))?;

    let session_id = state
        .stewie
        .create_checkout(&settings, &signup, now)
        .await
        .map_err(|e| upstream_failed(UpstreamOp::Checkout, e))?;

    tracing::info!(plan = signup.plan.as_str(), "Checkout session created");

    Ok(Json(CheckoutResponse {
        success: true,
        session_id,
        message: "Checkout session created successfully.".to_string(),
    }))
}

/// Subscription products, served from cache for an hour
async fn get_products(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let settings = state.settings.load().await?;
    check_origin(&settings, &headers)?;

    let upstream = settings.api_base_url().to_string();
    if let Some(products) = state.products.get(&upstream) {
        tracing::debug!("Serving products from cache");
        return Ok(Json(products));
    }

    let products = state
        .stewie
        .products(&settings)
        .await
        .map_err(|e| upstream_failed(UpstreamOp::Products, e))?;
    state.products.insert(&upstream, products.clone());

    Ok(Json(products))
}

/// Upstream connectivity test (admin only)
async fn test_connection(
    State(state): State<AppState>,
    _admin: AdminAuth,
) -> Result<Json<TestConnectionResponse>, ApiError> {
    let settings = state.settings.load().await?;

    if !settings.has_api_key() {
        return Ok(Json(TestConnectionResponse {
            success: false,
            message: "API key is not configured.".to_string(),
            data: None,
        }));
    }

    let response = match state.stewie.health(&settings).await {
        Ok(data) => TestConnectionResponse {
            success: true,
            message: "API connection successful.".to_string(),
            data: Some(data),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Connection test failed");
            TestConnectionResponse {
                success: false,
                message: e.to_string(),
                data: None,
            }
        }
    };

    Ok(Json(response))
}

/// Reject requests whose Referer is not an allowed domain (when any are configured)
fn check_origin(settings: &Settings, headers: &HeaderMap) -> Result<(), ApiError> {
    if settings.allowed_domains.is_empty() {
        return Ok(());
    }

    let host = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(referer_host);

    let allowed = host.as_deref().is_some_and(|host| {
        settings
            .allowed_domains
            .iter()
            .any(|domain| host == domain.as_str() || host.ends_with(&format!(".{}", domain)))
    });

    if allowed {
        Ok(())
    } else {
        tracing::warn!(event = "origin_rejected", referer_host = ?host, "Request from disallowed origin");
        Err(ApiError::Forbidden)
    }
}

/// Host part of a Referer URL, lowercased
fn referer_host(referer: &str) -> Option<String> {
    let (_, rest) = referer.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    (!host.is_empty()).then(|| host.to_lowercase())
}

fn verify_session(state: &AppState, headers: &HeaderMap, now: DateTime<Utc>) -> Result<DateTime<Utc>, ApiError> {
    let token = headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    Ok(state.signer.verify(token, now)?)
}

async fn enforce_rate_limit(
    state: &AppState,
    settings: &Settings,
    ip: &str,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    if settings.environment.is_relaxed() && ip::is_private(ip) {
        tracing::debug!(ip = %ip, "Skipping rate limit for local address");
        return Ok(());
    }

    let config = RateLimitConfig::new(settings.effective_rate_limit());
    let result = state.rate_limiter.check(ip, &config, now).await?;
    if result.allowed {
        Ok(())
    } else {
        Err(ApiError::RateLimited {
            retry_after_secs: result.retry_after_secs(now),
        })
    }
}

fn field_error(code: &'static str, field: &str, message: String) -> ApiError {
    let mut errors = FieldErrors::new();
    errors.add(field, message);
    ApiError::validation(code, errors)
}

fn upstream_failed(op: UpstreamOp, error: ProxyError) -> ApiError {
    match &error {
        ProxyError::NotConfigured => tracing::error!(operation = ?op, "Upstream API key is not configured"),
        _ => tracing::error!(operation = ?op, error = %error, "Upstream call failed"),
    }
    ApiError::Upstream(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        routes::{app, test_support},
        testing::MockStewie,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::json;
    use tower::ServiceExt;

    const CLIENT_IP: &str = "8.8.8.8";

    fn production(mock: &MockStewie) -> Settings {
        Settings {
            environment: phynite_common::Environment::Production,
            ..mock.settings()
        }
    }

    async fn session_token(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/v1/signup/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        test_support::json_body(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", CLIENT_IP)
            .header(SESSION_TOKEN_HEADER, token)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn signup_body(email: &str) -> Value {
        json!({
            "website": "https://example.com",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": email,
            "planId": "yearly",
            "acceptTerms": true,
            "website_confirm": "",
            "elapsedMs": 6500
        })
    }

    #[test]
    fn test_referer_host() {
        assert_eq!(referer_host("https://Shop.Example.com/signup?x=1").as_deref(), Some("shop.example.com"));
        assert_eq!(referer_host("http://user@example.com:8080/").as_deref(), Some("example.com"));
        assert_eq!(referer_host("not a url"), None);
    }

    #[tokio::test]
    async fn test_check_email_reports_existing_account() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));
        let token = session_token(&app).await;

        let response = app
            .clone()
            .oneshot(post_json("/v1/signup/check-email", &token, json!({ "email": "existing@example.com" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["exists"], true);

        let response = app
            .oneshot(post_json("/v1/signup/check-website", &token, json!({ "website": "https://fresh.io" })))
            .await
            .unwrap();
        let body = test_support::json_body(response).await;
        assert_eq!(body["exists"], false);
    }

    #[tokio::test]
    async fn test_missing_session_token_is_unauthorized() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));

        let response = app
            .oneshot(post_json("/v1/signup/check-email", "", json!({ "email": "ada@example.com" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(mock.hits("/v1/users/signup-existence-check"), 0);
    }

    #[tokio::test]
    async fn test_invalid_email_is_field_error() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));
        let token = session_token(&app).await;

        let response = app
            .oneshot(post_json("/v1/signup/check-email", &token, json!({ "email": "nope" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = test_support::json_body(response).await;
        assert_eq!(body["code"], "invalid_email");
        assert_eq!(body["errors"]["email"], "Please enter a valid email address.");
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_sixth_attempt() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));
        let token = session_token(&app).await;

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(post_json("/v1/signup/check-email", &token, json!({ "email": "ada@example.com" })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(post_json("/v1/signup/check-email", &token, json!({ "email": "ada@example.com" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        let body = test_support::json_body(response).await;
        assert_eq!(body["code"], "rate_limit_exceeded");
        assert_eq!(mock.hits("/v1/users/signup-existence-check"), 5);
    }

    #[tokio::test]
    async fn test_local_addresses_skip_rate_limit_outside_production() {
        let mock = MockStewie::start().await;
        let settings = Settings {
            rate_limit: 1,
            ..mock.settings()
        };
        let app = app(test_support::state(settings));
        let token = session_token(&app).await;

        for _ in 0..3 {
            let request = Request::builder()
                .method("POST")
                .uri("/v1/signup/check-email")
                .header("content-type", "application/json")
                .header(SESSION_TOKEN_HEADER, token.as_str())
                .body(Body::from(json!({ "email": "ada@example.com" }).to_string()))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_create_checkout_success() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));
        let token = session_token(&app).await;

        let response = app
            .oneshot(post_json("/v1/signup/create-checkout", &token, signup_body("ada@example.com")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::json_body(response).await;
        assert_eq!(body["success"], true);
        assert!(body["sessionId"].as_str().unwrap().starts_with("cs_test_"));

        let forwarded = mock.last_checkout().unwrap();
        assert_eq!(forwarded["planId"], "yearly");
        assert!(forwarded.get("tosAcceptedAt").is_some());
        assert!(forwarded.get("website_confirm").is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_gets_uniform_error() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));
        let token = session_token(&app).await;

        let bodies = [r#"{"email": 5"#, r#"{"email": 5}"#];
        for raw in bodies {
            let request = Request::builder()
                .method("POST")
                .uri("/v1/signup/create-checkout")
                .header("content-type", "application/json")
                .header("x-forwarded-for", CLIENT_IP)
                .header(SESSION_TOKEN_HEADER, token.as_str())
                .body(Body::from(raw))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = test_support::json_body(response).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["code"], "validation_error");
            assert!(body["errors"]["body"].is_string());
        }
        assert_eq!(mock.hits("/v1/billing/checkout"), 0);
    }

    #[tokio::test]
    async fn test_honeypot_rejects_without_upstream_call() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));
        let token = session_token(&app).await;

        let mut body = signup_body("ada@example.com");
        body["website_confirm"] = json!("http://spam.example");

        let response = app
            .oneshot(post_json("/v1/signup/create-checkout", &token, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = test_support::json_body(response).await;
        assert_eq!(body["code"], "submission_rejected");
        assert_eq!(
            body["errors"]["form"],
            "Your submission could not be processed. Please try again."
        );
        assert!(body["errors"].get("website_confirm").is_none());
        assert_eq!(mock.hits("/v1/billing/checkout"), 0);
    }

    #[tokio::test]
    async fn test_fast_disposable_submission_reports_both_reasons() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));
        let token = session_token(&app).await;

        let mut body = signup_body("test@mailinator.com");
        body["elapsedMs"] = json!(500);

        let response = app
            .oneshot(post_json("/v1/signup/create-checkout", &token, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = test_support::json_body(response).await;
        assert_eq!(body["errors"]["email"], "Please use a permanent email address");
        assert!(body["errors"]["form"].is_string());
    }

    #[tokio::test]
    async fn test_elapsed_time_falls_back_to_token_age() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));
        // Token issued just now: no client timing means the submission is too fast
        let token = session_token(&app).await;

        let mut body = signup_body("ada@example.com");
        body.as_object_mut().unwrap().remove("elapsedMs");

        let response = app
            .oneshot(post_json("/v1/signup/create-checkout", &token, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = test_support::json_body(response).await;
        assert!(body["errors"]["form"].is_string());
    }

    #[tokio::test]
    async fn test_upstream_rejection_is_generic_error() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));
        let token = session_token(&app).await;

        let response = app
            .oneshot(post_json("/v1/signup/create-checkout", &token, signup_body("existing@example.com")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = test_support::json_body(response).await;
        assert_eq!(body["code"], "checkout_error");
        assert_eq!(body["message"], "Unable to create checkout session. Please try again.");
    }

    #[tokio::test]
    async fn test_validation_errors_are_collected() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));
        let token = session_token(&app).await;

        let body = json!({
            "website": "https://example.com/pricing",
            "firstName": "",
            "lastName": "Lovelace",
            "email": "ada@example.com",
            "planId": "weekly",
            "acceptTerms": false,
            "elapsedMs": 5000
        });
        let response = app
            .oneshot(post_json("/v1/signup/create-checkout", &token, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = test_support::json_body(response).await;
        assert_eq!(body["code"], "validation_error");
        for field in ["website", "firstName", "planId", "acceptTerms"] {
            assert!(body["errors"][field].is_string(), "missing error for {}", field);
        }
    }

    #[tokio::test]
    async fn test_products_are_cached() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));

        let mut payloads = Vec::new();
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/v1/signup/get-products").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            payloads.push(test_support::json_body(response).await);
        }

        assert_eq!(payloads[0], payloads[1]);
        assert_eq!(payloads[0]["monthly"]["id"], "monthly");
        assert_eq!(mock.hits("/v1/billing/products"), 1);
    }

    #[tokio::test]
    async fn test_disallowed_referer_is_forbidden() {
        let mock = MockStewie::start().await;
        let settings = Settings {
            allowed_domains: vec!["example.com".to_string()],
            ..production(&mock)
        };
        let app = app(test_support::state(settings));

        let request = |referer: &'static str| {
            Request::builder()
                .uri("/v1/signup/session")
                .header("referer", referer)
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(request("https://evil.test/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.oneshot(request("https://www.example.com/signup")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_connection_requires_admin() {
        let mock = MockStewie::start().await;
        let app = app(test_support::state(production(&mock)));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/v1/signup/test-connection").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/signup/test-connection")
                    .header("authorization", format!("Bearer {}", test_support::ADMIN_TOKEN))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["message"], "Billing service is healthy");
    }
}
