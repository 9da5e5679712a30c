//! Admin-configurable settings record

use crate::constants::{
    DEFAULT_RATE_LIMIT, DEVELOPMENT_API_URL, MAX_RATE_LIMIT, MIN_RATE_LIMIT, PRODUCTION_API_URL,
};
use crate::validation::is_valid_hostname;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Deployment environment of the signup form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Development,
}

impl Environment {
    /// Parse an environment name, falling back to production
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "development" => Environment::Development,
            "staging" => Environment::Staging,
            _ => Environment::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
        }
    }

    /// Upstream base URL used when none is configured
    pub fn default_api_url(&self) -> &'static str {
        match self {
            Environment::Development => DEVELOPMENT_API_URL,
            Environment::Production | Environment::Staging => PRODUCTION_API_URL,
        }
    }

    /// Non-production environments relax IP-based limits for local addresses
    pub fn is_relaxed(&self) -> bool {
        matches!(self, Environment::Development | Environment::Staging)
    }
}

/// Visual style of the rendered form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStyle {
    #[default]
    Default,
    Minimal,
    Modern,
    Compact,
}

impl FormStyle {
    /// Parse a style name, falling back to the default style
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "minimal" => FormStyle::Minimal,
            "modern" => FormStyle::Modern,
            "compact" => FormStyle::Compact,
            _ => FormStyle::Default,
        }
    }
}

/// Settings record.
///
/// Unknown or missing fields fall back to their defaults so that older
/// stored records keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Upstream API key, never exposed to form visitors
    pub api_key: String,
    /// Upstream base URL; empty means the environment default
    pub stewie_url: String,
    #[serde(deserialize_with = "lenient_environment")]
    pub environment: Environment,
    pub stripe_publishable_key: String,
    #[serde(deserialize_with = "lenient_form_style")]
    pub form_style: FormStyle,
    pub primary_color: Option<String>,
    pub show_terms_links: bool,
    /// Log upstream request/response bodies (PII redacted)
    pub enable_logging: bool,
    /// Attempts per minute per IP
    #[serde(deserialize_with = "lenient_rate_limit")]
    pub rate_limit: u32,
    /// Referer hosts allowed to use the signup routes; empty allows all
    pub allowed_domains: Vec<String>,
    pub enable_ga_tracking: bool,
    pub ga_measurement_id: String,
    pub enable_fb_tracking: bool,
    pub fb_pixel_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            stewie_url: PRODUCTION_API_URL.to_string(),
            environment: Environment::Production,
            stripe_publishable_key: String::new(),
            form_style: FormStyle::Default,
            primary_color: None,
            show_terms_links: true,
            enable_logging: false,
            rate_limit: DEFAULT_RATE_LIMIT,
            allowed_domains: Vec::new(),
            enable_ga_tracking: false,
            ga_measurement_id: String::new(),
            enable_fb_tracking: false,
            fb_pixel_id: String::new(),
        }
    }
}

impl Settings {
    /// Base URL for upstream calls, without trailing slash
    pub fn api_base_url(&self) -> &str {
        let url = self.stewie_url.trim_end_matches('/');
        if url.is_empty() {
            self.environment.default_api_url()
        } else {
            url
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Rate limit clamped to the supported range
    pub fn effective_rate_limit(&self) -> u32 {
        self.rate_limit.clamp(MIN_RATE_LIMIT, MAX_RATE_LIMIT)
    }

    /// Publishable key handed to the browser, if one is configured
    pub fn publishable_key(&self) -> Option<&str> {
        let key = self.stripe_publishable_key.trim();
        (!key.is_empty()).then_some(key)
    }

    /// Copy with the API key masked, for display
    pub fn masked(&self) -> Self {
        Self {
            api_key: mask_secret(&self.api_key),
            ..self.clone()
        }
    }

    /// Sanitize an incoming settings update against the currently stored record.
    ///
    /// Fields that fail a format check keep their previous value; fields with
    /// a closed set of values fall back to their default.
    pub fn sanitize(self, previous: &Settings) -> Settings {
        let api_key = {
            let key = self.api_key.trim().to_string();
            // A masked key coming back from a read-modify-write keeps the stored key
            if !previous.api_key.is_empty() && key == mask_secret(&previous.api_key) {
                previous.api_key.clone()
            } else {
                key
            }
        };

        let stewie_url = sanitize_api_url(&self.stewie_url);

        let stripe_publishable_key = {
            let key = self.stripe_publishable_key.trim();
            if key.is_empty() || is_publishable_key(key) {
                key.to_string()
            } else {
                previous.stripe_publishable_key.clone()
            }
        };

        let primary_color = self
            .primary_color
            .as_deref()
            .map(str::trim)
            .filter(|c| is_hex_color(c))
            .map(str::to_lowercase);

        let allowed_domains = self
            .allowed_domains
            .iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| is_valid_hostname(d) || d == "localhost")
            .collect();

        let ga_measurement_id = {
            let id = self.ga_measurement_id.trim();
            if id.is_empty() || is_ga_measurement_id(id) {
                id.to_string()
            } else {
                previous.ga_measurement_id.clone()
            }
        };

        let fb_pixel_id = {
            let id = self.fb_pixel_id.trim();
            if id.is_empty() || is_fb_pixel_id(id) {
                id.to_string()
            } else {
                previous.fb_pixel_id.clone()
            }
        };

        Settings {
            api_key,
            stewie_url,
            environment: self.environment,
            stripe_publishable_key,
            form_style: self.form_style,
            primary_color,
            show_terms_links: self.show_terms_links,
            enable_logging: self.enable_logging,
            rate_limit: self.rate_limit.clamp(MIN_RATE_LIMIT, MAX_RATE_LIMIT),
            allowed_domains,
            enable_ga_tracking: self.enable_ga_tracking,
            ga_measurement_id,
            enable_fb_tracking: self.enable_fb_tracking,
            fb_pixel_id,
        }
    }
}

// Closed-set and numeric fields decode leniently so that one bad value in an
// update is corrected by `sanitize` instead of failing the whole record.

fn lenient_environment<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Environment, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Environment::parse_or_default(&s),
        _ => Environment::default(),
    })
}

fn lenient_form_style<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FormStyle, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => FormStyle::parse_or_default(&s),
        _ => FormStyle::default(),
    })
}

fn lenient_rate_limit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let requested = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(match requested {
        Some(n) => n.clamp(MIN_RATE_LIMIT as i64, MAX_RATE_LIMIT as i64) as u32,
        None => DEFAULT_RATE_LIMIT,
    })
}

/// Mask all but the last four characters of a secret
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

/// Only HTTPS, or plain HTTP against localhost, is accepted
fn sanitize_api_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        return String::new();
    }
    if url.starts_with("https://") || url.starts_with("http://localhost") {
        url.to_string()
    } else {
        PRODUCTION_API_URL.to_string()
    }
}

fn is_publishable_key(key: &str) -> bool {
    let rest = key
        .strip_prefix("pk_test_")
        .or_else(|| key.strip_prefix("pk_live_"));
    matches!(rest, Some(r) if !r.is_empty() && r.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn is_hex_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

fn is_ga_measurement_id(id: &str) -> bool {
    match id.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("G-") => {
            let rest = &id[2..];
            rest.len() == 10 && rest.chars().all(|c| c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

fn is_fb_pixel_id(id: &str) -> bool {
    (15..=16).contains(&id.len()) && id.chars().all(|c| c.is_ascii_digit())
}
