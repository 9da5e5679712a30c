//! Field validation for signup submissions
//!
//! The same rules run in the CLI (before a request is sent) and in the
//! server (before anything is forwarded upstream).

use crate::SignupSubmission;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum lengths accepted by the upstream API
pub const FIRST_NAME_MAX: usize = 64;
pub const LAST_NAME_MAX: usize = 128;
pub const EMAIL_MAX: usize = 255;

/// Subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Monthly,
    Yearly,
}

impl Plan {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "monthly" => Some(Plan::Monthly),
            "yearly" => Some(Plan::Yearly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Monthly => "monthly",
            Plan::Yearly => "yearly",
        }
    }
}

/// Field name -> message, ordered for stable output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(pub BTreeMap<String, String>);

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.values().map(String::as_str).collect();
        write!(f, "{}", joined.join(" "))
    }
}

impl std::error::Error for FieldErrors {}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error; the first error per field wins
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// A submission whose fields passed validation, normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSignup {
    pub website: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub plan: Plan,
}

/// Validate every field of a submission, collecting all errors.
///
/// The honeypot and timing checks are not part of this; they belong to
/// the server's bot screening.
pub fn validate_submission(submission: &SignupSubmission) -> Result<ValidatedSignup, FieldErrors> {
    let mut errors = FieldErrors::new();

    let website = validate_website(&submission.website)
        .map_err(|msg| errors.add("website", msg))
        .ok();
    let first_name = validate_name(&submission.first_name, "First name", FIRST_NAME_MAX)
        .map_err(|msg| errors.add("firstName", msg))
        .ok();
    let last_name = validate_name(&submission.last_name, "Last name", LAST_NAME_MAX)
        .map_err(|msg| errors.add("lastName", msg))
        .ok();
    let email = validate_email(&submission.email)
        .map_err(|msg| errors.add("email", msg))
        .ok();

    let plan = Plan::parse(&submission.plan_id);
    if plan.is_none() {
        errors.add("planId", "Please select a valid subscription plan.");
    }

    if !submission.accept_terms {
        errors.add("acceptTerms", "You must accept the Terms of Service to continue.");
    }

    match (website, first_name, last_name, email, plan) {
        (Some(website), Some(first_name), Some(last_name), Some(email), Some(plan)) if errors.is_empty() => {
            Ok(ValidatedSignup {
                website,
                first_name,
                last_name,
                email,
                plan,
            })
        }
        _ => Err(errors),
    }
}

/// Validate and normalize (trim, lowercase) an email address
pub fn validate_email(email: &str) -> Result<String, String> {
    let email = email.trim().to_lowercase();

    if email.is_empty() {
        return Err("Email is required.".to_string());
    }
    if email.len() > EMAIL_MAX {
        return Err("Email address must be less than 255 characters.".to_string());
    }
    if !is_valid_email(&email) {
        return Err("Please enter a valid email address.".to_string());
    }

    Ok(email)
}

/// Validate a website URL: http(s) root domain only, no path, query or fragment
pub fn validate_website(website: &str) -> Result<String, String> {
    let website = website.trim();

    if website.is_empty() {
        return Err("Website URL is required.".to_string());
    }

    let lower = website.to_lowercase();
    let rest = if let Some(rest) = lower.strip_prefix("https://") {
        rest
    } else if let Some(rest) = lower.strip_prefix("http://") {
        rest
    } else if lower.contains("://") {
        return Err("Website must use http or https protocol.".to_string());
    } else {
        return Err("Please enter a valid URL.".to_string());
    };

    let host_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(host_end);

    let host = match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.parse::<u16>().is_ok() => host,
        Some(_) => return Err("Please enter a valid URL.".to_string()),
        None => authority,
    };

    if !is_valid_hostname(host) {
        return Err("Please enter a valid URL.".to_string());
    }
    if !tail.is_empty() && tail != "/" {
        return Err("Please enter the root domain without any path.".to_string());
    }

    Ok(website.trim_end_matches('/').to_string())
}

/// Validate a personal name field
pub fn validate_name(name: &str, label: &str, max: usize) -> Result<String, String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(format!("{} is required.", label));
    }
    if name.chars().count() > max {
        return Err(format!("{} must be less than {} characters.", label, max));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c.is_whitespace() || c == '-' || c == '\'')
    {
        return Err(format!(
            "{} can only contain letters, spaces, hyphens, and apostrophes.",
            label
        ));
    }

    Ok(name.to_string())
}

/// Domain part of an email address, lowercased
pub fn email_domain(email: &str) -> Option<String> {
    email
        .trim()
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_lowercase())
        .filter(|d| !d.is_empty())
}

fn is_valid_email(email: &str) -> bool {
    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return false,
    };

    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let local_ok = local.chars().all(|c| {
        c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~.-".contains(c)
    });
    if !local_ok || local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }

    is_valid_hostname(domain)
}

/// Lowercase DNS hostname with at least one dot
pub fn is_valid_hostname(host: &str) -> bool {
    if host.len() < 4 || host.len() > 253 || !host.contains('.') {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    })
}
