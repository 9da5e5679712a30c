//! Disposable email provider blocklist

use once_cell::sync::Lazy;
use phynite_common::validation::email_domain;
use std::collections::HashSet;

/// Throwaway mailbox providers - signups from these are refused
static DISPOSABLE_DOMAINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "10minutemail.com",
        "guerrillamail.com",
        "guerrillamailblock.com",
        "sharklasers.com",
        "mailinator.com",
        "yopmail.com",
        "temp-mail.org",
        "tempmail.org",
        "tempmail.net",
        "throwaway.email",
        "maildrop.cc",
        "dispostable.com",
        "trashmail.com",
        "mytrashmail.com",
        "mohmal.com",
        "pokemail.net",
        "spam4.me",
        "bccto.me",
    ]
    .into_iter()
    .collect()
});

/// Check a bare domain, including subdomains of a listed provider
pub fn is_disposable_domain(domain: &str) -> bool {
    let domain = domain.trim().trim_end_matches('.').to_lowercase();

    if DISPOSABLE_DOMAINS.contains(domain.as_str()) {
        return true;
    }

    // "inbox.mailinator.com" -> "mailinator.com", ...
    domain
        .char_indices()
        .filter(|(_, c)| *c == '.')
        .any(|(i, _)| DISPOSABLE_DOMAINS.contains(&domain[i + 1..]))
}

/// Check the domain part of an email address
pub fn is_disposable_email(email: &str) -> bool {
    email_domain(email)
        .map(|domain| is_disposable_domain(&domain))
        .unwrap_or(false)
}
