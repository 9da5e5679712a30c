//! Submission screening: honeypot, time-on-form and disposable email checks

use super::disposable::is_disposable_email;
use phynite_common::{constants::MIN_FORM_ELAPSED_MS, validation::email_domain, FieldErrors, SignupSubmission};

/// Why a submission was treated as automated or abusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Hidden field was filled in
    Honeypot,
    /// Submitted faster than a human can fill the form
    TooFast { elapsed_ms: u64 },
    /// Email belongs to a throwaway mailbox provider
    DisposableEmail { domain: String },
}

impl RejectReason {
    /// Short identifier for logs
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Honeypot => "honeypot",
            RejectReason::TooFast { .. } => "too_fast",
            RejectReason::DisposableEmail { .. } => "disposable_email",
        }
    }

    /// Form field the rejection is reported against
    pub fn field(&self) -> &'static str {
        match self {
            RejectReason::Honeypot | RejectReason::TooFast { .. } => "form",
            RejectReason::DisposableEmail { .. } => "email",
        }
    }

    /// User-facing message; automated-looking submissions get a generic one
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::Honeypot | RejectReason::TooFast { .. } => {
                "Your submission could not be processed. Please try again."
            }
            RejectReason::DisposableEmail { .. } => "Please use a permanent email address",
        }
    }
}

/// Outcome of screening a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(Vec<RejectReason>),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }

    /// Field-level messages for the error response
    pub fn field_errors(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if let Verdict::Reject(reasons) = self {
            for reason in reasons {
                errors.add(reason.field(), reason.message());
            }
        }
        errors
    }
}

/// Screen a submission. Every failing check is reported, not just the first.
///
/// A submission without an elapsed time is treated as instantaneous.
pub fn screen(submission: &SignupSubmission) -> Verdict {
    let mut reasons = Vec::new();

    if !submission.website_confirm.is_empty() {
        reasons.push(RejectReason::Honeypot);
    }

    let elapsed_ms = submission.elapsed_ms.unwrap_or(0);
    if elapsed_ms < MIN_FORM_ELAPSED_MS {
        reasons.push(RejectReason::TooFast { elapsed_ms });
    }

    if is_disposable_email(&submission.email) {
        reasons.push(RejectReason::DisposableEmail {
            domain: email_domain(&submission.email).unwrap_or_default(),
        });
    }

    if reasons.is_empty() {
        Verdict::Accept
    } else {
        Verdict::Reject(reasons)
    }
}
