//! Maps raw transport outcomes onto [`ErrorKind`]s.
//!
//! Classification is a pure function of the outcome (plus the current time,
//! which is only needed to turn an HTTP-date `Retry-After` into a duration).

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::core::{ErrorKind, Failure, Outcome};
use crate::transport::{RawOutcome, ResponseEnvelope, TransportFailure, TransportFailureKind};

/// The verdict for a failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// The failure kind.
    pub kind: ErrorKind,
    /// Whether another attempt may succeed.
    pub retryable: bool,
    /// Minimum wait requested by the backend.
    pub retry_after: Option<Duration>,
}

impl Classification {
    fn of(kind: ErrorKind) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            retry_after: None,
        }
    }
}

/// Classifies a raw outcome. Returns `None` for 2xx responses.
#[must_use]
pub fn classify(raw: &RawOutcome) -> Option<Classification> {
    classify_at(raw, Utc::now())
}

/// Classifies a raw outcome relative to a fixed "now".
#[must_use]
pub fn classify_at(raw: &RawOutcome, now: DateTime<Utc>) -> Option<Classification> {
    match raw {
        RawOutcome::Failed(failure) => Some(classify_transport_failure(failure)),
        RawOutcome::Response(envelope) if envelope.is_success() => None,
        RawOutcome::Response(envelope) => Some(classify_response(envelope, now)),
    }
}

fn classify_transport_failure(failure: &TransportFailure) -> Classification {
    match failure.kind {
        TransportFailureKind::Timeout => Classification::of(ErrorKind::Timeout),
        TransportFailureKind::Connect
        | TransportFailureKind::Dns
        | TransportFailureKind::Tls
        | TransportFailureKind::Io => Classification::of(ErrorKind::Network),
    }
}

fn classify_response(envelope: &ResponseEnvelope, now: DateTime<Utc>) -> Classification {
    let kind = match envelope.status {
        429 => ErrorKind::RateLimited,
        403 if envelope.header("x-ratelimit-remaining") == Some("0") => ErrorKind::RateLimited,
        401 | 403 => ErrorKind::AuthFailed,
        404 => ErrorKind::NotFound,
        409 | 412 => ErrorKind::Conflict,
        400 | 422 => ErrorKind::ValidationFailed,
        500..=599 => ErrorKind::ServerFault,
        _ => ErrorKind::Unknown,
    };

    let retry_after = match kind {
        ErrorKind::RateLimited | ErrorKind::ServerFault => retry_after_hint(envelope, now),
        _ => None,
    };

    Classification {
        kind,
        retryable: kind.is_retryable(),
        retry_after,
    }
}

/// Extracts the backend's requested wait from `Retry-After` or GitHub's
/// `x-ratelimit-reset`.
#[must_use]
pub fn retry_after_hint(envelope: &ResponseEnvelope, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(value) = envelope.header("retry-after") {
        return parse_retry_after(value, now);
    }

    let reset = envelope.header("x-ratelimit-reset")?.trim().parse::<i64>().ok()?;
    let wait = reset.saturating_sub(now.timestamp());
    u64::try_from(wait).ok().map(Duration::from_secs)
}

/// Parses a `Retry-After` value: delta-seconds or an HTTP-date.
#[must_use]
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let wait = (at - now).to_std().unwrap_or(Duration::ZERO);
    Some(wait)
}

/// Pulls a readable message out of a backend error body.
fn backend_message(envelope: &ResponseEnvelope) -> Option<String> {
    let body = &envelope.body;

    if let Some(message) = body.get("message").and_then(|m| m.as_str()) {
        return Some(message.to_string());
    }

    if let Some(messages) = body.get("errorMessages").and_then(|m| m.as_array()) {
        let joined: Vec<&str> = messages.iter().filter_map(|m| m.as_str()).collect();
        if !joined.is_empty() {
            return Some(joined.join("; "));
        }
    }

    if let Some(errors) = body.get("errors").and_then(|e| e.as_object()) {
        let joined: Vec<String> = errors
            .iter()
            .map(|(field, msg)| format!("{field}: {}", msg.as_str().unwrap_or_default()))
            .collect();
        if !joined.is_empty() {
            return Some(joined.join("; "));
        }
    }

    body.as_str()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.chars().take(200).collect())
}

/// Converts a raw outcome into an [`Outcome`], classifying failures.
pub fn into_outcome(raw: RawOutcome) -> Outcome<ResponseEnvelope> {
    let now = Utc::now();
    match classify_at(&raw, now) {
        None => match raw {
            RawOutcome::Response(envelope) => Ok(envelope),
            RawOutcome::Failed(failure) => Err(Failure::new(ErrorKind::Unknown, failure.message)),
        },
        Some(verdict) => Err(failure_from(&raw, verdict)),
    }
}

fn failure_from(raw: &RawOutcome, verdict: Classification) -> Failure {
    let message = match raw {
        RawOutcome::Failed(failure) => failure.message.clone(),
        RawOutcome::Response(envelope) => match backend_message(envelope) {
            Some(detail) => format!("HTTP {}: {detail}", envelope.status),
            None => format!("HTTP {}: {}", envelope.status, verdict.kind.description()),
        },
    };

    let failure = if verdict.retryable {
        Failure::new(verdict.kind, message)
    } else {
        Failure::terminal(verdict.kind, message)
    };
    failure.with_retry_after(verdict.retry_after)
}
