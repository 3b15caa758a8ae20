//! Response envelope normalization
//!
//! Deployed backend versions disagree about where results live: the
//! outcome, document, and contact may sit at the top level, under
//! `data`, or under `document`, and some endpoints return the bare
//! document with no envelope at all. Everything funnels through
//! [`normalize_response`], which flattens the known shapes into a
//! [`SyncResponse`] or a typed [`SyncError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SyncError;
use crate::types::{Contact, Document};

/// Envelope-level outcome of a backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Success,
    /// The operation landed but the backend flagged a follow-up
    PartialSuccess,
    Failure,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Success => write!(f, "success"),
            SyncOutcome::PartialSuccess => write!(f, "partial_success"),
            SyncOutcome::Failure => write!(f, "failure"),
        }
    }
}

/// Normalized result of a backend call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub outcome: SyncOutcome,
    pub document: Option<Document>,
    pub contact: Option<Contact>,
    pub message: Option<String>,
}

/// Flatten a raw response body into a [`SyncResponse`].
///
/// A failure envelope whose message says the signature was already
/// recorded normalizes to success: the first attempt landed and the
/// retry is reporting old news. A status string that is actually a
/// document status means the body is the document itself, not an
/// envelope, and the HTTP status decides the outcome.
pub fn normalize_response(http_status: u16, body: &Value) -> Result<SyncResponse, SyncError> {
    let message = extract_message(body);

    if let Some(msg) = &message {
        if is_unknown_operation(msg) {
            return Err(SyncError::UnknownOperation(msg.clone()));
        }
    }

    if http_status == 409 {
        return Err(SyncError::Conflict);
    }
    if http_status == 404 {
        return Err(SyncError::NotFound(
            message.unwrap_or_else(|| "resource not found".to_string()),
        ));
    }

    let document = extract_document(body);
    let contact = extract_contact(body);

    let outcome = match envelope_status(body) {
        Some(s) => match parse_outcome(s) {
            Some(o) => Some(o),
            // The body is a bare document; its own status is not an
            // envelope outcome.
            None if is_document_status(s) => None,
            None => {
                return Err(SyncError::UnrecognizedEnvelope(format!(
                    "unexpected envelope status '{}'",
                    s
                )))
            }
        },
        None => None,
    };

    match outcome {
        Some(SyncOutcome::Failure) => {
            let msg = message.unwrap_or_else(|| "backend reported failure".to_string());
            let lowered = msg.to_ascii_lowercase();
            if lowered.contains("already") && lowered.contains("signed") {
                return Ok(SyncResponse {
                    outcome: SyncOutcome::Success,
                    document,
                    contact,
                    message: Some(msg),
                });
            }
            if lowered.contains("conflict") || lowered.contains("revision mismatch") {
                return Err(SyncError::Conflict);
            }
            if http_status >= 500 {
                return Err(SyncError::Server {
                    status: http_status,
                    message: msg,
                });
            }
            Err(SyncError::Rejected { message: msg })
        }
        Some(outcome) => Ok(SyncResponse {
            outcome,
            document,
            contact,
            message,
        }),
        None => {
            if (200..300).contains(&http_status) {
                if document.is_some() || contact.is_some() {
                    return Ok(SyncResponse {
                        outcome: SyncOutcome::Success,
                        document,
                        contact,
                        message,
                    });
                }
                return Err(SyncError::UnrecognizedEnvelope(truncate_body(body)));
            }
            Err(SyncError::Server {
                status: http_status,
                message: message.unwrap_or_else(|| truncate_body(body)),
            })
        }
    }
}

// ============================================================================
// Shape probing
// ============================================================================

/// First envelope-level status string, checking the top level then `data`
fn envelope_status(body: &Value) -> Option<&str> {
    for scope in [Some(body), body.get("data")].into_iter().flatten() {
        for key in ["status", "outcome"] {
            if let Some(s) = scope.get(key).and_then(Value::as_str) {
                return Some(s);
            }
        }
    }
    None
}

fn parse_outcome(s: &str) -> Option<SyncOutcome> {
    match s.to_ascii_lowercase().as_str() {
        "success" => Some(SyncOutcome::Success),
        "partial_success" => Some(SyncOutcome::PartialSuccess),
        "failure" | "failed" => Some(SyncOutcome::Failure),
        _ => None,
    }
}

/// Lowercase wire forms of [`crate::types::DocumentStatus`]
fn is_document_status(s: &str) -> bool {
    matches!(s, "draft" | "waiting" | "signed" | "declined" | "expired")
}

/// Human-readable message, from `message` or `error` (string or object
/// with a nested `message`), at the top level or under `data`
fn extract_message(body: &Value) -> Option<String> {
    for scope in [Some(body), body.get("data")].into_iter().flatten() {
        for key in ["message", "error"] {
            match scope.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(Value::Object(obj)) => {
                    if let Some(Value::String(s)) = obj.get("message") {
                        if !s.is_empty() {
                            return Some(s.clone());
                        }
                    }
                }
                _ => {}
            }
        }
    }
    None
}

fn is_unknown_operation(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("unknown operation")
        || lowered.contains("unrecognized operation")
        || lowered.contains("no such operation")
}

fn extract_document(body: &Value) -> Option<Document> {
    for candidate in nested_candidates(body, "document") {
        if looks_like_document(candidate) {
            if let Ok(doc) = serde_json::from_value::<Document>(candidate.clone()) {
                return Some(doc);
            }
        }
    }
    None
}

fn extract_contact(body: &Value) -> Option<Contact> {
    for candidate in nested_candidates(body, "contact") {
        if looks_like_contact(candidate) {
            if let Ok(contact) = serde_json::from_value::<Contact>(candidate.clone()) {
                return Some(contact);
            }
        }
    }
    None
}

/// Places a payload of the given kind has been observed: its own key at
/// the top level, the same key under `data`, bare under `data`, or the
/// whole body
fn nested_candidates<'a>(body: &'a Value, key: &str) -> Vec<&'a Value> {
    let mut candidates = Vec::new();
    if let Some(v) = body.get(key) {
        candidates.push(v);
    }
    if let Some(v) = body.get("data").and_then(|d| d.get(key)) {
        candidates.push(v);
    }
    if let Some(v) = body.get("data") {
        candidates.push(v);
    }
    candidates.push(body);
    candidates
}

fn looks_like_document(v: &Value) -> bool {
    let Some(obj) = v.as_object() else {
        return false;
    };
    let has_id = obj.get("id").map(Value::is_string).unwrap_or(false);
    let has_status = obj
        .get("status")
        .and_then(Value::as_str)
        .map(is_document_status)
        .unwrap_or(false);
    has_id && has_status
}

fn looks_like_contact(v: &Value) -> bool {
    let Some(obj) = v.as_object() else {
        return false;
    };
    let has_id = obj.get("id").map(Value::is_string).unwrap_or(false);
    let has_email = obj.get("email").map(Value::is_string).unwrap_or(false);
    has_id && has_email && !looks_like_document(v)
}

fn truncate_body(body: &Value) -> String {
    let text = body.to_string();
    if text.chars().count() <= 240 {
        text
    } else {
        text.chars().take(240).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
