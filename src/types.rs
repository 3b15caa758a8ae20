//! Domain model for signing workflows
//!
//! Wire-facing types are serde-tolerant: the backend frequently returns
//! partially shaped documents, so collections and optional fields default
//! instead of failing deserialization. Only identity and status fields are
//! required, since the engine cannot reason about a document without them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Status enums
// ============================================================================

/// Document lifecycle status
///
/// `draft -> waiting -> {signed, declined, expired}`. The right-hand three
/// are terminal and never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Being assembled, not yet sent to signers
    Draft,
    /// Dispatched, collecting signatures
    Waiting,
    /// Every signer signed
    Signed,
    /// At least one signer declined
    Declined,
    /// Signing window elapsed before completion
    Expired,
}

impl DocumentStatus {
    /// Terminal statuses are sticky
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Signed | DocumentStatus::Declined | DocumentStatus::Expired
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Waiting => "waiting",
            DocumentStatus::Signed => "signed",
            DocumentStatus::Declined => "declined",
            DocumentStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Per-signer status. Moves once, from waiting to signed or declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerStatus {
    Waiting,
    Signed,
    Declined,
}

impl fmt::Display for SignerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignerStatus::Waiting => "waiting",
            SignerStatus::Signed => "signed",
            SignerStatus::Declined => "declined",
        };
        write!(f, "{}", s)
    }
}

/// How the signer list is populated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Signer list fixed at creation
    #[default]
    Standard,
    /// Recipients attached dynamically after creation
    Bulk,
}

// ============================================================================
// Document and slots
// ============================================================================

/// A party expected to sign, paired with the placeholder at the same index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signer {
    /// 1-based position, meaningful when the document is sequential
    pub order: u32,
    pub identity_id: String,
    pub email: String,
    pub status: SignerStatus,
}

/// A document-embedded slot describing where and how a party signs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placeholder {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: String,
    /// Identity occupying this slot, None until a signer is attached
    #[serde(default)]
    pub signer_identity_ref: Option<String>,
    /// Opaque field geometry, passed through untouched
    #[serde(default)]
    pub field_meta: serde_json::Value,
}

impl Placeholder {
    /// A slot no signer occupies yet
    pub fn is_vacant(&self) -> bool {
        self.signer_identity_ref.is_none() && self.email.is_none()
    }
}

/// The signing workflow state for one document
///
/// `signers` and `placeholders` are index-aligned: entry i of each
/// describes the same party. Occupied slots form a prefix; vacant
/// placeholders extend past `signers.len()`. Mutate the pair only through
/// the reconcile module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Identity of the author
    #[serde(default)]
    pub created_by: String,
    /// Sequential signing: signer N waits for signers 1..N-1
    #[serde(default)]
    pub send_in_order: bool,
    #[serde(default)]
    pub kind: DocumentKind,
    /// Locator for the stored document bytes
    #[serde(default)]
    pub file_ref: Option<String>,
    pub status: DocumentStatus,
    /// Backend revision counter, checked on writes
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub signers: Vec<Signer>,
    #[serde(default)]
    pub placeholders: Vec<Placeholder>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One index of the parallel arrays viewed as a unit
#[derive(Debug, Clone)]
pub struct SignerSlot {
    pub index: usize,
    pub placeholder: Placeholder,
    /// None for vacant capacity past the occupied prefix
    pub signer: Option<Signer>,
}

impl Document {
    /// View the parallel arrays as slots
    pub fn slots(&self) -> Vec<SignerSlot> {
        self.placeholders
            .iter()
            .enumerate()
            .map(|(index, placeholder)| SignerSlot {
                index,
                placeholder: placeholder.clone(),
                signer: self.signers.get(index).cloned(),
            })
            .collect()
    }

    /// View one slot, None past the placeholder array
    pub fn slot(&self, index: usize) -> Option<SignerSlot> {
        self.placeholders.get(index).map(|placeholder| SignerSlot {
            index,
            placeholder: placeholder.clone(),
            signer: self.signers.get(index).cloned(),
        })
    }
}

// ============================================================================
// Contacts and recipients
// ============================================================================

/// A deduplicated identity in the tenant's directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    /// Normalized (trimmed, lowercased); the dedup key
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Fields for a contact that does not exist yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContact {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Caller-provided description of a recipient to attach
#[derive(Debug, Clone)]
pub struct RecipientInput {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
}

/// Caller identity as known to the engine
///
/// Signer matching prefers the identity id and falls back to a
/// case-insensitive email comparison.
#[derive(Debug, Clone)]
pub struct SignerIdentity {
    pub identity_id: String,
    pub email: String,
}

// ============================================================================
// Signature payloads
// ============================================================================

/// Signature bytes or a locator for bytes stored elsewhere
///
/// References are preferred: they keep request bodies small and let the
/// backend pull from storage at its own pace. Inline bytes are the
/// fallback when no locator exists.
#[derive(Debug, Clone)]
pub enum SignaturePayload {
    /// Locator for already-stored signature bytes
    Reference(String),
    /// Raw bytes shipped with the request
    Inline(bytes::Bytes),
}

/// Size class driving timeout and retry budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadClass {
    Reference,
    SmallInline,
    LargeInline,
}

impl fmt::Display for PayloadClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadClass::Reference => write!(f, "reference"),
            PayloadClass::SmallInline => write!(f, "small_inline"),
            PayloadClass::LargeInline => write!(f, "large_inline"),
        }
    }
}

impl SignaturePayload {
    /// Classify against the configured large-inline threshold
    pub fn class(&self, large_threshold: usize) -> PayloadClass {
        match self {
            SignaturePayload::Reference(_) => PayloadClass::Reference,
            SignaturePayload::Inline(data) if data.len() > large_threshold => {
                PayloadClass::LargeInline
            }
            SignaturePayload::Inline(_) => PayloadClass::SmallInline,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
