//! Caller-facing error taxonomy
//!
//! Transport-level failures live in `backend::SyncError`; the facade folds
//! them into this taxonomy before anything reaches a caller.

use thiserror::Error;

/// Engine operation error
#[derive(Debug, Error)]
pub enum EngineError {
    /// Recipient input failed validation
    #[error("invalid recipient: {reason}")]
    RecipientInvalid { reason: String },

    /// Dynamic recipients only apply to bulk documents
    #[error("document {document_id} has a fixed signer list")]
    DocumentNotBulkEligible { document_id: String },

    /// Identity may not sign this document right now
    #[error("not eligible to sign: {reason}")]
    NotEligibleToSign { reason: String },

    /// Signer and placeholder arrays disagree
    #[error("slot arrays misaligned on document {document_id}: {detail}")]
    SlotMisaligned { document_id: String, detail: String },

    /// Requested move violates the lifecycle rules
    #[error("invalid transition: {detail}")]
    InvalidTransition { detail: String },

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// Contact could neither be found nor created
    #[error("contact not found for {0}")]
    ContactNotFound(String),

    /// Another writer changed the document first; refetch and retry
    #[error("document {document_id} was modified concurrently")]
    RevisionConflict { document_id: String },

    /// Backend kept failing after retries were exhausted
    #[error("signing backend unavailable: {message}")]
    BackendUnavailable { message: String },
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
