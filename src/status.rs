//! Document and signer lifecycle rules
//!
//! Pure functions over the document model. Nothing here talks to the
//! backend; the orchestrator composes these with persistence.
//!
//! Document lifecycle: `draft -> waiting -> {signed, declined, expired}`.
//! Signer statuses move once, from waiting to signed or declined, and the
//! document status is always derivable from its signers while the
//! document is in flight.

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::types::{Document, DocumentStatus, Signer, SignerIdentity, SignerStatus};

/// Derive document status from signer statuses.
///
/// Terminal statuses are sticky. Declines win over progress: one declined
/// signer fails the document even if everyone else signed. Draft
/// documents stay draft until dispatched regardless of signer state.
pub fn derive_status(current: DocumentStatus, signers: &[Signer]) -> DocumentStatus {
    if current.is_terminal() {
        return current;
    }
    if current == DocumentStatus::Draft {
        return DocumentStatus::Draft;
    }
    if signers
        .iter()
        .any(|s| s.status == SignerStatus::Declined)
    {
        return DocumentStatus::Declined;
    }
    if !signers.is_empty()
        && signers.iter().all(|s| s.status == SignerStatus::Signed)
    {
        return DocumentStatus::Signed;
    }
    DocumentStatus::Waiting
}

/// Locate the signer for an identity.
///
/// Matches by identity id first, then by case-insensitive email. Returns
/// None when neither matches; callers treat that as not eligible.
pub fn find_signer<'a>(
    document: &'a Document,
    identity: &SignerIdentity,
) -> Option<(usize, &'a Signer)> {
    if let Some(found) = document
        .signers
        .iter()
        .enumerate()
        .find(|(_, s)| s.identity_id == identity.identity_id)
    {
        return Some(found);
    }

    let email = identity.email.trim().to_ascii_lowercase();
    if email.is_empty() {
        return None;
    }
    document
        .signers
        .iter()
        .enumerate()
        .find(|(_, s)| s.email.trim().to_ascii_lowercase() == email)
}

/// Whether an identity may sign right now.
///
/// Fails closed: unknown identities, settled signers, and documents not
/// collecting signatures all answer false. On sequential documents every
/// earlier signer must have signed; a declined predecessor therefore
/// blocks the rest permanently.
pub fn can_sign(document: &Document, identity: &SignerIdentity) -> bool {
    if document.status != DocumentStatus::Waiting {
        return false;
    }

    let signer = match find_signer(document, identity) {
        Some((_, signer)) => signer,
        None => return false,
    };

    if signer.status != SignerStatus::Waiting {
        return false;
    }

    if document.send_in_order {
        return document
            .signers
            .iter()
            .filter(|s| s.order < signer.order)
            .all(|s| s.status == SignerStatus::Signed);
    }

    true
}

/// Move a draft document into circulation.
pub fn dispatch(document: &mut Document) -> Result<()> {
    if document.status != DocumentStatus::Draft {
        return Err(EngineError::InvalidTransition {
            detail: format!("cannot dispatch a {} document", document.status),
        });
    }
    if document.signers.is_empty() {
        return Err(EngineError::InvalidTransition {
            detail: "cannot dispatch a document with no signers".to_string(),
        });
    }

    document.status = DocumentStatus::Waiting;
    debug!(document_id = %document.id, "Document dispatched");
    Ok(())
}

/// Time out a document that is still collecting signatures.
///
/// The timer lives outside the engine; this is the transition it applies
/// when it fires.
pub fn mark_expired(document: &mut Document) -> Result<()> {
    if document.status != DocumentStatus::Waiting {
        return Err(EngineError::InvalidTransition {
            detail: format!("cannot expire a {} document", document.status),
        });
    }

    document.status = DocumentStatus::Expired;
    debug!(document_id = %document.id, "Document expired");
    Ok(())
}

/// Record a signer's decision and recompute document status.
///
/// The only mutation path for signer status. Re-applying the status a
/// signer already holds is a no-op; moving out of a settled status is
/// rejected. Returns the document status before and after for logging.
pub fn apply_signer_transition(
    document: &mut Document,
    index: usize,
    new_status: SignerStatus,
) -> Result<(DocumentStatus, DocumentStatus)> {
    let signer = match document.signers.get_mut(index) {
        Some(signer) => signer,
        None => {
            return Err(EngineError::InvalidTransition {
                detail: format!("no signer at index {}", index),
            })
        }
    };

    if signer.status != SignerStatus::Waiting && signer.status != new_status {
        return Err(EngineError::InvalidTransition {
            detail: format!(
                "signer {} is already {}",
                signer.identity_id, signer.status
            ),
        });
    }
    signer.status = new_status;

    let before = document.status;
    document.status = derive_status(before, &document.signers);
    if before != document.status {
        debug!(
            document_id = %document.id,
            from = %before,
            to = %document.status,
            "Document status changed"
        );
    }

    Ok((before, document.status))
}

// ============================================================================
// Tests
// ============================================================================
