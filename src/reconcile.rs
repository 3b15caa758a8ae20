//! Signer/placeholder reconciliation
//!
//! Documents carry two parallel arrays: `signers` (who signs) and
//! `placeholders` (where they sign). Entry i of each describes the same
//! party. Every write to either array goes through this module and lands
//! on both sides in one step, so the arrays cannot drift apart.
//!
//! Reachable documents keep their vacancies at the tail: the first
//! `signers.len()` placeholders are occupied and point at their signer,
//! anything past that is vacant capacity. A fetched document violating
//! that layout is surfaced as corrupt rather than silently repaired.

use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::types::{
    Contact, Document, DocumentKind, Placeholder, RecipientInput, Signer, SignerSlot, SignerStatus,
};

/// Result of attaching a recipient
#[derive(Debug, Clone)]
pub struct AttachedSlot {
    pub index: usize,
    /// Composed view of the occupied slot
    pub slot: SignerSlot,
    /// No vacancy existed, a placeholder was appended
    pub appended: bool,
    /// The contact was already on the document; nothing changed
    pub already_present: bool,
}

/// Check recipient input before touching the directory or the document.
///
/// Basic shape only; the directory is the authority on identity.
pub fn validate_recipient(input: &RecipientInput) -> Result<()> {
    let email = input.email.trim();
    if email.is_empty() {
        return Err(EngineError::RecipientInvalid {
            reason: "email is required".to_string(),
        });
    }
    if email.contains(char::is_whitespace) {
        return Err(EngineError::RecipientInvalid {
            reason: format!("email '{}' contains whitespace", email),
        });
    }

    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => {
            return Err(EngineError::RecipientInvalid {
                reason: format!("email '{}' is missing '@'", email),
            })
        }
    };
    if local.is_empty()
        || domain.is_empty()
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(EngineError::RecipientInvalid {
            reason: format!("email '{}' has an invalid domain", email),
        });
    }

    Ok(())
}

/// Dynamic recipients only apply to bulk documents.
pub fn ensure_bulk_eligible(document: &Document) -> Result<()> {
    if document.kind != DocumentKind::Bulk {
        return Err(EngineError::DocumentNotBulkEligible {
            document_id: document.id.clone(),
        });
    }
    Ok(())
}

/// Verify the parallel arrays describe a reachable document.
///
/// The occupied prefix must pair each signer with a placeholder holding
/// its identity; everything past the prefix must be vacant.
pub fn validate_alignment(document: &Document) -> Result<()> {
    if document.signers.len() > document.placeholders.len() {
        return Err(misaligned(
            document,
            format!(
                "{} signers but only {} placeholders",
                document.signers.len(),
                document.placeholders.len()
            ),
        ));
    }

    for (i, signer) in document.signers.iter().enumerate() {
        let placeholder = &document.placeholders[i];
        match placeholder.signer_identity_ref {
            Some(ref id) if *id == signer.identity_id => {}
            Some(ref id) => {
                return Err(misaligned(
                    document,
                    format!(
                        "placeholder {} holds identity {} but the signer there is {}",
                        i, id, signer.identity_id
                    ),
                ));
            }
            None => {
                return Err(misaligned(
                    document,
                    format!("placeholder {} is vacant but signer {} exists", i, i),
                ));
            }
        }
    }

    for (i, placeholder) in document
        .placeholders
        .iter()
        .enumerate()
        .skip(document.signers.len())
    {
        if !placeholder.is_vacant() {
            return Err(misaligned(
                document,
                format!("placeholder {} is occupied with no matching signer", i),
            ));
        }
    }

    Ok(())
}

/// Attach a resolved contact to the first vacant slot, appending a new
/// placeholder when the document has no vacancy left.
///
/// Idempotent for a contact already on the document: the existing slot
/// comes back unchanged. Both arrays are written together; the returned
/// slot is the composed view the caller persists.
pub fn attach_contact(document: &mut Document, contact: &Contact) -> Result<AttachedSlot> {
    ensure_bulk_eligible(document)?;
    if document.status.is_terminal() {
        return Err(EngineError::InvalidTransition {
            detail: format!("cannot add recipients to a {} document", document.status),
        });
    }
    validate_alignment(document)?;

    if let Some(i) = document
        .signers
        .iter()
        .position(|s| s.identity_id == contact.id)
    {
        debug!(
            document_id = %document.id,
            contact_id = %contact.id,
            slot = i,
            "Contact already attached"
        );
        let slot = SignerSlot {
            index: i,
            placeholder: document.placeholders[i].clone(),
            signer: Some(document.signers[i].clone()),
        };
        return Ok(AttachedSlot {
            index: i,
            slot,
            appended: false,
            already_present: true,
        });
    }

    let (index, appended) = match document.placeholders.iter().position(|p| p.is_vacant()) {
        Some(i) => (i, false),
        None => {
            document.placeholders.push(Placeholder {
                id: format!("ph_{}", uuid::Uuid::new_v4()),
                email: None,
                role: "signer".to_string(),
                signer_identity_ref: None,
                field_meta: serde_json::Value::Null,
            });
            (document.placeholders.len() - 1, true)
        }
    };

    let slot = occupy(document, index, contact)?;

    info!(
        document_id = %document.id,
        contact_id = %contact.id,
        slot = index,
        appended = appended,
        "Recipient attached to slot"
    );

    Ok(AttachedSlot {
        index,
        slot,
        appended,
        already_present: false,
    })
}

/// Write both sides of slot `index` in one step.
///
/// The slot must be the first vacancy, which after alignment validation
/// sits exactly at `signers.len()`.
fn occupy(document: &mut Document, index: usize, contact: &Contact) -> Result<SignerSlot> {
    if index != document.signers.len() || index >= document.placeholders.len() {
        return Err(misaligned(
            document,
            format!(
                "occupying slot {} with {} signers and {} placeholders",
                index,
                document.signers.len(),
                document.placeholders.len()
            ),
        ));
    }

    let placeholder = &mut document.placeholders[index];
    placeholder.signer_identity_ref = Some(contact.id.clone());
    placeholder.email = Some(contact.email.clone());

    let signer = Signer {
        order: index as u32 + 1,
        identity_id: contact.id.clone(),
        email: contact.email.clone(),
        status: SignerStatus::Waiting,
    };
    document.signers.push(signer.clone());

    Ok(SignerSlot {
        index,
        placeholder: document.placeholders[index].clone(),
        signer: Some(signer),
    })
}

fn misaligned(document: &Document, detail: String) -> EngineError {
    EngineError::SlotMisaligned {
        document_id: document.id.clone(),
        detail,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentStatus;

    fn contact(id: &str, email: &str) -> Contact {
        Contact {
            id: id.to_string(),
            email: email.to_string(),
            name: "Test Contact".to_string(),
            phone: None,
        }
    }

    fn occupied_placeholder(id: &str, identity_id: &str, email: &str) -> Placeholder {
        Placeholder {
            id: id.to_string(),
            email: Some(email.to_string()),
            role: "signer".to_string(),
            signer_identity_ref: Some(identity_id.to_string()),
            field_meta: serde_json::json!({"page": 1, "x": 10, "y": 20}),
        }
    }

    fn vacant_placeholder(id: &str) -> Placeholder {
        Placeholder {
            id: id.to_string(),
            email: None,
            role: "signer".to_string(),
            signer_identity_ref: None,
            field_meta: serde_json::Value::Null,
        }
    }

    fn bulk_document(occupied: usize, vacant: usize) -> Document {
        let mut signers = Vec::new();
        let mut placeholders = Vec::new();
        for i in 0..occupied {
            let identity = format!("identity-{}", i);
            let email = format!("signer{}@example.com", i);
            signers.push(Signer {
                order: i as u32 + 1,
                identity_id: identity.clone(),
                email: email.clone(),
                status: SignerStatus::Waiting,
            });
            placeholders.push(occupied_placeholder(
                &format!("ph-{}", i),
                &identity,
                &email,
            ));
        }
        for i in 0..vacant {
            placeholders.push(vacant_placeholder(&format!("ph-vacant-{}", i)));
        }

        Document {
            id: "doc-1".to_string(),
            name: "Bulk Agreement".to_string(),
            created_by: "author-1".to_string(),
            send_in_order: false,
            kind: DocumentKind::Bulk,
            file_ref: Some("files/doc-1.pdf".to_string()),
            status: DocumentStatus::Waiting,
            revision: 3,
            signers,
            placeholders,
            updated_at: None,
        }
    }

    fn recipient(email: &str, name: &str) -> RecipientInput {
        RecipientInput {
            email: email.to_string(),
            name: name.to_string(),
            phone: None,
        }
    }

    // ---- validation ----

    #[test]
    fn test_validate_recipient_accepts_plain_address() {
        validate_recipient(&recipient("ada@example.com", "Ada")).unwrap();
    }

    #[test]
    fn test_validate_recipient_rejects_bad_shapes() {
        for email in ["", "no-at-sign", "@example.com", "a@", "a@nodot", "a@.com", "a@x.com.", "a b@x.com"] {
            let err = validate_recipient(&recipient(email, "Ada")).unwrap_err();
            assert!(
                matches!(err, EngineError::RecipientInvalid { .. }),
                "expected rejection for {:?}",
                email
            );
        }
    }

    #[test]
    fn test_validate_recipient_tolerates_missing_name() {
        // The address is the identity; a display name is optional
        // context the directory can fill in later.
        validate_recipient(&recipient("ada@example.com", "")).unwrap();
        validate_recipient(&recipient("ada@example.com", "  ")).unwrap();
    }

    #[test]
    fn test_standard_document_is_not_bulk_eligible() {
        let mut doc = bulk_document(0, 1);
        doc.kind = DocumentKind::Standard;
        assert!(matches!(
            ensure_bulk_eligible(&doc),
            Err(EngineError::DocumentNotBulkEligible { .. })
        ));
    }

    // ---- alignment ----

    #[test]
    fn test_alignment_accepts_occupied_prefix_with_vacant_tail() {
        let doc = bulk_document(2, 3);
        validate_alignment(&doc).unwrap();
    }

    #[test]
    fn test_alignment_rejects_more_signers_than_placeholders() {
        let mut doc = bulk_document(2, 0);
        doc.placeholders.pop();
        let err = validate_alignment(&doc).unwrap_err();
        assert!(matches!(err, EngineError::SlotMisaligned { .. }));
    }

    #[test]
    fn test_alignment_rejects_vacant_slot_inside_prefix() {
        let mut doc = bulk_document(2, 0);
        doc.placeholders[0].signer_identity_ref = None;
        doc.placeholders[0].email = None;
        assert!(validate_alignment(&doc).is_err());
    }

    #[test]
    fn test_alignment_rejects_identity_mismatch() {
        let mut doc = bulk_document(2, 0);
        doc.placeholders[1].signer_identity_ref = Some("someone-else".to_string());
        assert!(validate_alignment(&doc).is_err());
    }

    #[test]
    fn test_alignment_rejects_occupied_slot_past_prefix() {
        let mut doc = bulk_document(1, 1);
        doc.placeholders[1].email = Some("stray@example.com".to_string());
        assert!(validate_alignment(&doc).is_err());
    }

    // ---- attach ----

    #[test]
    fn test_attach_fills_first_vacancy() {
        let mut doc = bulk_document(2, 1);
        let new_contact = contact("contact-9", "new@example.com");

        let attached = attach_contact(&mut doc, &new_contact).unwrap();

        assert_eq!(attached.index, 2);
        assert!(!attached.appended);
        assert!(!attached.already_present);
        assert_eq!(doc.signers.len(), 3);
        assert_eq!(doc.signers[2].identity_id, "contact-9");
        assert_eq!(doc.signers[2].email, "new@example.com");
        assert_eq!(doc.signers[2].order, 3);
        assert_eq!(
            doc.placeholders[2].signer_identity_ref.as_deref(),
            Some("contact-9")
        );
        assert_eq!(
            doc.placeholders[2].email.as_deref(),
            Some("new@example.com")
        );
        validate_alignment(&doc).unwrap();
    }

    #[test]
    fn test_attach_appends_when_no_vacancy() {
        let mut doc = bulk_document(2, 0);
        let new_contact = contact("contact-9", "new@example.com");

        let attached = attach_contact(&mut doc, &new_contact).unwrap();

        assert_eq!(attached.index, 2);
        assert!(attached.appended);
        assert_eq!(doc.placeholders.len(), 3);
        assert_eq!(doc.signers.len(), 3);
        validate_alignment(&doc).unwrap();
    }

    #[test]
    fn test_attach_same_contact_twice_is_idempotent() {
        let mut doc = bulk_document(0, 2);
        let new_contact = contact("contact-9", "new@example.com");

        let first = attach_contact(&mut doc, &new_contact).unwrap();
        let second = attach_contact(&mut doc, &new_contact).unwrap();

        assert_eq!(first.index, second.index);
        assert!(second.already_present);
        assert_eq!(doc.signers.len(), 1);
        assert_eq!(doc.placeholders.len(), 2);
    }

    #[test]
    fn test_attach_keeps_arrays_aligned_over_many_attaches() {
        let mut doc = bulk_document(0, 2);
        for i in 0..5 {
            let c = contact(&format!("contact-{}", i), &format!("c{}@example.com", i));
            attach_contact(&mut doc, &c).unwrap();
        }

        assert_eq!(doc.signers.len(), 5);
        assert_eq!(doc.placeholders.len(), 5);
        for (i, signer) in doc.signers.iter().enumerate() {
            assert_eq!(
                doc.placeholders[i].signer_identity_ref.as_deref(),
                Some(signer.identity_id.as_str())
            );
            assert_eq!(signer.order, i as u32 + 1);
        }
        validate_alignment(&doc).unwrap();
    }

    #[test]
    fn test_attach_preserves_placeholder_field_meta() {
        let mut doc = bulk_document(0, 1);
        doc.placeholders[0].field_meta = serde_json::json!({"page": 4, "x": 72, "y": 410});
        let new_contact = contact("contact-9", "new@example.com");

        let attached = attach_contact(&mut doc, &new_contact).unwrap();

        assert_eq!(
            attached.slot.placeholder.field_meta["page"],
            serde_json::json!(4)
        );
    }

    #[test]
    fn test_attach_rejects_standard_documents() {
        let mut doc = bulk_document(0, 1);
        doc.kind = DocumentKind::Standard;
        let err = attach_contact(&mut doc, &contact("c", "c@example.com")).unwrap_err();
        assert!(matches!(err, EngineError::DocumentNotBulkEligible { .. }));
    }

    #[test]
    fn test_attach_rejects_terminal_documents() {
        for status in [
            DocumentStatus::Signed,
            DocumentStatus::Declined,
            DocumentStatus::Expired,
        ] {
            let mut doc = bulk_document(1, 1);
            doc.status = status;
            let err = attach_contact(&mut doc, &contact("c", "c@example.com")).unwrap_err();
            assert!(matches!(err, EngineError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn test_attach_surfaces_inherited_misalignment() {
        let mut doc = bulk_document(2, 1);
        doc.placeholders[0].signer_identity_ref = Some("wrong-identity".to_string());
        let err = attach_contact(&mut doc, &contact("c", "c@example.com")).unwrap_err();
        assert!(matches!(err, EngineError::SlotMisaligned { .. }));
        // The document was not touched further.
        assert_eq!(doc.signers.len(), 2);
        assert_eq!(doc.placeholders.len(), 3);
    }
}
