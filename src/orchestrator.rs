//! High-level signing workflow facade
//!
//! Ties the pieces together: fetch current state from the backend,
//! validate and reconcile locally, then push the mutation with the
//! revision observed before mutating. Callers get domain errors and a
//! warning string when the backend reports partial success; transport
//! details stay below this layer.

use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{SigningBackend, SyncError, SyncOutcome};
use crate::contacts::{ContactDirectory, ContactResolver};
use crate::error::{EngineError, Result};
use crate::reconcile;
use crate::status;
use crate::types::{
    Document, DocumentStatus, RecipientInput, SignaturePayload, SignerIdentity, SignerStatus,
};

/// Document state after a workflow mutation
#[derive(Debug, Clone)]
pub struct DocumentUpdate {
    pub document: Document,
    /// Set when the mutation landed but the backend flagged a follow-up
    pub warning: Option<String>,
}

/// Facade over document fetch, recipient attach, and signature submit
pub struct SigningOrchestrator<B: SigningBackend, D: ContactDirectory> {
    backend: Arc<B>,
    contacts: ContactResolver<D>,
}

impl<B: SigningBackend, D: ContactDirectory> SigningOrchestrator<B, D> {
    pub fn new(backend: Arc<B>, contacts: ContactResolver<D>) -> Self {
        Self { backend, contacts }
    }

    /// Fetch the current state of a document
    pub async fn get_document(&self, document_id: &str) -> Result<Document> {
        self.backend
            .fetch_document(document_id)
            .await
            .map_err(|e| map_sync_error(document_id, e))
    }

    /// Resolve a recipient to a contact and attach it to the next open
    /// slot of a bulk document.
    ///
    /// Attaching someone who is already on the document succeeds without
    /// touching the backend. The backend write carries the revision
    /// observed before the local mutation, so a concurrent writer
    /// surfaces as [`EngineError::RevisionConflict`] instead of a silent
    /// overwrite.
    pub async fn add_recipient(
        &self,
        document_id: &str,
        recipient: &RecipientInput,
    ) -> Result<DocumentUpdate> {
        reconcile::validate_recipient(recipient)?;

        let mut document = self.get_document(document_id).await?;
        reconcile::ensure_bulk_eligible(&document)?;
        let expected_revision = document.revision;

        let contact = self
            .contacts
            .resolve(&recipient.email, &recipient.name, recipient.phone.as_deref())
            .await?;

        let attached = reconcile::attach_contact(&mut document, &contact)?;
        if attached.already_present {
            info!(
                document_id = %document_id,
                contact_id = %contact.id,
                "Recipient already attached"
            );
            return Ok(DocumentUpdate {
                document,
                warning: None,
            });
        }

        let synced = self
            .backend
            .attach_recipient(document_id, attached.index, &contact, expected_revision)
            .await
            .map_err(|e| match e {
                SyncError::Rejected { message } => EngineError::RecipientInvalid { reason: message },
                other => map_sync_error(document_id, other),
            })?;

        info!(
            document_id = %document_id,
            slot_index = attached.index,
            contact_id = %contact.id,
            appended = attached.appended,
            "Recipient attached"
        );
        Ok(DocumentUpdate {
            document: synced,
            warning: None,
        })
    }

    /// Submit a signature on behalf of the calling identity.
    ///
    /// Eligibility is checked against fresh state and fails closed. A
    /// repeat submission from a signer who already signed succeeds
    /// without a backend call; the signature landed the first time.
    pub async fn submit_signature(
        &self,
        document_id: &str,
        identity: &SignerIdentity,
        payload: SignaturePayload,
    ) -> Result<DocumentUpdate> {
        let mut document = self.get_document(document_id).await?;

        let matched =
            status::find_signer(&document, identity).map(|(i, s)| (i, s.identity_id.clone()));

        if !status::can_sign(&document, identity) {
            if let Some((index, _)) = &matched {
                if document.signers[*index].status == SignerStatus::Signed {
                    info!(
                        document_id = %document_id,
                        signer = %identity.identity_id,
                        "Signature already recorded"
                    );
                    // Stored status can lag the signer rows; recompute
                    // rather than echoing it.
                    document.status = status::derive_status(document.status, &document.signers);
                    return Ok(DocumentUpdate {
                        document,
                        warning: None,
                    });
                }
            }
            return Err(EngineError::NotEligibleToSign {
                reason: eligibility_reason(&document, identity),
            });
        }

        // can_sign matched a signer; submit under the signer row's
        // identity, which may differ from the caller's when matching
        // fell back to email.
        let Some((signer_index, signer_identity_id)) = matched else {
            return Err(EngineError::NotEligibleToSign {
                reason: "no matching signer on this document".to_string(),
            });
        };

        let response = self
            .backend
            .submit_signature(document_id, &signer_identity_id, &payload)
            .await
            .map_err(|e| match e {
                SyncError::Rejected { message } => {
                    EngineError::NotEligibleToSign { reason: message }
                }
                other => map_sync_error(document_id, other),
            })?;

        let warning = if response.outcome == SyncOutcome::PartialSuccess {
            let msg = response
                .message
                .clone()
                .unwrap_or_else(|| "backend reported partial success".to_string());
            warn!(
                document_id = %document_id,
                message = %msg,
                "Signature recorded with warning"
            );
            Some(msg)
        } else {
            None
        };

        let document = match response.document {
            Some(mut fresh) => {
                // The body can lag the write it acknowledges; recompute
                // from the signer rows instead of trusting it.
                match fresh
                    .signers
                    .iter()
                    .position(|s| s.identity_id == signer_identity_id)
                {
                    Some(index) => {
                        status::apply_signer_transition(&mut fresh, index, SignerStatus::Signed)?;
                    }
                    None => {
                        fresh.status = status::derive_status(fresh.status, &fresh.signers);
                    }
                }
                fresh
            }
            None => {
                // Ack without a document body; apply the transition to
                // the state we fetched.
                status::apply_signer_transition(
                    &mut document,
                    signer_index,
                    SignerStatus::Signed,
                )?;
                document
            }
        };

        info!(
            document_id = %document_id,
            signer = %signer_identity_id,
            status = %document.status,
            "Signature submitted"
        );
        Ok(DocumentUpdate { document, warning })
    }

    /// Number of contacts this orchestrator has resolved
    pub fn resolved_contacts(&self) -> usize {
        self.contacts.cached_count()
    }
}

/// Explain why [`status::can_sign`] said no
fn eligibility_reason(document: &Document, identity: &SignerIdentity) -> String {
    if document.status == DocumentStatus::Draft {
        return "document has not been dispatched".to_string();
    }
    if document.status.is_terminal() {
        return format!("document is {}", document.status);
    }
    let Some((_, signer)) = status::find_signer(document, identity) else {
        return "no matching signer on this document".to_string();
    };
    match signer.status {
        SignerStatus::Declined => "signer already declined".to_string(),
        SignerStatus::Signed => "signer already signed".to_string(),
        SignerStatus::Waiting if document.send_in_order => {
            "waiting for earlier signers in the sequence".to_string()
        }
        SignerStatus::Waiting => "signer is not currently eligible".to_string(),
    }
}

fn map_sync_error(document_id: &str, e: SyncError) -> EngineError {
    match e {
        SyncError::NotFound(_) => EngineError::DocumentNotFound(document_id.to_string()),
        SyncError::Conflict => EngineError::RevisionConflict {
            document_id: document_id.to_string(),
        },
        other => EngineError::BackendUnavailable {
            message: other.to_string(),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SyncResponse;
    use crate::contacts::{InMemoryDirectory, ResolverConfig};
    use crate::types::{Contact, DocumentKind, Signer};
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockBackend {
        documents: DashMap<String, Document>,
        fetch_calls: AtomicU32,
        submit_calls: AtomicU32,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                documents: DashMap::new(),
                fetch_calls: AtomicU32::new(0),
                submit_calls: AtomicU32::new(0),
            }
        }

        fn insert(&self, document: Document) {
            self.documents.insert(document.id.clone(), document);
        }
    }

    #[async_trait::async_trait]
    impl SigningBackend for MockBackend {
        async fn fetch_document(
            &self,
            document_id: &str,
        ) -> std::result::Result<Document, SyncError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.documents
                .get(document_id)
                .map(|d| d.clone())
                .ok_or_else(|| SyncError::NotFound(document_id.to_string()))
        }

        async fn attach_recipient(
            &self,
            document_id: &str,
            slot_index: usize,
            contact: &Contact,
            _expected_revision: u64,
        ) -> std::result::Result<Document, SyncError> {
            let mut document = self
                .documents
                .get(document_id)
                .map(|d| d.clone())
                .ok_or_else(|| SyncError::NotFound(document_id.to_string()))?;
            document.placeholders[slot_index].signer_identity_ref = Some(contact.id.clone());
            document.placeholders[slot_index].email = Some(contact.email.clone());
            document.signers.push(Signer {
                order: (slot_index + 1) as u32,
                identity_id: contact.id.clone(),
                email: contact.email.clone(),
                status: SignerStatus::Waiting,
            });
            document.revision += 1;
            self.insert(document.clone());
            Ok(document)
        }

        async fn submit_signature(
            &self,
            document_id: &str,
            signer_identity_id: &str,
            _payload: &SignaturePayload,
        ) -> std::result::Result<SyncResponse, SyncError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            let mut document = self
                .documents
                .get(document_id)
                .map(|d| d.clone())
                .ok_or_else(|| SyncError::NotFound(document_id.to_string()))?;
            for signer in &mut document.signers {
                if signer.identity_id == signer_identity_id {
                    signer.status = SignerStatus::Signed;
                }
            }
            document.status = status::derive_status(document.status, &document.signers);
            document.revision += 1;
            self.insert(document.clone());
            Ok(SyncResponse {
                outcome: SyncOutcome::Success,
                document: Some(document),
                contact: None,
                message: None,
            })
        }
    }

    fn orchestrator(
        backend: Arc<MockBackend>,
    ) -> SigningOrchestrator<MockBackend, InMemoryDirectory> {
        let resolver = ContactResolver::new(
            Arc::new(InMemoryDirectory::new()),
            ResolverConfig::default(),
        );
        SigningOrchestrator::new(backend, resolver)
    }

    fn signer(identity_id: &str, order: u32, status: SignerStatus) -> Signer {
        Signer {
            order,
            identity_id: identity_id.to_string(),
            email: format!("{}@example.com", identity_id),
            status,
        }
    }

    fn waiting_document(id: &str, signers: Vec<Signer>) -> Document {
        Document {
            id: id.to_string(),
            name: "Lease".to_string(),
            created_by: "ops".to_string(),
            send_in_order: false,
            kind: DocumentKind::Bulk,
            file_ref: None,
            status: DocumentStatus::Waiting,
            revision: 1,
            placeholders: signers
                .iter()
                .map(|s| crate::types::Placeholder {
                    id: format!("ph_{}", s.order),
                    email: Some(s.email.clone()),
                    role: "signer".to_string(),
                    signer_identity_ref: Some(s.identity_id.clone()),
                    field_meta: serde_json::Value::Null,
                })
                .collect(),
            signers,
            updated_at: None,
        }
    }

    fn identity(id: &str) -> SignerIdentity {
        SignerIdentity {
            identity_id: id.to_string(),
            email: format!("{}@example.com", id),
        }
    }

    #[tokio::test]
    async fn test_invalid_recipient_never_reaches_the_backend() {
        let backend = Arc::new(MockBackend::new());
        let orchestrator = orchestrator(Arc::clone(&backend));

        let err = orchestrator
            .add_recipient(
                "doc-1",
                &RecipientInput {
                    email: "not-an-email".to_string(),
                    name: "Ada".to_string(),
                    phone: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::RecipientInvalid { .. }));
        assert_eq!(backend.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_submit_skips_the_backend() {
        let backend = Arc::new(MockBackend::new());
        backend.insert(waiting_document(
            "doc-1",
            vec![signer("u1", 1, SignerStatus::Signed)],
        ));
        let orchestrator = orchestrator(Arc::clone(&backend));

        let update = orchestrator
            .submit_signature(
                "doc-1",
                &identity("u1"),
                SignaturePayload::Reference("sig/u1".to_string()),
            )
            .await
            .unwrap();

        assert!(update.warning.is_none());
        assert_eq!(backend.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(update.document.status, DocumentStatus::Signed);
    }

    #[tokio::test]
    async fn test_unknown_document_maps_to_not_found() {
        let backend = Arc::new(MockBackend::new());
        let orchestrator = orchestrator(backend);

        let err = orchestrator.get_document("missing").await.unwrap_err();
        assert!(matches!(err, EngineError::DocumentNotFound(_)));
    }

    #[test]
    fn test_eligibility_reasons_name_the_blocking_condition() {
        let document = waiting_document("doc-1", vec![signer("u1", 1, SignerStatus::Declined)]);
        assert_eq!(
            eligibility_reason(&document, &identity("u1")),
            "signer already declined"
        );
        assert_eq!(
            eligibility_reason(&document, &identity("stranger")),
            "no matching signer on this document"
        );

        let mut draft = waiting_document("doc-2", vec![signer("u1", 1, SignerStatus::Waiting)]);
        draft.status = DocumentStatus::Draft;
        assert_eq!(
            eligibility_reason(&draft, &identity("u1")),
            "document has not been dispatched"
        );

        let mut ordered = waiting_document(
            "doc-3",
            vec![
                signer("u1", 1, SignerStatus::Waiting),
                signer("u2", 2, SignerStatus::Waiting),
            ],
        );
        ordered.send_in_order = true;
        assert_eq!(
            eligibility_reason(&ordered, &identity("u2")),
            "waiting for earlier signers in the sequence"
        );
    }
}
