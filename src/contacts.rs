//! Recipient identity resolution against the tenant contact directory
//!
//! One contact per normalized email per tenant. Resolution always looks
//! up before creating, and a retried resolve restarts from the lookup
//! instead of retrying the bare create, so a create whose response was
//! lost never produces a duplicate. Existing contacts are returned
//! untouched; recipient-provided fields never overwrite directory data.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::SyncError;
use crate::error::{EngineError, Result};
use crate::types::{Contact, NewContact};

/// Canonical form of an email for dedup: trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Directory of deduplicated signer identities
#[async_trait::async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Look up a contact by normalized email
    async fn find_by_email(&self, email: &str)
        -> std::result::Result<Option<Contact>, SyncError>;

    /// Create a contact. Concurrent creates for one email settle in
    /// favor of the existing record.
    async fn create(&self, contact: NewContact) -> std::result::Result<Contact, SyncError>;
}

/// Tuning for contact resolution
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Full lookup-then-create passes before giving up
    pub max_attempts: u32,
    /// Keep a process-local email -> contact map to skip repeat lookups
    pub cache_enabled: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cache_enabled: true,
        }
    }
}

/// Resolves recipients to directory contacts without creating duplicates
pub struct ContactResolver<D: ContactDirectory> {
    directory: Arc<D>,
    config: ResolverConfig,
    /// Normalized email -> resolved contact, per resolver instance
    cache: DashMap<String, Contact>,
}

impl<D: ContactDirectory> ContactResolver<D> {
    pub fn new(directory: Arc<D>, config: ResolverConfig) -> Self {
        Self {
            directory,
            config,
            cache: DashMap::new(),
        }
    }

    /// Resolve an email to its contact, creating one if none exists.
    ///
    /// Safe to retry and safe under concurrent callers for the same
    /// email: every pass starts from the lookup, and a create that lost
    /// a race surfaces as a conflict the next lookup resolves. The
    /// transport layer owns backoff; this loop only restarts the pass.
    pub async fn resolve(&self, email: &str, name: &str, phone: Option<&str>) -> Result<Contact> {
        let normalized = normalize_email(email);
        if normalized.is_empty() {
            return Err(EngineError::RecipientInvalid {
                reason: "email is required".to_string(),
            });
        }

        if self.config.cache_enabled {
            if let Some(hit) = self.cache.get(&normalized) {
                debug!(email = %normalized, contact_id = %hit.id, "Contact cache hit");
                return Ok(hit.clone());
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.resolve_once(&normalized, name, phone).await {
                Ok(contact) => {
                    if self.config.cache_enabled {
                        self.cache.insert(normalized.clone(), contact.clone());
                    }
                    return Ok(contact);
                }
                Err(e) => {
                    let worth_retrying = e.is_retryable() || matches!(e, SyncError::Conflict);
                    if !worth_retrying || attempt >= self.config.max_attempts {
                        return Err(map_directory_error(&normalized, e));
                    }
                    warn!(
                        email = %normalized,
                        attempt = attempt,
                        error = %e,
                        "Contact resolve failed, restarting from lookup"
                    );
                }
            }
        }
    }

    /// One lookup-then-create pass.
    async fn resolve_once(
        &self,
        normalized: &str,
        name: &str,
        phone: Option<&str>,
    ) -> std::result::Result<Contact, SyncError> {
        if let Some(existing) = self.directory.find_by_email(normalized).await? {
            debug!(email = %normalized, contact_id = %existing.id, "Contact already known");
            return Ok(existing);
        }

        let created = self
            .directory
            .create(NewContact {
                email: normalized.to_string(),
                name: name.trim().to_string(),
                phone: phone.map(|p| p.trim().to_string()),
            })
            .await?;

        info!(email = %normalized, contact_id = %created.id, "Contact created");
        Ok(created)
    }

    /// Number of contacts resolved through this instance
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

fn map_directory_error(email: &str, e: SyncError) -> EngineError {
    match e {
        SyncError::NotFound(_) => EngineError::ContactNotFound(email.to_string()),
        SyncError::Rejected { message } => EngineError::RecipientInvalid { reason: message },
        other => EngineError::BackendUnavailable {
            message: other.to_string(),
        },
    }
}

// ============================================================================
// In-Memory Directory (for testing/local development)
// ============================================================================

/// Directory backed by a process-local map
pub struct InMemoryDirectory {
    contacts: DashMap<String, Contact>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            contacts: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContactDirectory for InMemoryDirectory {
    async fn find_by_email(
        &self,
        email: &str,
    ) -> std::result::Result<Option<Contact>, SyncError> {
        Ok(self.contacts.get(email).map(|c| c.clone()))
    }

    async fn create(&self, contact: NewContact) -> std::result::Result<Contact, SyncError> {
        let normalized = normalize_email(&contact.email);
        let candidate = Contact {
            id: format!("contact_{}", uuid::Uuid::new_v4()),
            email: normalized.clone(),
            name: contact.name,
            phone: contact.phone,
        };
        let entry = self.contacts.entry(normalized).or_insert(candidate);
        Ok(entry.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
