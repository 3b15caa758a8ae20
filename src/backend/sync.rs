//! Idempotency keys, submit replay cache, and in-flight tracking
//!
//! Every signature submission carries a derived idempotency key so the
//! backend can collapse replays, and recent outcomes are cached locally
//! so a duplicate submit inside the replay window never reaches the
//! wire at all.

use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use super::endpoints::OperationKind;
use super::envelope::{SyncOutcome, SyncResponse};
use crate::types::PayloadClass;

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Deterministic key identifying one logical mutation across retries
///
/// Derived from the document, the signer, the operation, and a coarse
/// time bucket. Two attempts inside the same bucket share a key and are
/// the same mutation as far as the backend is concerned; a genuine
/// re-submission in a later bucket gets a fresh key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn derive(
        document_id: &str,
        signer_identity_id: &str,
        op: OperationKind,
        bucket_secs: u64,
    ) -> Self {
        // The canonical name, not the wire alias, so the key survives
        // alias fallback mid-retry.
        let bucket = if bucket_secs == 0 {
            0
        } else {
            unix_now() / bucket_secs
        };
        let mut hasher = Sha256::new();
        hasher.update(document_id.as_bytes());
        hasher.update(b":");
        hasher.update(signer_identity_id.as_bytes());
        hasher.update(b":");
        hasher.update(op.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(bucket.to_be_bytes());
        let hash = hasher.finalize();
        Self(hex::encode(&hash[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Submit replay cache
// ============================================================================

/// TTL cache of completed submissions keyed by idempotency key
pub struct SubmitCache {
    entries: DashMap<String, (SyncResponse, u64)>,
    ttl_secs: u64,
}

impl SubmitCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_secs,
        }
    }

    pub fn get(&self, key: &IdempotencyKey) -> Option<SyncResponse> {
        let entry = self.entries.get(key.as_str())?;
        let (response, stored_at) = entry.value();
        if unix_now().saturating_sub(*stored_at) < self.ttl_secs {
            Some(response.clone())
        } else {
            None
        }
    }

    pub fn set(&self, key: &IdempotencyKey, response: SyncResponse) {
        self.entries
            .insert(key.as_str().to_string(), (response, unix_now()));
    }

    /// Drop entries past their TTL
    pub fn cleanup(&self) {
        let now = unix_now();
        self.entries
            .retain(|_, (_, stored_at)| now.saturating_sub(*stored_at) < self.ttl_secs);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// In-flight operation registry
// ============================================================================

/// A mutation currently in flight against the backend
#[derive(Debug, Clone, Serialize)]
pub struct SyncOperation {
    pub idempotency_key: String,
    pub operation: String,
    pub document_id: String,
    pub attempt: u32,
    pub payload_class: PayloadClass,
    pub outcome: Option<SyncOutcome>,
}

/// Tracks mutations from first send to settled outcome
pub struct OperationRegistry {
    active: DashMap<String, SyncOperation>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
        }
    }

    pub fn begin(
        &self,
        key: &IdempotencyKey,
        op: OperationKind,
        document_id: &str,
        payload_class: PayloadClass,
    ) {
        self.active.insert(
            key.as_str().to_string(),
            SyncOperation {
                idempotency_key: key.as_str().to_string(),
                operation: op.as_str().to_string(),
                document_id: document_id.to_string(),
                attempt: 1,
                payload_class,
                outcome: None,
            },
        );
    }

    pub fn touch(&self, key: &IdempotencyKey, attempt: u32) {
        if let Some(mut entry) = self.active.get_mut(key.as_str()) {
            entry.attempt = attempt;
        }
    }

    /// Remove the operation and return it with its final outcome
    pub fn finish(
        &self,
        key: &IdempotencyKey,
        outcome: Option<SyncOutcome>,
    ) -> Option<SyncOperation> {
        let (_, mut op) = self.active.remove(key.as_str())?;
        op.outcome = outcome;
        Some(op)
    }

    pub fn list_active(&self) -> Vec<SyncOperation> {
        self.active.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
