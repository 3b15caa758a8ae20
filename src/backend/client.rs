//! HTTP client for the signing backend call endpoint
//!
//! The backend exposes `POST {base_url}/api/{tenant}/call` taking
//! `{"operation": <name>, "args": {...}}`. This client layers on retry
//! with exponential backoff, alias fallback for renamed operations,
//! submit replay via idempotency keys, and payload-class-aware
//! timeouts. Large inline signatures get a longer per-request timeout
//! and a smaller retry budget so one oversized body cannot pin a worker.

use base64::Engine;
use reqwest::{header, Client};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::endpoints::{AliasTable, OperationKind};
use super::envelope::{self, SyncOutcome, SyncResponse};
use super::sync::{IdempotencyKey, OperationRegistry, SubmitCache, SyncOperation};
use super::{SigningBackend, SyncError};
use crate::config::BackendConfig;
use crate::contacts::ContactDirectory;
use crate::types::{Contact, Document, NewContact, PayloadClass, SignaturePayload};

/// Internal counters
struct ClientStatsInner {
    requests: AtomicU64,
    retries: AtomicU64,
    alias_fallbacks: AtomicU64,
    failures: AtomicU64,
    partial_successes: AtomicU64,
    replayed_submits: AtomicU64,
}

/// Snapshot of client statistics
#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    pub requests: u64,
    pub retries: u64,
    pub alias_fallbacks: u64,
    pub failures: u64,
    pub partial_successes: u64,
    pub replayed_submits: u64,
}

/// Client for the signing backend
pub struct BackendClient {
    config: BackendConfig,
    client: Client,
    aliases: AliasTable,
    submit_cache: SubmitCache,
    registry: OperationRegistry,
    stats: ClientStatsInner,
}

impl BackendClient {
    /// Create a new backend client
    pub fn new(config: BackendConfig) -> Self {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = config.auth_token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .expect("Invalid auth token"),
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to build HTTP client");

        let submit_cache = SubmitCache::new(config.submit_cache_ttl_secs);

        Self {
            config,
            client,
            aliases: AliasTable::new(),
            submit_cache,
            registry: OperationRegistry::new(),
            stats: ClientStatsInner {
                requests: AtomicU64::new(0),
                retries: AtomicU64::new(0),
                alias_fallbacks: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                partial_successes: AtomicU64::new(0),
                replayed_submits: AtomicU64::new(0),
            },
        }
    }

    fn call_url(&self) -> String {
        format!(
            "{}/api/{}/call",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.tenant)
        )
    }

    fn attempt_budget(&self, class: PayloadClass) -> u32 {
        match class {
            PayloadClass::LargeInline => self.config.max_attempts_large,
            _ => self.config.max_attempts,
        }
    }

    /// Exponential backoff capped at the configured ceiling
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let millis = (self.config.backoff_base.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis).min(self.config.backoff_cap)
    }

    /// One wire round trip for one alias
    async fn send_once(
        &self,
        alias: &'static str,
        args: &Value,
        class: PayloadClass,
    ) -> Result<SyncResponse, SyncError> {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);

        let body = json!({ "operation": alias, "args": args });
        let mut request = self.client.post(self.call_url()).json(&body);
        if class == PayloadClass::LargeInline {
            request = request.timeout(self.config.large_payload_timeout);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(SyncError::Timeout),
            Err(e) => return Err(SyncError::Http(e)),
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) if e.is_timeout() => return Err(SyncError::Timeout),
            Err(e) => return Err(SyncError::Http(e)),
        };

        debug!(
            operation = %alias,
            status = status,
            body_len = text.len(),
            "Backend response received"
        );

        let parsed: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            // A non-JSON error page is still a definitive HTTP answer.
            Err(_) if status >= 400 => {
                return Err(SyncError::Server {
                    status,
                    message: text.chars().take(240).collect(),
                })
            }
            Err(_) => {
                return Err(SyncError::UnrecognizedEnvelope(
                    text.chars().take(240).collect(),
                ))
            }
        };

        envelope::normalize_response(status, &parsed)
    }

    /// Retry one alias until it settles or the attempt budget runs out
    async fn call_alias(
        &self,
        alias: &'static str,
        args: &Value,
        class: PayloadClass,
        track: Option<&IdempotencyKey>,
    ) -> Result<SyncResponse, SyncError> {
        let budget = self.attempt_budget(class);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(key) = track {
                self.registry.touch(key, attempt);
            }

            match self.send_once(alias, args, class).await {
                Ok(response) => return Ok(response),
                // An unrecognized name will stay unrecognized; let the
                // caller move on to the next alias.
                Err(e @ SyncError::UnknownOperation(_)) => return Err(e),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt >= budget {
                        return Err(SyncError::Exhausted {
                            attempts: attempt,
                            last_message: e.to_string(),
                        });
                    }
                    let delay = self.backoff_delay(attempt);
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        operation = %alias,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Backend call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Walk the alias list for an operation, remembering what worked
    async fn call_operation(
        &self,
        op: OperationKind,
        args: Value,
        class: PayloadClass,
        track: Option<&IdempotencyKey>,
    ) -> Result<SyncResponse, SyncError> {
        let candidates = self.aliases.candidates(op);
        let mut last_unknown: Option<SyncError> = None;

        for (position, alias) in candidates.into_iter().enumerate() {
            if position > 0 {
                self.stats.alias_fallbacks.fetch_add(1, Ordering::Relaxed);
                info!(
                    operation = %op,
                    alias = %alias,
                    "Falling back to alternate operation name"
                );
            }
            match self.call_alias(alias, &args, class, track).await {
                Ok(response) => {
                    self.aliases.record(op, alias);
                    if response.outcome == SyncOutcome::PartialSuccess {
                        self.stats.partial_successes.fetch_add(1, Ordering::Relaxed);
                    }
                    return Ok(response);
                }
                Err(SyncError::UnknownOperation(msg)) => {
                    debug!(operation = %op, alias = %alias, "Alias not recognized by backend");
                    last_unknown = Some(SyncError::UnknownOperation(msg));
                }
                Err(e) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }

        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        Err(last_unknown.unwrap_or_else(|| SyncError::UnknownOperation(op.as_str().to_string())))
    }

    /// Mutations currently in flight
    pub fn active_operations(&self) -> Vec<SyncOperation> {
        self.registry.list_active()
    }

    /// Drop submit replay entries past their TTL
    pub fn cleanup_submit_cache(&self) {
        self.submit_cache.cleanup();
    }

    /// Get current statistics
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            requests: self.stats.requests.load(Ordering::Relaxed),
            retries: self.stats.retries.load(Ordering::Relaxed),
            alias_fallbacks: self.stats.alias_fallbacks.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            partial_successes: self.stats.partial_successes.load(Ordering::Relaxed),
            replayed_submits: self.stats.replayed_submits.load(Ordering::Relaxed),
        }
    }
}

#[async_trait::async_trait]
impl SigningBackend for BackendClient {
    async fn fetch_document(
        &self,
        document_id: &str,
    ) -> std::result::Result<Document, SyncError> {
        let args = json!({ "document_id": document_id });
        let response = self
            .call_operation(
                OperationKind::FetchDocument,
                args,
                PayloadClass::Reference,
                None,
            )
            .await?;
        response.document.ok_or_else(|| {
            SyncError::UnrecognizedEnvelope(format!(
                "fetch for {} returned no document",
                document_id
            ))
        })
    }

    async fn attach_recipient(
        &self,
        document_id: &str,
        slot_index: usize,
        contact: &Contact,
        expected_revision: u64,
    ) -> std::result::Result<Document, SyncError> {
        let key = IdempotencyKey::derive(
            document_id,
            &contact.id,
            OperationKind::AttachRecipient,
            self.config.idempotency_bucket_secs,
        );
        let args = json!({
            "document_id": document_id,
            "slot_index": slot_index,
            "contact_id": contact.id,
            "email": contact.email,
            "name": contact.name,
            "expected_revision": expected_revision,
            "idempotency_key": key.as_str(),
        });

        info!(
            document_id = %document_id,
            slot_index = slot_index,
            contact_id = %contact.id,
            "Attaching recipient"
        );

        self.registry.begin(
            &key,
            OperationKind::AttachRecipient,
            document_id,
            PayloadClass::Reference,
        );
        let result = self
            .call_operation(
                OperationKind::AttachRecipient,
                args,
                PayloadClass::Reference,
                Some(&key),
            )
            .await;
        let outcome = result.as_ref().ok().map(|r| r.outcome);
        self.registry.finish(&key, outcome);

        match result?.document {
            Some(document) => Ok(document),
            // Bare ack; refetch for the updated state.
            None => self.fetch_document(document_id).await,
        }
    }

    async fn submit_signature(
        &self,
        document_id: &str,
        signer_identity_id: &str,
        payload: &SignaturePayload,
    ) -> std::result::Result<SyncResponse, SyncError> {
        let class = payload.class(self.config.large_inline_threshold);
        let key = IdempotencyKey::derive(
            document_id,
            signer_identity_id,
            OperationKind::SubmitSignature,
            self.config.idempotency_bucket_secs,
        );

        if let Some(cached) = self.submit_cache.get(&key) {
            self.stats.replayed_submits.fetch_add(1, Ordering::Relaxed);
            debug!(
                document_id = %document_id,
                idempotency_key = %key,
                "Replaying cached submit outcome"
            );
            return Ok(cached);
        }

        let mut args = json!({
            "document_id": document_id,
            "signer_identity_id": signer_identity_id,
            "idempotency_key": key.as_str(),
        });
        match payload {
            SignaturePayload::Reference(reference) => {
                args["signature_ref"] = json!(reference);
            }
            SignaturePayload::Inline(data) => {
                args["signature_b64"] =
                    json!(base64::engine::general_purpose::STANDARD.encode(data));
            }
        }

        info!(
            document_id = %document_id,
            signer = %signer_identity_id,
            payload_class = %class,
            idempotency_key = %key,
            "Submitting signature"
        );

        self.registry
            .begin(&key, OperationKind::SubmitSignature, document_id, class);
        let result = self
            .call_operation(OperationKind::SubmitSignature, args, class, Some(&key))
            .await;
        let outcome = result.as_ref().ok().map(|r| r.outcome);
        self.registry.finish(&key, outcome);

        let response = result?;
        self.submit_cache.set(&key, response.clone());
        Ok(response)
    }
}

#[async_trait::async_trait]
impl ContactDirectory for BackendClient {
    async fn find_by_email(
        &self,
        email: &str,
    ) -> std::result::Result<Option<Contact>, SyncError> {
        let args = json!({ "email": email });
        match self
            .call_operation(
                OperationKind::FindContact,
                args,
                PayloadClass::Reference,
                None,
            )
            .await
        {
            Ok(response) => Ok(response.contact),
            Err(SyncError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, contact: NewContact) -> std::result::Result<Contact, SyncError> {
        let args = json!({
            "email": contact.email,
            "name": contact.name,
            "phone": contact.phone,
        });
        let response = self
            .call_operation(
                OperationKind::CreateContact,
                args,
                PayloadClass::Reference,
                None,
            )
            .await?;
        response.contact.ok_or_else(|| {
            SyncError::UnrecognizedEnvelope("create returned no contact".to_string())
        })
    }
}
