//! Multi-party document signing orchestration
//!
//! Coordinates signing workflows against a remote backend: document
//! lifecycle and signer eligibility, recipient resolution with contact
//! dedup, slot reconciliation for bulk documents, and a resilient sync
//! client that rides out flaky deployments (retries with backoff,
//! operation-name aliases, envelope normalization, idempotent submits).
//!
//! # Example
//!
//! ```rust,no_run
//! use countersign::{
//!     BackendClient, BackendConfig, ContactResolver, RecipientInput, ResolverConfig,
//!     SignaturePayload, SignerIdentity, SigningOrchestrator,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(BackendClient::new(BackendConfig {
//!     base_url: "http://localhost:8080".into(),
//!     tenant: "acme".into(),
//!     ..Default::default()
//! }));
//!
//! let resolver = ContactResolver::new(Arc::clone(&backend), ResolverConfig::default());
//! let orchestrator = SigningOrchestrator::new(backend, resolver);
//!
//! // Attach a recipient to the next open slot of a bulk document
//! let update = orchestrator
//!     .add_recipient(
//!         "doc-123",
//!         &RecipientInput {
//!             email: "Ada@Example.com".into(),
//!             name: "Ada Lovelace".into(),
//!             phone: None,
//!         },
//!     )
//!     .await?;
//! println!("document now at revision {}", update.document.revision);
//!
//! // Submit a signature as that recipient
//! let identity = SignerIdentity {
//!     identity_id: update.document.signers.last().unwrap().identity_id.clone(),
//!     email: "ada@example.com".into(),
//! };
//! orchestrator
//!     .submit_signature("doc-123", &identity, SignaturePayload::Reference("sig/ada".into()))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod contacts;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod status;
pub mod types;

// Re-export main types
pub use backend::{
    BackendClient, ClientStats, OperationKind, SigningBackend, SyncError, SyncOutcome,
    SyncResponse,
};
pub use config::BackendConfig;
pub use contacts::{ContactDirectory, ContactResolver, InMemoryDirectory, ResolverConfig};
pub use error::{EngineError, Result};
pub use orchestrator::{DocumentUpdate, SigningOrchestrator};
pub use types::*;
