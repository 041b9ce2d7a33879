//! # Transcript Router
//!
//! A transcript routing and agent dispatch subsystem: classifies short
//! voice-transcript blobs and dispatches them to one of three agent
//! processors — journal, memory, or repository creation — then aggregates
//! and persists the outcome.
//!
//! ## Overview
//!
//! - **Classifier** maps transcript text to a [`types::RoutingDecision`],
//!   using either a path-hint on the object key or a content-based model
//!   call, with a keyword heuristic as the final fallback. See
//!   [`classifier`].
//! - **Orchestrator** is the per-event entry point: reads the transcript,
//!   consults the classifier, dispatches to processors concurrently,
//!   aggregates results, and writes the Aggregate Result. See
//!   [`orchestrator`].
//! - **Processors** perform the actual side effects: [`processors::JournalProcessor`]
//!   appends to a weekly journal object, [`processors::MemoryProcessor`]
//!   appends a structured memory record, and [`processors::RepositoryProcessor`]
//!   creates an external repository exactly once per distinct transcript
//!   content.
//! - **Adapters** ([`blob`], [`secret`], [`model`]) isolate every external
//!   dependency behind a trait so the whole pipeline can run against
//!   in-memory test doubles.
//!
//! ## Example
//!
//! ```rust,no_run
//! use transcript_router::blob::InMemoryBlobStore;
//! use transcript_router::classifier::PathHintClassifier;
//! use transcript_router::config::RouterConfig;
//! use transcript_router::model::FakeModelAdapter;
//! use transcript_router::orchestrator::{Orchestrator, ObjectCreatedRecord};
//! use transcript_router::processors::{
//!     InMemoryRepositoryHost, JournalProcessor, MemoryProcessor, Processor, RepositoryProcessor,
//! };
//! use transcript_router::secret::EnvSecretStore;
//! use transcript_router::types::AgentId;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn example() -> transcript_router::Result<()> {
//! let config = RouterConfig::builder()
//!     .secret_token_name("github_token")
//!     .secret_model_key_name("model_api_key")
//!     .build()?;
//!
//! let mut processors: HashMap<AgentId, Arc<dyn Processor>> = HashMap::new();
//! processors.insert(AgentId::Journal, Arc::new(JournalProcessor::new()));
//! processors.insert(AgentId::Memory, Arc::new(MemoryProcessor::new()));
//! processors.insert(AgentId::Repository, Arc::new(RepositoryProcessor::new()));
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(InMemoryBlobStore::new()),
//!     Arc::new(PathHintClassifier::new()),
//!     processors,
//!     Arc::new(EnvSecretStore),
//!     Arc::new(FakeModelAdapter::constant("{}")),
//!     Arc::new(InMemoryRepositoryHost::new()),
//!     config,
//! );
//!
//! orchestrator
//!     .handle_record(&ObjectCreatedRecord {
//!         bucket: "transcripts-bucket".into(),
//!         key: "transcripts/work/2024/01/15/standup.txt".into(),
//!         correlation_id: None,
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod blob;
pub mod classifier;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod processors;
pub mod retry;
pub mod secret;
pub mod types;

pub use error::{Error, Result};

/// Convenience module for the most commonly used types and traits.
pub mod prelude {
    pub use crate::blob::{BlobStore, InMemoryBlobStore, SharedBlobStore};
    pub use crate::classifier::{build_classifier, Classifier};
    pub use crate::config::{ClassifierMode, Enrichment, RouterConfig, Visibility};
    pub use crate::model::ModelAdapter;
    pub use crate::orchestrator::{Notification, ObjectCreatedRecord, Orchestrator};
    pub use crate::processors::{
        JournalProcessor, MemoryProcessor, Processor, ProcessorContext, RepositoryHost,
        RepositoryProcessor,
    };
    pub use crate::secret::SecretStore;
    pub use crate::types::{AgentId, AgentResult, AggregateResult, RoutingDecision};
    pub use crate::{Error, Result};
}
