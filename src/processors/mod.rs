//! Agent Processors: the three concrete side-effecting handlers a
//! [`RoutingDecision`](crate::types::RoutingDecision) dispatches to.

mod journal;
mod memory;
mod repository;

pub use journal::JournalProcessor;
pub use memory::MemoryProcessor;
pub use repository::{HttpRepositoryHost, InMemoryRepositoryHost, RepositoryHost, RepositoryProcessor};

use crate::blob::SharedBlobStore;
use crate::config::RouterConfig;
use crate::model::ModelAdapter;
use crate::secret::SecretStore;
use crate::types::{AgentResult, CorrelationId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A side-effecting handler for one agent. Constructed once and reused
/// across events — processors are not reentrant within a single event, but
/// the process handles multiple events concurrently.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        ctx: &ProcessorContext,
        transcript: &str,
        correlation_id: CorrelationId,
    ) -> AgentResult;
}

/// Shared adapters and resolved configuration every processor needs, plus
/// the orchestrator-derived event timestamp `T`.
pub struct ProcessorContext {
    pub blob: SharedBlobStore,
    pub secrets: Arc<dyn SecretStore>,
    pub model: Arc<dyn ModelAdapter>,
    pub repository_host: Arc<dyn RepositoryHost>,
    pub config: RouterConfig,
    pub event_time: DateTime<Utc>,
}

pub(crate) fn elapsed_ms(started: std::time::Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
