//! Orchestrator: the per-event entry point. Reads the transcript, consults
//! the Classifier, dispatches to Processors concurrently, aggregates their
//! results, and writes the Aggregate Result.
//!
//! State machine: `READY → READING → CLASSIFYING → DISPATCHING →
//! AGGREGATING → WRITING → DONE`, with a defensive `FAILED → WRITING → DONE`
//! branch when a step fails fatally (source missing, aggregate write
//! failure). Processor failures are locally contained and never take this
//! branch — they are recorded in the Aggregate Result instead.

use crate::blob::SharedBlobStore;
use crate::classifier::Classifier;
use crate::config::RouterConfig;
use crate::error::ErrorKind;
use crate::processors::Processor;
use crate::processors::ProcessorContext;
use crate::secret::SecretStore;
use crate::model::ModelAdapter;
use crate::processors::RepositoryHost;
use crate::types::{
    AgentId, AgentResult, AggregateResult, CorrelationId, RoutingDecision, TranscriptKey,
};
use crate::{Error, Result};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;

/// One record of a bucket-notification event, as delivered by the hosting
/// environment. Only the fields the Orchestrator needs are modeled.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectCreatedRecord {
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// A trigger notification, possibly batching multiple records.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub records: Vec<ObjectCreatedRecord>,
}

/// Parses a raw notification payload. Returns an error only if the JSON
/// itself is malformed; unrecognized keys within records are tolerated.
pub fn decode_notification(payload: &str) -> Result<Notification> {
    serde_json::from_str(payload).map_err(Error::from)
}

/// Aggregates every adapter and the resolved configuration needed to run
/// events end to end.
pub struct Orchestrator {
    blob: SharedBlobStore,
    classifier: Arc<dyn Classifier>,
    processors: HashMap<AgentId, Arc<dyn Processor>>,
    secrets: Arc<dyn SecretStore>,
    model: Arc<dyn ModelAdapter>,
    repository_host: Arc<dyn RepositoryHost>,
    config: RouterConfig,
}

/// Health snapshot returned by [`Orchestrator::health`]; used by the hosting
/// environment's readiness probe.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub blob_reachable: bool,
    pub secrets_resolved: bool,
    pub classifier_mode: &'static str,
    /// `None` when the configured classifier mode never calls the Model
    /// Adapter (`path_hint`); `Some(true/false)` when it does (`content`).
    pub model_reachable: Option<bool>,
}

impl Orchestrator {
    pub fn new(
        blob: SharedBlobStore,
        classifier: Arc<dyn Classifier>,
        processors: HashMap<AgentId, Arc<dyn Processor>>,
        secrets: Arc<dyn SecretStore>,
        model: Arc<dyn ModelAdapter>,
        repository_host: Arc<dyn RepositoryHost>,
        config: RouterConfig,
    ) -> Self {
        Self {
            blob,
            classifier,
            processors,
            secrets,
            model,
            repository_host,
            config,
        }
    }

    /// Processes a raw notification payload end to end, one record at a time.
    pub async fn handle_notification(&self, payload: &str) -> Result<Vec<AggregateResult>> {
        let notification = decode_notification(payload)?;
        let mut results = Vec::with_capacity(notification.records.len());
        for record in notification.records {
            if let Some(result) = self.handle_record(&record).await? {
                results.push(result);
            }
        }
        Ok(results)
    }

    /// Handles one object-created record. Returns `Ok(None)` for keys the
    /// Orchestrator is not interested in (acknowledge and ignore).
    pub async fn handle_record(
        &self,
        record: &ObjectCreatedRecord,
    ) -> Result<Option<AggregateResult>> {
        let Some(transcript_key) = TranscriptKey::parse(&record.key) else {
            log::debug!("ignoring non-transcript key: {}", record.key);
            return Ok(None);
        };

        let correlation_id = match &record.correlation_id {
            Some(id) => match CorrelationId::from_upstream(id) {
                Some(parsed) => {
                    log::info!("correlation_id={parsed} accepted from event metadata");
                    parsed
                }
                None => {
                    let generated = CorrelationId::new();
                    log::info!(
                        "correlation_id={generated} generated (upstream id {id} unparseable)"
                    );
                    generated
                }
            },
            None => {
                let generated = CorrelationId::new();
                log::info!("correlation_id={generated} generated (no upstream id)");
                generated
            }
        };

        let event_deadline = Duration::from_millis(self.config.event_deadline_ms());
        let task_handles: Arc<Mutex<Vec<AbortHandle>>> = Arc::new(Mutex::new(Vec::new()));
        match tokio::time::timeout(
            event_deadline,
            self.run_event(&transcript_key, correlation_id, &task_handles),
        )
        .await
        {
            Ok(result) => result.map(Some),
            Err(_) => {
                log::warn!("correlation_id={correlation_id} event deadline exceeded");
                // The run_event future was just dropped, but its tokio::spawn
                // tasks are detached and keep running unless aborted here.
                for handle in task_handles.lock().expect("task handle lock poisoned").drain(..) {
                    handle.abort();
                }
                let aggregate = self.fatal_aggregate(
                    &transcript_key,
                    correlation_id,
                    ErrorKind::Timeout,
                );
                self.write_aggregate(&transcript_key, &aggregate).await;
                Ok(Some(aggregate))
            }
        }
    }

    async fn run_event(
        &self,
        transcript_key: &TranscriptKey,
        correlation_id: CorrelationId,
        task_handles: &Mutex<Vec<AbortHandle>>,
    ) -> Result<AggregateResult> {
        // READING
        let transcript = match self.blob.get(&transcript_key.raw).await {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(None) => {
                log::warn!("correlation_id={correlation_id} transcript not found: {}", transcript_key.raw);
                let aggregate =
                    self.fatal_aggregate(transcript_key, correlation_id, ErrorKind::SourceMissing);
                self.write_aggregate(transcript_key, &aggregate).await;
                return Ok(aggregate);
            }
            Err(err) => {
                log::warn!("correlation_id={correlation_id} transcript read failed: {err}");
                let aggregate = self.fatal_aggregate(transcript_key, correlation_id, err.kind());
                self.write_aggregate(transcript_key, &aggregate).await;
                return Ok(aggregate);
            }
        };

        if transcript.len() > crate::types::MAX_TRANSCRIPT_BYTES {
            log::warn!("correlation_id={correlation_id} transcript exceeds size limit");
            let aggregate =
                self.fatal_aggregate(transcript_key, correlation_id, ErrorKind::Oversize);
            self.write_aggregate(transcript_key, &aggregate).await;
            return Ok(aggregate);
        }

        // CLASSIFYING
        let routing = self.classifier.classify(&transcript, transcript_key).await;

        // DISPATCHING
        let event_time = Utc::now();
        let processor_deadline = Duration::from_millis(self.config.processor_deadline_ms());
        let context = Arc::new(ProcessorContext {
            blob: self.blob.clone(),
            secrets: self.secrets.clone(),
            model: self.model.clone(),
            repository_host: self.repository_host.clone(),
            config: self.config.clone(),
            event_time,
        });

        let agents = routing.all_agents();
        let mut tasks = Vec::with_capacity(agents.len());
        for agent in agents {
            let Some(processor) = self.processors.get(&agent).cloned() else {
                continue;
            };
            let context = context.clone();
            let transcript = transcript.clone();
            let task = tokio::spawn(async move {
                match tokio::time::timeout(
                    processor_deadline,
                    processor.process(&context, &transcript, correlation_id),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => AgentResult::timeout(
                        agent,
                        correlation_id,
                        Utc::now(),
                        processor_deadline.as_millis() as u64,
                    ),
                }
            });
            task_handles
                .lock()
                .expect("task handle lock poisoned")
                .push(task.abort_handle());
            tasks.push(task);
        }

        // AGGREGATING
        let joined = futures::future::join_all(tasks).await;
        let mut results = Vec::with_capacity(joined.len());
        for outcome in joined {
            match outcome {
                Ok(result) => results.push(result),
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        log::info!("correlation_id={correlation_id} processor task aborted");
                    } else {
                        log::warn!("correlation_id={correlation_id} processor task panicked: {join_err}");
                    }
                }
            }
        }

        let aggregate = AggregateResult {
            correlation_id,
            transcript_key: transcript_key.raw.clone(),
            timestamp: Utc::now(),
            routing,
            results,
        };

        // WRITING
        self.write_aggregate(transcript_key, &aggregate).await;
        Ok(aggregate)
    }

    /// Builds the Aggregate Result written for a fatal orchestrator failure
    /// (source missing, oversize, event timeout). No processor is invoked;
    /// `results` stays empty per the defensive FAILED branch.
    fn fatal_aggregate(
        &self,
        transcript_key: &TranscriptKey,
        correlation_id: CorrelationId,
        kind: ErrorKind,
    ) -> AggregateResult {
        AggregateResult {
            correlation_id,
            transcript_key: transcript_key.raw.clone(),
            timestamp: Utc::now(),
            routing: RoutingDecision::new(
                AgentId::Journal,
                Vec::new(),
                0.0,
                format!("orchestrator failure: {kind:?}"),
                crate::types::ClassifierModeUsed::KeywordFallback,
            ),
            results: Vec::new(),
        }
    }

    async fn write_aggregate(&self, transcript_key: &TranscriptKey, aggregate: &AggregateResult) {
        let key = transcript_key.aggregate_key();
        let bytes = match serde_json::to_vec_pretty(aggregate) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!(
                    "correlation_id={} failed to serialize aggregate result: {err}",
                    aggregate.correlation_id
                );
                return;
            }
        };

        if let Err(err) = self.blob.put(&key, bytes).await {
            log::error!(
                "correlation_id={} aggregate write failed: {err}",
                aggregate.correlation_id
            );
            let error_key = format!(
                "errors/{}/{:02}/{:02}/{}.json",
                aggregate.timestamp.format("%Y"),
                aggregate.timestamp.format("%m").to_string().parse::<u32>().unwrap_or(0),
                aggregate.timestamp.format("%d").to_string().parse::<u32>().unwrap_or(0),
                aggregate.correlation_id,
            );
            let error_body = serde_json::json!({
                "correlation_id": aggregate.correlation_id.to_string(),
                "transcript_key": transcript_key.raw,
                "error": err.to_string(),
            });
            if let Ok(bytes) = serde_json::to_vec(&error_body) {
                let _ = self.blob.put(&error_key, bytes).await;
            }
        }
    }

    /// Readiness probe: checks Blob Store reachability, that both required
    /// secrets resolve, and — only when the configured classifier mode
    /// actually calls a model — that the Model Adapter answers a short
    /// no-op prompt.
    pub async fn health(&self) -> HealthReport {
        let blob_reachable = self.blob.get("__health__").await.is_ok();
        let secrets_resolved = self
            .secrets
            .get_secret(self.config.secret_token_name())
            .await
            .is_ok()
            && self
                .secrets
                .get_secret(self.config.secret_model_key_name())
                .await
                .is_ok();

        let classifier_mode = self.config.classifier_mode();
        let model_reachable = match classifier_mode {
            crate::config::ClassifierMode::PathHint => None,
            crate::config::ClassifierMode::Content => Some(
                self.model
                    .invoke("ping", 1, Duration::from_millis(2_000))
                    .await
                    .is_ok(),
            ),
        };

        HealthReport {
            blob_reachable,
            secrets_resolved,
            classifier_mode: match classifier_mode {
                crate::config::ClassifierMode::PathHint => "path_hint",
                crate::config::ClassifierMode::Content => "content",
            },
            model_reachable,
        }
    }
}
