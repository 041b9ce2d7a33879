//! Configuration for the transcript router.
//!
//! [`RouterConfig`] enumerates every tunable named in the external interface
//! table: classifier mode and confidence floor, memory enrichment, repository
//! visibility and enablement, the adapter/orchestrator deadlines, the blob
//! append retry budget, and the two secret names the Secret Adapter resolves.
//! Build it through [`RouterConfig::builder()`]; `build()` validates required
//! fields and returns [`crate::Error::Config`] if any are missing.
//!
//! ## Environment Variables
//!
//! - `TRANSCRIPT_ROUTER_TOKEN_NAME`: overrides `secret.token_name` if the
//!   builder left it unset.
//! - `TRANSCRIPT_ROUTER_MODEL_KEY_NAME`: overrides `secret.model_key_name` if
//!   the builder left it unset.

use std::env;

/// Selects which [`crate::classifier::Classifier`] implementation the
/// dispatch factory builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierMode {
    /// Derive the agent purely from the object key's hint segment.
    PathHint,
    /// Call the Model Adapter with a classification prompt, falling back to
    /// path-hint then keyword scoring.
    Content,
}

impl std::str::FromStr for ClassifierMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "path_hint" | "path-hint" => Ok(ClassifierMode::PathHint),
            "content" => Ok(ClassifierMode::Content),
            _ => Err(format!("unknown classifier mode: {s}")),
        }
    }
}

/// Whether the Memory Processor calls the Model Adapter for enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enrichment {
    On,
    Off,
}

/// Default visibility applied to repositories the Repository Processor creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// All tunables of the router, resolved once at startup.
///
/// Construct with [`RouterConfig::builder()`]; direct instantiation is not
/// supported because required fields (the two secret names) must be
/// validated before the Orchestrator or any processor can run.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    classifier_mode: ClassifierMode,
    classifier_min_confidence: f64,
    memory_enrichment: Enrichment,
    repository_default_visibility: Visibility,
    repository_enabled: bool,
    model_timeout_ms: u64,
    event_deadline_ms: u64,
    processor_deadline_ms: u64,
    blob_append_retries: u32,
    secret_token_name: String,
    secret_model_key_name: String,
}

impl RouterConfig {
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }

    pub fn classifier_mode(&self) -> ClassifierMode {
        self.classifier_mode
    }

    pub fn classifier_min_confidence(&self) -> f64 {
        self.classifier_min_confidence
    }

    pub fn memory_enrichment(&self) -> Enrichment {
        self.memory_enrichment
    }

    pub fn repository_default_visibility(&self) -> Visibility {
        self.repository_default_visibility
    }

    pub fn repository_enabled(&self) -> bool {
        self.repository_enabled
    }

    pub fn model_timeout_ms(&self) -> u64 {
        self.model_timeout_ms
    }

    pub fn event_deadline_ms(&self) -> u64 {
        self.event_deadline_ms
    }

    pub fn processor_deadline_ms(&self) -> u64 {
        self.processor_deadline_ms
    }

    pub fn blob_append_retries(&self) -> u32 {
        self.blob_append_retries
    }

    pub fn secret_token_name(&self) -> &str {
        &self.secret_token_name
    }

    pub fn secret_model_key_name(&self) -> &str {
        &self.secret_model_key_name
    }
}

/// Builder for [`RouterConfig`], mirroring every row of the configuration
/// table. `secret.token_name` and `secret.model_key_name` are the only
/// required fields; everything else falls back to the table's documented
/// default.
#[derive(Default)]
pub struct RouterConfigBuilder {
    classifier_mode: Option<ClassifierMode>,
    classifier_min_confidence: Option<f64>,
    memory_enrichment: Option<Enrichment>,
    repository_default_visibility: Option<Visibility>,
    repository_enabled: Option<bool>,
    model_timeout_ms: Option<u64>,
    event_deadline_ms: Option<u64>,
    processor_deadline_ms: Option<u64>,
    blob_append_retries: Option<u32>,
    secret_token_name: Option<String>,
    secret_model_key_name: Option<String>,
}

impl RouterConfigBuilder {
    pub fn classifier_mode(mut self, mode: ClassifierMode) -> Self {
        self.classifier_mode = Some(mode);
        self
    }

    pub fn classifier_min_confidence(mut self, value: f64) -> Self {
        self.classifier_min_confidence = Some(value);
        self
    }

    pub fn memory_enrichment(mut self, value: Enrichment) -> Self {
        self.memory_enrichment = Some(value);
        self
    }

    pub fn repository_default_visibility(mut self, value: Visibility) -> Self {
        self.repository_default_visibility = Some(value);
        self
    }

    pub fn repository_enabled(mut self, value: bool) -> Self {
        self.repository_enabled = Some(value);
        self
    }

    pub fn model_timeout_ms(mut self, value: u64) -> Self {
        self.model_timeout_ms = Some(value);
        self
    }

    pub fn event_deadline_ms(mut self, value: u64) -> Self {
        self.event_deadline_ms = Some(value);
        self
    }

    pub fn processor_deadline_ms(mut self, value: u64) -> Self {
        self.processor_deadline_ms = Some(value);
        self
    }

    pub fn blob_append_retries(mut self, value: u32) -> Self {
        self.blob_append_retries = Some(value);
        self
    }

    pub fn secret_token_name(mut self, name: impl Into<String>) -> Self {
        self.secret_token_name = Some(name.into());
        self
    }

    pub fn secret_model_key_name(mut self, name: impl Into<String>) -> Self {
        self.secret_model_key_name = Some(name.into());
        self
    }

    /// Validates required fields and applies table defaults.
    ///
    /// `secret.token_name` and `secret.model_key_name` fall back to the
    /// `TRANSCRIPT_ROUTER_TOKEN_NAME` / `TRANSCRIPT_ROUTER_MODEL_KEY_NAME`
    /// environment variables before failing; an `ErrConfig` here is fatal at
    /// startup.
    pub fn build(self) -> crate::Result<RouterConfig> {
        let secret_token_name = self
            .secret_token_name
            .or_else(|| env::var("TRANSCRIPT_ROUTER_TOKEN_NAME").ok())
            .ok_or_else(|| crate::Error::config("secret.token_name is required"))?;

        let secret_model_key_name = self
            .secret_model_key_name
            .or_else(|| env::var("TRANSCRIPT_ROUTER_MODEL_KEY_NAME").ok())
            .ok_or_else(|| crate::Error::config("secret.model_key_name is required"))?;

        if secret_token_name.trim().is_empty() {
            return Err(crate::Error::config("secret.token_name cannot be empty"));
        }
        if secret_model_key_name.trim().is_empty() {
            return Err(crate::Error::config(
                "secret.model_key_name cannot be empty",
            ));
        }

        let classifier_min_confidence = self.classifier_min_confidence.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&classifier_min_confidence) {
            return Err(crate::Error::config(
                "classifier.min_confidence must be between 0.0 and 1.0",
            ));
        }

        Ok(RouterConfig {
            classifier_mode: self.classifier_mode.unwrap_or(ClassifierMode::Content),
            classifier_min_confidence,
            memory_enrichment: self.memory_enrichment.unwrap_or(Enrichment::On),
            repository_default_visibility: self
                .repository_default_visibility
                .unwrap_or(Visibility::Public),
            repository_enabled: self.repository_enabled.unwrap_or(true),
            model_timeout_ms: self.model_timeout_ms.unwrap_or(6_000),
            event_deadline_ms: self.event_deadline_ms.unwrap_or(120_000),
            processor_deadline_ms: self.processor_deadline_ms.unwrap_or(30_000),
            blob_append_retries: self.blob_append_retries.unwrap_or(8),
            secret_token_name,
            secret_model_key_name,
        })
    }
}
