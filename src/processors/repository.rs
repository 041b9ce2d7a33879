//! Repository Processor: creates an external repository via an injected
//! code-hosting client and appends an idempotency ledger record.
//!
//! The content-hash dedup scan of `github/history.jsonl` is the first line of
//! defense; the ledger append in the last step is the commit point. If the
//! external create succeeds but the ledger append fails, the processor still
//! reports success with a `ledger_write_failed` flag. The next delivery for
//! the same content re-derives the same `base_name`, calls
//! `RepositoryHost::find_by_name` before attempting creation, finds the
//! already-live repository, and records a reconciliation ledger entry
//! instead of retrying the name into a second, different repository.

use super::{ProcessorContext, Processor, elapsed_ms};
use crate::config::Visibility;
use crate::types::{
    AgentId, AgentResult, CorrelationId, MIN_REPOSITORY_CONTENT_BYTES, RepositoryHistoryRecord,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The external code-hosting API's interface, specified only at this
/// boundary — upstream authentication plumbing is out of scope.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<String>>;
    async fn create_repo(
        &self,
        name: &str,
        description: &str,
        visibility: Visibility,
        token: &str,
    ) -> Result<String>;
    async fn create_readme(&self, repo_url: &str, markdown: &str, token: &str) -> Result<()>;
    async fn create_issue(&self, repo_url: &str, title: &str, token: &str) -> Result<()>;
}

/// Test double used by every test in this crate and as a reference
/// implementation of collision semantics.
#[derive(Default)]
pub struct InMemoryRepositoryHost {
    repos: RwLock<HashMap<String, String>>,
}

impl InMemoryRepositoryHost {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RepositoryHost for InMemoryRepositoryHost {
    async fn find_by_name(&self, name: &str) -> Result<Option<String>> {
        let repos = self.repos.read().await;
        Ok(repos.get(name).cloned())
    }

    async fn create_repo(
        &self,
        name: &str,
        _description: &str,
        _visibility: Visibility,
        _token: &str,
    ) -> Result<String> {
        let mut repos = self.repos.write().await;
        if repos.contains_key(name) {
            return Err(Error::conflict(format!("repository name taken: {name}")));
        }
        let url = format!("https://example-host.test/repos/{name}");
        repos.insert(name.to_string(), url.clone());
        Ok(url)
    }

    async fn create_readme(&self, _repo_url: &str, _markdown: &str, _token: &str) -> Result<()> {
        Ok(())
    }

    async fn create_issue(&self, _repo_url: &str, _title: &str, _token: &str) -> Result<()> {
        Ok(())
    }
}

/// HTTP-backed [`RepositoryHost`] against a generic REST code-hosting API,
/// in the same request-building idiom as [`crate::blob::HttpBlobStore`].
pub struct HttpRepositoryHost {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRepositoryHost {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[derive(Deserialize)]
struct RepoLookup {
    html_url: String,
}

#[derive(Deserialize)]
struct RepoCreated {
    html_url: String,
}

#[async_trait]
impl RepositoryHost for HttpRepositoryHost {
    async fn find_by_name(&self, name: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("{}/repos/{}", self.base_url, name))
            .send()
            .await
            .map_err(Error::Http)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::external(format!(
                "lookup for {name} failed: {}",
                response.status()
            )));
        }
        let body: RepoLookup = response.json().await.map_err(Error::Http)?;
        Ok(Some(body.html_url))
    }

    async fn create_repo(
        &self,
        name: &str,
        description: &str,
        visibility: Visibility,
        token: &str,
    ) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/repos", self.base_url))
            .header("Authorization", format!("Bearer {token}"))
            .json(&json!({
                "name": name,
                "description": description,
                "visibility": visibility.as_str(),
            }))
            .send()
            .await
            .map_err(Error::Http)?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(Error::conflict(format!("repository name taken: {name}")));
        }
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::auth("repository host rejected token"));
        }
        if !response.status().is_success() {
            return Err(Error::external(format!(
                "create repo {name} failed: {}",
                response.status()
            )));
        }
        let body: RepoCreated = response.json().await.map_err(Error::Http)?;
        Ok(body.html_url)
    }

    async fn create_readme(&self, repo_url: &str, markdown: &str, token: &str) -> Result<()> {
        let response = self
            .client
            .put(format!("{repo_url}/contents/README.md"))
            .header("Authorization", format!("Bearer {token}"))
            .json(&json!({ "content": markdown }))
            .send()
            .await
            .map_err(Error::Http)?;
        if !response.status().is_success() {
            return Err(Error::external(format!(
                "create README failed: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn create_issue(&self, repo_url: &str, title: &str, token: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{repo_url}/issues"))
            .header("Authorization", format!("Bearer {token}"))
            .json(&json!({ "title": title }))
            .send()
            .await
            .map_err(Error::Http)?;
        if !response.status().is_success() {
            return Err(Error::external(format!(
                "create issue failed: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct GeneratedRepository {
    repo_name: String,
    description: String,
    readme_markdown: String,
    #[serde(default)]
    initial_issues: Vec<String>,
}

fn is_valid_repo_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() < 2 || bytes.len() > 64 {
        return false;
    }
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !is_alnum(bytes[0]) || !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes[1..bytes.len() - 1]
        .iter()
        .all(|&b| is_alnum(b) || b == b'-')
}

fn generation_prompt(transcript: &str) -> String {
    format!(
        "Generate a repository for this idea. Respond as JSON: \
         {{\"repo_name\": string, \"description\": string, \"readme_markdown\": string, \
         \"initial_issues\": [string]}}. repo_name must be lowercase, hyphenated, \
         2-64 chars.\n\nTranscript:\n{transcript}"
    )
}

fn collision_suffix(attempt: u32) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| {
            let choices = b"abcdefghijklmnopqrstuvwxyz0123456789";
            choices[rng.gen_range(0..choices.len())] as char
        })
        .collect();
    format!("-{suffix}{attempt}")
}

pub struct RepositoryProcessor;

impl RepositoryProcessor {
    pub fn new() -> Self {
        Self
    }

    fn hash(transcript: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(transcript.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn find_existing_record(
        ctx: &ProcessorContext,
        hash: &str,
    ) -> Result<Option<RepositoryHistoryRecord>> {
        let bytes = ctx.blob.get("github/history.jsonl").await?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<RepositoryHistoryRecord>(line) {
                if record.transcript_hash == hash {
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }

    /// Appends the ledger entry a prior delivery should have written, then
    /// reports the event as skipped — the repository already exists.
    async fn record_reconciliation(
        &self,
        ctx: &ProcessorContext,
        hash: &str,
        repo_name: &str,
        repo_url: &str,
        correlation_id: CorrelationId,
        started_at: chrono::DateTime<Utc>,
        duration_ms: u64,
    ) -> AgentResult {
        let record = RepositoryHistoryRecord {
            timestamp: ctx.event_time,
            transcript_hash: hash.to_string(),
            repo_name: repo_name.to_string(),
            repo_url: repo_url.to_string(),
            created: true,
        };
        let line = serde_json::to_string(&record).expect("record serializes");
        let ledger_write_failed = ctx
            .blob
            .append_line("github/history.jsonl", &line, ctx.config.blob_append_retries())
            .await
            .is_err();

        if ledger_write_failed {
            log::warn!(
                "correlation_id={correlation_id} reconciliation ledger write failed for {repo_name}"
            );
        } else {
            log::info!(
                "correlation_id={correlation_id} reconciled existing repository {repo_name} into ledger"
            );
        }

        AgentResult::skipped(
            AgentId::Repository,
            correlation_id,
            started_at,
            duration_ms,
            json!({
                "repo_name": repo_name,
                "repo_url": repo_url,
                "created": false,
                "reconciled": true,
                "ledger_write_failed": ledger_write_failed,
            }),
        )
    }
}

impl Default for RepositoryProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for RepositoryProcessor {
    async fn process(
        &self,
        ctx: &ProcessorContext,
        transcript: &str,
        correlation_id: CorrelationId,
    ) -> AgentResult {
        let started = std::time::Instant::now();
        let started_at = Utc::now();

        if !ctx.config.repository_enabled() {
            return AgentResult::skipped(
                AgentId::Repository,
                correlation_id,
                started_at,
                elapsed_ms(started),
                json!({"reason": "repository_disabled"}),
            );
        }

        let trimmed = transcript.trim();
        if trimmed.len() < MIN_REPOSITORY_CONTENT_BYTES {
            return AgentResult::skipped(
                AgentId::Repository,
                correlation_id,
                started_at,
                elapsed_ms(started),
                json!({"reason": "insufficient_content"}),
            );
        }

        let hash = Self::hash(transcript);

        match Self::find_existing_record(ctx, &hash).await {
            Ok(Some(existing)) => {
                return AgentResult::skipped(
                    AgentId::Repository,
                    correlation_id,
                    started_at,
                    elapsed_ms(started),
                    json!({
                        "repo_name": existing.repo_name,
                        "repo_url": existing.repo_url,
                        "created": false,
                        "dedup_of": existing.transcript_hash,
                    }),
                );
            }
            Ok(None) => {}
            Err(_) => {
                // best-effort: treat an unreadable ledger the same as not_found
            }
        }

        let generation_timeout = std::time::Duration::from_millis(8_000.min(ctx.config.model_timeout_ms() * 2));
        let raw = match ctx
            .model
            .invoke(&generation_prompt(transcript), 1024, generation_timeout)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                return AgentResult::failure(
                    AgentId::Repository,
                    correlation_id,
                    started_at,
                    elapsed_ms(started),
                    err.kind(),
                );
            }
        };

        let generated: GeneratedRepository = match serde_json::from_str(&raw) {
            Ok(g) => g,
            Err(_) => {
                return AgentResult::failure(
                    AgentId::Repository,
                    correlation_id,
                    started_at,
                    elapsed_ms(started),
                    crate::error::ErrorKind::Model,
                );
            }
        };

        let base_name = generated.repo_name.to_lowercase();
        if !is_valid_repo_name(&base_name) || generated.initial_issues.len() > 10 {
            return AgentResult::failure(
                AgentId::Repository,
                correlation_id,
                started_at,
                elapsed_ms(started),
                crate::error::ErrorKind::Model,
            );
        }

        // A repository already live under this name but absent from the hash
        // ledger means a prior delivery for this same content created it and
        // then failed to record the ledger entry (see `ledger_write_failed`
        // below). Reconcile instead of racing the collision-retry loop into
        // creating a second, different repository for identical content.
        match ctx.repository_host.find_by_name(&base_name).await {
            Ok(Some(existing_url)) => {
                return self
                    .record_reconciliation(ctx, &hash, &base_name, &existing_url, correlation_id, started_at, elapsed_ms(started))
                    .await;
            }
            Ok(None) => {}
            Err(_) => {
                // best-effort: an unreadable lookup falls through to the normal create path
            }
        }

        let token = match ctx.secrets.get_secret(ctx.config.secret_token_name()).await {
            Ok(token) => token,
            Err(err) => {
                return AgentResult::failure(
                    AgentId::Repository,
                    correlation_id,
                    started_at,
                    elapsed_ms(started),
                    err.kind(),
                );
            }
        };

        let visibility = ctx.config.repository_default_visibility();
        let mut name = base_name.clone();
        let mut repo_url = None;
        for attempt in 0..3u32 {
            match ctx
                .repository_host
                .create_repo(&name, &generated.description, visibility, &token)
                .await
            {
                Ok(url) => {
                    repo_url = Some(url);
                    break;
                }
                Err(Error::Conflict(_)) => {
                    name = format!("{base_name}{}", collision_suffix(attempt));
                    continue;
                }
                Err(err) => {
                    return AgentResult::failure(
                        AgentId::Repository,
                        correlation_id,
                        started_at,
                        elapsed_ms(started),
                        err.kind(),
                    );
                }
            }
        }

        let Some(repo_url) = repo_url else {
            return AgentResult::failure(
                AgentId::Repository,
                correlation_id,
                started_at,
                elapsed_ms(started),
                crate::error::ErrorKind::Conflict,
            );
        };

        if let Err(err) = ctx
            .repository_host
            .create_readme(&repo_url, &generated.readme_markdown, &token)
            .await
        {
            log::warn!("correlation_id={correlation_id} README creation failed: {err}");
        }

        let mut issue_count = 0u32;
        for title in &generated.initial_issues {
            match ctx.repository_host.create_issue(&repo_url, title, &token).await {
                Ok(()) => issue_count += 1,
                Err(err) => {
                    log::warn!("correlation_id={correlation_id} issue creation failed: {err}");
                }
            }
        }

        let record = RepositoryHistoryRecord {
            timestamp: ctx.event_time,
            transcript_hash: hash,
            repo_name: name.clone(),
            repo_url: repo_url.clone(),
            created: true,
        };

        let line = serde_json::to_string(&record).expect("record serializes");
        let ledger_write_failed = ctx
            .blob
            .append_line("github/history.jsonl", &line, ctx.config.blob_append_retries())
            .await
            .is_err();

        if ledger_write_failed {
            log::warn!(
                "correlation_id={correlation_id} repository ledger write failed after external creation of {name}"
            );
        }

        AgentResult::success(
            AgentId::Repository,
            correlation_id,
            started_at,
            elapsed_ms(started),
            json!({
                "repo_name": name,
                "repo_url": repo_url,
                "created": true,
                "issue_count": issue_count,
                "ledger_write_failed": ledger_write_failed,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;
    use crate::config::RouterConfig;
    use crate::model::FakeModelAdapter;
    use crate::secret::EnvSecretStore;
    use crate::types::AgentStatus;

    fn ctx_with(model: FakeModelAdapter) -> ProcessorContext {
        ProcessorContext {
            blob: Arc::new(InMemoryBlobStore::new()),
            secrets: Arc::new(EnvSecretStore),
            model: Arc::new(model),
            repository_host: Arc::new(InMemoryRepositoryHost::new()),
            config: RouterConfig::builder()
                .secret_token_name("github_token")
                .secret_model_key_name("model_key")
                .build()
                .unwrap(),
            event_time: Utc::now(),
        }
    }

    #[test]
    fn test_is_valid_repo_name() {
        assert!(is_valid_repo_name("habit-tracker"));
        assert!(is_valid_repo_name("a1"));
        assert!(!is_valid_repo_name("a"));
        assert!(!is_valid_repo_name("-leading"));
        assert!(!is_valid_repo_name("trailing-"));
        assert!(!is_valid_repo_name("Has-Upper"));
    }

    #[tokio::test]
    async fn test_insufficient_content_is_skipped() {
        let processor = RepositoryProcessor::new();
        let context = ctx_with(FakeModelAdapter::constant("{}"));
        let result = processor.process(&context, "short", CorrelationId::new()).await;
        assert_eq!(result.status, AgentStatus::Skipped);
        assert_eq!(result.payload.unwrap()["reason"], "insufficient_content");
    }

    #[tokio::test]
    async fn test_creates_repository_and_ledger_entry() {
        let processor = RepositoryProcessor::new();
        let model = FakeModelAdapter::constant(
            r#"{"repo_name":"habit-tracker","description":"Track habits","readme_markdown":"# Habit Tracker","initial_issues":["Set up CI"]}"#,
        );
        let context = ctx_with(model);
        let transcript = "Idea for a habit tracker app with gamification and streaks.";
        let result = processor.process(&context, transcript, CorrelationId::new()).await;

        assert_eq!(result.status, AgentStatus::Success);
        let payload = result.payload.unwrap();
        assert_eq!(payload["repo_name"], "habit-tracker");
        assert_eq!(payload["created"], true);

        let ledger = context.blob.get("github/history.jsonl").await.unwrap().unwrap();
        let text = String::from_utf8(ledger).unwrap();
        assert!(text.contains("habit-tracker"));
    }

    #[tokio::test]
    async fn test_second_event_for_same_content_is_skipped() {
        let processor = RepositoryProcessor::new();
        let model = FakeModelAdapter::constant(
            r#"{"repo_name":"habit-tracker","description":"Track habits","readme_markdown":"# Habit Tracker","initial_issues":[]}"#,
        );
        let context = ctx_with(model);
        let transcript = "Idea for a habit tracker app with gamification and streaks.";

        let first = processor.process(&context, transcript, CorrelationId::new()).await;
        assert_eq!(first.status, AgentStatus::Success);

        let second = processor.process(&context, transcript, CorrelationId::new()).await;
        assert_eq!(second.status, AgentStatus::Skipped);
        assert_eq!(second.payload.unwrap()["created"], false);

        let ledger = context.blob.get("github/history.jsonl").await.unwrap().unwrap();
        let text = String::from_utf8(ledger).unwrap();
        assert_eq!(text.lines().filter(|l| !l.trim().is_empty()).count(), 1);
    }

    #[tokio::test]
    async fn test_reconciles_existing_repository_with_missing_ledger_entry() {
        let processor = RepositoryProcessor::new();
        let model = FakeModelAdapter::constant(
            r#"{"repo_name":"habit-tracker","description":"Track habits","readme_markdown":"# Habit Tracker","initial_issues":[]}"#,
        );
        let context = ctx_with(model);

        // A prior delivery created the repository but its ledger write
        // failed, so the history object never recorded it.
        context
            .repository_host
            .create_repo("habit-tracker", "Track habits", Visibility::Public, "tok")
            .await
            .unwrap();

        let transcript = "Idea for a habit tracker app with gamification and streaks.";
        let result = processor.process(&context, transcript, CorrelationId::new()).await;

        assert_eq!(result.status, AgentStatus::Skipped);
        let payload = result.payload.unwrap();
        assert_eq!(payload["reconciled"], true);
        assert_eq!(payload["repo_name"], "habit-tracker");
        assert_eq!(payload["created"], false);

        let ledger = context.blob.get("github/history.jsonl").await.unwrap().unwrap();
        let text = String::from_utf8(ledger).unwrap();
        assert_eq!(text.lines().filter(|l| !l.trim().is_empty()).count(), 1);
        assert!(text.contains("habit-tracker"));
    }

    #[tokio::test]
    async fn test_disabled_repository_is_skipped() {
        let processor = RepositoryProcessor::new();
        let mut context = ctx_with(FakeModelAdapter::constant("{}"));
        context.config = RouterConfig::builder()
            .secret_token_name("t")
            .secret_model_key_name("m")
            .repository_enabled(false)
            .build()
            .unwrap();

        let result = processor
            .process(&context, "Idea for a long enough transcript here", CorrelationId::new())
            .await;
        assert_eq!(result.status, AgentStatus::Skipped);
        assert_eq!(result.payload.unwrap()["reason"], "repository_disabled");
    }

    #[tokio::test]
    async fn test_invalid_generated_name_fails() {
        let processor = RepositoryProcessor::new();
        let model = FakeModelAdapter::constant(
            r#"{"repo_name":"Invalid Name!","description":"x","readme_markdown":"x","initial_issues":[]}"#,
        );
        let context = ctx_with(model);
        let result = processor
            .process(&context, "Idea for a long enough transcript here", CorrelationId::new())
            .await;
        assert_eq!(result.status, AgentStatus::Failure);
    }
}
