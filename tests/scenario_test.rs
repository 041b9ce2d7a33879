//! End-to-end scenario tests against in-memory adapters, covering each
//! documented routing/dispatch scenario.

use std::collections::HashMap;
use std::sync::Arc;

use transcript_router::blob::{BlobStore, InMemoryBlobStore};
use transcript_router::classifier::{build_classifier, Classifier, PathHintClassifier};
use transcript_router::config::{ClassifierMode, RouterConfig};
use transcript_router::model::FakeModelAdapter;
use transcript_router::orchestrator::{ObjectCreatedRecord, Orchestrator};
use transcript_router::processors::{
    InMemoryRepositoryHost, JournalProcessor, MemoryProcessor, Processor, RepositoryProcessor,
};
use transcript_router::secret::EnvSecretStore;
use transcript_router::types::{AgentId, AgentStatus};

fn processor_table() -> HashMap<AgentId, Arc<dyn Processor>> {
    let mut table: HashMap<AgentId, Arc<dyn Processor>> = HashMap::new();
    table.insert(AgentId::Journal, Arc::new(JournalProcessor::new()));
    table.insert(AgentId::Memory, Arc::new(MemoryProcessor::new()));
    table.insert(AgentId::Repository, Arc::new(RepositoryProcessor::new()));
    table
}

fn path_hint_orchestrator(blob: Arc<InMemoryBlobStore>) -> Orchestrator {
    Orchestrator::new(
        blob,
        Arc::new(PathHintClassifier::new()),
        processor_table(),
        Arc::new(EnvSecretStore),
        Arc::new(FakeModelAdapter::constant("{}")),
        Arc::new(InMemoryRepositoryHost::new()),
        RouterConfig::builder()
            .secret_token_name("t")
            .secret_model_key_name("m")
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn s1_path_hint_journal_entry() {
    let blob = Arc::new(InMemoryBlobStore::new());
    blob.put(
        "transcripts/work/2024/01/15/mon.txt".into(),
        b"Finished the authentication module; meeting with Priya tomorrow.".to_vec(),
    )
    .await
    .unwrap();

    let orchestrator = path_hint_orchestrator(blob.clone());
    let aggregate = orchestrator
        .handle_record(&ObjectCreatedRecord {
            bucket: "b".into(),
            key: "transcripts/work/2024/01/15/mon.txt".into(),
            correlation_id: None,
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(aggregate.routing.primary, AgentId::Journal);
    assert_eq!(aggregate.routing.confidence, 1.0);
    assert_eq!(aggregate.results.len(), 1);
    assert_eq!(aggregate.results[0].status, AgentStatus::Success);

    let week = blob.get("work/weekly_logs/2024-W03.md").await.unwrap().unwrap();
    let text = String::from_utf8(week).unwrap();
    assert!(text.contains("Finished the authentication module; meeting with Priya tomorrow."));
}

#[tokio::test]
async fn s2_path_hint_memory_record() {
    let blob = Arc::new(InMemoryBlobStore::new());
    blob.put(
        "transcripts/memories/2024/07/04/sunset.txt".into(),
        b"Watching the sunset at the lake reminded me of summers with grandma.".to_vec(),
    )
    .await
    .unwrap();

    let orchestrator = path_hint_orchestrator(blob.clone());
    let aggregate = orchestrator
        .handle_record(&ObjectCreatedRecord {
            bucket: "b".into(),
            key: "transcripts/memories/2024/07/04/sunset.txt".into(),
            correlation_id: None,
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(aggregate.routing.primary, AgentId::Memory);
    let recorded = blob.get("memories/2024-07-04.jsonl").await.unwrap().unwrap();
    let text = String::from_utf8(recorded).unwrap();
    assert!(text.contains("Watching the sunset at the lake reminded me of summers with grandma."));
}

#[tokio::test]
async fn s3_repository_creation_is_idempotent() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();

    let blob = Arc::new(InMemoryBlobStore::new());
    blob.put(
        "transcripts/github_ideas/2024/02/02/tracker.txt".into(),
        b"Idea for a habit tracker app with gamification and streaks.".to_vec(),
    )
    .await
    .unwrap();

    let model = FakeModelAdapter::constant(
        r#"{"repo_name":"habit-tracker","description":"d","readme_markdown":"# Habit Tracker","initial_issues":[]}"#,
    );
    let orchestrator = Orchestrator::new(
        blob.clone(),
        Arc::new(PathHintClassifier::new()),
        processor_table(),
        Arc::new(EnvSecretStore),
        Arc::new(model),
        Arc::new(InMemoryRepositoryHost::new()),
        RouterConfig::builder()
            .secret_token_name("t")
            .secret_model_key_name("m")
            .build()
            .unwrap(),
    );

    let record = ObjectCreatedRecord {
        bucket: "b".into(),
        key: "transcripts/github_ideas/2024/02/02/tracker.txt".into(),
        correlation_id: None,
    };

    let first = orchestrator.handle_record(&record).await.unwrap().unwrap();
    assert_eq!(first.routing.primary, AgentId::Repository);
    assert_eq!(first.results[0].status, AgentStatus::Success);
    let payload = first.results[0].payload.clone().unwrap();
    assert_eq!(payload["created"], true);

    let second = orchestrator.handle_record(&record).await.unwrap().unwrap();
    assert_eq!(second.results[0].status, AgentStatus::Skipped);

    let history = blob.get("github/history.jsonl").await.unwrap().unwrap();
    let text = String::from_utf8(history).unwrap();
    assert_eq!(text.lines().filter(|l| !l.trim().is_empty()).count(), 1);
}

#[tokio::test]
async fn s4_content_mode_classifies_mixed_transcript() {
    let model = FakeModelAdapter::constant(
        r#"{"primary":"repository","secondary":["journal"],"confidence":0.7,"rationale":"idea dominates"}"#,
    );
    let classifier = build_classifier(
        &RouterConfig::builder()
            .secret_token_name("t")
            .secret_model_key_name("m")
            .classifier_mode(ClassifierMode::Content)
            .build()
            .unwrap(),
        Arc::new(model),
    );

    let key = transcript_router::types::TranscriptKey::parse(
        "transcripts/unclassified/2024/03/03/mixed.txt",
    )
    .unwrap();
    let decision = classifier
        .classify(
            "Had an idea for an app while remembering my first project at work.",
            &key,
        )
        .await;

    assert!(decision.confidence >= 0.5);
    assert!(matches!(
        decision.primary,
        AgentId::Repository | AgentId::Memory | AgentId::Journal
    ));
}

#[tokio::test]
async fn s4_path_hint_fallback_keyword_tiebreak() {
    let classifier = PathHintClassifier::new();
    let key = transcript_router::types::TranscriptKey::parse(
        "transcripts/unclassified/2024/03/03/mixed.txt",
    )
    .unwrap();
    let decision = classifier
        .classify(
            "Had an idea for an app while remembering my first project at work.",
            &key,
        )
        .await;

    assert_eq!(decision.primary, AgentId::Repository);
    assert!(decision.secondary.is_empty());
}

#[tokio::test]
async fn s5_missing_transcript_yields_empty_results() {
    let blob = Arc::new(InMemoryBlobStore::new());
    let orchestrator = path_hint_orchestrator(blob.clone());

    let aggregate = orchestrator
        .handle_record(&ObjectCreatedRecord {
            bucket: "b".into(),
            key: "transcripts/work/2024/05/05/gone.txt".into(),
            correlation_id: None,
        })
        .await
        .unwrap()
        .unwrap();

    assert!(aggregate.results.is_empty());
    let aggregate_obj = blob
        .get("outputs/work/2024/05/05/gone_response.json")
        .await
        .unwrap();
    assert!(aggregate_obj.is_some());
}

#[tokio::test]
async fn s6_concurrent_journal_appends_both_land() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();

    let blob = Arc::new(InMemoryBlobStore::new());
    blob.put(
        "transcripts/work/2024/01/15/a.txt".into(),
        b"Completed the sprint deadline work with the team on project A.".to_vec(),
    )
    .await
    .unwrap();
    blob.put(
        "transcripts/work/2024/01/16/b.txt".into(),
        b"Completed the sprint deadline work with the team on project B.".to_vec(),
    )
    .await
    .unwrap();

    let orchestrator = Arc::new(path_hint_orchestrator(blob.clone()));
    let o1 = orchestrator.clone();
    let o2 = orchestrator.clone();

    let (r1, r2) = tokio::join!(
        o1.handle_record(&ObjectCreatedRecord {
            bucket: "b".into(),
            key: "transcripts/work/2024/01/15/a.txt".into(),
            correlation_id: None,
        }),
        o2.handle_record(&ObjectCreatedRecord {
            bucket: "b".into(),
            key: "transcripts/work/2024/01/16/b.txt".into(),
            correlation_id: None,
        })
    );

    assert!(r1.unwrap().unwrap().results[0].status == AgentStatus::Success);
    assert!(r2.unwrap().unwrap().results[0].status == AgentStatus::Success);

    let week = blob.get("work/weekly_logs/2024-W03.md").await.unwrap().unwrap();
    let text = String::from_utf8(week).unwrap();
    assert!(text.contains("project A."));
    assert!(text.contains("project B."));
}
