use criterion::{black_box, criterion_group, criterion_main, Criterion};
use transcript_router::classifier::PathHintClassifier;
use transcript_router::classifier::Classifier;
use transcript_router::retry::is_retryable_error;
use transcript_router::types::TranscriptKey;
use transcript_router::Error;

fn bench_path_hint_classify(c: &mut Criterion) {
    let classifier = PathHintClassifier::new();
    let key = TranscriptKey::parse("transcripts/work/2024/01/15/standup.txt").unwrap();
    let transcript = "Finished the authentication module; meeting with Priya tomorrow.";

    let rt = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("path_hint_classify", |b| {
        b.iter(|| {
            rt.block_on(classifier.classify(black_box(transcript), black_box(&key)))
        });
    });
}

fn bench_keyword_fallback_classify(c: &mut Criterion) {
    let classifier = PathHintClassifier::new();
    let key = TranscriptKey::parse("transcripts/unclassified/2024/03/03/mixed.txt").unwrap();
    let transcript =
        "Had an idea for an app while remembering my first project at work, a prototype really.";

    let rt = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("keyword_fallback_classify", |b| {
        b.iter(|| {
            rt.block_on(classifier.classify(black_box(transcript), black_box(&key)))
        });
    });
}

fn bench_is_retryable_error(c: &mut Criterion) {
    let errors = vec![
        Error::timeout("t"),
        Error::conflict("c"),
        Error::config("cfg"),
        Error::auth("a"),
        Error::model("throttled"),
    ];
    c.bench_function("is_retryable_error", |b| {
        b.iter(|| {
            for err in &errors {
                black_box(is_retryable_error(black_box(err)));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_path_hint_classify,
    bench_keyword_fallback_classify,
    bench_is_retryable_error,
);
criterion_main!(benches);
