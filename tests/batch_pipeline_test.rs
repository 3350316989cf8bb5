//! Integration tests for the batch render-and-upload pipeline.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeRenderer, RecordingStore, PAGE};
use page_render_archiver::constants::HTML_CONTENT_TYPE;
use page_render_archiver::orchestrator::{BatchError, BatchRunner};
use page_render_archiver::render::RenderError;
use page_render_archiver::report::{BatchStatus, ErrorKind, FetchOutcome};

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|u| (*u).to_string()).collect()
}

fn runner(renderer: &Arc<FakeRenderer>, store: &Arc<RecordingStore>, limit: usize) -> BatchRunner {
    BatchRunner::new(renderer.clone(), store.clone(), limit)
}

#[tokio::test]
async fn test_all_succeed() {
    let renderer = Arc::new(FakeRenderer::new());
    let store = Arc::new(RecordingStore::new());
    let input = urls(&["https://a.test/page1", "https://a.test/"]);

    let batch = runner(&renderer, &store, 2)
        .run(&input, "b1")
        .await
        .expect("batch should succeed");

    assert_eq!(batch.status, BatchStatus::Complete);
    assert_eq!(batch.status.status_code(), 200);
    assert_eq!(batch.report.total_count, 2);
    assert_eq!(batch.report.success_count, 2);

    let keys: Vec<_> = batch
        .report
        .outcomes
        .iter()
        .map(|o| match o {
            FetchOutcome::Success { rendered_key, .. } => rendered_key.as_str(),
            FetchOutcome::Failure { .. } => panic!("unexpected failure: {o:?}"),
        })
        .collect();
    assert_eq!(keys, vec!["page1.html", "index.html"]);

    let puts = store.puts();
    assert_eq!(puts.len(), 2);
    for (bucket, _, bytes, content_type) in &puts {
        assert_eq!(bucket, "b1");
        assert_eq!(bytes, PAGE.as_bytes());
        assert_eq!(content_type, HTML_CONTENT_TYPE);
    }
}

#[tokio::test]
async fn test_partial_success() {
    let renderer = Arc::new(
        FakeRenderer::new().fail(
            "https://a.test/page1",
            RenderError::permanent("navigate: net::ERR_NAME_NOT_RESOLVED"),
        ),
    );
    let store = Arc::new(RecordingStore::new());
    let input = urls(&["https://a.test/page1", "https://a.test/"]);

    let batch = runner(&renderer, &store, 2).run(&input, "b1").await.unwrap();

    assert_eq!(batch.status, BatchStatus::Partial);
    assert_eq!(batch.status.status_code(), 207);
    assert!(!batch.report.outcomes[0].is_success());
    assert!(batch.report.outcomes[1].is_success());
    assert!(matches!(
        &batch.report.outcomes[0],
        FetchOutcome::Failure {
            error_kind: ErrorKind::PermanentRender,
            message,
            ..
        } if message.contains("ERR_NAME_NOT_RESOLVED")
    ));
    // Permanent failures are not retried
    assert_eq!(renderer.calls("https://a.test/page1"), 1);
    assert_eq!(store.keys(), vec!["index.html"]);
}

#[tokio::test]
async fn test_all_failed_is_batch_error() {
    let renderer = Arc::new(
        FakeRenderer::new()
            .fail("https://a.test/a", RenderError::permanent("first failure"))
            .fail("https://a.test/b", RenderError::permanent("second failure")),
    );
    let store = Arc::new(RecordingStore::new());
    let input = urls(&["https://a.test/a", "https://a.test/b"]);

    let err = runner(&renderer, &store, 2)
        .run(&input, "b1")
        .await
        .unwrap_err();

    match err {
        BatchError::AllFailed {
            ref first_error,
            ref report,
        } => {
            assert_eq!(first_error, "first failure");
            assert_eq!(report.total_count, 2);
            assert_eq!(report.success_count, 0);
        }
        BatchError::Empty => panic!("expected AllFailed"),
    }
    assert!(!err.to_string().is_empty());
    assert!(store.puts().is_empty());
}

#[tokio::test]
async fn test_empty_batch() {
    let renderer = Arc::new(FakeRenderer::new());
    let store = Arc::new(RecordingStore::new());

    let err = runner(&renderer, &store, 2).run(&[], "b1").await.unwrap_err();
    assert!(matches!(err, BatchError::Empty));
}

#[tokio::test]
async fn test_every_url_reported_once_in_input_order() {
    let renderer = Arc::new(FakeRenderer::new().with_delay(Duration::from_millis(5)));
    let store = Arc::new(RecordingStore::new());
    let input: Vec<String> = (0..12).map(|i| format!("https://a.test/p{i}")).collect();

    let batch = runner(&renderer, &store, 4).run(&input, "b1").await.unwrap();

    assert_eq!(batch.report.total_count, input.len());
    assert_eq!(batch.report.outcomes.len(), input.len());
    let reported: Vec<_> = batch.report.outcomes.iter().map(FetchOutcome::url).collect();
    assert_eq!(reported, input.iter().map(String::as_str).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_gate_bounds_concurrent_renders() {
    let renderer = Arc::new(FakeRenderer::new().with_delay(Duration::from_millis(20)));
    let store = Arc::new(RecordingStore::new());
    let input: Vec<String> = (0..10).map(|i| format!("https://a.test/p{i}")).collect();

    let batch = runner(&renderer, &store, 3).run(&input, "b1").await.unwrap();

    assert_eq!(batch.status, BatchStatus::Complete);
    assert!(renderer.max_active() <= 3, "max active {}", renderer.max_active());
    assert_eq!(renderer.max_active(), 3);
}

#[tokio::test]
async fn test_gate_of_one_serializes() {
    let renderer = Arc::new(FakeRenderer::new().with_delay(Duration::from_millis(2)));
    let store = Arc::new(RecordingStore::new());
    let input: Vec<String> = (0..5).map(|i| format!("https://a.test/p{i}")).collect();

    runner(&renderer, &store, 1).run(&input, "b1").await.unwrap();

    assert_eq!(renderer.max_active(), 1);
}

#[tokio::test]
async fn test_transient_failure_then_success_is_transparent() {
    let renderer = Arc::new(FakeRenderer::new().script(
        "https://a.test/flaky",
        vec![Err(RenderError::transient("Target closed")), Ok("<html>retried</html>")],
    ));
    let store = Arc::new(RecordingStore::new());

    let batch = runner(&renderer, &store, 1)
        .run(&urls(&["https://a.test/flaky"]), "b1")
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Complete);
    assert_eq!(renderer.calls("https://a.test/flaky"), 2);
    assert_eq!(store.puts()[0].2, b"<html>retried</html>");
    assert!(matches!(
        batch.report.outcomes[0],
        FetchOutcome::Success {
            content_length: Some(20),
            ..
        }
    ));
}

#[tokio::test]
async fn test_transient_failure_twice_fails_url() {
    let renderer = Arc::new(FakeRenderer::new().script(
        "https://a.test/dead",
        vec![
            Err(RenderError::transient("first: Target closed")),
            Err(RenderError::transient("second: Target closed")),
        ],
    ));
    let store = Arc::new(RecordingStore::new());
    let input = urls(&["https://a.test/dead", "https://a.test/ok"]);

    let batch = runner(&renderer, &store, 2).run(&input, "b1").await.unwrap();

    assert_eq!(renderer.calls("https://a.test/dead"), 2);
    assert!(matches!(
        &batch.report.outcomes[0],
        FetchOutcome::Failure {
            error_kind: ErrorKind::TransientRender,
            message,
            ..
        } if message == "second: Target closed"
    ));
}

#[tokio::test]
async fn test_upload_failure_is_isolated() {
    let renderer = Arc::new(FakeRenderer::new());
    let store = Arc::new(RecordingStore::rejecting(&["a.html"]));
    let input = urls(&["https://a.test/a", "https://a.test/b"]);

    let batch = runner(&renderer, &store, 2).run(&input, "b1").await.unwrap();

    assert_eq!(batch.status, BatchStatus::Partial);
    assert!(matches!(
        batch.report.outcomes[0],
        FetchOutcome::Failure {
            error_kind: ErrorKind::Upload,
            ..
        }
    ));
    // Uploads are never retried, and rendering happened once
    assert_eq!(renderer.calls("https://a.test/a"), 1);
    assert_eq!(store.keys(), vec!["b.html"]);
}

#[tokio::test]
async fn test_invalid_url_is_not_rendered() {
    let renderer = Arc::new(FakeRenderer::new());
    let store = Arc::new(RecordingStore::new());
    let input = urls(&["not a url", "ftp://a.test/file", "https://a.test/ok"]);

    let batch = runner(&renderer, &store, 2).run(&input, "b1").await.unwrap();

    assert_eq!(batch.status, BatchStatus::Partial);
    for outcome in &batch.report.outcomes[..2] {
        assert!(matches!(
            outcome,
            FetchOutcome::Failure {
                error_kind: ErrorKind::InvalidUrl,
                ..
            }
        ));
    }
    assert_eq!(store.keys(), vec!["ok.html"]);
}

#[tokio::test]
async fn test_panicking_task_is_isolated() {
    let renderer = Arc::new(FakeRenderer::new().panic_on("https://a.test/boom"));
    let store = Arc::new(RecordingStore::new());
    let input = urls(&["https://a.test/boom", "https://a.test/fine"]);

    let batch = runner(&renderer, &store, 1).run(&input, "b1").await.unwrap();

    assert!(matches!(
        batch.report.outcomes[0],
        FetchOutcome::Failure {
            error_kind: ErrorKind::TaskPanicked,
            ..
        }
    ));
    assert!(batch.report.outcomes[1].is_success());
}

#[tokio::test]
async fn test_deadline_abandons_slow_urls() {
    let renderer = Arc::new(FakeRenderer::new().with_delay(Duration::from_secs(30)));
    let store = Arc::new(RecordingStore::new());
    let input = urls(&["https://a.test/slow1", "https://a.test/slow2"]);

    let err = runner(&renderer, &store, 2)
        .with_deadline(Some(Duration::from_millis(50)))
        .run(&input, "b1")
        .await
        .unwrap_err();

    let BatchError::AllFailed { report, .. } = err else {
        panic!("expected AllFailed");
    };
    assert_eq!(report.outcomes.len(), 2);
    for outcome in &report.outcomes {
        assert!(matches!(
            outcome,
            FetchOutcome::Failure {
                error_kind: ErrorKind::DeadlineExceeded,
                ..
            }
        ));
    }
}

#[tokio::test]
async fn test_colliding_keys_overwrite() {
    let renderer = Arc::new(FakeRenderer::new());
    let store = Arc::new(RecordingStore::new());
    let input = urls(&["https://a.test/x/page", "https://b.test/y/page/"]);

    let batch = runner(&renderer, &store, 1).run(&input, "b1").await.unwrap();

    assert_eq!(batch.status, BatchStatus::Complete);
    assert_eq!(store.keys(), vec!["page.html", "page.html"]);
}

#[tokio::test]
async fn test_key_prefix_applied() {
    let renderer = Arc::new(FakeRenderer::new());
    let store = Arc::new(RecordingStore::new());

    runner(&renderer, &store, 1)
        .with_key_prefix("rendered/")
        .run(&urls(&["https://a.test/docs/intro"]), "b1")
        .await
        .unwrap();

    assert_eq!(store.keys(), vec!["rendered/intro.html"]);
}

#[tokio::test]
async fn test_oversized_concurrency_is_clamped() {
    let renderer = Arc::new(FakeRenderer::new());
    let store = Arc::new(RecordingStore::new());

    let batch = runner(&renderer, &store, usize::MAX)
        .run(&urls(&["https://a.test/x", "https://a.test/y"]), "b1")
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Complete);
    assert_eq!(store.keys(), vec!["x.html", "y.html"]);
}
