use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use quizsession::error::{GatewayError, StoreError};
use quizsession::gateway::PersistenceGateway;
use quizsession::model::{Attempt, SubmittedAnswer};
use quizsession::store::{status_report, LocalStore, Progress, ProgressWriter};
use quizsession::supply::parse_attempt;

fn data_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "quizsession-test-{}-{}",
        std::process::id(),
        name
    ));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn sample_attempt() -> Arc<Attempt> {
    let content = fs::read_to_string("fixtures/sample_attempt.yaml").expect("Cannot read fixture");
    Arc::new(parse_attempt(&content).unwrap())
}

#[tokio::test]
async fn test_saved_answers_survive_reopen() {
    let dir = data_dir("reopen");
    let attempt = sample_attempt();
    let store = LocalStore::open(&dir, Arc::clone(&attempt)).unwrap();

    store
        .save_answer(&attempt.id, "q-fork", "fork")
        .await
        .unwrap();
    store
        .save_answer(&attempt.id, "q-short-sig", "SIGINT")
        .await
        .unwrap();
    store
        .save_answer(&attempt.id, "q-short-sig", "SIGINT (2)")
        .await
        .unwrap();
    assert!(store.path().exists());

    let reopened = LocalStore::open(&dir, Arc::clone(&attempt)).unwrap();
    let doc = reopened.document().await;
    assert_eq!(doc.attempt_id, attempt.id);
    assert_eq!(doc.answers.len(), 2);
    assert_eq!(doc.answers["q-fork"].value, "fork");
    assert_eq!(doc.answers["q-short-sig"].value, "SIGINT (2)");

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_rejects_values_the_question_cannot_hold() {
    let dir = data_dir("validate");
    let attempt = sample_attempt();
    let store = LocalStore::open(&dir, Arc::clone(&attempt)).unwrap();

    let err = store
        .save_answer(&attempt.id, "q-fork", "vfork")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));

    let err = store
        .save_answer(&attempt.id, "q-tf-pipes", "yes")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));

    let err = store
        .save_answer(&attempt.id, "q-missing", "x")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));

    let err = store
        .save_answer("other-attempt", "q-fork", "fork")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));

    // Clearing an answer is always allowed.
    store.save_answer(&attempt.id, "q-fork", "").await.unwrap();
    store
        .save_answer(&attempt.id, "q-tf-pipes", "false")
        .await
        .unwrap();
    assert!(store.document().await.answers.contains_key("q-tf-pipes"));

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_submission_is_recorded_once() {
    let dir = data_dir("submit");
    let attempt = sample_attempt();
    let store = LocalStore::open(&dir, Arc::clone(&attempt)).unwrap();
    let answers = vec![SubmittedAnswer {
        question_id: "q-fork".to_string(),
        value: "fork".to_string(),
    }];

    let receipt = store.submit_attempt(&attempt.id, &answers).await.unwrap();
    assert_eq!(
        store.submit_attempt(&attempt.id, &answers).await,
        Err(GatewayError::AlreadySubmitted)
    );
    assert_eq!(
        store.save_answer(&attempt.id, "q-fork", "exec").await,
        Err(GatewayError::AlreadySubmitted)
    );

    let reopened = LocalStore::open(&dir, Arc::clone(&attempt)).unwrap();
    let submission = reopened.document().await.submission.unwrap();
    assert_eq!(submission.finalized_at, receipt.finalized_at);
    assert_eq!(submission.answers, answers);

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_changed_attempt_file_is_detected() {
    let dir = data_dir("mismatch");
    let attempt = sample_attempt();
    let store = LocalStore::open(&dir, Arc::clone(&attempt)).unwrap();
    store.save_answer(&attempt.id, "q-fork", "fork").await.unwrap();

    let mut edited = (*attempt).clone();
    edited.source_hash = "sha256:edited".to_string();
    assert!(matches!(
        LocalStore::open(&dir, Arc::new(edited)),
        Err(StoreError::AttemptMismatch)
    ));

    LocalStore::clear(&dir, &attempt.id).unwrap();
    assert!(!LocalStore::dir_for(&dir, &attempt.id).exists());
    let fresh = LocalStore::open(&dir, Arc::clone(&attempt)).unwrap();
    assert!(fresh.document().await.answers.is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_progress_export_and_status() {
    let dir = data_dir("progress");
    let attempt = sample_attempt();
    let store = LocalStore::open(&dir, Arc::clone(&attempt)).unwrap();
    store.save_answer(&attempt.id, "q-fork", "fork").await.unwrap();
    store
        .save_answer(&attempt.id, "q-short-sig", "   ")
        .await
        .unwrap();
    store
        .save_progress(Progress {
            current_index: 3,
            flagged: vec!["q-essay-vm".to_string()],
            started_at: None,
        })
        .await
        .unwrap();

    let doc = LocalStore::open(&dir, Arc::clone(&attempt))
        .unwrap()
        .document()
        .await;
    assert_eq!(doc.progress.current_index, 3);
    assert_eq!(doc.progress.flagged, vec!["q-essay-vm".to_string()]);

    let report = status_report(&attempt, &doc);
    assert!(report.contains("Saved answers: 1, Unanswered: 4, Flagged: 1"));
    assert!(report.contains("Not submitted"));

    let dest = dir.join("export.yaml");
    store.export(&dest).await.unwrap();
    let exported = fs::read_to_string(&dest).unwrap();
    assert!(exported.contains("attempt_id: systems-midterm-7f3a"));
    assert!(exported.contains("q-essay-vm"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_attempt_ids_are_sanitized_for_paths() {
    let dir = PathBuf::from("/data");
    assert_eq!(
        LocalStore::dir_for(&dir, "unit 3/quiz:a"),
        PathBuf::from("/data/unit_3_quiz_a")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_writer_keeps_newest_position() {
    let dir = data_dir("writer");
    let attempt = sample_attempt();
    let store = Arc::new(LocalStore::open(&dir, Arc::clone(&attempt)).unwrap());
    let writer = ProgressWriter::spawn(Arc::clone(&store));

    for index in 1..=20 {
        writer.update(Progress {
            current_index: index % 5,
            flagged: vec![format!("step-{}", index)],
            started_at: None,
        });
        tokio::task::yield_now().await;
    }
    writer.finish().await;

    let doc = LocalStore::open(&dir, Arc::clone(&attempt))
        .unwrap()
        .document()
        .await;
    assert_eq!(doc.progress.current_index, 0);
    assert_eq!(doc.progress.flagged, vec!["step-20".to_string()]);
    assert_eq!(store.document().await.progress, doc.progress);

    let _ = fs::remove_dir_all(&dir);
}
