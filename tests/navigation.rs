mod common;

use std::sync::Arc;

use tokio::sync::broadcast;

use quizsession::autosave::AutosavePump;
use quizsession::buffer::AnswerBuffer;
use quizsession::error::{SealReason, SessionError};
use quizsession::navigation::NavigationController;
use quizsession::retry::RetryConfig;

use common::{attempt, settle, ScriptedGateway};

fn controller(questions: usize) -> (NavigationController, Arc<AnswerBuffer>, Arc<ScriptedGateway>) {
    let attempt = attempt(questions, 600, true);
    let gateway = ScriptedGateway::new();
    let buffer = Arc::new(AnswerBuffer::new(&attempt));
    let (events, _) = broadcast::channel(16);
    let pump = Arc::new(AutosavePump::new(
        attempt.id.clone(),
        Arc::clone(&buffer),
        gateway.clone(),
        RetryConfig::default(),
        events,
    ));
    (
        NavigationController::new(&attempt, pump),
        buffer,
        gateway,
    )
}

#[tokio::test]
async fn test_go_to_clamps_to_last_question() {
    let (mut nav, _, _) = controller(3);
    assert_eq!(nav.current_index(), 0);
    assert_eq!(nav.go_to(7), Ok(2));
    assert_eq!(nav.current_question_id(), "q3");
    assert_eq!(nav.next(), Ok(2));
    assert_eq!(nav.previous(), Ok(1));
    assert_eq!(nav.go_to(0), Ok(0));
    assert_eq!(nav.previous(), Ok(0));
}

#[tokio::test]
async fn test_leaving_a_dirty_question_flushes_it() {
    let (mut nav, buffer, gateway) = controller(3);
    buffer.set("q1", "draft").unwrap();
    nav.go_to(2).unwrap();
    settle().await;

    assert_eq!(gateway.saves_of("q1"), vec!["draft"]);
    assert!(!buffer.is_dirty("q1"));
}

#[tokio::test]
async fn test_staying_put_still_flushes_current_question() {
    let (mut nav, buffer, gateway) = controller(2);
    buffer.set("q1", "x").unwrap();
    nav.go_to(0).unwrap();
    settle().await;
    assert_eq!(gateway.saves_of("q1"), vec!["x"]);
}

#[tokio::test]
async fn test_flags_are_listed_in_attempt_order() {
    let (mut nav, _, _) = controller(4);
    assert_eq!(nav.toggle_flag("q3"), Ok(true));
    assert_eq!(nav.toggle_flag("q1"), Ok(true));
    assert_eq!(nav.toggle_flag("q2"), Ok(true));
    assert_eq!(nav.toggle_flag("q2"), Ok(false));

    assert_eq!(nav.flagged(), vec!["q1".to_string(), "q3".to_string()]);
    assert!(nav.is_flagged("q3"));
    assert!(!nav.is_flagged("q2"));
}

#[tokio::test]
async fn test_unknown_question_cannot_be_flagged() {
    let (mut nav, _, _) = controller(2);
    assert_eq!(
        nav.toggle_flag("q9"),
        Err(SessionError::UnknownQuestion("q9".to_string()))
    );
    assert!(nav.flagged().is_empty());
}

#[tokio::test]
async fn test_visited_tracks_every_question_shown() {
    let (mut nav, _, _) = controller(3);
    assert!(nav.is_visited("q1"));
    assert!(!nav.is_visited("q3"));
    nav.go_to(2).unwrap();
    assert!(nav.is_visited("q3"));
    assert!(!nav.is_visited("q2"));
}

#[tokio::test]
async fn test_restore_drops_unknown_flags_and_clamps_index() {
    let (mut nav, _, _) = controller(3);
    nav.restore(10, &["q2".to_string(), "ghost".to_string()]);
    assert_eq!(nav.current_index(), 2);
    assert_eq!(nav.flagged(), vec!["q2".to_string()]);
    assert!(nav.is_visited("q3"));
}

#[tokio::test]
async fn test_closed_controller_rejects_changes() {
    let (mut nav, _, _) = controller(3);
    nav.go_to(1).unwrap();
    nav.close();
    assert!(nav.is_closed());

    let closed = Err(SessionError::SessionExpired(SealReason::Submitted));
    assert_eq!(nav.go_to(2), closed);
    assert_eq!(
        nav.toggle_flag("q1"),
        Err(SessionError::SessionExpired(SealReason::Submitted))
    );
    assert_eq!(nav.current_index(), 1);
}
