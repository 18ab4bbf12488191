//! End-to-end loop behaviour with a scripted provider.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use quill_core::actions::Signal;
use quill_core::events::LoopEvent;
use quill_core::turns::Role;
use quill_engine::runner::{COMPLETION_REJECTED, FINISH_DEFERRED, RETRY_NOTICE};
use quill_engine::{ActionDispatcher, ControlLoop, LoopConfig, Session, StopReason};
use quill_llm::{ScriptedProvider, ScriptedResponse};
use quill_store::{Database, Persistence, SnapshotRepo};

fn config() -> LoopConfig {
    LoopConfig {
        max_iterations: 20,
        turn_delay: Duration::ZERO,
    }
}

fn setup(responses: Vec<ScriptedResponse>) -> (Arc<ScriptedProvider>, ControlLoop) {
    let provider = Arc::new(ScriptedProvider::new(responses));
    let control = ControlLoop::new(
        provider.clone(),
        Arc::new(ActionDispatcher::with_builtins()),
        config(),
    );
    (provider, control)
}

fn texts(session: &Session, role: Role) -> Vec<String> {
    session
        .history()
        .get()
        .iter()
        .filter(|t| t.role == role)
        .map(|t| t.text())
        .collect()
}

#[tokio::test]
async fn action_free_reply_halts_after_one_call() {
    let (provider, control) = setup(vec![
        ScriptedResponse::text("Hello! Nothing to do here."),
        ScriptedResponse::text("<finish>never reached</finish>"),
    ]);
    let mut session = Session::new(1024);
    let outcome = control
        .start(&mut session, "hi", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(provider.call_count(), 1);
    assert_eq!(outcome.signal, Signal::Halt);
    assert_eq!(outcome.stop, StopReason::NaturalEnd);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(texts(&session, Role::Model), ["Hello! Nothing to do here."]);
    assert!(texts(&session, Role::System).is_empty());
}

#[tokio::test]
async fn empty_reply_after_error_forces_retry() {
    let (provider, control) = setup(vec![
        ScriptedResponse::text(r#"<read path="missing.txt"/>"#),
        ScriptedResponse::text("I give up."),
        ScriptedResponse::text(r#"<create path="missing.txt">now it exists</create>"#),
        ScriptedResponse::text("<finish>created</finish>"),
    ]);
    let mut session = Session::new(1024);
    let outcome = control
        .start(&mut session, "read the file", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(provider.call_count(), 4);
    assert_eq!(outcome.stop, StopReason::Completed);
    let system = texts(&session, Role::System);
    assert!(system[0].contains("[read missing.txt] error"));
    assert_eq!(system[1], RETRY_NOTICE);
    assert_eq!(session.store().read("missing.txt").unwrap().content, "now it exists");
}

#[tokio::test]
async fn retry_notice_is_not_repeated_without_new_errors() {
    let (provider, control) = setup(vec![
        ScriptedResponse::text(r#"<delete path=""/>"#),
        ScriptedResponse::text("hmm"),
        ScriptedResponse::text("still nothing"),
    ]);
    let mut session = Session::new(1024);
    let outcome = control
        .start(&mut session, "go", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(provider.call_count(), 3);
    assert_eq!(outcome.stop, StopReason::NaturalEnd);
}

#[tokio::test]
async fn failing_turn_cannot_terminate() {
    let (provider, control) = setup(vec![
        ScriptedResponse::text(
            "<edit path=\"nope.txt\">\n<<<<<<< SEARCH\na\n=======\nb\n>>>>>>> REPLACE\n</edit>\n<finish>all done</finish>",
        ),
        ScriptedResponse::text("<finish>really done</finish>"),
    ]);
    let mut session = Session::new(1024);
    let outcome = control
        .start(&mut session, "edit", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(provider.call_count(), 2);
    assert_eq!(outcome.stop, StopReason::Completed);
    assert_eq!(outcome.iterations, 2);

    let first_system = session
        .history()
        .get()
        .iter()
        .find(|t| t.role == Role::System)
        .unwrap();
    assert!(first_system.text().contains(COMPLETION_REJECTED));
    assert_eq!(first_system.meta["override"], COMPLETION_REJECTED);
    assert_eq!(first_system.meta["signal"], "continue");
}

#[tokio::test]
async fn question_defers_finish() {
    let (_, control) = setup(vec![ScriptedResponse::text(
        "<finish>done</finish><ask>Should I also update the docs?</ask>",
    )]);
    let mut session = Session::new(1024);
    let outcome = control
        .start(&mut session, "go", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.signal, Signal::Halt);
    assert_eq!(outcome.stop, StopReason::AwaitingInput);
    let last = session.history().last().unwrap();
    assert!(last.text().contains(FINISH_DEFERRED));
}

#[tokio::test]
async fn mutations_run_before_edits_within_a_turn() {
    let (_, control) = setup(vec![
        ScriptedResponse::text(
            r#"<finish>ok</finish>
<create path="src/lib.rs">
line one
line two
line three
</create>
<edit path="src/lib.rs" mode="replace" start="1" end="1">LINE ONE</edit>
<move from="src" to="pkg"/>"#,
        ),
        ScriptedResponse::text(
            r#"<edit path="pkg/lib.rs" mode="replace" start="1" end="1">LINE ONE</edit><finish>ok</finish>"#,
        ),
    ]);
    let mut session = Session::new(4096);
    let outcome = control
        .start(&mut session, "go", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.stop, StopReason::Completed);
    assert_eq!(outcome.iterations, 2);

    // The move ran before the edit, so the first edit missed its target and
    // the finish in the same turn was rejected.
    let system = texts(&session, Role::System).remove(0);
    assert!(system.contains("[create src/lib.rs] ok"));
    assert!(system.contains("[move src -> pkg] ok"));
    assert!(system.contains("[edit src/lib.rs] error"));
    assert!(system.contains(COMPLETION_REJECTED));
    assert_eq!(
        session.store().read("pkg/lib.rs").unwrap().content,
        "LINE ONE\nline two\nline three\n"
    );
}

#[tokio::test]
async fn descending_line_edits_apply_cleanly() {
    let (_, control) = setup(vec![ScriptedResponse::text(
        r#"<edit path="list.txt" mode="delete" start="1" end="1"></edit>
<edit path="list.txt" mode="delete" start="3" end="3"></edit>
<finish>trimmed</finish>"#,
    )]);
    let mut session = Session::new(1024);
    session.store_mut().write("list.txt", "a\nb\nc\nd\n").unwrap();
    let outcome = control
        .start(&mut session, "drop lines 1 and 3", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.stop, StopReason::Completed);
    assert_eq!(session.store().read("list.txt").unwrap().content, "b\nd\n");
}

#[tokio::test]
async fn quota_rejection_surfaces_as_action_error() {
    let (_, control) = setup(vec![
        ScriptedResponse::text(r#"<create path="a.txt">12345</create><create path="b.txt">123456</create>"#),
        ScriptedResponse::text("<finish>done</finish>"),
    ]);
    let mut session = Session::new(10);
    control
        .start(&mut session, "go", &CancellationToken::new())
        .await
        .unwrap();
    let system = texts(&session, Role::System).remove(0);
    assert!(system.contains("[create b.txt] error"));
    assert!(system.contains("quota"));
    assert_eq!(session.store().read("a.txt").unwrap().content, "12345");
    assert!(!session.store().exists("b.txt"));
}

#[tokio::test]
async fn cancellation_drops_partial_model_turn() {
    let (_, control) = setup(vec![ScriptedResponse::Stall(vec!["<create path=\"x\">partial".into()])]);
    let control = Arc::new(control);
    let mut events = control.subscribe();
    let cancel = CancellationToken::new();

    let task = {
        let control = control.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut session = Session::new(1024);
            let outcome = control.start(&mut session, "go", &cancel).await;
            (outcome, session)
        })
    };

    loop {
        if let LoopEvent::Chunk { delta, .. } = events.recv().await.unwrap() {
            assert!(delta.contains("partial"));
            break;
        }
    }
    cancel.cancel();

    let (outcome, session) = task.await.unwrap();
    let outcome = outcome.unwrap();
    assert_eq!(outcome.stop, StopReason::Cancelled);
    assert_eq!(session.history().len(), 1, "only the user prompt is recorded");
    assert!(session.store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_turn_delay() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedResponse::text("<report>working</report>"),
        ScriptedResponse::text("<finish>done</finish>"),
    ]));
    let control = Arc::new(ControlLoop::new(
        provider.clone(),
        Arc::new(ActionDispatcher::with_builtins()),
        LoopConfig {
            max_iterations: 20,
            turn_delay: Duration::from_secs(30),
        },
    ));
    let mut events = control.subscribe();
    let cancel = CancellationToken::new();
    let task = {
        let control = control.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut session = Session::new(1024);
            control.start(&mut session, "go", &cancel).await
        })
    };

    loop {
        if let LoopEvent::TurnComplete { signal, .. } = events.recv().await.unwrap() {
            assert_eq!(signal, Signal::Continue);
            break;
        }
    }
    cancel.cancel();
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.stop, StopReason::Cancelled);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn events_follow_turn_order() {
    let (_, control) = setup(vec![ScriptedResponse::chunks([
        "<read path=",
        "\"a.txt\"/>",
        "<finish>ok</finish>",
    ])]);
    let mut rx = control.subscribe();
    let mut session = Session::new(1024);
    session.store_mut().write("a.txt", "content").unwrap();
    control
        .start(&mut session, "go", &CancellationToken::new())
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.session_id(), session.id());
        kinds.push(match event {
            LoopEvent::IterationStart { .. } => "start",
            LoopEvent::Chunk { .. } => "chunk",
            LoopEvent::ModelTurn { .. } => "model",
            LoopEvent::ActionExecuted { .. } => "action",
            LoopEvent::TurnComplete { .. } => "complete",
            LoopEvent::Stopped { .. } => "stopped",
        });
    }
    assert_eq!(
        kinds,
        ["start", "chunk", "chunk", "chunk", "model", "action", "action", "complete", "stopped"]
    );
}

#[tokio::test]
async fn turns_are_saved_and_restored() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SnapshotRepo::new(Database::in_memory().unwrap()));
    let (_, control) = setup(vec![ScriptedResponse::text(
        r#"<create path="notes/todo.md">- ship it</create><finish>saved</finish>"#,
    )]);

    let mut session = Session::open(1024, persistence.clone()).unwrap();
    control
        .start(&mut session, "write a todo", &CancellationToken::new())
        .await
        .unwrap();
    assert!(!session.is_dirty());

    let restored = Session::open(1024, persistence).unwrap();
    assert_eq!(restored.store().read("notes/todo.md").unwrap().content, "- ship it");
    assert_eq!(restored.history().len(), 3);
}
