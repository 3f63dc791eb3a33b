//! Edit, analyze, suggest and accept against a mock assistant service.

use std::time::Duration;

use onpoint_engine::{
    AcceptOutcome, EditorSurface, MARKER_OWNER, RecordOutcome, SelectionAction,
};
use onpoint_types::{AnalysisKind, DocumentPath, FailureKind, Pipeline, Selection, SuggestionEdit};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{
    engine_for, fast_options, manual_options, mount_analysis, mount_check, mount_status,
    mount_suggestion, start_assistant_mock, wait_for_record,
};

const BROKEN: &str = "def greet(name)\n    print(name)\n";
const FIXED: &str = "def greet(name):\n    print(name)\n";

fn analysis_reply() -> String {
    format!(
        "Line 1 [Syntax]: Missing colon after the signature\n\
         Line 9 [Style]: Trailing blank line\n\
         ```python\n{FIXED}```\n"
    )
}

#[tokio::test]
async fn debounced_edit_projects_diagnostics_and_fix() {
    let server = start_assistant_mock().await;
    mount_analysis(&server, &analysis_reply()).await;
    let mut engine = engine_for(&server, fast_options());
    let doc = DocumentPath::new("app.py");

    engine.open_document(&doc, "");
    engine.on_content_change(&doc, "def greet(name)");
    engine.on_content_change(&doc, BROKEN);

    assert_eq!(
        wait_for_record(&mut engine, Pipeline::Analysis).await,
        RecordOutcome::Applied
    );
    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1, "the burst collapses into one request");
    let sent: serde_json::Value = requests[0].body_json().expect("json body");
    assert_eq!(sent["code"], BROKEN);
    assert_eq!(sent["language"], "python");

    let session = engine.session(&doc).expect("open");
    assert_eq!(session.diagnostics().len(), 2);
    assert_eq!(session.diagnostics()[0].label(), "[Syntax] Missing colon after the signature");
    assert_eq!(session.report().and_then(|r| r.fix()), Some(FIXED));

    let markers = engine.surface().markers(MARKER_OWNER);
    assert_eq!(markers.len(), 2);
    assert_eq!(markers[0].start_line, 1);
    assert_eq!(markers[1].start_line, 3, "past-the-end lines clamp to the last line");
}

#[tokio::test]
async fn document_fix_is_reviewed_then_applied() {
    let server = start_assistant_mock().await;
    mount_analysis(&server, &analysis_reply()).await;
    let mut engine = engine_for(&server, manual_options());
    let doc = DocumentPath::new("app.py");
    engine.open_document(&doc, BROKEN);

    assert!(engine.request_analysis(&doc, AnalysisKind::Analyze));
    assert_eq!(
        wait_for_record(&mut engine, Pipeline::Analysis).await,
        RecordOutcome::Applied
    );

    let id = engine.propose_document_fix(&doc).expect("report carries a fix");
    let pending = engine.session(&doc).and_then(|s| s.pending_suggestion()).expect("pending");
    let SuggestionEdit::ReplaceDocument { diff, .. } = pending.edit() else {
        panic!("expected a whole-document edit, got {:?}", pending.edit());
    };
    assert!(diff.contains("-def greet(name)\n"));
    assert!(diff.contains("+def greet(name):\n"));

    assert!(matches!(
        engine.accept_suggestion(&doc, id),
        AcceptOutcome::Applied { .. }
    ));
    assert_eq!(engine.surface().value(), FIXED);
    assert_eq!(engine.session(&doc).map(|s| s.content()), Some(FIXED));
    assert!(engine.session(&doc).is_some_and(|s| s.is_dirty()));
}

#[tokio::test]
async fn server_error_clears_diagnostics() {
    let server = start_assistant_mock().await;
    mount_check(&server, "Line 1 [Logic]: Off by one").await;
    let mut engine = engine_for(&server, manual_options());
    let doc = DocumentPath::new("loop.js");
    engine.open_document(&doc, "for (let i = 0; i <= n; i++) {}\n");

    engine.request_analysis(&doc, AnalysisKind::Check);
    assert_eq!(
        wait_for_record(&mut engine, Pipeline::Analysis).await,
        RecordOutcome::Applied
    );
    assert_eq!(engine.surface().markers(MARKER_OWNER).len(), 1);

    server.reset().await;
    mount_status(&server, "/check", 500).await;
    engine.on_content_change(&doc, "for (let i = 0; i < n; i++) {}\n");
    engine.request_analysis(&doc, AnalysisKind::Check);
    assert_eq!(
        wait_for_record(&mut engine, Pipeline::Analysis).await,
        RecordOutcome::Failed
    );

    let session = engine.session(&doc).expect("open");
    let error = session.analysis_error().expect("failure recorded");
    assert_eq!(error.kind(), FailureKind::Server { status: 500 });
    assert_eq!(error.user_message(), "Error checking code.");
    assert!(session.diagnostics().is_empty());
    assert!(engine.surface().markers(MARKER_OWNER).is_empty());
}

#[tokio::test]
async fn slow_response_for_old_content_is_dropped() {
    let server = start_assistant_mock().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(body_partial_json(serde_json::json!({"code": "x = 1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"analysis": "Line 1 [Old]: outdated"}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(body_partial_json(serde_json::json!({"code": "x = 2"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"analysis": "Line 1 [New]: current"})),
        )
        .mount(&server)
        .await;

    let mut engine = engine_for(&server, manual_options());
    let doc = DocumentPath::new("x.py");
    engine.open_document(&doc, "x = 1");
    engine.request_analysis(&doc, AnalysisKind::Analyze);
    engine.on_content_change(&doc, "x = 2");
    engine.request_analysis(&doc, AnalysisKind::Analyze);

    assert_eq!(
        wait_for_record(&mut engine, Pipeline::Analysis).await,
        RecordOutcome::Applied
    );
    assert_eq!(
        wait_for_record(&mut engine, Pipeline::Analysis).await,
        RecordOutcome::Stale
    );
    let session = engine.session(&doc).expect("open");
    assert_eq!(session.diagnostics().len(), 1);
    assert_eq!(session.diagnostics()[0].category(), "New");
}

#[tokio::test]
async fn completion_suggestion_is_appended_on_accept() {
    let server = start_assistant_mock().await;
    mount_suggestion(&server, "print(total)").await;
    let mut engine = engine_for(&server, manual_options());
    let doc = DocumentPath::new("sum.py");
    engine.open_document(&doc, "total = a + b");

    assert!(engine.request_suggestion(&doc));
    assert_eq!(
        wait_for_record(&mut engine, Pipeline::Suggestion).await,
        RecordOutcome::Applied
    );
    let id = engine
        .session(&doc)
        .and_then(|s| s.pending_suggestion())
        .map(|s| s.id())
        .expect("pending suggestion");

    assert!(matches!(
        engine.accept_suggestion(&doc, id),
        AcceptOutcome::Applied { .. }
    ));
    assert_eq!(engine.surface().value(), "total = a + b\nprint(total)");
    assert!(engine.session(&doc).is_some_and(|s| s.pending_suggestion().is_none()));
}

#[tokio::test]
async fn selection_fix_replaces_only_the_selection() {
    let server = start_assistant_mock().await;
    Mock::given(method("POST"))
        .and(path("/check"))
        .and(body_partial_json(serde_json::json!({"code": "retrun x\n"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "feedback": "Typo in keyword.\n```python\nreturn x\n```\n"
        })))
        .mount(&server)
        .await;
    let mut engine = engine_for(&server, manual_options());
    let doc = DocumentPath::new("f.py");
    let content = "def f(x):\n    retrun x\n";
    engine.open_document(&doc, content);

    let start = content.find("retrun").expect("present");
    engine
        .surface_mut()
        .select(Some(Selection::new(start, start + "retrun x\n".len())));
    assert!(engine.request_selection_action(&doc, SelectionAction::Fix));
    assert_eq!(
        wait_for_record(&mut engine, Pipeline::Suggestion).await,
        RecordOutcome::Applied
    );

    let id = engine
        .session(&doc)
        .and_then(|s| s.pending_suggestion())
        .map(|s| s.id())
        .expect("pending fix");
    assert!(matches!(
        engine.accept_suggestion(&doc, id),
        AcceptOutcome::Applied { .. }
    ));
    assert_eq!(engine.surface().value(), "def f(x):\n    return x\n");
}
