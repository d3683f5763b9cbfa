//! Load, edit, save and save-before-switch through an in-memory remote.

mod common;

use std::sync::Arc;

use common::{repo, FakeRepo};
use scribe_core::document::{DocumentPhase, DocumentSession, SaveOutcome, SelectPlan};
use scribe_core::remote::{decode_text, encode_text, EntryKind};
use scribe_core::tree::TreeNode;
use scribe_core::{DocumentError, RemoteError};

fn file(path: &str) -> TreeNode {
    TreeNode {
        name: path.rsplit('/').next().unwrap().to_owned(),
        path: path.to_owned(),
        kind: EntryKind::File,
        revision: String::new(),
        size: None,
        children: None,
    }
}

fn session() -> DocumentSession {
    let mut session = DocumentSession::new();
    session.reset(repo());
    session
}

#[test]
fn encoding_round_trips_unicode() {
    for text in ["plain", "emoji 🦀🚀 and 👩‍👩‍👧", "e\u{301}\u{302} combining", "", "line\r\nbreaks\n"] {
        assert_eq!(decode_text("x.md", &encode_text(text)).unwrap(), text);
    }
}

#[test]
fn wrapped_base64_decodes_and_garbage_is_a_decode_error() {
    let encoded = encode_text("a fairly long line of markdown text that wraps");
    let wrapped = format!("{}\n{}\n", &encoded[..20], &encoded[20..]);
    assert_eq!(
        decode_text("x.md", &wrapped).unwrap(),
        "a fairly long line of markdown text that wraps"
    );
    assert!(matches!(decode_text("x.md", "***"), Err(RemoteError::Decode { .. })));
    // Valid base64 of bytes that are not UTF-8.
    assert!(matches!(decode_text("x.md", "/w=="), Err(RemoteError::Decode { .. })));
}

#[tokio::test]
async fn select_loads_unicode_content_clean() {
    let remote = FakeRepo::new().with_file("docs/intro.md", "# Café 🦀\n\ne\u{301}");
    let mut session = session();

    let report = session.select(&remote, &file("docs/intro.md")).await.unwrap();
    assert!(report.switched);
    assert!(report.load_error.is_none());

    let doc = session.current().unwrap();
    assert_eq!(doc.text(), "# Café 🦀\n\ne\u{301}");
    assert_eq!(doc.original(), doc.text());
    assert!(!doc.is_dirty());
    assert_eq!(doc.revision(), remote.revision("docs/intro.md").as_deref());
    assert_eq!(session.phase(), DocumentPhase::Ready);
}

#[tokio::test]
async fn reselecting_clean_current_file_is_a_noop() {
    let remote = FakeRepo::new().with_file("a.md", "a");
    let mut session = session();
    session.select(&remote, &file("a.md")).await.unwrap();

    let report = session.select(&remote, &file("a.md")).await.unwrap();
    assert!(!report.switched);
    assert_eq!(remote.calls(), ["read a.md"]);
}

#[tokio::test]
async fn edit_tracks_dirty_by_value() {
    let remote = FakeRepo::new().with_file("a.md", "same");
    let mut session = session();
    session.select(&remote, &file("a.md")).await.unwrap();

    assert!(session.edit("changed"));
    assert!(session.is_dirty());
    assert!(session.edit("same"));
    assert!(!session.is_dirty());
}

#[tokio::test]
async fn save_writes_and_installs_new_revision() {
    let remote = FakeRepo::new().with_file("a.md", "before");
    let mut session = session();
    session.select(&remote, &file("a.md")).await.unwrap();

    assert_eq!(session.save(&remote).await.unwrap(), SaveOutcome::Clean);

    session.edit("after 🎉");
    let outcome = session.save(&remote).await.unwrap();
    let revision = remote.revision("a.md").unwrap();
    assert_eq!(outcome, SaveOutcome::Saved { revision: revision.clone() });

    let doc = session.current().unwrap();
    assert!(!doc.is_dirty());
    assert_eq!(doc.original(), "after 🎉");
    assert_eq!(doc.revision(), Some(revision.as_str()));
    assert!(doc.last_saved_at().is_some());
    assert_eq!(remote.text("a.md").as_deref(), Some("after 🎉"));

    // The stored revision is the precondition of the next save.
    session.edit("third");
    session.save(&remote).await.unwrap();
    assert_eq!(remote.text("a.md").as_deref(), Some("third"));
}

#[tokio::test]
async fn conflicting_save_keeps_document_dirty() {
    let remote = FakeRepo::new().with_file("a.md", "base");
    let mut session = session();
    session.select(&remote, &file("a.md")).await.unwrap();

    remote.put("a.md", "someone else");
    session.edit("mine");
    let err = session.save(&remote).await.unwrap_err();

    assert_eq!(err, DocumentError::Remote(RemoteError::Conflict { path: "a.md".into() }));
    let doc = session.current().unwrap();
    assert!(doc.is_dirty());
    assert_eq!(doc.text(), "mine");
    assert_eq!(doc.original(), "base");
    assert_eq!(remote.text("a.md").as_deref(), Some("someone else"));
    assert_eq!(session.phase(), DocumentPhase::Ready);
}

#[tokio::test]
async fn switching_saves_dirty_document_before_loading() {
    let remote = FakeRepo::new().with_file("a.md", "a").with_file("b.md", "b");
    let mut session = session();
    session.select(&remote, &file("a.md")).await.unwrap();
    session.edit("a edited");

    let report = session.select(&remote, &file("b.md")).await.unwrap();
    assert!(report.save_error.is_none());
    assert_eq!(remote.calls(), ["read a.md", "write a.md", "read b.md"]);
    assert_eq!(remote.text("a.md").as_deref(), Some("a edited"));
    assert_eq!(session.current().unwrap().text(), "b");
}

#[tokio::test]
async fn failed_save_before_switch_is_reported_and_load_proceeds() {
    let remote = FakeRepo::new().with_file("a.md", "a").with_file("b.md", "b");
    let mut session = session();
    session.select(&remote, &file("a.md")).await.unwrap();
    session.edit("a edited");
    remote.put("a.md", "remote edit");

    let report = session.select(&remote, &file("b.md")).await.unwrap();
    assert_eq!(report.save_error, Some(RemoteError::Conflict { path: "a.md".into() }));
    assert_eq!(session.current().unwrap().path, "b.md");
    assert_eq!(session.current().unwrap().text(), "b");
}

#[tokio::test]
async fn failed_load_shows_empty_read_only_document() {
    let remote = FakeRepo::new().with_file("a.md", "a");
    remote.fail("a.md");
    let mut session = session();

    let report = session.select(&remote, &file("a.md")).await.unwrap();
    assert!(report.load_error.is_some());
    let doc = session.current().unwrap();
    assert_eq!(doc.text(), "");
    assert!(!doc.is_loaded());
    assert!(!session.edit("typed"));
    assert_eq!(session.save(&remote).await.unwrap(), SaveOutcome::Clean);

    // Selecting it again retries the load.
    remote.heal("a.md");
    let report = session.select(&remote, &file("a.md")).await.unwrap();
    assert!(report.switched);
    assert_eq!(session.current().unwrap().text(), "a");
}

#[tokio::test]
async fn concurrent_operations_are_refused_while_loading() {
    let remote = Arc::new(FakeRepo::new().with_file("a.md", "a").with_file("b.md", "b"));
    let mut session = session();

    let SelectPlan::Switch(request) = session.begin_select(&file("a.md")).unwrap() else {
        panic!("expected a switch");
    };
    assert_eq!(session.phase(), DocumentPhase::Loading);
    assert_eq!(session.begin_select(&file("b.md")), Err(DocumentError::Busy));
    assert_eq!(session.begin_save(), Err(DocumentError::Busy));
    assert!(!session.edit("nope"));

    let result = DocumentSession::execute_switch(remote.as_ref(), request).await;
    session.finish_select(result);
    assert_eq!(session.phase(), DocumentPhase::Ready);
    assert_eq!(session.current().unwrap().text(), "a");
}

#[tokio::test]
async fn directories_are_not_opened() {
    let mut session = session();
    let dir = TreeNode { kind: EntryKind::Directory, ..file("docs") };
    assert_eq!(session.begin_select(&dir), Ok(SelectPlan::Unchanged));
    assert_eq!(session.phase(), DocumentPhase::Idle);
}

#[tokio::test]
async fn commit_message_uses_template() {
    let remote = FakeRepo::new().with_file("docs/a.md", "a");
    let mut session = DocumentSession::new().with_commit_template("docs: edit {path}");
    session.reset(repo());
    session.select(&remote, &file("docs/a.md")).await.unwrap();
    session.edit("b");

    let request = session.begin_save().unwrap().unwrap();
    assert_eq!(request.message, "docs: edit docs/a.md");
    assert_eq!(request.expected_revision, remote.revision("docs/a.md").unwrap());
}
