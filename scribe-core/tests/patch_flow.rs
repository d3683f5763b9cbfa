//! Proposal synthesis and application against an open document.

mod common;

use common::{repo, FakeModel, FakeRepo};
use scribe_core::document::DocumentSession;
use scribe_core::llm::PromptMessage;
use scribe_core::patch::{apply_patch, propose, PatchProposal};
use scribe_core::remote::EntryKind;
use scribe_core::tree::TreeNode;
use scribe_core::{DocumentError, LlmError, PatchError};

fn node(path: &str) -> TreeNode {
    TreeNode {
        name: path.to_owned(),
        path: path.to_owned(),
        kind: EntryKind::File,
        revision: String::new(),
        size: None,
        children: None,
    }
}

#[test]
fn identical_find_and_replace_is_noop() {
    let doc = "Title\n\nBody.";
    assert_eq!(apply_patch(doc, &PatchProposal::new("Body.", "Body.")), Err(PatchError::NoOp));
}

#[test]
fn absent_text_is_not_found() {
    assert_eq!(
        apply_patch("hello world", &PatchProposal::new("goodbye", "hi")),
        Err(PatchError::NotFound)
    );
}

#[test]
fn matching_is_exact_not_normalised() {
    let doc = "Line one.\nLine two.";
    assert_eq!(
        apply_patch(doc, &PatchProposal::new("line one.", "x")),
        Err(PatchError::NotFound)
    );
    assert_eq!(
        apply_patch(doc, &PatchProposal::new("Line one. Line two.", "x")),
        Err(PatchError::NotFound)
    );
}

#[tokio::test]
async fn end_to_end_proposal_is_applied_and_document_dirty() {
    let remote = FakeRepo::new().with_file("post.md", "Title\n\nOld para.");
    let model = FakeModel::new()
        .complete_reply(Ok(Some(r#"{"findText":"Old para.","replaceText":"New para."}"#.into())));
    let mut session = DocumentSession::new();
    session.reset(repo());
    session.select(&remote, &node("post.md")).await.unwrap();

    let history = [
        PromptMessage::user("rewrite the paragraph"),
        PromptMessage::assistant("Try: New para."),
    ];
    let text = session.current().unwrap().text().to_owned();
    let proposal = propose(&model, &history, &text).await.unwrap().unwrap();
    let applied = session.replace_with_patch(&proposal).unwrap();

    assert_eq!(applied.extra_matches, 0);
    let doc = session.current().unwrap();
    assert_eq!(doc.text(), "Title\n\nNew para.");
    assert!(doc.is_dirty());

    // The request carried the document and the conversation.
    let prompt = model.last_prompt().unwrap();
    assert!(prompt.messages[0].content.contains("Title\n\nOld para."));
    assert_eq!(prompt.messages[1], history[0]);
    assert_eq!(prompt.messages[2], history[1]);
}

#[tokio::test]
async fn malformed_or_null_model_output_means_no_proposal() {
    for raw in [None, Some("null"), Some("{\"findText\": "), Some("{}"), Some("I could not find it")] {
        let model = FakeModel::new().complete_reply(Ok(raw.map(str::to_owned)));
        assert_eq!(propose(&model, &[], "doc").await, Ok(None), "{raw:?}");
    }
}

#[tokio::test]
async fn transport_failure_is_surfaced() {
    let model = FakeModel::new().complete_reply(Err(LlmError::transport(Some(429), "rate limited")));
    assert_eq!(
        propose(&model, &[], "doc").await,
        Err(LlmError::transport(Some(429), "rate limited"))
    );
}

#[tokio::test]
async fn patch_is_applied_to_the_live_text_at_apply_time() {
    let remote = FakeRepo::new().with_file("a.md", "alpha beta");
    let mut session = DocumentSession::new();
    session.reset(repo());
    session.select(&remote, &node("a.md")).await.unwrap();
    let proposal = PatchProposal::new("beta", "gamma");

    // The user edits after the proposal was made; the span is gone.
    session.edit("alpha delta");
    assert_eq!(
        session.replace_with_patch(&proposal),
        Err(DocumentError::Patch(PatchError::NotFound))
    );
    assert_eq!(session.current().unwrap().text(), "alpha delta");
}

#[test]
fn patch_without_open_document_is_refused() {
    let mut session = DocumentSession::new();
    assert_eq!(
        session.replace_with_patch(&PatchProposal::new("a", "b")),
        Err(DocumentError::NoDocument)
    );
}
