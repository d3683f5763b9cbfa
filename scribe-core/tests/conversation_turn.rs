//! The streaming-turn protocol of the conversation log.

mod common;

use std::sync::atomic::AtomicBool;

use common::{chunks, repo, FakeModel, FakeRepo};
use futures::stream;
use scribe_core::context::{assemble_context, chat_prompt, ActiveDocument};
use scribe_core::conversation::{drive_turn, ConversationLog, Role, TurnOutcome, TurnRejected};
use scribe_core::llm::{ChunkStream, LanguageModel, PromptRole};
use scribe_core::LlmError;

fn scripted(items: Vec<Result<String, LlmError>>) -> ChunkStream {
    Box::pin(stream::iter(items))
}

#[tokio::test]
async fn chunks_concatenate_in_order() {
    let mut log = ConversationLog::new();
    let ticket = log.begin_turn("say hello").unwrap();
    assert!(log.is_in_flight());

    let outcome = drive_turn(&mut log, &ticket, scripted(chunks(&["Hel", "lo"])), &AtomicBool::new(false)).await;

    assert_eq!(outcome, TurnOutcome::Completed);
    assert!(!log.is_in_flight());
    assert!(log.last_error().is_none());
    let messages = log.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].text, "say hello");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].text, "Hello");
    assert!(messages[0].id < messages[1].id);
}

#[test]
fn second_turn_while_in_flight_is_rejected_without_change() {
    let mut log = ConversationLog::new();
    log.begin_turn("first").unwrap();
    let snapshot = log.clone();

    assert_eq!(log.begin_turn("second"), Err(TurnRejected::InFlight));
    assert_eq!(log, snapshot);
}

#[test]
fn blank_message_is_rejected() {
    let mut log = ConversationLog::new();
    assert_eq!(log.begin_turn("   \n"), Err(TurnRejected::EmptyMessage));
    assert!(log.messages().is_empty());
}

#[tokio::test]
async fn error_keeps_partial_text_and_sets_last_error() {
    let mut log = ConversationLog::new();
    let ticket = log.begin_turn("go").unwrap();
    let items = vec![
        Ok("partial ".to_owned()),
        Err(LlmError::transport(Some(502), "bad gateway")),
        Ok("never seen".to_owned()),
    ];

    let outcome = drive_turn(&mut log, &ticket, scripted(items), &AtomicBool::new(false)).await;

    assert!(matches!(outcome, TurnOutcome::Failed(_)));
    assert!(!log.is_in_flight());
    assert_eq!(log.message(ticket.assistant_id).unwrap().text, "partial ");
    assert!(log.last_error().unwrap().contains("bad gateway"));

    // The next turn clears the error.
    log.begin_turn("again").unwrap();
    assert!(log.last_error().is_none());
}

#[tokio::test]
async fn stop_is_not_an_error() {
    let mut log = ConversationLog::new();
    let ticket = log.begin_turn("go").unwrap();

    let outcome = drive_turn(&mut log, &ticket, scripted(chunks(&["a", "b"])), &AtomicBool::new(true)).await;

    assert_eq!(outcome, TurnOutcome::Stopped);
    assert!(!log.is_in_flight());
    assert!(log.last_error().is_none());
    assert_eq!(log.message(ticket.assistant_id).unwrap().text, "");
}

#[test]
fn stale_chunks_are_ignored() {
    let mut log = ConversationLog::new();
    let ticket = log.begin_turn("go").unwrap();
    assert!(log.append_chunk(ticket.assistant_id, "x"));
    assert!(!log.append_chunk(ticket.assistant_id + 7, "y"));

    log.clear();
    assert!(!log.is_in_flight());
    assert!(!log.append_chunk(ticket.assistant_id, "late"));
    assert!(!log.finish_turn(ticket.assistant_id, TurnOutcome::Completed));
    assert!(log.messages().is_empty());
}

#[test]
fn history_excludes_the_empty_placeholder() {
    let mut log = ConversationLog::new();
    let ticket = log.begin_turn("question").unwrap();
    assert_eq!(ticket.history.len(), 1);
    assert_eq!(ticket.history[0].role, PromptRole::User);
    assert_eq!(ticket.history[0].content, "question");
}

#[test]
fn clear_empties_messages_error_and_pins() {
    let mut log = ConversationLog::new();
    let ticket = log.begin_turn("go").unwrap();
    log.finish_turn(ticket.assistant_id, TurnOutcome::Failed("boom".into()));
    log.pin("ref.md");

    log.clear();
    assert!(log.messages().is_empty());
    assert!(log.last_error().is_none());
    assert!(log.pins().is_empty());
}

#[test]
fn pins_keep_order_and_toggle() {
    let mut log = ConversationLog::new();
    assert!(log.pin("b.md"));
    assert!(log.pin("a.md"));
    assert!(!log.pin("b.md"));
    assert_eq!(log.pins(), ["b.md", "a.md"]);

    assert!(!log.toggle_pin("b.md"));
    assert!(log.toggle_pin("c.md"));
    assert_eq!(log.pins(), ["a.md", "c.md"]);
}

#[test]
fn restore_continues_ids() {
    let mut first = ConversationLog::new();
    let ticket = first.begin_turn("hi").unwrap();
    first.append_chunk(ticket.assistant_id, "hello");
    first.finish_turn(ticket.assistant_id, TurnOutcome::Completed);

    let mut restored = ConversationLog::new();
    restored.restore(first.messages().to_vec(), vec!["p.md".into()]);
    let next = restored.begin_turn("more").unwrap();
    assert!(next.assistant_id > ticket.assistant_id);
    assert_eq!(next.history.len(), 3);
    assert_eq!(restored.last_assistant_reply().unwrap().text, "hello");
    assert_eq!(restored.pins(), ["p.md"]);
}

#[tokio::test]
async fn full_turn_through_context_and_model() {
    let remote = FakeRepo::new().with_file("ref.md", "reference body");
    let model = FakeModel::new().stream_reply(chunks(&["Sure", ", done."]));
    let mut log = ConversationLog::new();
    log.pin("ref.md");

    let ticket = log.begin_turn("tighten the intro").unwrap();
    let active = ActiveDocument { path: "intro.md".into(), name: "intro.md".into(), content: "live text".into() };
    let files = assemble_context(&remote, &repo(), Some(&active), log.pins(), 10_000).await;
    let stream = model.stream(chat_prompt(&files, &ticket.history)).await.unwrap();
    drive_turn(&mut log, &ticket, stream, &AtomicBool::new(false)).await;

    assert_eq!(log.last_assistant_reply().unwrap().text, "Sure, done.");
    let prompt = model.last_prompt().unwrap();
    assert_eq!(prompt.messages.len(), 4);
    assert!(prompt.messages[1].content.ends_with("live text"));
    assert!(prompt.messages[2].content.ends_with("reference body"));
    assert_eq!(prompt.messages[3].content, "tighten the intro");
}
