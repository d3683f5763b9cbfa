//! Builds the prompt payload for a chat turn from the open document and the
//! pinned reference documents.

use crate::llm::{Prompt, PromptMessage};
use crate::locator::RepoRef;
use crate::remote::RepoReader;

pub const SYSTEM_PREAMBLE: &str = "You are a helpful AI assistant helping to edit markdown files. \
Provide clear, concise suggestions and improvements.";

/// Appended to a file whose content was cut to fit the budget.
pub const TRUNCATION_MARKER: &str = "\n[... truncated ...]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRole {
    /// The document being edited.
    Active,
    /// A pinned document included for reference.
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    pub name: String,
    pub path: String,
    pub content: String,
    pub role: ContextRole,
}

/// The live text of the open document, as it should be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDocument {
    pub path: String,
    pub name: String,
    pub content: String,
}

/// Collects the context files for one turn.
///
/// The active document comes first, then each pin in pin order. A pin equal
/// to the active document's path, or repeated, is skipped. Pins are fetched
/// now; a failed fetch is logged and that file is left out. Once the
/// accumulated content reaches `max_chars`, the file crossing the limit is
/// truncated and nothing further is fetched or added.
pub async fn assemble_context(
    reader: &dyn RepoReader,
    repo: &RepoRef,
    active: Option<&ActiveDocument>,
    pins: &[String],
    max_chars: usize,
) -> Vec<ContextFile> {
    let mut files: Vec<ContextFile> = Vec::new();
    let mut budget = Budget { remaining: max_chars };

    if let Some(doc) = active {
        let (content, full) = budget.take(&doc.content);
        files.push(ContextFile {
            name: doc.name.clone(),
            path: doc.path.clone(),
            content,
            role: ContextRole::Active,
        });
        if !full {
            return files;
        }
    }

    for path in pins {
        if budget.is_spent() {
            tracing::info!("context budget reached");
            break;
        }
        if files.iter().any(|f| &f.path == path) {
            continue;
        }
        let fetched = match reader.read(repo, path).await {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "skipping pinned context file");
                continue;
            }
        };
        let (content, full) = budget.take(&fetched.text);
        files.push(ContextFile {
            name: file_name(path).to_owned(),
            path: path.clone(),
            content,
            role: ContextRole::Reference,
        });
        if !full {
            tracing::info!(path = %path, "context budget reached");
            break;
        }
    }
    files
}

struct Budget {
    remaining: usize,
}

impl Budget {
    fn is_spent(&self) -> bool {
        self.remaining == 0
    }

    /// Takes as much of `text` as fits. The flag is `false` when the text
    /// had to be cut (the budget is then exhausted).
    fn take(&mut self, text: &str) -> (String, bool) {
        let chars = text.chars().count();
        if chars <= self.remaining {
            self.remaining -= chars;
            return (text.to_owned(), true);
        }
        let cut = text
            .char_indices()
            .nth(self.remaining)
            .map_or(text.len(), |(idx, _)| idx);
        self.remaining = 0;
        (format!("{}{TRUNCATION_MARKER}", &text[..cut]), false)
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Builds the streaming prompt: preamble, one system message per context
/// file, then the conversation history.
pub fn chat_prompt(files: &[ContextFile], history: &[PromptMessage]) -> Prompt {
    let mut messages = Vec::with_capacity(files.len() + history.len() + 1);
    messages.push(PromptMessage::system(SYSTEM_PREAMBLE));
    for file in files {
        let content = match file.role {
            ContextRole::Active => format!(
                "The user is currently editing a markdown file named \"{}\" ({}). Here is the current content of the file:\n\n{}",
                file.name, file.path, file.content
            ),
            ContextRole::Reference => format!(
                "Reference file \"{}\" ({}), included for context:\n\n{}",
                file.name, file.path, file.content
            ),
        };
        messages.push(PromptMessage::system(content));
    }
    messages.extend(history.iter().cloned());
    Prompt::new(messages)
}
