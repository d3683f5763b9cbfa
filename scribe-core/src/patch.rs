//! Exact-match patches: asking the model for one, previewing and applying it.
//!
//! A proposal is a verbatim `{findText, replaceText}` pair. Application is a
//! single first-occurrence substring replace; nothing is normalised and no
//! pattern syntax is interpreted.

use serde::Deserialize;
use similar::TextDiff;

use crate::error::{LlmError, PatchError};
use crate::llm::{LanguageModel, Prompt, PromptMessage, ResponseShape};

/// One contiguous replacement suggested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PatchProposal {
    #[serde(rename = "findText", alias = "oldContent", alias = "find_text")]
    pub find_text: String,
    #[serde(rename = "replaceText", alias = "newContent", alias = "replace_text", default)]
    pub replace_text: String,
}

impl PatchProposal {
    pub fn new(find_text: impl Into<String>, replace_text: impl Into<String>) -> Self {
        Self { find_text: find_text.into(), replace_text: replace_text.into() }
    }
}

/// The document after a successful application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPatch {
    pub text: String,
    /// Further occurrences of the find text that were left untouched.
    pub extra_matches: usize,
}

/// Replaces the first occurrence of `proposal.find_text` in `document`.
///
/// An empty find text never matches. A patch whose result equals the input
/// is rejected as [`PatchError::NoOp`].
pub fn apply_patch(document: &str, proposal: &PatchProposal) -> Result<AppliedPatch, PatchError> {
    let find = proposal.find_text.as_str();
    if find.is_empty() {
        return Err(PatchError::NotFound);
    }
    let start = document.find(find).ok_or(PatchError::NotFound)?;
    let end = start + find.len();

    let mut text = String::with_capacity(document.len() - find.len() + proposal.replace_text.len());
    text.push_str(&document[..start]);
    text.push_str(&proposal.replace_text);
    text.push_str(&document[end..]);

    if text == document {
        return Err(PatchError::NoOp);
    }
    let extra_matches = document[end..].matches(find).count();
    Ok(AppliedPatch { text, extra_matches })
}

/// Unified diff of what `proposal` would do to `document`.
pub fn preview_patch(document: &str, proposal: &PatchProposal) -> Result<String, PatchError> {
    let applied = apply_patch(document, proposal)?;
    let diff = TextDiff::from_lines(document, applied.text.as_str());
    Ok(diff.unified_diff().context_radius(2).header("current", "proposed").to_string())
}

/// Instruction sent with every patch request.
pub const PATCH_INSTRUCTIONS: &str = "You turn the assistant's last suggestion into one exact edit of the document below. \
Identify a single contiguous span of the document that the suggestion changes. \
Respond with a JSON object with exactly two string fields: \"findText\", copied verbatim from the document \
(same whitespace, same line breaks), and \"replaceText\", the text that should take its place. \
If no single span can be identified, respond with null.";

pub fn patch_shape() -> ResponseShape {
    ResponseShape { fields: vec!["findText", "replaceText"] }
}

/// Builds the structured patch request from the conversation and document.
pub fn patch_prompt(history: &[PromptMessage], document: &str) -> Prompt {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(format!(
        "{PATCH_INSTRUCTIONS}\n\nDocument:\n```markdown\n{document}\n```"
    )));
    messages.extend(history.iter().cloned());
    messages.push(PromptMessage::user(
        "Produce the findText/replaceText pair for your last suggestion.",
    ));
    Prompt::new(messages)
}

/// Interprets raw model output as a proposal.
///
/// `null`, an empty object, malformed JSON and a missing or empty
/// `findText` all mean "no span identified" and yield `None`. A markdown
/// code fence around the JSON is tolerated.
pub fn parse_proposal(raw: &str) -> Option<PatchProposal> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() || body == "null" {
        tracing::info!("model declined to identify a section to patch");
        return None;
    }
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "model returned malformed patch output");
            return None;
        }
    };
    if value.is_null() {
        return None;
    }
    match serde_json::from_value::<PatchProposal>(value) {
        Ok(proposal) if !proposal.find_text.is_empty() => Some(proposal),
        Ok(_) => {
            tracing::warn!("model returned a patch with empty find text");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "model patch output is missing required fields");
            None
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Asks the model for a single patch against `document`.
///
/// Transport failures are errors; every other reason for not getting a
/// usable proposal is `Ok(None)`.
pub async fn propose(
    model: &dyn LanguageModel,
    history: &[PromptMessage],
    document: &str,
) -> Result<Option<PatchProposal>, LlmError> {
    let raw = model.complete(patch_prompt(history, document), &patch_shape()).await?;
    Ok(raw.as_deref().and_then(parse_proposal))
}
