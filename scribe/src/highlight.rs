//! Syntax highlighting for the document panel and the patch preview.
//!
//! Documents are highlighted once per text change and cached as owned
//! `Line<'static>` values; the renderer only slices the visible window.

use std::sync::LazyLock;

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, ThemeSet};
use syntect::parsing::SyntaxSet;

use crate::theme::Theme;

static PS: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static TS: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

const SYNTAX_THEME: &str = "base16-ocean.dark";

/// Highlights markdown `text` line by line. Falls back to plain lines when
/// the bundled syntax or theme is unavailable.
pub fn highlight_markdown(text: &str) -> Vec<Line<'static>> {
    let syntax = PS
        .find_syntax_by_extension("md")
        .unwrap_or_else(|| PS.find_syntax_plain_text());
    let Some(theme) = TS.themes.get(SYNTAX_THEME) else {
        return text.lines().map(|l| Line::raw(l.to_owned())).collect();
    };
    let mut h = HighlightLines::new(syntax, theme);

    // `lines()` drops the trailing newline syntect's newline-aware syntaxes
    // expect, so split inclusively and trim per line.
    text.split_inclusive('\n')
        .map(|line| {
            let spans = match h.highlight_line(line, &PS) {
                Ok(ranges) => ranges
                    .into_iter()
                    .map(|(style, piece)| syntect_to_span(style, piece.trim_end_matches(['\n', '\r'])))
                    .filter(|span| !span.content.is_empty())
                    .collect(),
                Err(err) => {
                    tracing::debug!(error = %err, "highlighting failed for a line");
                    Vec::new()
                }
            };
            if spans.is_empty() {
                Line::raw(line.trim_end_matches(['\n', '\r']).to_owned())
            } else {
                Line::from(spans)
            }
        })
        .collect()
}

/// Converts a syntect style to a ratatui span. Backgrounds are dropped so the
/// panel keeps the terminal's own background.
fn syntect_to_span(style: syntect::highlighting::Style, content: &str) -> Span<'static> {
    let fg = style.foreground;
    let mut ratatui_style = Style::default();
    if fg.a > 0 {
        ratatui_style = ratatui_style.fg(Color::Rgb(fg.r, fg.g, fg.b));
    }
    if style.font_style.contains(FontStyle::BOLD) {
        ratatui_style = ratatui_style.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        ratatui_style = ratatui_style.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        ratatui_style = ratatui_style.add_modifier(Modifier::UNDERLINED);
    }
    Span::styled(content.to_owned(), ratatui_style)
}

/// Colours a unified diff: headers, hunk markers, additions, removals.
pub fn diff_lines(diff: &str, theme: &Theme) -> Vec<Line<'static>> {
    diff.lines()
        .map(|line| {
            let style = if line.starts_with("+++") || line.starts_with("---") {
                Style::default().add_modifier(Modifier::BOLD)
            } else if line.starts_with("@@") {
                Style::default().fg(theme.diff_hunk_header)
            } else if line.starts_with('+') {
                Style::default().fg(theme.diff_added)
            } else if line.starts_with('-') {
                Style::default().fg(theme.diff_removed)
            } else {
                Style::default().fg(theme.diff_context)
            };
            Line::styled(line.to_owned(), style)
        })
        .collect()
}
