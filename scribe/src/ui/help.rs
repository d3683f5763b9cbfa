//! Help overlay: a centred modal drawn over the panels inside the same
//! `terminal.draw()` closure, with `Clear` erasing the background first.

use ratatui::{
    Frame,
    layout::Constraint,
    style::{Modifier, Style},
    text::{Line, Text},
    widgets::{Block, Clear, Paragraph, Wrap},
};

use crate::theme::Theme;

/// Draws the help text, scrolled by `help_scroll` rows. Skipped below 60
/// columns, where the modal would collapse to nothing.
pub fn render_help_overlay(frame: &mut Frame, theme: &Theme, help_scroll: u16) {
    if frame.area().width < 60 {
        return;
    }

    let overlay_area = frame
        .area()
        .centered(Constraint::Percentage(80), Constraint::Percentage(80));
    frame.render_widget(Clear, overlay_area);

    let block = Block::bordered()
        .title(" Help: j/k scroll, ? or Esc to dismiss ")
        .border_style(Style::default().fg(theme.border_active));

    frame.render_widget(
        Paragraph::new(build_help_text())
            .block(block)
            .style(Style::default().bg(theme.background))
            .wrap(Wrap { trim: false })
            .scroll((help_scroll, 0)),
        overlay_area,
    );
}

fn heading(text: &'static str) -> Line<'static> {
    Line::styled(text, Style::default().add_modifier(Modifier::BOLD))
}

fn build_help_text() -> Text<'static> {
    Text::from(vec![
        heading("Navigation"),
        Line::from("  j / k         Move down / up"),
        Line::from("  g / G         Jump to top / bottom"),
        Line::from("  Ctrl-d / u    Half page down / up"),
        Line::from("  Ctrl-f / b    Full page down / up"),
        Line::from("  Tab / H / L   Move panel focus"),
        Line::from("  < / >         Shrink / grow the document panel"),
        Line::from(""),
        heading("Repository"),
        Line::from("  o             Open a repository (owner/repo, URL, or SSH remote)"),
        Line::from("  Enter / l     Open a file, or open / close a directory"),
        Line::from("  h             Close a directory, or go to the parent"),
        Line::from("  p             Pin / unpin a file as chat context"),
        Line::from("  R             Reload the repository tree"),
        Line::from(""),
        heading("Document"),
        Line::from("  e             Edit in $VISUAL / $EDITOR"),
        Line::from("  s / Ctrl-s    Save to the repository"),
        Line::from("  Q             Quote the lines in view into a new message"),
        Line::from(""),
        heading("Assistant"),
        Line::from("  i             Type a message (Enter sends, Alt-Enter new line, Esc leaves)"),
        Line::from("  Esc           Stop the reply that is streaming"),
        Line::from("  a             Apply the last reply to the document as a patch"),
        Line::from("  y / n         Accept / discard the previewed patch"),
        Line::from("  C             Clear the conversation and pins"),
        Line::from(""),
        heading("General"),
        Line::from("  ?             Open / close this help"),
        Line::from("  q / Ctrl-c    Quit (asks first when there are unsaved changes)"),
    ])
}
