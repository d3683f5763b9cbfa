//! Color theme system for scribe.
//!
//! A `Theme` holds named `ratatui::style::Color` fields covering every UI
//! surface. Two built-in themes are provided:
//!
//! - `dark`: ANSI 16 colors, works on any terminal including 256-color SSH
//!   sessions with no truecolor support.
//! - `catppuccin_mocha`: Catppuccin Mocha palette in RGB; requires truecolor.

use ratatui::style::Color;

#[derive(Debug, Clone)]
pub struct Theme {
    // Panel borders
    pub border_active: Color,
    pub border_inactive: Color,

    // Preview diff
    pub diff_added: Color,
    pub diff_removed: Color,
    pub diff_context: Color,
    pub diff_hunk_header: Color,

    // File tree
    pub tree_dir: Color,
    pub tree_file: Color,
    /// Marker next to a file that is pinned as chat context.
    pub tree_pinned: Color,
    /// "loading…" rows under a directory being fetched.
    pub tree_loading: Color,

    // Conversation
    pub chat_user: Color,
    pub chat_assistant: Color,
    pub chat_error: Color,

    // Status bar
    pub status_bar_bg: Color,
    pub status_bar_fg: Color,
    pub status_mode_normal: Color,
    pub status_mode_insert: Color,
    /// Unsaved-changes marker.
    pub status_dirty: Color,
    pub status_error: Color,

    pub background: Color,
}

impl Theme {
    /// The built-in dark theme using ANSI 16 colors. Used when no config is
    /// present or color capability is unknown.
    pub fn dark() -> Self {
        Self {
            border_active: Color::Cyan,
            border_inactive: Color::DarkGray,

            diff_added: Color::Green,
            diff_removed: Color::Red,
            diff_context: Color::Reset,
            diff_hunk_header: Color::Cyan,

            tree_dir: Color::Blue,
            tree_file: Color::Reset,
            tree_pinned: Color::Yellow,
            tree_loading: Color::DarkGray,

            chat_user: Color::Green,
            chat_assistant: Color::Cyan,
            chat_error: Color::Red,

            status_bar_bg: Color::DarkGray,
            status_bar_fg: Color::White,
            status_mode_normal: Color::Cyan,
            status_mode_insert: Color::Green,
            status_dirty: Color::Yellow,
            status_error: Color::LightRed,

            background: Color::Reset,
        }
    }

    /// The Catppuccin Mocha theme using RGB truecolor values.
    ///
    /// Palette source: <https://github.com/catppuccin/catppuccin> Mocha variant.
    pub fn catppuccin_mocha() -> Self {
        let green = Color::Rgb(166, 227, 161); // #a6e3a1
        let red = Color::Rgb(243, 139, 168); // #f38ba8
        let yellow = Color::Rgb(249, 226, 175); // #f9e2af
        let blue = Color::Rgb(137, 180, 250); // #89b4fa
        let teal = Color::Rgb(148, 226, 213); // #94e2d5
        let lavender = Color::Rgb(180, 190, 254); // #b4befe
        let mauve = Color::Rgb(203, 166, 247); // #cba6f7
        let overlay1 = Color::Rgb(127, 132, 156); // #7f849c
        let surface1 = Color::Rgb(69, 71, 90); // #45475a
        let base = Color::Rgb(30, 30, 46); // #1e1e2e
        let text = Color::Rgb(205, 214, 244); // #cdd6f4
        let peach = Color::Rgb(250, 179, 135); // #fab387

        Self {
            border_active: lavender,
            border_inactive: overlay1,

            diff_added: green,
            diff_removed: red,
            diff_context: text,
            diff_hunk_header: teal,

            tree_dir: blue,
            tree_file: text,
            tree_pinned: peach,
            tree_loading: overlay1,

            chat_user: green,
            chat_assistant: mauve,
            chat_error: red,

            status_bar_bg: surface1,
            status_bar_fg: text,
            status_mode_normal: lavender,
            status_mode_insert: green,
            status_dirty: yellow,
            status_error: red,

            background: base,
        }
    }

    /// Resolves a theme name from config. Unknown names fall back to `dark()`
    /// so a typo never prevents startup.
    pub fn from_name(name: &str) -> Self {
        match name {
            "catppuccin-mocha" | "catppuccin_mocha" => Self::catppuccin_mocha(),
            "dark" => Self::dark(),
            other => {
                tracing::warn!(theme = other, "unknown theme, falling back to 'dark'");
                Self::dark()
            }
        }
    }
}
