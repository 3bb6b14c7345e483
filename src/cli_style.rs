//! Terminal styling for the `scrobble-mirror` CLI.

use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;
use crossterm::style::{Attribute, Stylize};
use unicode_width::UnicodeWidthStr;

// ═══════════════════════════════════════════════════════════════════════════════
// Clap Styles
// ═══════════════════════════════════════════════════════════════════════════════

fn ansi(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(Color::Ansi(color)))
}

pub fn get_styles() -> Styles {
    Styles::styled()
        .usage(ansi(AnsiColor::Red).bold().underline())
        .header(ansi(AnsiColor::Red).bold().underline())
        .literal(ansi(AnsiColor::Green).bold())
        .invalid(ansi(AnsiColor::Yellow).bold())
        .error(ansi(AnsiColor::Red).bold())
        .placeholder(ansi(AnsiColor::BrightBlack))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Palette
// ═══════════════════════════════════════════════════════════════════════════════

/// Colors by role. Last.fm red is the accent.
pub mod palette {
    use crossterm::style::Color;

    const fn rgb(r: u8, g: u8, b: u8) -> Color {
        Color::Rgb { r, g, b }
    }

    pub const ACCENT: Color = rgb(213, 16, 7);
    pub const LABEL: Color = rgb(240, 120, 110);
    pub const OK: Color = rgb(0, 255, 136);
    pub const WARN: Color = rgb(255, 165, 0);
    pub const ERR: Color = rgb(255, 85, 85);
    pub const MUTED: Color = rgb(128, 128, 128);
    pub const TEXT: Color = rgb(255, 255, 255);
}

pub mod glyphs {
    pub const RULE: &str = "─";
    pub const ITEM: &str = "▶";
    pub const FIELD: &str = "●";
    pub const EMPTY: &str = "○";
    pub const OK: &str = "✓";
    pub const ERR: &str = "✗";
    pub const WARN: &str = "⚠";
    pub const BAR: &str = "█";
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status lines
// ═══════════════════════════════════════════════════════════════════════════════

pub fn print_success(message: &str) {
    println!(
        " {} {}",
        glyphs::OK.with(palette::OK).bold(),
        message.with(palette::OK)
    );
}

/// Written to stderr so it survives piping stdout.
pub fn print_error(message: &str) {
    eprintln!(
        " {} {}",
        glyphs::ERR.with(palette::ERR).bold(),
        message.with(palette::ERR)
    );
}

pub fn print_warning(message: &str) {
    println!(
        " {} {}",
        glyphs::WARN.with(palette::WARN).bold(),
        message.with(palette::WARN)
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════════════════════════

const SECTION_WIDTH: usize = 60;

/// Widest a ranking's play-count bar gets.
const BAR_WIDTH: usize = 20;

pub fn print_section_header(title: &str) {
    let trailing = SECTION_WIDTH.saturating_sub(title.width() + 4);
    println!();
    println!(
        "{} {} {}",
        glyphs::RULE.repeat(2).with(palette::ACCENT),
        title.with(palette::ACCENT).bold().attribute(Attribute::Italic),
        glyphs::RULE.repeat(trailing).with(palette::ACCENT)
    );
}

pub fn print_key_value(key: &str, value: &str) {
    println!(
        "  {} {} {}",
        glyphs::FIELD.with(palette::LABEL),
        format!("{}:", key).with(palette::MUTED),
        value.with(palette::TEXT)
    );
}

pub fn print_list_item(item: &str) {
    println!(
        "  {}  {}",
        glyphs::ITEM.with(palette::ACCENT),
        item.with(palette::TEXT)
    );
}

/// A ranked row followed by a bar scaled against the top entry.
pub fn print_ranked_item(line: &str, plays: i64, max_plays: i64) {
    println!(
        "  {}  {} {}",
        glyphs::ITEM.with(palette::ACCENT),
        line.with(palette::TEXT),
        plays_bar(plays, max_plays).with(palette::LABEL)
    );
}

pub fn print_empty_list(message: &str) {
    println!(
        "  {} {}",
        glyphs::EMPTY.with(palette::MUTED),
        message.with(palette::MUTED).attribute(Attribute::Italic)
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// Layout helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Pads `text` with spaces to `width` terminal columns.
pub fn pad_to_width(text: &str, width: usize) -> String {
    let padding = width.saturating_sub(text.width());
    format!("{}{}", text, " ".repeat(padding))
}

/// One line of a ranking, with labels aligned on their display width.
pub fn ranked_line(rank: usize, label: &str, label_width: usize, plays: i64) -> String {
    format!(
        "{:>2}. {}  {} plays",
        rank,
        pad_to_width(label, label_width),
        plays
    )
}

/// At least one block for any played entry.
pub fn plays_bar(plays: i64, max_plays: i64) -> String {
    if plays <= 0 || max_plays <= 0 {
        return String::new();
    }
    let blocks = (plays as f64 / max_plays as f64 * BAR_WIDTH as f64).round() as usize;
    glyphs::BAR.repeat(blocks.clamp(1, BAR_WIDTH))
}
