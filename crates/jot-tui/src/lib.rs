//! jot-tui: Terminal UI components for the journal assistant
//!
//! Widgets built on ratatui and crossterm, plus the rich content renderer
//! used for assistant replies (markdown, math, code and diagrams).

pub mod input;
pub mod render;
pub mod theme;
pub mod widgets;

pub use render::MarkdownRenderer;
pub use theme::Theme;
