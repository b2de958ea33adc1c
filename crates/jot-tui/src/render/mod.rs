//! Rich content rendering: markdown, math, code and diagrams

pub mod diagram;
pub mod highlight;
pub mod markdown;
pub mod math;

pub use diagram::{DiagramCache, DiagramKey};
pub use markdown::MarkdownRenderer;
