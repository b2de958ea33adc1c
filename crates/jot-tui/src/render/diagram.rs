//! Mermaid diagram blocks rendered as terminal text
//!
//! Only flowcharts and sequence diagrams are drawn; any other kind, or a
//! block that does not parse yet because more text is still streaming in,
//! is shown as its raw source.

use ratatui::{
    style::{Modifier, Style},
    text::{Line, Span},
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

use crate::theme::Theme;

static FLOW_EDGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<from>.+?)\s*(?P<arrow>-\.->|==>|-->|---|-\.-)\s*(?:\|(?P<label>[^|]*)\|)?\s*(?P<to>.+)$")
        .expect("valid regex")
});

static FLOW_NODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<id>[A-Za-z0-9_]+)\s*(?P<shape>[\[\(\{>].*[\]\)\}])?$").expect("valid regex")
});

static SEQ_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<from>[^\s\-:>]+)\s*(?P<arrow>-->>|->>|-->|->|--x|-x|--\)|-\))\s*(?P<to>[^:]+?)\s*:\s*(?P<text>.*)$")
        .expect("valid regex")
});

static SEQ_PARTICIPANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:participant|actor)\s+(?P<id>\S+)(?:\s+as\s+(?P<alias>.+))?$").expect("valid regex")
});

/// Stable identity of a diagram block across re-renders
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiagramKey {
    /// Owner of the block (usually a message id)
    pub scope: String,
    /// Position among the owner's diagram blocks
    pub ordinal: usize,
}

impl DiagramKey {
    pub fn new(scope: impl Into<String>, ordinal: usize) -> Self {
        Self {
            scope: scope.into(),
            ordinal,
        }
    }
}

/// Why a block could not be drawn
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagramError {
    #[error("empty diagram")]
    Empty,
    #[error("unsupported diagram type: {0}")]
    Unsupported(String),
    #[error("cannot parse line {line}: {text}")]
    Syntax { line: usize, text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkStyle {
    Arrow,
    Dotted,
    Thick,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Link {
    from: String,
    to: String,
    label: Option<String>,
    style: LinkStyle,
}

/// A parsed diagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagram {
    title: String,
    labels: HashMap<String, String>,
    order: Vec<String>,
    links: Vec<Link>,
}

impl Diagram {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            labels: HashMap::new(),
            order: Vec::new(),
            links: Vec::new(),
        }
    }

    fn declare(&mut self, id: &str, label: Option<String>) {
        if !self.order.iter().any(|n| n == id) {
            self.order.push(id.to_string());
        }
        if let Some(label) = label {
            self.labels.insert(id.to_string(), label);
        }
    }

    fn name<'a>(&'a self, id: &'a str) -> &'a str {
        self.labels.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Number of drawn connections
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Draw as styled lines
    pub fn to_lines(&self, theme: &Theme) -> Vec<Line<'static>> {
        let mut lines = vec![Line::from(Span::styled(
            format!("  ◇ {}", self.title),
            theme.dim_style().add_modifier(Modifier::ITALIC),
        ))];

        let node_style = theme.accent_style();
        let edge_style = theme.dim_style();
        for link in &self.links {
            let arrow = match link.style {
                LinkStyle::Arrow => "──▶",
                LinkStyle::Dotted => "┄┄▶",
                LinkStyle::Thick => "━━▶",
                LinkStyle::Open => "───",
            };
            let mut spans = vec![
                Span::raw("    "),
                Span::styled(self.name(&link.from).to_string(), node_style),
                Span::raw(" "),
            ];
            match &link.label {
                Some(label) if !label.is_empty() => {
                    spans.push(Span::styled(format!("─({})─{}", label, arrow), edge_style));
                }
                _ => spans.push(Span::styled(arrow.to_string(), edge_style)),
            }
            spans.push(Span::raw(" "));
            spans.push(Span::styled(self.name(&link.to).to_string(), node_style));
            lines.push(Line::from(spans));
        }

        for id in &self.order {
            let linked = self.links.iter().any(|l| &l.from == id || &l.to == id);
            if !linked {
                lines.push(Line::from(vec![
                    Span::raw("    ▢ "),
                    Span::styled(self.name(id).to_string(), node_style),
                ]));
            }
        }
        lines
    }
}

/// Parse mermaid source
pub fn parse_mermaid(source: &str) -> Result<Diagram, DiagramError> {
    let mut statements = source
        .lines()
        .enumerate()
        .map(|(n, l)| (n + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with("%%"));

    let Some((_, header)) = statements.next() else {
        return Err(DiagramError::Empty);
    };
    let kind = header.split_whitespace().next().unwrap_or_default();

    match kind {
        "graph" | "flowchart" => {
            let mut diagram = Diagram::new(header);
            for (line, text) in statements {
                parse_flow_statement(&mut diagram, line, text)?;
            }
            if diagram.order.is_empty() {
                return Err(DiagramError::Empty);
            }
            Ok(diagram)
        }
        "sequenceDiagram" => {
            let mut diagram = Diagram::new("sequence");
            for (line, text) in statements {
                parse_sequence_statement(&mut diagram, line, text)?;
            }
            if diagram.links.is_empty() {
                return Err(DiagramError::Empty);
            }
            Ok(diagram)
        }
        other => Err(DiagramError::Unsupported(other.to_string())),
    }
}

fn syntax(line: usize, text: &str) -> DiagramError {
    DiagramError::Syntax {
        line,
        text: text.to_string(),
    }
}

fn parse_flow_statement(diagram: &mut Diagram, line: usize, text: &str) -> Result<(), DiagramError> {
    let text = text.trim_end_matches(';').trim();
    let first = text.split_whitespace().next().unwrap_or_default();
    if matches!(
        first,
        "subgraph" | "end" | "direction" | "classDef" | "class" | "style" | "linkStyle" | "click"
    ) {
        return Ok(());
    }

    if !FLOW_EDGE.is_match(text) {
        let (id, label) = parse_node(text).ok_or_else(|| syntax(line, text))?;
        diagram.declare(&id, label);
        return Ok(());
    }

    let mut rest = text.to_string();
    let mut from: Option<String> = None;
    while let Some(caps) = FLOW_EDGE.captures(&rest) {
        let mut left = caps["from"].trim().to_string();
        let mut label = caps.name("label").map(|m| m.as_str().trim().to_string());
        // `A -- text --> B` form
        if label.is_none() {
            if let Some((node, text_label)) = left.split_once(" -- ") {
                label = Some(text_label.trim().to_string());
                left = node.trim().to_string();
            }
        }
        let style = match &caps["arrow"] {
            "-.->" | "-.-" => LinkStyle::Dotted,
            "==>" => LinkStyle::Thick,
            "---" => LinkStyle::Open,
            _ => LinkStyle::Arrow,
        };
        let to_text = caps["to"].trim().to_string();

        let from_id = match from.take() {
            Some(id) => id,
            None => {
                let (id, node_label) = parse_node(&left).ok_or_else(|| syntax(line, text))?;
                diagram.declare(&id, node_label);
                id
            }
        };

        // The right side may continue the chain
        let target = match FLOW_EDGE.captures(&to_text) {
            Some(next) => next["from"].trim().to_string(),
            None => to_text.clone(),
        };
        let (to_id, to_label) = parse_node(&target).ok_or_else(|| syntax(line, text))?;
        diagram.declare(&to_id, to_label);
        diagram.links.push(Link {
            from: from_id,
            to: to_id.clone(),
            label,
            style,
        });

        if FLOW_EDGE.is_match(&to_text) {
            from = Some(to_id);
            rest = to_text;
        } else {
            break;
        }
    }
    Ok(())
}

/// Split `id[label]` style node text
fn parse_node(text: &str) -> Option<(String, Option<String>)> {
    let caps = FLOW_NODE.captures(text.trim())?;
    let id = caps["id"].to_string();
    let label = caps.name("shape").map(|shape| {
        shape
            .as_str()
            .trim_matches(|c| matches!(c, '[' | ']' | '(' | ')' | '{' | '}' | '>' | '/' | '\\'))
            .trim_matches('"')
            .to_string()
    });
    Some((id, label))
}

fn parse_sequence_statement(
    diagram: &mut Diagram,
    line: usize,
    text: &str,
) -> Result<(), DiagramError> {
    let first = text.split_whitespace().next().unwrap_or_default();
    if matches!(
        first,
        "note" | "Note" | "loop" | "alt" | "else" | "opt" | "par" | "and" | "end" | "rect"
            | "activate" | "deactivate" | "autonumber" | "critical" | "break"
    ) {
        return Ok(());
    }

    if let Some(caps) = SEQ_PARTICIPANT.captures(text) {
        let alias = caps.name("alias").map(|m| m.as_str().trim().to_string());
        diagram.declare(&caps["id"], alias);
        return Ok(());
    }

    let caps = SEQ_MESSAGE.captures(text).ok_or_else(|| syntax(line, text))?;
    let from = caps["from"].to_string();
    let to = caps["to"].trim_start_matches(['+', '-']).to_string();
    diagram.declare(&from, None);
    diagram.declare(&to, None);
    let style = if caps["arrow"].starts_with("--") {
        LinkStyle::Dotted
    } else {
        LinkStyle::Arrow
    };
    diagram.links.push(Link {
        from,
        to,
        label: Some(caps["text"].trim().to_string()),
        style,
    });
    Ok(())
}

struct CachedDiagram {
    source: String,
    lines: Vec<Line<'static>>,
}

/// Rendered diagrams keyed by block identity
///
/// A block is redrawn only when its source differs from the last draw.
#[derive(Default)]
pub struct DiagramCache {
    entries: HashMap<DiagramKey, CachedDiagram>,
    renders: usize,
}

impl DiagramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines for a diagram block, drawing it only if the source changed
    pub fn render(&mut self, key: DiagramKey, source: &str, theme: &Theme) -> Vec<Line<'static>> {
        if let Some(entry) = self.entries.get(&key) {
            if entry.source == source {
                return entry.lines.clone();
            }
        }

        self.renders += 1;
        let lines = match parse_mermaid(source) {
            Ok(diagram) => diagram.to_lines(theme),
            Err(e) => {
                tracing::debug!(scope = %key.scope, ordinal = key.ordinal, "Diagram shown raw: {}", e);
                raw_lines(source, theme)
            }
        };
        self.entries.insert(
            key,
            CachedDiagram {
                source: source.to_string(),
                lines: lines.clone(),
            },
        );
        lines
    }

    /// How many times a diagram was actually drawn
    pub fn render_count(&self) -> usize {
        self.renders
    }

    /// Drop cached diagrams owned by `scope`
    pub fn forget_scope(&mut self, scope: &str) {
        self.entries.retain(|key, _| key.scope != scope);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn raw_lines(source: &str, theme: &Theme) -> Vec<Line<'static>> {
    let style = Style::default().fg(theme.code);
    let mut lines = vec![Line::from(Span::styled("  mermaid", theme.dim_style()))];
    lines.extend(
        source
            .lines()
            .map(|l| Line::from(Span::styled(format!("  {}", l), style))),
    );
    lines
}
