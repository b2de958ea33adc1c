//! Math span protection and LaTeX-to-Unicode rendering
//!
//! Markdown parsing mangles TeX (`_` and `*` become emphasis, `\\` escapes
//! vanish), so math spans are swapped for placeholder tokens before parsing
//! and swapped back afterwards. Four delimiter styles are recognised:
//! `$$..$$` and `\[..\]` (display), `$..$` and `\(..\)` (inline).

use thiserror::Error;

const INLINE_OPEN: char = '\u{E000}';
const INLINE_CLOSE: char = '\u{E001}';
const DISPLAY_OPEN: char = '\u{E002}';
const DISPLAY_CLOSE: char = '\u{E003}';

/// A protected math expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSpan {
    /// TeX source without delimiters
    pub source: String,
    /// Block (display) rather than inline
    pub display: bool,
}

/// Text with math spans replaced by placeholders
#[derive(Debug, Clone, Default)]
pub struct Protected {
    text: String,
    spans: Vec<MathSpan>,
}

/// A piece of protected text, split at placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Math(&'a MathSpan),
}

impl Protected {
    /// Placeholder-bearing text to hand to the markdown parser
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn spans(&self) -> &[MathSpan] {
        &self.spans
    }

    /// Put the math back using `$..$` and `$$..$$`
    ///
    /// Inline spans get a space on any side that would otherwise touch a
    /// word character.
    pub fn restore(&self) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut pending_space = false;

        for segment in self.split(&self.text) {
            match segment {
                Segment::Text(text) => {
                    if pending_space && text.chars().next().is_some_and(is_word_char) {
                        out.push(' ');
                    }
                    pending_space = false;
                    out.push_str(text);
                }
                Segment::Math(span) if span.display => {
                    out.push_str("$$");
                    out.push_str(&span.source);
                    out.push_str("$$");
                    pending_space = false;
                }
                Segment::Math(span) => {
                    if out.chars().next_back().is_some_and(is_word_char) {
                        out.push(' ');
                    }
                    out.push('$');
                    out.push_str(&span.source);
                    out.push('$');
                    pending_space = true;
                }
            }
        }
        out
    }

    /// Split a string produced from [`Protected::text`] into text and math
    ///
    /// Markdown parsing hands back fragments of the protected text; any
    /// placeholder inside them resolves against this span table.
    pub fn split<'a>(&'a self, text: &'a str) -> Vec<Segment<'a>> {
        let mut segments = Vec::new();
        let mut rest = text;

        while let Some(start) = rest.find([INLINE_OPEN, DISPLAY_OPEN]) {
            let (before, tail) = rest.split_at(start);
            let open = tail.chars().next().unwrap_or(INLINE_OPEN);
            let close = if open == DISPLAY_OPEN {
                DISPLAY_CLOSE
            } else {
                INLINE_CLOSE
            };
            let body = &tail[open.len_utf8()..];
            let parsed = body.find(close).and_then(|end| {
                let index: usize = body[..end].parse().ok()?;
                let span = self.spans.get(index)?;
                Some((span, &body[end + close.len_utf8()..]))
            });

            match parsed {
                Some((span, after)) => {
                    if !before.is_empty() {
                        segments.push(Segment::Text(before));
                    }
                    segments.push(Segment::Math(span));
                    rest = after;
                }
                None => {
                    // Not one of ours; keep the character as text
                    let skip = start + open.len_utf8();
                    segments.push(Segment::Text(&rest[..skip]));
                    rest = &rest[skip..];
                }
            }
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest));
        }
        segments
    }

    /// Whether `text` is exactly one display placeholder
    pub fn display_only<'a>(&'a self, text: &'a str) -> Option<&'a MathSpan> {
        match self.split(text.trim()).as_slice() {
            [Segment::Math(span)] if span.display => Some(*span),
            _ => None,
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Replace well-formed math spans with placeholders
///
/// Fenced code blocks and inline code are left alone. Unterminated
/// delimiters stay as literal text.
pub fn protect(text: &str) -> Protected {
    let mut out = Protected::default();
    let mut in_fence: Option<String> = None;
    // Prose between fences; display math may span several lines
    let mut chunk = String::new();

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(ref fence) = in_fence {
            if trimmed.starts_with(fence.as_str()) {
                in_fence = None;
            }
            out.text.push_str(line);
            continue;
        }
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            out.protect_chunk(&chunk);
            chunk.clear();
            let marker: String = trimmed
                .chars()
                .take_while(|c| *c == '`' || *c == '~')
                .collect();
            in_fence = Some(marker);
            out.text.push_str(line);
            continue;
        }
        chunk.push_str(line);
    }
    out.protect_chunk(&chunk);

    out
}

impl Protected {
    fn push_span(&mut self, source: &str, display: bool) {
        let index = self.spans.len();
        self.spans.push(MathSpan {
            source: source.trim().to_string(),
            display,
        });
        let (open, close) = if display {
            (DISPLAY_OPEN, DISPLAY_CLOSE)
        } else {
            (INLINE_OPEN, INLINE_CLOSE)
        };
        self.text.push(open);
        self.text.push_str(&index.to_string());
        self.text.push(close);
    }

    fn protect_chunk(&mut self, chunk: &str) {
        let mut i = 0;
        let bytes = chunk.as_bytes();

        while i < chunk.len() {
            let rest = &chunk[i..];

            if rest.starts_with('`') {
                let ticks = rest.bytes().take_while(|b| *b == b'`').count();
                let fence = &rest[..ticks];
                match rest[ticks..].find(fence) {
                    Some(end) => {
                        let total = ticks + end + ticks;
                        self.text.push_str(&rest[..total]);
                        i += total;
                    }
                    None => {
                        self.text.push_str(fence);
                        i += ticks;
                    }
                }
                continue;
            }

            if rest.starts_with("\\$") {
                self.text.push_str("\\$");
                i += 2;
                continue;
            }

            if let Some(body) = rest.strip_prefix("$$") {
                if let Some(end) = body.find("$$") {
                    if !body[..end].trim().is_empty() {
                        self.push_span(&body[..end], true);
                        i += 2 + end + 2;
                        continue;
                    }
                }
                self.text.push_str("$$");
                i += 2;
                continue;
            }

            if let Some(consumed) = self.try_bracketed(rest, "\\[", "\\]", true) {
                i += consumed;
                continue;
            }
            if let Some(consumed) = self.try_bracketed(rest, "\\(", "\\)", false) {
                i += consumed;
                continue;
            }

            if bytes[i] == b'$' {
                if let Some(end) = inline_dollar_end(&rest[1..]) {
                    self.push_span(&rest[1..1 + end], false);
                    i += 1 + end + 1;
                } else {
                    self.text.push('$');
                    i += 1;
                }
                continue;
            }

            let ch_len = rest.chars().next().map_or(1, char::len_utf8);
            self.text.push_str(&rest[..ch_len]);
            i += ch_len;
        }
    }

    fn try_bracketed(&mut self, rest: &str, open: &str, close: &str, display: bool) -> Option<usize> {
        let body = rest.strip_prefix(open)?;
        let end = body.find(close)?;
        if body[..end].trim().is_empty() {
            return None;
        }
        self.push_span(&body[..end], display);
        Some(open.len() + end + close.len())
    }
}

/// Find the closing `$` of an inline span
///
/// The body must be non-empty, stay on one line, must not start or end with
/// whitespace, and the closing `$` must not be followed by a digit (so
/// "$5 and $10" is not math).
fn inline_dollar_end(body: &str) -> Option<usize> {
    let first = body.chars().next()?;
    if first.is_whitespace() || first == '$' {
        return None;
    }
    let mut prev = '\0';
    for (idx, c) in body.char_indices() {
        if c == '\n' {
            return None;
        }
        if c == '$' && prev != '\\' {
            let before = body[..idx].chars().next_back()?;
            if before.is_whitespace() {
                return None;
            }
            let after = body[idx + 1..].chars().next();
            if after.is_some_and(|a| a.is_ascii_digit()) {
                return None;
            }
            return Some(idx);
        }
        prev = c;
    }
    None
}

/// Errors from [`render_tex`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("unbalanced braces")]
    UnbalancedBraces,
    #[error("unterminated command")]
    UnterminatedCommand,
    #[error("missing argument for \\{0}")]
    MissingArgument(String),
    #[error("groups nested too deeply")]
    TooDeep,
    #[error("source too long")]
    TooLong,
}

/// Deepest group/command nesting the parser follows
const MAX_DEPTH: usize = 64;
/// Longest source `render_tex` attempts
const MAX_SOURCE_CHARS: usize = 4096;

/// Render TeX source as Unicode text
pub fn render_tex(src: &str) -> Result<String, MathError> {
    render_nested(src, 0)
}

fn render_nested(src: &str, depth: usize) -> Result<String, MathError> {
    if src.chars().nth(MAX_SOURCE_CHARS).is_some() {
        return Err(MathError::TooLong);
    }
    let mut parser = TexParser {
        chars: src.chars().peekable(),
        depth,
    };
    let out = parser.sequence(false)?;
    Ok(collapse_spaces(out.trim()))
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = false;
    for c in s.chars() {
        if c == ' ' {
            if !last_space {
                out.push(c);
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}

struct TexParser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    depth: usize,
}

impl TexParser<'_> {
    /// Run `f` one nesting level deeper
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, MathError>,
    ) -> Result<T, MathError> {
        if self.depth >= MAX_DEPTH {
            return Err(MathError::TooDeep);
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn sequence(&mut self, in_group: bool) -> Result<String, MathError> {
        self.nested(|p| p.sequence_inner(in_group))
    }

    fn sequence_inner(&mut self, in_group: bool) -> Result<String, MathError> {
        let mut out = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                '}' if in_group => return Ok(out),
                '}' => return Err(MathError::UnbalancedBraces),
                '{' => out.push_str(&self.sequence(true)?),
                '\\' => out.push_str(&self.command()?),
                '^' => {
                    let arg = self.argument("^")?;
                    out.push_str(&script(&arg, superscript_char, '^'));
                }
                '_' => {
                    let arg = self.argument("_")?;
                    out.push_str(&script(&arg, subscript_char, '_'));
                }
                '&' | '~' => out.push(' '),
                '\n' => out.push(' '),
                c => out.push(c),
            }
        }
        if in_group {
            Err(MathError::UnbalancedBraces)
        } else {
            Ok(out)
        }
    }

    fn argument(&mut self, command: &str) -> Result<String, MathError> {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
        match self.chars.next() {
            None => Err(MathError::MissingArgument(command.to_string())),
            Some('{') => self.sequence(true),
            Some('\\') => self.command(),
            Some('}') => Err(MathError::UnbalancedBraces),
            Some(c) => Ok(c.to_string()),
        }
    }

    fn optional_argument(&mut self) -> Result<Option<String>, MathError> {
        if self.chars.peek() != Some(&'[') {
            return Ok(None);
        }
        self.chars.next();
        let mut raw = String::new();
        for c in self.chars.by_ref() {
            if c == ']' {
                return Ok(Some(render_nested(&raw, self.depth)?));
            }
            raw.push(c);
        }
        Err(MathError::UnterminatedCommand)
    }

    fn command(&mut self) -> Result<String, MathError> {
        self.nested(Self::command_inner)
    }

    fn command_inner(&mut self) -> Result<String, MathError> {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphabetic() {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }

        if name.is_empty() {
            return match self.chars.next() {
                None => Err(MathError::UnterminatedCommand),
                Some('\\') => Ok("; ".to_string()),
                Some(',' | ';' | ':' | '!' | ' ') => Ok(" ".to_string()),
                Some(c) => Ok(c.to_string()),
            };
        }

        match name.as_str() {
            "frac" | "dfrac" | "tfrac" => {
                let num = self.argument(&name)?;
                let den = self.argument(&name)?;
                Ok(format!("{}/{}", group(&num), group(&den)))
            }
            "sqrt" => {
                let index = self.optional_argument()?;
                let body = self.argument(&name)?;
                let root = match index.as_deref() {
                    Some("3") => "∛",
                    Some("4") => "∜",
                    _ => "√",
                };
                Ok(format!("{}{}", root, group(&body)))
            }
            "text" | "textrm" | "textbf" | "textit" | "mathrm" | "mathbf" | "mathit"
            | "mathsf" | "mathtt" | "operatorname" | "boldsymbol" => self.argument(&name),
            "mathbb" => {
                let arg = self.argument(&name)?;
                Ok(arg.chars().map(double_struck).collect())
            }
            "begin" | "end" => {
                self.argument(&name)?;
                Ok(" ".to_string())
            }
            "left" | "right" | "big" | "Big" | "bigg" | "Bigg" | "displaystyle" | "limits" => {
                Ok(String::new())
            }
            "quad" => Ok("  ".to_string()),
            "qquad" => Ok("    ".to_string()),
            _ => Ok(match symbol(&name) {
                Some(s) => s.to_string(),
                None if is_function_name(&name) => name,
                None => format!("\\{}", name),
            }),
        }
    }
}

/// Parenthesize multi-character operands
fn group(s: &str) -> String {
    let s = s.trim();
    if s.chars().count() <= 1 || s.chars().all(|c| c.is_alphanumeric() || c == '.') {
        s.to_string()
    } else {
        format!("({})", s)
    }
}

fn script(arg: &str, map: fn(char) -> Option<char>, marker: char) -> String {
    let mapped: Option<String> = arg.chars().map(map).collect();
    match mapped {
        Some(s) if !arg.is_empty() => s,
        _ if arg.chars().count() == 1 => format!("{}{}", marker, arg),
        _ => format!("{}({})", marker, arg),
    }
}

fn superscript_char(c: char) -> Option<char> {
    Some(match c {
        '0' => '⁰',
        '1' => '¹',
        '2' => '²',
        '3' => '³',
        '4' => '⁴',
        '5' => '⁵',
        '6' => '⁶',
        '7' => '⁷',
        '8' => '⁸',
        '9' => '⁹',
        '+' => '⁺',
        '-' | '−' => '⁻',
        '=' => '⁼',
        '(' => '⁽',
        ')' => '⁾',
        'n' => 'ⁿ',
        'i' => 'ⁱ',
        'x' => 'ˣ',
        'T' => 'ᵀ',
        '′' => '′',
        _ => return None,
    })
}

fn subscript_char(c: char) -> Option<char> {
    Some(match c {
        '0' => '₀',
        '1' => '₁',
        '2' => '₂',
        '3' => '₃',
        '4' => '₄',
        '5' => '₅',
        '6' => '₆',
        '7' => '₇',
        '8' => '₈',
        '9' => '₉',
        '+' => '₊',
        '-' | '−' => '₋',
        '=' => '₌',
        '(' => '₍',
        ')' => '₎',
        'a' => 'ₐ',
        'e' => 'ₑ',
        'i' => 'ᵢ',
        'j' => 'ⱼ',
        'k' => 'ₖ',
        'n' => 'ₙ',
        'o' => 'ₒ',
        'x' => 'ₓ',
        _ => return None,
    })
}

fn double_struck(c: char) -> char {
    match c {
        'R' => 'ℝ',
        'N' => 'ℕ',
        'Z' => 'ℤ',
        'Q' => 'ℚ',
        'C' => 'ℂ',
        other => other,
    }
}

fn is_function_name(name: &str) -> bool {
    matches!(
        name,
        "sin" | "cos" | "tan" | "cot" | "sec" | "csc" | "log" | "ln" | "exp" | "lim" | "max"
            | "min" | "det" | "gcd" | "arg" | "deg" | "sup" | "inf"
    )
}

fn symbol(name: &str) -> Option<&'static str> {
    Some(match name {
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "epsilon" | "varepsilon" => "ε",
        "zeta" => "ζ",
        "eta" => "η",
        "theta" | "vartheta" => "θ",
        "iota" => "ι",
        "kappa" => "κ",
        "lambda" => "λ",
        "mu" => "μ",
        "nu" => "ν",
        "xi" => "ξ",
        "pi" => "π",
        "rho" => "ρ",
        "sigma" => "σ",
        "tau" => "τ",
        "upsilon" => "υ",
        "phi" | "varphi" => "φ",
        "chi" => "χ",
        "psi" => "ψ",
        "omega" => "ω",
        "Gamma" => "Γ",
        "Delta" => "Δ",
        "Theta" => "Θ",
        "Lambda" => "Λ",
        "Xi" => "Ξ",
        "Pi" => "Π",
        "Sigma" => "Σ",
        "Phi" => "Φ",
        "Psi" => "Ψ",
        "Omega" => "Ω",
        "times" => "×",
        "cdot" => "·",
        "div" => "÷",
        "pm" => "±",
        "mp" => "∓",
        "leq" | "le" => "≤",
        "geq" | "ge" => "≥",
        "neq" | "ne" => "≠",
        "approx" => "≈",
        "equiv" => "≡",
        "sim" => "∼",
        "propto" => "∝",
        "infty" => "∞",
        "sum" => "∑",
        "prod" => "∏",
        "int" => "∫",
        "oint" => "∮",
        "partial" => "∂",
        "nabla" => "∇",
        "in" => "∈",
        "notin" => "∉",
        "subset" => "⊂",
        "subseteq" => "⊆",
        "supset" => "⊃",
        "cup" => "∪",
        "cap" => "∩",
        "emptyset" | "varnothing" => "∅",
        "forall" => "∀",
        "exists" => "∃",
        "neg" | "lnot" => "¬",
        "land" | "wedge" => "∧",
        "lor" | "vee" => "∨",
        "to" | "rightarrow" => "→",
        "leftarrow" | "gets" => "←",
        "leftrightarrow" => "↔",
        "Rightarrow" | "implies" => "⇒",
        "Leftarrow" => "⇐",
        "Leftrightarrow" | "iff" => "⇔",
        "mapsto" => "↦",
        "ldots" | "dots" => "…",
        "cdots" => "⋯",
        "vdots" => "⋮",
        "prime" => "′",
        "degree" | "circ" => "°",
        "angle" => "∠",
        "perp" => "⊥",
        "parallel" => "∥",
        "langle" => "⟨",
        "rangle" => "⟩",
        "lceil" => "⌈",
        "rceil" => "⌉",
        "lfloor" => "⌊",
        "rfloor" => "⌋",
        "hbar" => "ℏ",
        "ell" => "ℓ",
        _ => return None,
    })
}
