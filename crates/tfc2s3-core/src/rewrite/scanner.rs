//! Minimal brace-depth-aware scanner for HCL configuration text.
//!
//! This is not a parser. It tokenizes just enough of the language to find
//! block headers, their matching closing braces and simple attributes while
//! skipping quoted strings (including `${...}` templates), comments and
//! heredocs, so braces inside those never affect nesting depth.
//!
//! All offsets are byte offsets into the original source and always fall on
//! ASCII token boundaries, so slicing the source with them is safe.

use std::ops::Range;

/// A block found at the top level of a scanned range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block type, e.g. `terraform`, `module`, `cloud`.
    pub keyword: String,

    /// Labels following the keyword, unquoted.
    pub labels: Vec<String>,

    /// Offset of the first byte of the keyword.
    pub start: usize,

    /// Offset of the opening brace.
    pub open: usize,

    /// Offset of the matching closing brace.
    pub close: usize,
}

impl Block {
    /// Full extent of the block, from keyword to closing brace inclusive.
    pub fn span(&self) -> Range<usize> {
        self.start..self.close + 1
    }

    /// Everything between the braces.
    pub fn body(&self) -> Range<usize> {
        self.open + 1..self.close
    }

    /// First label, if any (`module "vpc"` → `vpc`).
    pub fn label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }
}

/// A `name = value` attribute found at the top level of a scanned range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,

    /// Offset of the first byte of the attribute name.
    pub start: usize,

    /// Extent of the first value token (the quoted literal for strings).
    pub value: Range<usize>,

    /// Unquoted text when the value is a plain string literal.
    pub literal: Option<String>,
}

/// A replacement of one byte range of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub replacement: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Ident,
    /// `closed` is false when the line or range ended before the quote.
    Str { template: bool, closed: bool },
    Open(u8),
    Close(u8),
    Equals,
    Newline,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
}

/// Blocks whose headers sit at nesting depth zero of `range`.
pub fn blocks(src: &str, range: Range<usize>) -> Vec<Block> {
    let mut found = Vec::new();
    let mut top: Vec<Token> = Vec::new();
    let mut depth = 0usize;
    let mut pending: Option<Block> = None;

    for tok in tokenize(src, range) {
        match tok.kind {
            Kind::Open(b) => {
                if depth == 0 {
                    pending = if b == b'{' {
                        block_header(src, &top, tok.start)
                    } else {
                        None
                    };
                    top.push(tok);
                }
                depth += 1;
            }
            Kind::Close(_) => {
                // Stray closers are ignored rather than underflowing.
                if depth == 0 {
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(mut block) = pending.take() {
                        block.close = tok.start;
                        found.push(block);
                    }
                    top.push(tok);
                }
            }
            _ if depth == 0 => top.push(tok),
            _ => {}
        }
    }

    found
}

/// Blocks at depth zero of `range` with the given keyword.
pub fn child_blocks(src: &str, range: Range<usize>, keyword: &str) -> Vec<Block> {
    blocks(src, range)
        .into_iter()
        .filter(|b| b.keyword == keyword)
        .collect()
}

/// Attributes at depth zero of `range`, in source order.
pub fn attributes(src: &str, range: Range<usize>) -> Vec<Attribute> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut top: Vec<Token> = Vec::new();

    for tok in tokenize(src, range) {
        match tok.kind {
            Kind::Open(_) => {
                if depth == 0 {
                    top.push(tok);
                }
                depth += 1;
            }
            Kind::Close(_) => {
                if depth == 0 {
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    top.push(tok);
                }
            }
            _ if depth == 0 => top.push(tok),
            _ => {}
        }
    }

    for (i, window) in top.windows(3).enumerate() {
        let (name, eq, value) = (window[0], window[1], window[2]);
        if name.kind != Kind::Ident || eq.kind != Kind::Equals {
            continue;
        }
        let at_statement_start = i == 0
            || matches!(
                top[i - 1].kind,
                Kind::Newline | Kind::Close(_) | Kind::Str { .. } | Kind::Open(_)
            );
        if !at_statement_start {
            continue;
        }
        let literal = match value.kind {
            Kind::Str {
                template: false,
                closed: true,
            } => string_body(src, value).map(str::to_string),
            _ => None,
        };
        found.push(Attribute {
            name: src[name.start..name.end].to_string(),
            start: name.start,
            value: value.start..value.end,
            literal,
        });
    }

    found
}

/// First string attribute named `name` at depth zero of `range`.
pub fn string_attribute(src: &str, range: Range<usize>, name: &str) -> Option<Attribute> {
    attributes(src, range)
        .into_iter()
        .find(|a| a.name == name && a.literal.is_some())
}

/// Apply non-overlapping edits and return the new text.
///
/// Bytes outside the edited ranges are copied unchanged.
pub fn apply_edits(src: &str, edits: &[Edit]) -> String {
    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by_key(|e| e.range.start);

    let mut out = String::with_capacity(src.len());
    let mut cursor = 0;
    for edit in sorted {
        if edit.range.start < cursor {
            continue;
        }
        out.push_str(&src[cursor..edit.range.start]);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(&src[cursor..]);
    out
}

/// Offset of the first byte of the line containing `pos`.
pub fn line_start(src: &str, pos: usize) -> usize {
    src[..pos].rfind('\n').map_or(0, |i| i + 1)
}

/// Offset just past the newline ending the line containing `pos`.
pub fn line_end_inclusive(src: &str, pos: usize) -> usize {
    src[pos..].find('\n').map_or(src.len(), |i| pos + i + 1)
}

/// Leading whitespace of the line containing `pos`.
pub fn indentation_at(src: &str, pos: usize) -> &str {
    let start = line_start(src, pos);
    let line = &src[start..];
    let width = line
        .bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count();
    &line[..width]
}

/// Decide whether the depth-zero tokens before an opening brace form a
/// block header, i.e. `keyword label* {` at the start of a statement.
fn block_header(src: &str, top: &[Token], open: usize) -> Option<Block> {
    let mut first = top.len();
    while first > 0 && matches!(top[first - 1].kind, Kind::Ident | Kind::Str { .. }) {
        first -= 1;
    }

    // Anything other than a statement boundary before the run means its
    // first token is the tail of an expression (`x = "a" blk {`).
    let boundary = first == 0
        || matches!(
            top[first - 1].kind,
            Kind::Newline | Kind::Close(_) | Kind::Open(_)
        );
    if !boundary {
        first += 1;
    }

    let header = top.get(first..)?;
    let (keyword, labels) = header.split_first()?;
    if keyword.kind != Kind::Ident {
        return None;
    }

    let labels = labels
        .iter()
        .map(|t| match t.kind {
            Kind::Str { .. } => string_body(src, *t).unwrap_or_default().to_string(),
            _ => src[t.start..t.end].to_string(),
        })
        .collect();

    Some(Block {
        keyword: src[keyword.start..keyword.end].to_string(),
        labels,
        start: keyword.start,
        open,
        close: open,
    })
}

/// Text between the quotes of a string token. An unterminated string has
/// no closing quote to strip.
fn string_body(src: &str, tok: Token) -> Option<&str> {
    match tok.kind {
        Kind::Str { closed: true, .. } if tok.end >= tok.start + 2 => {
            src.get(tok.start + 1..tok.end - 1)
        }
        Kind::Str { closed: false, .. } => src.get(tok.start + 1..tok.end),
        _ => None,
    }
}

fn tokenize(src: &str, range: Range<usize>) -> Vec<Token> {
    let b = src.as_bytes();
    let end = range.end.min(b.len());
    let mut i = range.start;
    let mut out = Vec::new();

    while i < end {
        let c = b[i];
        let start = i;
        let kind = match c {
            b' ' | b'\t' | b'\r' => {
                i += 1;
                continue;
            }
            b'\n' => {
                i += 1;
                Kind::Newline
            }
            b'#' => {
                i = skip_line(b, i, end);
                continue;
            }
            b'/' if peek(b, i + 1, end) == Some(b'/') => {
                i = skip_line(b, i, end);
                continue;
            }
            b'/' if peek(b, i + 1, end) == Some(b'*') => {
                i = find_seq(b, i + 2, end, b"*/").map_or(end, |p| p + 2);
                continue;
            }
            b'"' => {
                let (next, template, closed) = skip_string(b, i, end);
                i = next;
                Kind::Str { template, closed }
            }
            b'<' if peek(b, i + 1, end) == Some(b'<') => match skip_heredoc(b, i, end) {
                Some(next) => {
                    i = next;
                    Kind::Other
                }
                None => {
                    i += 2;
                    Kind::Other
                }
            },
            b'{' | b'[' | b'(' => {
                i += 1;
                Kind::Open(c)
            }
            b'}' | b']' | b')' => {
                i += 1;
                Kind::Close(c)
            }
            b'=' if matches!(peek(b, i + 1, end), Some(b'=') | Some(b'>')) => {
                i += 2;
                Kind::Other
            }
            b'!' | b'<' | b'>' if peek(b, i + 1, end) == Some(b'=') => {
                i += 2;
                Kind::Other
            }
            b'=' => {
                i += 1;
                Kind::Equals
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                i += 1;
                while i < end && (b[i].is_ascii_alphanumeric() || b[i] == b'_' || b[i] == b'-') {
                    i += 1;
                }
                Kind::Ident
            }
            _ => {
                i += 1;
                Kind::Other
            }
        };
        out.push(Token {
            kind,
            start,
            end: i,
        });
    }

    out
}

fn peek(b: &[u8], i: usize, end: usize) -> Option<u8> {
    (i < end).then(|| b[i])
}

fn skip_line(b: &[u8], mut i: usize, end: usize) -> usize {
    while i < end && b[i] != b'\n' {
        i += 1;
    }
    i
}

fn find_seq(b: &[u8], from: usize, end: usize, needle: &[u8]) -> Option<usize> {
    if from >= end {
        return None;
    }
    b[from..end]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Skip a quoted string starting at the opening quote. Returns the offset
/// after the string, whether it contained a template and whether a closing
/// quote was found.
///
/// A bare newline outside a template terminates an unclosed string.
fn skip_string(b: &[u8], open: usize, end: usize) -> (usize, bool, bool) {
    let mut i = open + 1;
    let mut template = false;
    while i < end {
        match b[i] {
            b'\\' => i += 2,
            b'"' => return (i + 1, template, true),
            b'\n' => return (i, template, false),
            b'$' | b'%' if peek(b, i + 1, end) == Some(b'{') => {
                // `$${` and `%%{` are escapes, not templates.
                if i > open + 1 && b[i - 1] == b[i] {
                    i += 2;
                    continue;
                }
                template = true;
                i = skip_template(b, i + 2, end);
            }
            _ => i += 1,
        }
    }
    (end.max(open + 1), template, false)
}

/// Skip a template interpolation body starting just after `${`.
fn skip_template(b: &[u8], mut i: usize, end: usize) -> usize {
    let mut depth = 1usize;
    while i < end {
        match b[i] {
            b'"' => {
                i = skip_string(b, i, end).0;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    end
}

/// Skip `<<EOF` / `<<-EOF` heredocs. Returns the offset of the newline that
/// ends the terminator line, or `None` when `<<` does not start a heredoc.
fn skip_heredoc(b: &[u8], start: usize, end: usize) -> Option<usize> {
    let mut i = start + 2;
    if peek(b, i, end) == Some(b'-') {
        i += 1;
    }
    let tag_start = i;
    while i < end && (b[i].is_ascii_alphanumeric() || b[i] == b'_') {
        i += 1;
    }
    if i == tag_start {
        return None;
    }
    let tag = &b[tag_start..i];
    if peek(b, i, end) == Some(b'\r') {
        i += 1;
    }
    if peek(b, i, end) != Some(b'\n') {
        return None;
    }

    let mut line = i + 1;
    while line < end {
        let line_end = skip_line(b, line, end);
        let text = &b[line..line_end];
        let trimmed = trim_ascii(text);
        if trimmed == tag {
            return Some(line_end);
        }
        line = line_end + 1;
    }
    Some(end)
}

fn trim_ascii(mut s: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = s {
        if first.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = s {
        if last.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    s
}
