//! Inline scanner: emphasis, code spans, links, autolinks and the inline
//! extensions (sub/superscript, status pills, cross-page references).
//!
//! The scanner works on one block's inline source at a time, so no inline
//! construct can cross a block boundary.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::MarkupError;
use crate::extensions::{BlockMacro, StatusColor};

static BARE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:https?|ftp)://[^\s<>\[\]()"'`]+"#).expect("valid URL pattern")
});

const STATUS_OPEN: &str = "&status-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Inline {
    Text(String),
    Code(String),
    Emphasis(Vec<Inline>),
    Strong(Vec<Inline>),
    Subscript(String),
    Superscript(String),
    Link { text: Vec<Inline>, href: String },
    AutoLink(String),
    PageLink { text: String, title: String },
    Status { color: StatusColor, label: String },
    LineBreak,
    EmDash,
}

/// Where the scanned source came from, for error reporting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceRef<'a> {
    pub path: &'a Path,
    pub line: usize,
}

/// Parse inline source into nodes.
pub(crate) fn parse_inlines(src: &str, origin: SourceRef<'_>) -> Result<Vec<Inline>, MarkupError> {
    Scanner::new(src, origin, false).run()
}

struct Scanner<'s, 'p> {
    src: &'s str,
    pos: usize,
    origin: SourceRef<'p>,
    in_link: bool,
    text: String,
    out: Vec<Inline>,
}

impl<'s, 'p> Scanner<'s, 'p> {
    fn new(src: &'s str, origin: SourceRef<'p>, in_link: bool) -> Self {
        Self {
            src,
            pos: 0,
            origin,
            in_link,
            text: String::new(),
            out: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Inline>, MarkupError> {
        let src = self.src;
        while self.pos < src.len() {
            let rest = &src[self.pos..];
            let Some(c) = rest.chars().next() else {
                break;
            };
            let consumed = match c {
                '\\' => self.escape(rest),
                '`' => self.code_span(rest),
                '&' => self.ampersand(rest)?,
                '[' if !self.in_link => self.link(rest)?,
                '<' => self.angle_autolink(rest),
                '*' | '_' => self.emphasis(rest, c)?,
                '~' => self.script(rest, '~'),
                '^' => self.script(rest, '^'),
                '-' if rest.starts_with("---") && !rest.starts_with("----") => {
                    self.flush();
                    self.out.push(Inline::EmDash);
                    Some(3)
                }
                '\n' => {
                    self.newline();
                    Some(1)
                }
                ':' => self.misplaced_macro(rest)?,
                _ if !self.in_link && self.at_word_start() => self.bare_url(rest),
                _ => None,
            };
            match consumed {
                Some(n) => self.pos += n,
                None => {
                    self.text.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
        self.flush();
        Ok(self.out)
    }

    fn flush(&mut self) {
        if !self.text.is_empty() {
            self.out.push(Inline::Text(std::mem::take(&mut self.text)));
        }
    }

    fn line_at(&self, pos: usize) -> usize {
        self.origin.line + self.src[..pos].matches('\n').count()
    }

    fn nested(&self, start: usize, end: usize, in_link: bool) -> Result<Vec<Inline>, MarkupError> {
        let origin = SourceRef {
            path: self.origin.path,
            line: self.line_at(start),
        };
        Scanner::new(&self.src[start..end], origin, in_link).run()
    }

    fn prev_char(&self) -> Option<char> {
        self.src[..self.pos].chars().next_back()
    }

    fn at_word_start(&self) -> bool {
        self.prev_char().map_or(true, |p| !p.is_alphanumeric())
    }

    fn escape(&mut self, rest: &str) -> Option<usize> {
        let next = rest[1..].chars().next()?;
        if next.is_ascii_punctuation() {
            self.text.push(next);
            Some(1 + next.len_utf8())
        } else {
            None
        }
    }

    fn newline(&mut self) {
        if self.text.ends_with("  ") {
            let trimmed = self.text.trim_end_matches(' ').len();
            self.text.truncate(trimmed);
            self.flush();
            self.out.push(Inline::LineBreak);
        } else {
            self.text.push('\n');
        }
    }

    fn code_span(&mut self, rest: &str) -> Option<usize> {
        let run = rest.chars().take_while(|c| *c == '`').count();
        let fence = &rest[..run];
        let body_start = run;
        let mut search = body_start;
        while let Some(found) = rest[search..].find(fence) {
            let at = search + found;
            let closing_run = rest[at..].chars().take_while(|c| *c == '`').count();
            if closing_run == run {
                let body = rest[body_start..at].replace('\n', " ");
                let body = match body.strip_prefix(' ').and_then(|b| b.strip_suffix(' ')) {
                    Some(inner) if !inner.trim().is_empty() => inner.to_string(),
                    _ => body,
                };
                self.flush();
                self.out.push(Inline::Code(body));
                return Some(at + run);
            }
            search = at + closing_run;
        }
        // Unmatched backticks are literal.
        self.text.push_str(fence);
        Some(run)
    }

    fn ampersand(&mut self, rest: &str) -> Result<Option<usize>, MarkupError> {
        if rest.starts_with("&[") {
            return Ok(self.page_link(rest));
        }
        if rest.starts_with(STATUS_OPEN) {
            return self.status(rest).map(Some);
        }
        Ok(None)
    }

    /// `&[display text](Page Title)`
    fn page_link(&mut self, rest: &str) -> Option<usize> {
        let close = matching_bracket(rest, 1)?;
        let after = &rest[close + 1..];
        if !after.starts_with('(') {
            return None;
        }
        let paren = after.find(')')?;
        let title = after[1..paren].trim();
        if title.is_empty() {
            return None;
        }
        self.flush();
        self.out.push(Inline::PageLink {
            text: unescape(&rest[2..close]),
            title: title.to_string(),
        });
        Some(close + 1 + paren + 1)
    }

    /// `&status-<color>:label;`
    fn status(&mut self, rest: &str) -> Result<usize, MarkupError> {
        let line = self.line_at(self.pos);
        let malformed = |reason: &str| MarkupError::MalformedStatus {
            path: self.origin.path.to_path_buf(),
            line,
            reason: reason.to_string(),
        };
        let body = &rest[STATUS_OPEN.len()..];
        let colon = body
            .find(|c: char| !c.is_ascii_alphanumeric())
            .filter(|&i| body[i..].starts_with(':'))
            .ok_or_else(|| malformed("expected '&status-<color>:<label>;'"))?;
        let color_name = &body[..colon];
        let color = StatusColor::from_name(color_name).ok_or_else(|| {
            MarkupError::UnknownStatusColor {
                path: self.origin.path.to_path_buf(),
                line,
                color: color_name.to_string(),
            }
        })?;
        let label_start = colon + 1;
        let semicolon = body[label_start..]
            .find([';', '\n'])
            .filter(|&i| body[label_start + i..].starts_with(';'))
            .ok_or_else(|| malformed("missing closing ';'"))?;
        let label = body[label_start..label_start + semicolon].trim();
        if label.is_empty() {
            return Err(malformed("empty label"));
        }
        self.flush();
        self.out.push(Inline::Status {
            color,
            label: label.to_string(),
        });
        Ok(STATUS_OPEN.len() + label_start + semicolon + 1)
    }

    /// `[text](href "optional title")`
    fn link(&mut self, rest: &str) -> Result<Option<usize>, MarkupError> {
        let Some(close) = matching_bracket(rest, 0) else {
            return Ok(None);
        };
        let after = &rest[close + 1..];
        if !after.starts_with('(') {
            return Ok(None);
        }
        let Some(paren) = after.find(')') else {
            return Ok(None);
        };
        let target = after[1..paren].trim();
        let href = target
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_start_matches('<')
            .trim_end_matches('>');
        if href.is_empty() {
            return Ok(None);
        }
        let text = self.nested(self.pos + 1, self.pos + close, true)?;
        self.flush();
        self.out.push(Inline::Link {
            text,
            href: href.to_string(),
        });
        Ok(Some(close + 1 + paren + 1))
    }

    /// `<https://example.com>`
    fn angle_autolink(&mut self, rest: &str) -> Option<usize> {
        let end = rest.find('>')?;
        let inner = &rest[1..end];
        let m = BARE_URL.find(inner)?;
        if m.end() != inner.len() {
            return None;
        }
        self.flush();
        self.out.push(Inline::AutoLink(inner.to_string()));
        Some(end + 1)
    }

    fn bare_url(&mut self, rest: &str) -> Option<usize> {
        let m = BARE_URL.find(rest)?;
        let url = m
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?', '*', '_', '~']);
        if url.ends_with("://") {
            return None;
        }
        self.flush();
        self.out.push(Inline::AutoLink(url.to_string()));
        Some(url.len())
    }

    fn emphasis(&mut self, rest: &str, marker: char) -> Result<Option<usize>, MarkupError> {
        let run = rest.chars().take_while(|c| *c == marker).count().min(3);
        // Intra-word underscores are literal.
        if marker == '_' && !self.at_word_start() {
            return Ok(None);
        }
        let content_start = run;
        if rest[content_start..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace)
        {
            return Ok(None);
        }
        let delimiter = &rest[..run];
        let Some(close) = find_closing(rest, content_start, delimiter, marker) else {
            return Ok(None);
        };
        let start = self.pos + content_start;
        let end = self.pos + close;
        let inner = self.nested(start, end, self.in_link)?;
        self.flush();
        let node = match run {
            1 => Inline::Emphasis(inner),
            2 => Inline::Strong(inner),
            _ => Inline::Strong(vec![Inline::Emphasis(inner)]),
        };
        self.out.push(node);
        Ok(Some(close + run))
    }

    /// `~sub~` and `^sup^`: no whitespace inside, never empty, never doubled.
    fn script(&mut self, rest: &str, marker: char) -> Option<usize> {
        let body = &rest[1..];
        let first = body.chars().next()?;
        if first == marker || first.is_whitespace() {
            return None;
        }
        let end = body.find(|c: char| c == marker || c.is_whitespace())?;
        if !body[end..].starts_with(marker) {
            return None;
        }
        let content = unescape(&body[..end]);
        self.flush();
        self.out.push(if marker == '~' {
            Inline::Subscript(content)
        } else {
            Inline::Superscript(content)
        });
        Some(end + 2)
    }

    fn misplaced_macro(&mut self, rest: &str) -> Result<Option<usize>, MarkupError> {
        for block_macro in BlockMacro::all() {
            if rest.starts_with(block_macro.token()) {
                return Err(MarkupError::MisplacedMacro {
                    path: self.origin.path.to_path_buf(),
                    line: self.line_at(self.pos),
                    token: block_macro.token().to_string(),
                });
            }
        }
        Ok(None)
    }
}

/// Index of the `]` matching the `[` at `open`, honoring nesting and escapes.
fn matching_bracket(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in s[open..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            '\n' if s[open..open + i].ends_with('\n') => return None,
            _ => {}
        }
    }
    None
}

/// Closing delimiter for emphasis: same run, not preceded by whitespace,
/// and (for `_`) not followed by a word character. Code spans and escaped
/// characters are skipped.
fn find_closing(rest: &str, from: usize, delimiter: &str, marker: char) -> Option<usize> {
    let mut at = from;
    while at < rest.len() {
        let tail = &rest[at..];
        let c = tail.chars().next()?;
        if c == '\\' {
            at += 1 + tail[1..].chars().next().map_or(0, char::len_utf8);
            continue;
        }
        if c == '`' {
            let run = tail.chars().take_while(|c| *c == '`').count();
            let fence = &tail[..run];
            at += match tail[run..].find(fence) {
                Some(close) => run + close + run,
                None => run,
            };
            continue;
        }
        if c != marker {
            at += c.len_utf8();
            continue;
        }
        let run = tail.chars().take_while(|c| *c == marker).count();
        let before = rest[..at].chars().next_back();
        let after = rest[at + run..].chars().next();
        let flanking = before.is_some_and(|b| !b.is_whitespace());
        let exact = run == delimiter.len() || (run > delimiter.len() && delimiter.len() == 3);
        let word_ok = marker != '_' || after.map_or(true, |a| !a.is_alphanumeric());
        if at > from && flanking && exact && word_ok {
            return Some(at);
        }
        at += run;
    }
    None
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_punctuation() {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
