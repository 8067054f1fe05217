//! Block-level markdown parser.
//!
//! Produces a tree of [`Block`]s whose inline content is kept as raw
//! [`Span`]s (source text + starting line); inline parsing happens during
//! serialization so every error can point at a line.

/// Raw inline source and the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Span {
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Block {
    Heading { level: u8, text: Span },
    /// `indented` is set when the first line carried leading indentation.
    Paragraph { text: Span, indented: bool },
    List(List),
    Quote(Vec<Block>),
    Code { language: Option<String>, code: String },
    Table(Table),
    Rule,
    /// Produced by the extension pass.
    Macro(crate::extensions::BlockMacro),
    /// Produced by the extension pass.
    Panel { kind: crate::extensions::PanelKind, body: Span },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct List {
    pub ordered: bool,
    pub start: u64,
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListItem {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Table {
    pub header: Vec<Span>,
    pub rows: Vec<Vec<Span>>,
}

#[derive(Debug, Clone)]
struct Line {
    number: usize,
    text: String,
}

/// Parse a whole document into blocks.
pub(crate) fn parse(markdown: &str) -> Vec<Block> {
    let lines: Vec<Line> = markdown
        .lines()
        .enumerate()
        .map(|(i, text)| Line {
            number: i + 1,
            text: expand_leading_tabs(text),
        })
        .collect();
    parse_blocks(&lines)
}

fn expand_leading_tabs(text: &str) -> String {
    let trimmed = text.trim_start_matches([' ', '\t']);
    let lead = &text[..text.len() - trimmed.len()];
    if !lead.contains('\t') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in lead.chars() {
        if c == '\t' {
            out.push_str("    ");
        } else {
            out.push(c);
        }
    }
    out.push_str(trimmed);
    out
}

fn parse_blocks(lines: &[Line]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let text = lines[i].text.as_str();
        if is_blank(text) {
            i += 1;
            continue;
        }
        if let Some((fence, language)) = fence_open(text) {
            let (block, next) = parse_fence(lines, i, &fence, language);
            blocks.push(block);
            i = next;
        } else if let Some((level, content)) = atx_heading(text) {
            blocks.push(Block::Heading {
                level,
                text: Span {
                    line: lines[i].number,
                    text: content,
                },
            });
            i += 1;
        } else if is_rule(text) {
            blocks.push(Block::Rule);
            i += 1;
        } else if quote_content(text).is_some() {
            let (block, next) = parse_quote(lines, i);
            blocks.push(block);
            i = next;
        } else if list_marker(text).is_some() {
            let (block, next) = parse_list(lines, i);
            blocks.push(block);
            i = next;
        } else if is_table_start(lines, i) {
            let (block, next) = parse_table(lines, i);
            blocks.push(block);
            i = next;
        } else {
            let (block, next) = parse_paragraph(lines, i);
            blocks.push(block);
            i = next;
        }
    }
    blocks
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

fn indent_of(text: &str) -> usize {
    text.len() - text.trim_start_matches(' ').len()
}

/// Opening code fence: returns the fence string and the optional language.
fn fence_open(text: &str) -> Option<(String, Option<String>)> {
    if indent_of(text) > 3 {
        return None;
    }
    let trimmed = text.trim_start();
    let fence_char = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.chars().take_while(|c| *c == fence_char).count();
    if run < 3 {
        return None;
    }
    let info = trimmed[run..].trim();
    if fence_char == '`' && info.contains('`') {
        return None;
    }
    let language = info
        .split_whitespace()
        .next()
        .map(str::to_string);
    Some((fence_char.to_string().repeat(run), language))
}

fn is_fence_close(text: &str, fence: &str) -> bool {
    let trimmed = text.trim();
    let Some(fence_char) = fence.chars().next() else {
        return false;
    };
    trimmed.len() >= fence.len() && trimmed.chars().all(|c| c == fence_char)
}

fn atx_heading(text: &str) -> Option<(u8, String)> {
    if indent_of(text) > 3 {
        return None;
    }
    let trimmed = text.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    // Optional closing sequence of #s.
    let content = rest.trim();
    let content = match content.trim_end_matches('#') {
        stripped if stripped.is_empty() || stripped.ends_with(' ') => stripped.trim_end(),
        _ => content,
    };
    Some((level as u8, content.to_string()))
}

fn is_rule(text: &str) -> bool {
    if indent_of(text) > 3 {
        return false;
    }
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() < 3 {
        return false;
    }
    let Some(first) = compact.chars().next() else {
        return false;
    };
    matches!(first, '-' | '*' | '_') && compact.chars().all(|c| c == first)
}

fn quote_content(text: &str) -> Option<&str> {
    if indent_of(text) > 3 {
        return None;
    }
    let rest = text.trim_start().strip_prefix('>')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marker {
    ordered: bool,
    number: u64,
    /// `-`, `*`, `+`, `.` or `)`; a change of delimiter starts a new list.
    delimiter: char,
    indent: usize,
    /// Column where item content starts.
    content_offset: usize,
}

fn list_marker(text: &str) -> Option<Marker> {
    let indent = indent_of(text);
    if indent > 3 {
        return None;
    }
    let rest = &text[indent..];
    let first = rest.chars().next()?;
    if matches!(first, '-' | '*' | '+') {
        let after = &rest[1..];
        if after.is_empty() || after.starts_with(' ') {
            return Some(Marker {
                ordered: false,
                number: 0,
                delimiter: first,
                indent,
                content_offset: indent + 1 + spaces_after(after),
            });
        }
        return None;
    }
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 9 {
        return None;
    }
    let delimiter = rest[digits..].chars().next()?;
    if delimiter != '.' && delimiter != ')' {
        return None;
    }
    let after = &rest[digits + 1..];
    if !after.is_empty() && !after.starts_with(' ') {
        return None;
    }
    let number = rest[..digits].parse().ok()?;
    Some(Marker {
        ordered: true,
        number,
        delimiter,
        indent,
        content_offset: indent + digits + 1 + spaces_after(after),
    })
}

/// Width of the gap between a list marker and its content (1..=4).
fn spaces_after(after: &str) -> usize {
    let spaces = indent_of(after);
    if spaces == 0 || spaces > 4 || is_blank(after) {
        1
    } else {
        spaces
    }
}

fn split_row(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = trimmed
        .strip_suffix('|')
        .filter(|t| !t.ends_with('\\'))
        .unwrap_or(trimmed);
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = trimmed.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

fn is_divider_row(text: &str) -> bool {
    if !text.contains('-') {
        return false;
    }
    split_row(text).iter().all(|cell| {
        let cell = cell.trim();
        let inner = cell.strip_prefix(':').unwrap_or(cell);
        let inner = inner.strip_suffix(':').unwrap_or(inner);
        !inner.is_empty() && inner.chars().all(|c| c == '-')
    })
}

fn is_table_start(lines: &[Line], i: usize) -> bool {
    lines[i].text.contains('|')
        && lines
            .get(i + 1)
            .is_some_and(|next| next.text.contains('|') && is_divider_row(&next.text))
}

/// Lines that end a paragraph without an intervening blank line.
fn interrupts_paragraph(text: &str) -> bool {
    fence_open(text).is_some()
        || atx_heading(text).is_some()
        || is_rule(text)
        || quote_content(text).is_some()
        || list_marker(text).is_some_and(|m| !m.ordered || m.number == 1)
}

// ---------------------------------------------------------------------------
// Block parsers
// ---------------------------------------------------------------------------

fn parse_fence(lines: &[Line], start: usize, fence: &str, language: Option<String>) -> (Block, usize) {
    let fence_indent = indent_of(&lines[start].text);
    let mut code_lines = Vec::new();
    let mut i = start + 1;
    while i < lines.len() {
        let text = &lines[i].text;
        if is_fence_close(text, fence) {
            i += 1;
            break;
        }
        let strip = indent_of(text).min(fence_indent);
        code_lines.push(&text[strip..]);
        i += 1;
    }
    let mut code = code_lines.join("\n");
    if !code_lines.is_empty() {
        code.push('\n');
    }
    (Block::Code { language, code }, i)
}

fn parse_quote(lines: &[Line], start: usize) -> (Block, usize) {
    let mut inner = Vec::new();
    let mut i = start;
    while i < lines.len() {
        match quote_content(&lines[i].text) {
            Some(content) => inner.push(Line {
                number: lines[i].number,
                text: content.to_string(),
            }),
            // Lazy continuation of a quoted paragraph.
            None if !is_blank(&lines[i].text)
                && inner.last().is_some_and(|l: &Line| !is_blank(&l.text))
                && !interrupts_paragraph(&lines[i].text) =>
            {
                inner.push(lines[i].clone())
            }
            None => break,
        }
        i += 1;
    }
    (Block::Quote(parse_blocks(&inner)), i)
}

fn parse_list(lines: &[Line], start: usize) -> (Block, usize) {
    let Some(first) = list_marker(&lines[start].text) else {
        return parse_paragraph(lines, start);
    };
    let mut items = Vec::new();
    let mut i = start;

    while i < lines.len() {
        let Some(marker) = list_marker(&lines[i].text) else {
            break;
        };
        if marker.ordered != first.ordered
            || marker.delimiter != first.delimiter
            || marker.indent >= first.content_offset
        {
            break;
        }

        let mut item_lines = vec![Line {
            number: lines[i].number,
            text: lines[i].text.get(marker.content_offset..).unwrap_or("").to_string(),
        }];
        let mut j = i + 1;
        while j < lines.len() {
            let text = &lines[j].text;
            if is_blank(text) {
                // Blank lines belong to the item only if indented content follows.
                let next = (j..lines.len()).find(|&k| !is_blank(&lines[k].text));
                match next {
                    Some(k) if indent_of(&lines[k].text) >= marker.content_offset => {
                        for blank in &lines[j..k] {
                            item_lines.push(Line {
                                number: blank.number,
                                text: String::new(),
                            });
                        }
                        j = k;
                        continue;
                    }
                    _ => break,
                }
            }
            if indent_of(text) >= marker.content_offset {
                item_lines.push(Line {
                    number: lines[j].number,
                    text: text[marker.content_offset..].to_string(),
                });
                j += 1;
                continue;
            }
            let lazy = item_lines.last().is_some_and(|l| !is_blank(&l.text))
                && list_marker(text).is_none()
                && !interrupts_paragraph(text);
            if lazy {
                item_lines.push(Line {
                    number: lines[j].number,
                    text: text.trim_start().to_string(),
                });
                j += 1;
                continue;
            }
            break;
        }

        items.push(ListItem {
            blocks: parse_blocks(&item_lines),
        });

        // Skip blank lines between items of the same list.
        let next = (j..lines.len()).find(|&k| !is_blank(&lines[k].text));
        match next {
            Some(k)
                if list_marker(&lines[k].text).is_some_and(|m| {
                    m.ordered == first.ordered
                        && m.delimiter == first.delimiter
                        && m.indent < first.content_offset
                }) =>
            {
                i = k;
            }
            _ => {
                i = j;
                break;
            }
        }
    }

    (
        Block::List(List {
            ordered: first.ordered,
            start: first.number,
            items,
        }),
        i,
    )
}

fn parse_table(lines: &[Line], start: usize) -> (Block, usize) {
    let span_row = |line: &Line| -> Vec<Span> {
        split_row(&line.text)
            .into_iter()
            .map(|text| Span {
                line: line.number,
                text,
            })
            .collect()
    };
    let header = span_row(&lines[start]);
    let mut rows = Vec::new();
    let mut i = start + 2;
    while i < lines.len() && !is_blank(&lines[i].text) && lines[i].text.contains('|') {
        let mut row = span_row(&lines[i]);
        row.resize_with(header.len(), || Span {
            line: lines[i].number,
            text: String::new(),
        });
        rows.push(row);
        i += 1;
    }
    (Block::Table(Table { header, rows }), i)
}

fn parse_paragraph(lines: &[Line], start: usize) -> (Block, usize) {
    let indented = indent_of(&lines[start].text) > 0;
    let mut text_lines = vec![lines[start].text.trim_start().to_string()];
    let mut i = start + 1;
    while i < lines.len() {
        let text = &lines[i].text;
        if is_blank(text) || interrupts_paragraph(text) || is_table_start(lines, i) {
            break;
        }
        text_lines.push(text.trim_start().to_string());
        i += 1;
    }
    (
        Block::Paragraph {
            text: Span {
                line: lines[start].number,
                text: text_lines.join("\n"),
            },
            indented,
        },
        i,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
