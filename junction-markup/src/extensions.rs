//! Target-specific extensions layered on the parsed block tree.
//!
//! Block extensions (page-tree/TOC macros and info panels) are recognised
//! here by rewriting [`Block::Paragraph`] nodes. Inline extensions (status
//! pills, cross-page references, sub/superscript) are recognised by the
//! inline scanner but their vocabulary lives in this module.

use std::fmt;
use std::path::Path;

use crate::error::MarkupError;
use crate::parser::{Block, Span};

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Colors accepted by `&status-<color>:label;`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusColor {
    Green,
    Yellow,
    Grey,
    Red,
    Blue,
    Purple,
}

impl StatusColor {
    pub fn all() -> &'static [StatusColor] {
        &[
            StatusColor::Green,
            StatusColor::Yellow,
            StatusColor::Grey,
            StatusColor::Red,
            StatusColor::Blue,
            StatusColor::Purple,
        ]
    }

    /// Parse the lowercase color name used in markdown.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|c| c.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StatusColor::Green => "green",
            StatusColor::Yellow => "yellow",
            StatusColor::Grey => "grey",
            StatusColor::Red => "red",
            StatusColor::Blue => "blue",
            StatusColor::Purple => "purple",
        }
    }

    /// Value of the macro's `colour` parameter.
    pub fn macro_value(&self) -> &'static str {
        match self {
            StatusColor::Green => "Green",
            StatusColor::Yellow => "Yellow",
            StatusColor::Grey => "Grey",
            StatusColor::Red => "Red",
            StatusColor::Blue => "Blue",
            StatusColor::Purple => "Purple",
        }
    }
}

impl fmt::Display for StatusColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Block macros that must occupy a paragraph of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockMacro {
    Children,
    TableOfContents,
}

impl BlockMacro {
    pub fn all() -> &'static [BlockMacro] {
        &[BlockMacro::Children, BlockMacro::TableOfContents]
    }

    pub fn token(&self) -> &'static str {
        match self {
            BlockMacro::Children => ":include-children:",
            BlockMacro::TableOfContents => ":include-toc:",
        }
    }

    fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        Self::all().iter().copied().find(|m| m.token() == line)
    }
}

/// Severity of an info panel, chosen by the paragraph prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    Info,
    Warning,
    Error,
    Success,
}

impl PanelKind {
    pub fn all() -> &'static [PanelKind] {
        &[
            PanelKind::Info,
            PanelKind::Warning,
            PanelKind::Error,
            PanelKind::Success,
        ]
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            PanelKind::Info => "Info:",
            PanelKind::Warning => "Warning:",
            PanelKind::Error => "Error:",
            PanelKind::Success => "Success:",
        }
    }

    /// Name of the panel macro in storage markup.
    pub fn macro_name(&self) -> &'static str {
        match self {
            PanelKind::Info => "info",
            PanelKind::Warning => "note",
            PanelKind::Error => "warning",
            PanelKind::Success => "tip",
        }
    }

    /// Split a paragraph into panel kind and body when it opens with a prefix
    /// followed by whitespace.
    fn detect(text: &str) -> Option<(Self, &str)> {
        Self::all().iter().copied().find_map(|kind| {
            let rest = text.strip_prefix(kind.prefix())?;
            rest.starts_with(char::is_whitespace)
                .then(|| (kind, rest.trim_start()))
        })
    }
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix().trim_end_matches(':'))
    }
}

// ---------------------------------------------------------------------------
// Block pass
// ---------------------------------------------------------------------------

/// Rewrite macro and panel paragraphs, recursing into quotes and list items.
pub(crate) fn apply(blocks: Vec<Block>, path: &Path) -> Result<Vec<Block>, MarkupError> {
    let mut out: Vec<Block> = Vec::with_capacity(blocks.len());
    for block in blocks {
        let rewritten = match block {
            Block::Paragraph { text, indented } => {
                if let Some(Block::Panel { kind, .. }) = out.last() {
                    if indented {
                        return Err(MarkupError::MultiParagraphPanel {
                            path: path.to_path_buf(),
                            line: text.line,
                            kind: *kind,
                        });
                    }
                }
                rewrite_paragraph(text, indented, path)?
            }
            Block::Quote(inner) => Block::Quote(apply(inner, path)?),
            Block::List(mut list) => {
                for item in &mut list.items {
                    item.blocks = apply(std::mem::take(&mut item.blocks), path)?;
                }
                Block::List(list)
            }
            other => other,
        };
        out.push(rewritten);
    }
    Ok(out)
}

fn rewrite_paragraph(text: Span, indented: bool, path: &Path) -> Result<Block, MarkupError> {
    if !text.text.contains('\n') {
        if let Some(block_macro) = BlockMacro::from_line(&text.text) {
            return Ok(Block::Macro(block_macro));
        }
    }
    if let Some((kind, body)) = PanelKind::detect(&text.text) {
        if body.trim().is_empty() {
            return Err(MarkupError::EmptyPanel {
                path: path.to_path_buf(),
                line: text.line,
                kind,
            });
        }
        // A body starting on the line after the prefix keeps line numbers honest.
        let skipped_lines = text.text[..text.text.len() - body.len()].matches('\n').count();
        return Ok(Block::Panel {
            kind,
            body: Span {
                line: text.line + skipped_lines,
                text: body.to_string(),
            },
        });
    }
    Ok(Block::Paragraph { text, indented })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn run(markdown: &str) -> Result<Vec<Block>, MarkupError> {
        apply(parse(markdown), Path::new("docs/page.md"))
    }

    #[test]
    fn status_color_names() {
        assert_eq!(StatusColor::from_name("purple"), Some(StatusColor::Purple));
        assert_eq!(StatusColor::from_name("orange"), None);
        assert_eq!(StatusColor::from_name("Green"), None);
        assert_eq!(StatusColor::Grey.macro_value(), "Grey");
    }

    #[test]
    fn standalone_macro_lines_become_macros() {
        let blocks = run("intro\n\n:include-toc:\n\n:include-children:\n").unwrap();
        assert_eq!(blocks[1], Block::Macro(BlockMacro::TableOfContents));
        assert_eq!(blocks[2], Block::Macro(BlockMacro::Children));
    }

    #[test]
    fn panel_prefix_is_stripped() {
        let blocks = run("Warning: mind the gap\nsecond line\n").unwrap();
        match &blocks[0] {
            Block::Panel { kind, body } => {
                assert_eq!(*kind, PanelKind::Warning);
                assert_eq!(body.text, "mind the gap\nsecond line");
            }
            other => panic!("expected panel, got {other:?}"),
        }
    }

    #[test]
    fn panel_prefix_is_case_sensitive_and_needs_whitespace() {
        let blocks = run("info: lowercase\n\nInfo:no-space\n").unwrap();
        assert!(matches!(blocks[0], Block::Paragraph { .. }));
        assert!(matches!(blocks[1], Block::Paragraph { .. }));
    }

    #[test]
    fn indented_paragraph_after_panel_is_rejected() {
        let err = run("Info: first\n\n  second paragraph\n").unwrap_err();
        assert!(
            matches!(err, MarkupError::MultiParagraphPanel { line: 3, kind: PanelKind::Info, .. }),
            "got: {err:?}"
        );
    }

    #[test]
    fn empty_panel_is_rejected() {
        let err = run("Success: \n").unwrap_err();
        assert!(matches!(err, MarkupError::EmptyPanel { .. }), "got: {err:?}");
    }
}
