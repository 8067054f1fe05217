//! Storage-format serializer.
//!
//! Walks the block tree (after the extension pass), scans inline content and
//! writes XHTML storage markup. Cross-page references whose target has no
//! remote id yet are written as placeholder tokens and collected as
//! [`UnresolvedLink`]s.

use std::path::Path;

use crate::converter::{PageResolver, UnresolvedLink};
use crate::error::MarkupError;
use crate::extensions::{BlockMacro, PanelKind, StatusColor};
use crate::inline::{parse_inlines, Inline, SourceRef};
use crate::parser::{Block, List, ListItem, Span, Table};

const PLACEHOLDER_OPEN: &str = "<ac:placeholder>junction:link:";
const PLACEHOLDER_CLOSE: &str = "</ac:placeholder>";

pub(crate) fn placeholder_token(index: usize) -> String {
    format!("{PLACEHOLDER_OPEN}{index}{PLACEHOLDER_CLOSE}")
}

/// Whether `storage` still holds any link placeholder.
pub fn has_placeholders(storage: &str) -> bool {
    storage.contains(PLACEHOLDER_OPEN)
}

/// Direct link to a page by remote id.
pub(crate) fn page_link(id: &str, text: &str) -> String {
    format!(
        "<ac:link><ri:content-entity ri:content-id=\"{}\" /><ac:link-body>{}</ac:link-body></ac:link>",
        escape_attr(id),
        escape_text(text)
    )
}

/// Body for a directory page: a page-tree macro listing its children.
pub(crate) fn children_macro() -> &'static str {
    "<ac:structured-macro ac:name=\"children\" ac:schema-version=\"2\" />"
}

pub(crate) struct StorageWriter<'a> {
    path: &'a Path,
    resolver: &'a dyn PageResolver,
    out: String,
    unresolved: Vec<UnresolvedLink>,
    next_task_id: usize,
}

impl<'a> StorageWriter<'a> {
    pub(crate) fn new(path: &'a Path, resolver: &'a dyn PageResolver) -> Self {
        Self {
            path,
            resolver,
            out: String::new(),
            unresolved: Vec::new(),
            next_task_id: 1,
        }
    }

    pub(crate) fn finish(self) -> (String, Vec<UnresolvedLink>) {
        (self.out, self.unresolved)
    }

    pub(crate) fn blocks(&mut self, blocks: &[Block]) -> Result<(), MarkupError> {
        for block in blocks {
            self.block(block)?;
        }
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result<(), MarkupError> {
        match block {
            Block::Heading { level, text } => {
                self.out.push_str(&format!("<h{level}>"));
                self.inline(text)?;
                self.out.push_str(&format!("</h{level}>"));
            }
            Block::Paragraph { text, .. } => {
                self.out.push_str("<p>");
                self.inline(text)?;
                self.out.push_str("</p>");
            }
            Block::List(list) => self.list(list)?,
            Block::Quote(inner) => {
                self.out.push_str("<blockquote>");
                self.blocks(inner)?;
                self.out.push_str("</blockquote>");
            }
            Block::Code { language, code } => self.code(language.as_deref(), code),
            Block::Table(table) => self.table(table)?,
            Block::Rule => self.out.push_str("<hr />"),
            Block::Macro(block_macro) => self.block_macro(*block_macro),
            Block::Panel { kind, body } => self.panel(*kind, body)?,
        }
        Ok(())
    }

    fn code(&mut self, language: Option<&str>, code: &str) {
        self.out
            .push_str("<ac:structured-macro ac:name=\"code\" ac:schema-version=\"1\">");
        if let Some(language) = language {
            self.out.push_str(&format!(
                "<ac:parameter ac:name=\"language\">{}</ac:parameter>",
                escape_text(language)
            ));
        }
        // CDATA cannot contain its own terminator; split it across sections.
        let body = code.replace("]]>", "]]]]><![CDATA[>");
        self.out.push_str(&format!(
            "<ac:plain-text-body><![CDATA[{body}]]></ac:plain-text-body></ac:structured-macro>"
        ));
    }

    fn block_macro(&mut self, block_macro: BlockMacro) {
        match block_macro {
            BlockMacro::Children => self.out.push_str(children_macro()),
            BlockMacro::TableOfContents => self.out.push_str(
                "<ac:structured-macro ac:name=\"toc\" ac:schema-version=\"1\" data-layout=\"default\" />",
            ),
        }
    }

    fn panel(&mut self, kind: PanelKind, body: &Span) -> Result<(), MarkupError> {
        self.out.push_str(&format!(
            "<ac:structured-macro ac:name=\"{}\" ac:schema-version=\"1\"><ac:rich-text-body><p>",
            kind.macro_name()
        ));
        self.inline(body)?;
        self.out
            .push_str("</p></ac:rich-text-body></ac:structured-macro>");
        Ok(())
    }

    fn table(&mut self, table: &Table) -> Result<(), MarkupError> {
        self.out.push_str("<table><tbody><tr>");
        for cell in &table.header {
            self.out.push_str("<th>");
            self.inline(cell)?;
            self.out.push_str("</th>");
        }
        self.out.push_str("</tr>");
        for row in &table.rows {
            self.out.push_str("<tr>");
            for cell in row {
                self.out.push_str("<td>");
                self.inline(cell)?;
                self.out.push_str("</td>");
            }
            self.out.push_str("</tr>");
        }
        self.out.push_str("</tbody></table>");
        Ok(())
    }

    fn list(&mut self, list: &List) -> Result<(), MarkupError> {
        if !list.ordered && !list.items.is_empty() && list.items.iter().all(|i| task_of(i).is_some()) {
            return self.task_list(list);
        }
        match (list.ordered, list.start) {
            (false, _) => self.out.push_str("<ul>"),
            (true, 1) => self.out.push_str("<ol>"),
            (true, start) => self.out.push_str(&format!("<ol start=\"{start}\">")),
        }
        for item in &list.items {
            self.out.push_str("<li>");
            self.item_blocks(&item.blocks)?;
            self.out.push_str("</li>");
        }
        self.out
            .push_str(if list.ordered { "</ol>" } else { "</ul>" });
        Ok(())
    }

    /// A tight item (at most one paragraph) renders its paragraph bare.
    fn item_blocks(&mut self, blocks: &[Block]) -> Result<(), MarkupError> {
        let paragraphs = blocks
            .iter()
            .filter(|b| matches!(b, Block::Paragraph { .. }))
            .count();
        for block in blocks {
            match block {
                Block::Paragraph { text, .. } if paragraphs <= 1 => self.inline(text)?,
                other => self.block(other)?,
            }
        }
        Ok(())
    }

    fn task_list(&mut self, list: &List) -> Result<(), MarkupError> {
        self.out.push_str("<ac:task-list>");
        for item in &list.items {
            let Some((done, caption)) = task_of(item) else {
                continue;
            };
            let id = self.next_task_id;
            self.next_task_id += 1;
            self.out.push_str(&format!(
                "<ac:task><ac:task-id>{id}</ac:task-id><ac:task-status>{}</ac:task-status><ac:task-body>",
                if done { "complete" } else { "incomplete" }
            ));
            self.inline(&caption)?;
            self.blocks(&item.blocks[1..])?;
            self.out.push_str("</ac:task-body></ac:task>");
        }
        self.out.push_str("</ac:task-list>");
        Ok(())
    }

    fn inline(&mut self, span: &Span) -> Result<(), MarkupError> {
        let nodes = parse_inlines(
            &span.text,
            SourceRef {
                path: self.path,
                line: span.line,
            },
        )?;
        self.inlines(&nodes);
        Ok(())
    }

    fn inlines(&mut self, nodes: &[Inline]) {
        for node in nodes {
            self.inline_node(node);
        }
    }

    fn inline_node(&mut self, node: &Inline) {
        match node {
            Inline::Text(text) => self.out.push_str(&escape_text(text)),
            Inline::Code(code) => {
                self.out.push_str("<code>");
                self.out.push_str(&escape_text(code));
                self.out.push_str("</code>");
            }
            Inline::Emphasis(inner) => self.wrap("em", inner),
            Inline::Strong(inner) => self.wrap("strong", inner),
            Inline::Subscript(text) => {
                self.out.push_str(&format!("<sub>{}</sub>", escape_text(text)))
            }
            Inline::Superscript(text) => {
                self.out.push_str(&format!("<sup>{}</sup>", escape_text(text)))
            }
            Inline::Link { text, href } => {
                self.out
                    .push_str(&format!("<a href=\"{}\">", escape_attr(href)));
                self.inlines(text);
                self.out.push_str("</a>");
            }
            Inline::AutoLink(url) => {
                let url = escape_attr(url);
                self.out.push_str(&format!("<a href=\"{url}\">{url}</a>"));
            }
            Inline::PageLink { text, title } => self.page_reference(text, title),
            Inline::Status { color, label } => self.status(*color, label),
            Inline::LineBreak => self.out.push_str("<br />"),
            Inline::EmDash => self.out.push('\u{2014}'),
        }
    }

    fn wrap(&mut self, tag: &str, inner: &[Inline]) {
        self.out.push_str(&format!("<{tag}>"));
        self.inlines(inner);
        self.out.push_str(&format!("</{tag}>"));
    }

    fn status(&mut self, color: StatusColor, label: &str) {
        self.out.push_str(&format!(
            "<ac:structured-macro ac:name=\"status\" ac:schema-version=\"1\">\
             <ac:parameter ac:name=\"title\">{}</ac:parameter>\
             <ac:parameter ac:name=\"colour\">{}</ac:parameter>\
             </ac:structured-macro>",
            escape_text(label),
            color.macro_value()
        ));
    }

    fn page_reference(&mut self, text: &str, title: &str) {
        if let Some(id) = self.resolver.lookup_page(title) {
            self.out.push_str(&page_link(&id.0, text));
            return;
        }
        let token = placeholder_token(self.unresolved.len());
        tracing::debug!(
            path = %self.path.display(),
            target = title,
            "cross-page reference deferred to second pass"
        );
        self.unresolved.push(UnresolvedLink {
            source_path: self.path.to_path_buf(),
            target_title: title.to_string(),
            display_text: text.to_string(),
            insertion_point: self.out.len(),
            token: token.clone(),
        });
        self.out.push_str(&token);
    }
}

/// `[ ] caption` / `[x] caption` as the first paragraph of a list item.
fn task_of(item: &ListItem) -> Option<(bool, Span)> {
    let Some(Block::Paragraph { text, .. }) = item.blocks.first() else {
        return None;
    };
    let (done, rest) = if let Some(rest) = text.text.strip_prefix("[ ] ") {
        (false, rest)
    } else if let Some(rest) = text
        .text
        .strip_prefix("[x] ")
        .or_else(|| text.text.strip_prefix("[X] "))
    {
        (true, rest)
    } else {
        return None;
    };
    Some((
        done,
        Span {
            line: text.line,
            text: rest.to_string(),
        },
    ))
}

pub(crate) fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
