// src/extract/document.rs
use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractError;

/// A label-only element is widened to its parent only when the parent is this small
/// (label + value, optionally a unit element).
const MAX_WIDEN_CHILDREN: usize = 3;

/// Text of one labeled block, whitespace-collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub text: String,
}

/// Read-only view over a fetched detail page.
pub trait DocumentView {
    /// Text of the primary heading (the athlete's display name), if any.
    fn heading(&self) -> Option<String>;
    /// Smallest block whose text contains `keyword` (ASCII case-insensitive).
    fn find_block_containing(&self, keyword: &str) -> Option<TextBlock>;
}

/// Compiled selector for the display-name element.
#[derive(Debug, Clone)]
pub struct NameSelector(Selector);

impl NameSelector {
    pub fn compile(css: &str) -> Result<Self, ExtractError> {
        compile_selector(css).map(Self)
    }
}

pub(crate) fn compile_selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css.to_string(),
        reason: format!("{e:?}"),
    })
}

/// `DocumentView` over a parsed HTML page.
pub struct HtmlDocument {
    html: Html,
    name: NameSelector,
}

impl HtmlDocument {
    pub fn parse(raw: &str, name: &NameSelector) -> Result<Self, ExtractError> {
        if raw.trim().is_empty() {
            return Err(ExtractError::EmptyDocument);
        }
        let html = Html::parse_document(raw);
        if visible_text(html.root_element()).trim().is_empty() {
            return Err(ExtractError::NoContent);
        }
        Ok(Self {
            html,
            name: name.clone(),
        })
    }
}

impl DocumentView for HtmlDocument {
    fn heading(&self) -> Option<String> {
        self.html
            .select(&self.name.0)
            .map(|el| super::normalize_ws(&visible_text(el)))
            .find(|t| !t.is_empty())
    }

    fn find_block_containing(&self, keyword: &str) -> Option<TextBlock> {
        let needle = fold(keyword);
        if needle.is_empty() {
            return None;
        }
        let contains = |el: ElementRef<'_>| fold(&visible_text(el)).contains(&needle);

        let innermost = self
            .html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| !is_hidden_tag(el))
            .find(|el| contains(*el) && !el.children().filter_map(ElementRef::wrap).any(contains))?;

        let text = super::normalize_ws(&visible_text(innermost));
        if text.chars().any(|c| c.is_ascii_digit()) {
            return Some(TextBlock { text });
        }

        // Header cell: the value sits in the same column of the first data row.
        if innermost.value().name() == "th" {
            if let Some(cell) = column_value(innermost) {
                return Some(TextBlock {
                    text: super::normalize_ws(&format!("{text} {cell}")),
                });
            }
        }

        // Label-only element: the value usually sits in a sibling under the same parent.
        if fold(&text) != needle {
            return Some(TextBlock { text });
        }
        let widened = innermost
            .parent()
            .and_then(ElementRef::wrap)
            .filter(|p| p.children().filter_map(ElementRef::wrap).count() <= MAX_WIDEN_CHILDREN)
            .map(|p| super::normalize_ws(&visible_text(p)))
            .filter(|pt| pt.chars().any(|c| c.is_ascii_digit()));
        Some(TextBlock {
            text: widened.unwrap_or(text),
        })
    }
}

/// Whitespace-collapsed, ASCII-lowercased form used for keyword matching.
fn fold(s: &str) -> String {
    super::normalize_ws(s).to_ascii_lowercase()
}

fn is_cell(el: &ElementRef<'_>) -> bool {
    matches!(el.value().name(), "th" | "td")
}

/// Text of the `td` under header cell `th` in the first row of its table that has data cells.
fn column_value(th: ElementRef<'_>) -> Option<String> {
    let header_row = th.parent().and_then(ElementRef::wrap)?;
    let column = header_row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(is_cell)
        .position(|c| c == th)?;

    let table = th
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")?;
    let data_row = table
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "tr")
        .find(|tr| {
            tr.children()
                .filter_map(ElementRef::wrap)
                .any(|c| c.value().name() == "td")
        })?;

    data_row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(is_cell)
        .nth(column)
        .map(|cell| super::normalize_ws(&visible_text(cell)))
}

fn is_hidden_tag(el: &ElementRef<'_>) -> bool {
    matches!(el.value().name(), "script" | "style" | "noscript" | "template")
}

/// Concatenated text nodes under `el`, skipping script/style content. No separator is inserted.
pub(crate) fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        let Some(t) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(ElementRef::wrap)
            .is_some_and(|p| is_hidden_tag(&p));
        if !hidden {
            out.push_str(t);
        }
    }
    out
}

/// In-memory `DocumentView`: a heading and a list of text blocks.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocument {
    heading: Option<String>,
    blocks: Vec<String>,
}

impl InMemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heading(mut self, heading: &str) -> Self {
        self.heading = Some(heading.to_string());
        self
    }

    pub fn with_block(mut self, text: &str) -> Self {
        self.blocks.push(text.to_string());
        self
    }
}

impl DocumentView for InMemoryDocument {
    fn heading(&self) -> Option<String> {
        self.heading.clone()
    }

    fn find_block_containing(&self, keyword: &str) -> Option<TextBlock> {
        let needle = fold(keyword);
        self.blocks
            .iter()
            .find(|b| fold(b).contains(&needle))
            .map(|b| TextBlock { text: b.clone() })
    }
}
