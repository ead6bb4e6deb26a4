//! Markup stripping for body sections.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, title").expect("heading selector is valid"));
static PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, li, pre").expect("paragraph selector is valid"));
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("body selector is valid"));

/// Text content of one body section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub paragraphs: Vec<String>,
}

impl Section {
    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    /// Paragraphs joined by blank lines.
    pub fn text(&self) -> String {
        self.paragraphs.join("\n\n")
    }
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain text of an HTML fragment, whitespace-normalized.
pub fn strip_markup(fragment: &str) -> String {
    let html = Html::parse_fragment(fragment);
    let text: String = html.root_element().text().collect();
    normalize_whitespace(&text)
}

/// Extract heading and paragraphs from a section document.
///
/// Paragraphs are `p`, `li` and `pre` elements that are not nested in one
/// another. When there are none, the body text outside `script` and `style`
/// is split on blank lines instead.
pub fn parse_section(resource_id: &str, markup: &str) -> Section {
    let document = Html::parse_document(markup);

    let heading = document
        .select(&HEADING)
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| resource_id.to_string());

    let mut paragraphs: Vec<String> = document
        .select(&PARAGRAPH)
        .filter(|el| !has_ancestor(el, &["p", "li", "pre"]))
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .collect();

    if paragraphs.is_empty() {
        let root = document
            .select(&BODY)
            .next()
            .unwrap_or_else(|| document.root_element());
        paragraphs = body_blocks(root);
    }

    Section {
        heading,
        paragraphs,
    }
}

fn has_ancestor(el: &ElementRef<'_>, names: &[&str]) -> bool {
    el.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|parent| names.contains(&parent.name()))
    })
}

fn body_blocks(root: ElementRef<'_>) -> Vec<String> {
    let mut raw = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|parent| {
            parent
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style"))
        });
        if !hidden {
            raw.push_str(text);
        }
    }

    let mut blocks = Vec::new();
    let mut current = String::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            push_block(&mut blocks, &current);
            current.clear();
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    push_block(&mut blocks, &current);
    blocks
}

fn push_block(blocks: &mut Vec<String>, raw: &str) {
    let block = normalize_whitespace(raw);
    if !block.is_empty() {
        blocks.push(block);
    }
}
