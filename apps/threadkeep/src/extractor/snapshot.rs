//! `PageSource` over a captured copy of the thread page.
//!
//! The HTML is parsed once with html5ever and reduced to owned post nodes, so
//! the snapshot can be shared across tasks.

use std::rc::Rc;

use async_trait::async_trait;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use reqwest::Url;

use super::{ExtractionError, PageSource, PostNode};

const LOADING_LABEL: &str = "Loading more items in conversation";
const POST_TEST_ID: &str = "tweet";
const POST_TEXT_TEST_ID: &str = "tweetText";
const CONTENT_IMAGE_ALT: &str = "Image";

/// Elements whose boundaries start a new line in rendered text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "tr", "ul",
];

#[derive(Debug, Clone, Default)]
pub struct HtmlSnapshot {
    has_body: bool,
    loading: bool,
    posts: Vec<PostNode>,
}

impl HtmlSnapshot {
    /// Parses `html`. Relative image sources are resolved against `base_url`.
    pub fn parse(html: &str, base_url: Option<&str>) -> Result<Self, ExtractionError> {
        let base = base_url
            .map(|b| {
                Url::parse(b).map_err(|e| {
                    ExtractionError::PageStructure(format!("invalid base URL {b:?}: {e}"))
                })
            })
            .transpose()?;

        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html.as_bytes())
            .map_err(|e| ExtractionError::PageStructure(format!("unreadable HTML: {e}")))?;

        let mut snapshot = HtmlSnapshot::default();
        snapshot.visit(&dom.document, base.as_ref());
        Ok(snapshot)
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    fn visit(&mut self, node: &Handle, base: Option<&Url>) {
        if let NodeData::Element { ref name, .. } = node.data {
            if name.local.as_ref() == "body" {
                self.has_body = true;
            }
            if attr(node, "aria-label").as_deref() == Some(LOADING_LABEL) {
                self.loading = true;
            }
            if attr(node, "data-testid").as_deref() == Some(POST_TEST_ID) {
                self.posts.push(read_post(node, base));
            }
        }

        for child in node.children.borrow().iter() {
            self.visit(child, base);
        }
    }
}

#[async_trait]
impl PageSource for HtmlSnapshot {
    async fn is_loading(&self) -> bool {
        self.loading
    }

    /// A snapshot never changes after capture.
    fn is_live(&self) -> bool {
        false
    }

    async fn post_nodes(&self) -> Result<Vec<PostNode>, ExtractionError> {
        if !self.has_body {
            return Err(ExtractionError::PageStructure(
                "document has no body".to_string(),
            ));
        }
        Ok(self.posts.clone())
    }
}

fn read_post(post: &Handle, base: Option<&Url>) -> PostNode {
    let text = find_first(post, &|n| attr(n, "data-testid").as_deref() == Some(POST_TEXT_TEST_ID))
        .map(|n| inner_text(&n))
        .filter(|t| !t.is_empty());

    let mut images = Vec::new();
    collect_all(
        post,
        &|n| is_element(n, "img") && attr(n, "alt").as_deref() == Some(CONTENT_IMAGE_ALT),
        &mut images,
    );
    let image_sources = images
        .iter()
        .filter_map(|img| attr(img, "src"))
        .filter(|src| !src.trim().is_empty())
        .map(|src| resolve(base, src.trim()))
        .collect();

    PostNode {
        text,
        image_sources,
    }
}

fn resolve(base: Option<&Url>, src: &str) -> String {
    match base {
        Some(base) => base
            .join(src)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| src.to_string()),
        None => src.to_string(),
    }
}

fn attr(node: &Handle, name: &str) -> Option<String> {
    match node.data {
        NodeData::Element { ref attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| a.name.local.as_ref() == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

fn is_element(node: &Handle, tag: &str) -> bool {
    matches!(node.data, NodeData::Element { ref name, .. } if name.local.as_ref() == tag)
}

/// First descendant of `node` (excluding itself) matching `pred`, in document order.
fn find_first(node: &Handle, pred: &dyn Fn(&Handle) -> bool) -> Option<Handle> {
    for child in node.children.borrow().iter() {
        if pred(child) {
            return Some(Rc::clone(child));
        }
        if let Some(found) = find_first(child, pred) {
            return Some(found);
        }
    }
    None
}

fn collect_all(node: &Handle, pred: &dyn Fn(&Handle) -> bool, out: &mut Vec<Handle>) {
    for child in node.children.borrow().iter() {
        if pred(child) {
            out.push(Rc::clone(child));
        }
        collect_all(child, pred, out);
    }
}

/// Rendered text of `node`, approximating `innerText`.
fn inner_text(node: &Handle) -> String {
    let mut raw = String::new();
    push_text(node, &mut raw);
    normalize_text(&raw)
}

fn push_text(node: &Handle, out: &mut String) {
    match node.data {
        NodeData::Text { ref contents } => out.push_str(&contents.borrow()),
        NodeData::Element { ref name, .. } => {
            let tag = name.local.as_ref();
            match tag {
                "br" => {
                    out.push('\n');
                    return;
                }
                "script" | "style" | "template" => return,
                _ => {}
            }
            let block = BLOCK_TAGS.contains(&tag);
            if block {
                soft_break(out);
            }
            for child in node.children.borrow().iter() {
                push_text(child, out);
            }
            if block {
                soft_break(out);
            }
        }
        _ => {
            for child in node.children.borrow().iter() {
                push_text(child, out);
            }
        }
    }
}

fn soft_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Collapses whitespace within each line and drops leading and trailing blank lines.
fn normalize_text(raw: &str) -> String {
    let lines: Vec<String> = raw
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}
