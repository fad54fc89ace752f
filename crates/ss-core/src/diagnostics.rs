//! Markup dumps for selector maintenance
//!
//! When the container or the like count cannot be found, the monitor logs
//! what the page does contain so the selector lists can be updated.

use std::collections::BTreeSet;

use log::{info, warn};

use crate::dom::{Element, Page, Scope};
use crate::extract::active_renderer;
use crate::TAG;

/// Elements mentioning "like" in their id or accessible label.
pub const LIKE_RELATED_SELECTOR: &str = "[id*=\"like\" i], [aria-label*=\"like\" i]";

/// Like button containers anywhere in the document.
pub const LIKE_BUTTON_SELECTOR: &str = "[id=\"like-button\"]";

const TEXT_LIMIT: usize = 120;
const HTML_LIMIT: usize = 200;
const DOCUMENT_HTML_LIMIT: usize = 300;

/// Summary of one like-related element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSummary {
    pub tag: String,
    pub id: String,
    pub aria_label: Option<String>,
    pub text: String,
    pub child_count: usize,
    pub outer_html: String,
}

/// Like-button diagnostics for the current item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeReport {
    pub scope: String,
    /// `None` when no renderer was found
    pub renderer_active: Option<bool>,
    pub like_related: Vec<ElementSummary>,
    /// Document-wide like buttons, collected only when the scope was a renderer
    pub document_buttons: Vec<ElementSummary>,
}

/// Sorted, de-duplicated custom element tags (names containing `-`).
pub fn custom_element_tags<P: Page>(page: &P) -> Vec<String> {
    page.query_all("*")
        .iter()
        .map(|element| element.tag_name().to_ascii_lowercase())
        .filter(|tag| tag.contains('-'))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Log the custom elements present after container discovery gave up.
pub fn dump_page<P: Page>(page: &P) {
    let tags = custom_element_tags(page);
    info!("{TAG} DIAG custom elements: {}", tags.join(", "));
}

/// Collect like-button diagnostics.
pub fn like_report<P: Page>(page: &P) -> LikeReport {
    let renderer = active_renderer(page);
    let scope = match &renderer {
        Some(renderer) => Scope::Within(renderer),
        None => Scope::Document,
    };

    let like_related = scope
        .query_all(page, LIKE_RELATED_SELECTOR)
        .iter()
        .map(|element| summarize(element, HTML_LIMIT))
        .collect();

    let document_buttons = if renderer.is_some() {
        page.query_all(LIKE_BUTTON_SELECTOR)
            .iter()
            .map(|element| summarize(element, DOCUMENT_HTML_LIMIT))
            .collect()
    } else {
        Vec::new()
    };

    LikeReport {
        scope: scope.describe(),
        renderer_active: renderer.as_ref().map(|r| r.has_attribute("is-active")),
        like_related,
        document_buttons,
    }
}

/// Log like-button diagnostics after a poll timed out.
pub fn dump_like_button<P: Page>(page: &P) {
    for line in report_lines(&like_report(page)) {
        warn!("{TAG} DIAG {}", line);
    }
}

/// Log lines for a like report, without the tag prefix.
pub fn report_lines(report: &LikeReport) -> Vec<String> {
    let mut lines = vec![
        format!("scope: {}", report.scope),
        format!("renderer [is-active]? {:?}", report.renderer_active),
        format!("like-related elements: {}", report.like_related.len()),
    ];
    for (i, element) in report.like_related.iter().enumerate() {
        lines.push(format!("[{}] {:?}", i, element));
    }

    if report.renderer_active.is_some() {
        lines.push(format!("#like-button elements in full document: {}", report.document_buttons.len()));
        for (i, element) in report.document_buttons.iter().enumerate() {
            lines.push(format!("doc-like [{}] {:?}", i, element));
        }
    }
    lines
}

fn summarize<E: Element>(element: &E, html_limit: usize) -> ElementSummary {
    let id = element.id();
    ElementSummary {
        tag: element.tag_name().to_ascii_lowercase(),
        id: if id.is_empty() { "(none)".to_string() } else { id },
        aria_label: element.attribute("aria-label"),
        text: truncate(&element.text_content(), TEXT_LIMIT).trim().to_string(),
        child_count: element.child_count(),
        outer_html: truncate(&element.outer_html(), html_limit).to_string(),
    }
}

/// First `limit` characters of `s`.
fn truncate(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}
