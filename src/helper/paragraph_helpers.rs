use crate::helper::sanitization_helpers::{sanitize_body_html, visible_text};
use crate::helper::normalization_helpers::normalize_post;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Bold-only paragraphs at or above this many visible characters are body text.
const MAX_HEADING_CHARS: usize = 80;

static RE_BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());
static RE_NUMBERED_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[IVXLCDM]+[.)\-]|\d+[.)])\s+\S").unwrap());
static RE_FOOTER_RESIDUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:@[\w.]+|link to|رابط)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParagraphKind {
    Heading,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paragraph {
    pub kind: ParagraphKind,
    pub text: String,
}

/// A sanitized block ready to be placed inside a heading or paragraph element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedBlock {
    pub kind: ParagraphKind,
    pub html: String,
}

pub fn split_paragraphs(normalized: &str) -> Vec<String> {
    RE_BLANK_LINE
        .split(normalized)
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

fn is_wholly_strong(paragraph: &str) -> bool {
    paragraph.starts_with("<strong>")
        && paragraph.ends_with("</strong>")
        && paragraph.find("</strong>") == Some(paragraph.len() - "</strong>".len())
}

/// `None` means the paragraph is signature residue and should not be rendered.
pub fn classify_paragraph(paragraph: &str) -> Option<ParagraphKind> {
    let text = visible_text(paragraph);
    let text = text.trim();

    if RE_FOOTER_RESIDUE.is_match(text) {
        return None;
    }
    if RE_NUMBERED_HEADING.is_match(text) {
        return Some(ParagraphKind::Heading);
    }
    if is_wholly_strong(paragraph.trim()) && text.chars().count() < MAX_HEADING_CHARS {
        return Some(ParagraphKind::Heading);
    }
    Some(ParagraphKind::Body)
}

pub fn classify(normalized: &str) -> Vec<Paragraph> {
    split_paragraphs(normalized)
        .into_iter()
        .filter_map(|text| classify_paragraph(&text).map(|kind| Paragraph { kind, text }))
        .collect()
}

/// Classifies already-normalized content and sanitizes each block.
/// Single line breaks inside a block become `<br>`.
pub fn render_normalized(normalized: &str) -> Vec<RenderedBlock> {
    classify(normalized)
        .into_iter()
        .filter_map(|p| {
            let html = sanitize_body_html(&p.text.replace('\n', "<br>"));
            if html.trim().is_empty() {
                None
            } else {
                Some(RenderedBlock { kind: p.kind, html })
            }
        })
        .collect()
}

/// Full pipeline from a raw channel post: normalize, classify, sanitize.
pub fn render_article_body(raw: &str) -> Vec<RenderedBlock> {
    render_normalized(&normalize_post(raw))
}
