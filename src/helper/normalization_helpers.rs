//! Turns raw channel posts (messaging-app markdown) into article body text.
//!
//! The upstream posts are inconsistently formatted. Header and footer detection
//! is a heuristic over the shapes seen in practice, not a strict grammar.

use crate::models::Category;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Only this many leading lines are inspected for a header block.
const HEADER_SCAN_LINES: usize = 20;

/// Footer lines longer than this are treated as content even when they mention a handle.
const MAX_FOOTER_LINE_CHARS: usize = 80;

static RE_LEADING_EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:[\p{Extended_Pictographic}\x{FE0F}\x{200D}\x{20E3}\x{1F1E6}-\x{1F1FF}\x{1F3FB}-\x{1F3FF}][ \t]*)+").unwrap()
});
static RE_BOLD_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*[^*\n]{1,40}\*\*\s*[:：]").unwrap());
static RE_LABEL_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([^:：]{1,40}?)\s*[:：]\s*(.*)$").unwrap());
static RE_WHOLLY_EMPHASIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\*\*(.+)\*\*|__(.+)__)$").unwrap());
static RE_HASHTAGS_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:#[\p{L}\p{N}_]+[\s,،]*)+$").unwrap());
static RE_HASHTAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#([\p{L}\p{N}_]+)").unwrap());

static RE_HANDLE_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:@[\w.]+[\s|,،]*)+$").unwrap());
static RE_LINK_TO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:link to|رابط)").unwrap());
static RE_CHANNEL_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:https?://)?(?:t\.me|telegram\.me)/\S+").unwrap());
static RE_HANDLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@[\w.]{3,}").unwrap());

static RE_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static RE_DOUBLE_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__(.+?)__").unwrap());
static RE_SINGLE_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(^|[^\w])_([^_\n]+?)_($|[^\w])").unwrap());
static RE_EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Values announced in a post's header block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostHeader {
    pub title: Option<String>,
    pub category: Option<Category>,
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedPost {
    pub header: PostHeader,
    pub body: String,
}

enum HeaderField {
    Title,
    Category,
    Countries,
    Other,
}

fn header_field(label: &str) -> HeaderField {
    match label.trim().to_lowercase().as_str() {
        "title" | "headline" | "العنوان" => HeaderField::Title,
        "category" | "section" | "التصنيف" | "القسم" => HeaderField::Category,
        "country" | "countries" | "الدولة" | "الدول" | "البلد" => HeaderField::Countries,
        _ => HeaderField::Other,
    }
}

fn strip_leading_emoji(line: &str) -> &str {
    match RE_LEADING_EMOJI.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

fn without_markers(text: &str) -> String {
    text.replace("**", "").replace("__", "")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c| c == ',' || c == '،' || c == '/' || c == '|')
        .map(|s| s.trim().trim_start_matches('#').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Records a header line into `header` and returns true, or returns false if the
/// line is not header-shaped.
fn absorb_header_line(line: &str, header: &mut PostHeader) -> bool {
    let trimmed = line.trim();
    let led_by_emoji = RE_LEADING_EMOJI.is_match(trimmed) && !strip_leading_emoji(trimmed).is_empty();
    let rest = strip_leading_emoji(trimmed).trim();
    if rest.is_empty() {
        // decoration-only line
        return true;
    }

    let bare = without_markers(rest);
    let labelled = RE_BOLD_LABEL.is_match(rest)
        || RE_LABEL_VALUE
            .captures(&bare)
            .map_or(false, |caps| !matches!(header_field(&caps[1]), HeaderField::Other));

    if labelled {
        if let Some(caps) = RE_LABEL_VALUE.captures(&bare) {
            let value = caps[2].trim();
            match header_field(&caps[1]) {
                HeaderField::Title => {
                    if !value.is_empty() {
                        header.title = Some(value.to_string());
                    }
                }
                HeaderField::Category => {
                    if header.category.is_none() {
                        header.category = Category::parse_label(value);
                    }
                }
                HeaderField::Countries => header.countries.extend(split_list(value)),
                HeaderField::Other => {}
            }
        }
        return true;
    }

    if RE_HASHTAGS_ONLY.is_match(rest) {
        for caps in RE_HASHTAG.captures_iter(rest) {
            if header.category.is_none() {
                header.category = Category::parse_label(&caps[1]);
            }
        }
        return true;
    }

    if led_by_emoji {
        if let Some(caps) = RE_WHOLLY_EMPHASIZED.captures(rest) {
            if header.title.is_none() {
                let inner = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().trim());
                header.title = inner.filter(|t| !t.is_empty()).map(|t| t.to_string());
            }
            return true;
        }
    }

    false
}

fn is_footer_line(line: &str) -> bool {
    let bare = without_markers(strip_leading_emoji(line.trim()).trim());
    let bare = bare.trim();
    if bare.is_empty() {
        return true;
    }
    if RE_HANDLE_ONLY.is_match(bare) || RE_LINK_TO.is_match(bare) {
        return true;
    }
    if RE_CHANNEL_LINK.find(bare).map_or(false, |m| m.as_str().len() == bare.len()) {
        return true;
    }
    bare.chars().count() <= MAX_FOOTER_LINE_CHARS
        && (RE_HANDLE.is_match(bare) || RE_CHANNEL_LINK.is_match(bare))
}

fn convert_emphasis(text: &str) -> String {
    let bolded = RE_BOLD.replace_all(text, "<strong>$1</strong>");
    let mut out = RE_DOUBLE_UNDERSCORE
        .replace_all(&bolded, "<em>$1</em>")
        .into_owned();

    // Adjacent italics share a boundary character, so repeat until nothing matches.
    loop {
        let next = RE_SINGLE_UNDERSCORE
            .replace_all(&out, "${1}<em>${2}</em>${3}")
            .into_owned();
        if next == out {
            break;
        }
        out = next;
    }

    // Unpaired markers are noise.
    loop {
        let next = out.replace("**", "").replace("__", "");
        if next == out {
            break;
        }
        out = next;
    }
    out
}

/// Splits a raw post into its header values and its normalized body.
pub fn parse_post(raw: &str) -> ParsedPost {
    let text = raw
        .replace('\u{FFFD}', "")
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    if text.trim().is_empty() {
        return ParsedPost::default();
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut header = PostHeader::default();
    let mut start = 0;
    for (i, line) in lines.iter().enumerate().take(HEADER_SCAN_LINES) {
        if line.trim().is_empty() {
            continue;
        }
        if absorb_header_line(line, &mut header) {
            start = i + 1;
        } else {
            break;
        }
    }

    let mut body_lines: Vec<&str> = lines[start..].to_vec();
    while body_lines.last().map_or(false, |line| is_footer_line(line)) {
        body_lines.pop();
    }

    let cleaned: Vec<&str> = body_lines
        .iter()
        .map(|line| strip_leading_emoji(line).trim_end())
        .collect();
    let converted = convert_emphasis(&cleaned.join("\n"));
    let body = RE_EXCESS_NEWLINES
        .replace_all(&converted, "\n\n")
        .trim()
        .to_string();

    ParsedPost { header, body }
}

/// Normalized article body for a raw post. Empty input gives an empty string.
pub fn normalize_post(raw: &str) -> String {
    parse_post(raw).body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_category_header_and_converts_bold() {
        let out = normalize_post("**Category**: Military\n\n**Bold** text here.");
        assert_eq!(out, "<strong>Bold</strong> text here.");
    }

    #[test]
    fn empty_and_tiny_inputs() {
        assert_eq!(normalize_post(""), "");
        assert_eq!(normalize_post("\u{FFFD}"), "");
        assert_eq!(normalize_post("a"), "a");
        assert_eq!(normalize_post("\n\n\n"), "");
    }

    #[test]
    fn no_header_keeps_first_line() {
        let out = normalize_post("First line of news.\nSecond line.");
        assert_eq!(out, "First line of news.\nSecond line.");
    }

    #[test]
    fn header_values_are_captured() {
        let parsed = parse_post(
            "🔴 **Convoy hit near the border**\n**Category**: Military\n**Country**: Syria, Iraq\n\nBody starts here.",
        );
        assert_eq!(parsed.header.title.as_deref(), Some("Convoy hit near the border"));
        assert_eq!(parsed.header.category, Some(Category::Military));
        assert_eq!(parsed.header.countries, vec!["Syria".to_string(), "Iraq".to_string()]);
        assert_eq!(parsed.body, "Body starts here.");
    }

    #[test]
    fn arabic_labels_are_headers() {
        let parsed = parse_post("التصنيف: سياسي\nالدولة: لبنان\n\nنص الخبر.");
        assert_eq!(parsed.header.category, Some(Category::Political));
        assert_eq!(parsed.header.countries, vec!["لبنان".to_string()]);
        assert_eq!(parsed.body, "نص الخبر.");
    }

    #[test]
    fn italics_are_converted() {
        assert_eq!(normalize_post("a __soft__ word"), "a <em>soft</em> word");
        assert_eq!(normalize_post("an _aside_ here"), "an <em>aside</em> here");
        assert_eq!(normalize_post("snake_case_name stays"), "snake_case_name stays");
    }

    #[test]
    fn stray_markers_are_removed() {
        for raw in ["odd ** marker", "***", "_**_", "__ unbalanced", "****x"] {
            let out = normalize_post(raw);
            assert!(!out.contains("**"), "{:?} -> {:?}", raw, out);
            assert!(!out.contains("__"), "{:?} -> {:?}", raw, out);
        }
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(normalize_post("one\n\n\n\n\ntwo"), "one\n\ntwo");
    }

    #[test]
    fn strips_footer_signature() {
        let raw = "Report body.\n\nMore detail.\n\n@newschannel\nLink to the channel: https://t.me/newschannel\n";
        assert_eq!(normalize_post(raw), "Report body.\n\nMore detail.");
    }

    #[test]
    fn strips_leading_decorative_emoji() {
        assert_eq!(normalize_post("Intro.\n📌 Key point"), "Intro.\nKey point");
    }

    #[test]
    fn removes_replacement_characters() {
        assert_eq!(normalize_post("bro\u{FFFD}ken text"), "broken text");
    }
}
