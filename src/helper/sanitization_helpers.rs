use std::collections::{HashMap, HashSet};

/// Tags that survive sanitizing of article body fragments.
pub const ALLOWED_BODY_TAGS: [&str; 3] = ["strong", "em", "br"];

/// Keeps only `<strong>`, `<em>` and `<br>`; every other tag and every attribute
/// is dropped, `script`/`style` content and comments are removed, text is escaped.
/// The result is stable under repeated application.
pub fn sanitize_body_html(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let tags: HashSet<&str> = ALLOWED_BODY_TAGS.iter().copied().collect();
    ammonia::Builder::new()
        .tags(tags)
        .tag_attributes(HashMap::new())
        .generic_attributes(HashSet::new())
        .link_rel(None)
        .strip_comments(true)
        .clean(input)
        .to_string()
}

/// Strips all HTML tags from input (for titles, excerpts, names and comments).
/// Entities are decoded afterwards so plain-text fields don't double-escape on render.
pub fn strip_all_html(input: &str) -> String {
    let cleaned = ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string();
    html_escape::decode_html_entities(&cleaned).trim().to_string()
}

/// Removes tags without touching entities. Used for measuring visible text.
pub fn visible_text(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}
