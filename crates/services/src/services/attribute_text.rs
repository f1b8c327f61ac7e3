//! Free-text editing of list attributes.
//!
//! While a list attribute is being typed it is held as raw lines, blanks
//! included. Only at save time (and for dirty comparison) are the lines
//! reduced to clean items.

use models::attribute::{AttributeValue, Attributes};

const BULLET_MARKERS: &[char] = &['*', '-', '+', '•', '–', '·'];

/// Split the text of a list editor into raw lines.
pub fn parse_list_text(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

/// Text shown in the list editor, one item per line.
pub fn render_list_text(items: &[String]) -> String {
    items.join("\n")
}

/// Strip a leading bullet marker and surrounding white space.
pub fn clean_item(line: &str) -> &str {
    let line = line.trim();
    match line.strip_prefix(BULLET_MARKERS) {
        Some(rest) => rest.trim_start(),
        None => line,
    }
}

/// Save-time transform: strip bullets, trim, drop blank lines.
pub fn normalize_items<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    lines
        .iter()
        .map(|line| clean_item(line.as_ref()))
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn normalize_value(value: &AttributeValue) -> AttributeValue {
    match value {
        AttributeValue::Scalar(s) => AttributeValue::Scalar(s.trim().to_string()),
        AttributeValue::List(lines) => AttributeValue::List(normalize_items(lines)),
    }
}

/// Normalized copy of an attribute map; names are trimmed as well.
///
/// When two names collapse to the same trimmed name the later one wins,
/// keeping the position of the first.
pub fn normalize_attributes(attributes: &Attributes) -> Attributes {
    let mut out = Attributes::with_capacity(attributes.len());
    for (name, value) in attributes {
        out.insert(name.trim().to_string(), normalize_value(value));
    }
    out
}
