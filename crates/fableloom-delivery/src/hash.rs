//! Content hashing for delivery idempotency.
//!
//! The hash identifies a logical content unit, not its exact rendering:
//! markup and whitespace are stripped first so that cosmetic re-renders of
//! the same step do not defeat deduplication.

use sha2::{Digest, Sha256};

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out
}

/// Removes `<...>` tag spans. An unmatched `<` is kept as-is.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('>') {
            Some(end) if end > 0 => rest = &after[end + 1..],
            _ => {
                out.push_str(&rest[start..start + 1]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Replaces markdown links `[label](url)` with their label.
fn unwrap_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('[') {
        let link = rest[start..].find(']').and_then(|close_rel| {
            let close = start + close_rel;
            let label = &rest[start + 1..close];
            if label.is_empty() || !rest[close + 1..].starts_with('(') {
                return None;
            }
            let url_start = close + 2;
            let url_end = url_start + rest[url_start..].find(')')?;
            if url_end == url_start {
                return None;
            }
            Some((label, url_end + 1))
        });
        match link {
            Some((label, resume)) => {
                out.push_str(&rest[..start]);
                out.push_str(label);
                rest = &rest[resume..];
            }
            None => {
                out.push_str(&rest[..=start]);
                rest = &rest[start + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Canonicalizes rendered text: trims, collapses whitespace, strips tags
/// and markdown decoration.
#[must_use]
pub fn normalize_content(text: &str) -> String {
    let collapsed = collapse_whitespace(text.trim());
    let untagged = strip_tags(&collapsed);
    let unlinked = unwrap_links(&untagged);
    let plain: String = unlinked
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '~'))
        .collect();
    plain.trim().to_owned()
}

/// Hex SHA-256 over the theme-scoped normalized content.
#[must_use]
pub fn content_hash(theme_id: Option<&str>, text: &str) -> String {
    let base = format!("{}:{}", theme_id.unwrap_or("none"), normalize_content(text));
    Sha256::digest(base.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
