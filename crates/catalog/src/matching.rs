//! Title matching and locator derivation.
//!
//! These rules decide whether a search candidate or a resolved page belongs to an
//! item. They are deliberately string-only so the pipeline can apply them to any
//! adapter's output.

/// True when `title` contains every whitespace-separated token of `name`,
/// ignoring case. A name with no tokens never matches.
pub fn title_contains_all_tokens(title: &str, name: &str) -> bool {
    let title = title.to_lowercase();
    let mut tokens = name.split_whitespace().peekable();
    if tokens.peek().is_none() {
        return false;
    }
    tokens.all(|token| title.contains(&token.to_lowercase()))
}

/// Case-insensitive equality after trimming.
pub fn titles_equal(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// True when a fallback page title looks like a real product page.
pub fn is_product_title(title: &str) -> bool {
    let title = title.trim().to_lowercase();
    !title.is_empty() && title != "unknown product" && !title.contains("not found")
}

/// Derive a URL path segment from a product name.
///
/// Lowercases, collapses every run of non `[a-z0-9]` characters to a single `-`
/// and trims leading/trailing separators.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else {
            pending_separator = true;
        }
    }

    slug
}
