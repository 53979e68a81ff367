//! Site slug derivation.

/// Derive a stable, URL-safe slug from a display name.
///
/// camelCase boundaries become separators, everything is lowercased, and
/// each run of non-alphanumeric characters collapses into a single `-`.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev: Option<char> = None;
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_alphanumeric() {
            let camel_break = c.is_uppercase()
                && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit());
            if (pending_dash || camel_break) && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
        prev = Some(c);
    }

    out
}
