//! `{{name}}` placeholder scanning.

use std::ops::Range;

/// A `{{name}}` token found in a piece of text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placeholder {
    /// Trimmed variable name between the braces.
    pub name: String,
    /// Byte range of the whole token, braces included.
    pub range: Range<usize>,
}

/// Returns every placeholder token in `text`, in order of appearance.
///
/// A token is `{{`, a non-blank name without braces or line breaks, and `}}`.
/// Anything else (unbalanced braces, `{{}}`, tokens spanning lines) is left
/// for the caller to treat as literal text.
#[must_use]
pub fn scan_placeholders(text: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find("{{") {
        let open = cursor + offset;
        let inner_start = open + 2;
        let Some(close_offset) = text[inner_start..].find("}}") else {
            break;
        };
        let inner = &text[inner_start..inner_start + close_offset];

        if inner.contains(['{', '}', '\n', '\r']) {
            // `{{{name}}` and friends: retry from the next brace
            cursor = open + 1;
            continue;
        }

        let name = inner.trim();
        if name.is_empty() {
            cursor = inner_start;
            continue;
        }

        let end = inner_start + close_offset + 2;
        found.push(Placeholder {
            name: name.to_owned(),
            range: open..end,
        });
        cursor = end;
    }

    found
}

/// Formats the canonical placeholder token for `name`.
#[must_use]
pub fn token(name: &str) -> String {
    format!("{{{{{name}}}}}")
}
