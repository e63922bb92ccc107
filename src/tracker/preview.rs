//! Bounded text previews for prompts, responses and errors.
//!
//! Previews are for observability only. Limits count Unicode scalar values, so
//! a multi-byte character is never split.

/// Maximum number of characters kept in any preview.
pub const PREVIEW_LIMIT: usize = 500;

/// Keep the first [`PREVIEW_LIMIT`] characters of `s`.
pub fn truncate(s: &str) -> String {
    truncate_to(s, PREVIEW_LIMIT)
}

/// Keep the first `max_chars` characters of `s`.
pub fn truncate_to(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

/// Incremental preview builder fed one text fragment at a time.
///
/// Stops growing once the limit is reached; later fragments are dropped.
#[derive(Debug, Clone)]
pub struct PreviewAccumulator {
    text: String,
    chars: usize,
    limit: usize,
}

impl PreviewAccumulator {
    pub fn new() -> Self {
        Self::with_limit(PREVIEW_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            limit,
        }
    }

    /// Append a fragment, keeping at most `limit` characters in total.
    pub fn push(&mut self, fragment: &str) {
        if self.is_full() {
            return;
        }
        for c in fragment.chars() {
            if self.chars == self.limit {
                break;
            }
            self.text.push(c);
            self.chars += 1;
        }
    }

    pub fn is_full(&self) -> bool {
        self.chars >= self.limit
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl Default for PreviewAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
