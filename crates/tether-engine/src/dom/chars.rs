//! Character-offset helpers.
//!
//! All offsets in the anchoring engine are counts of Unicode scalar values,
//! not bytes, because they describe positions inside rendered text. These
//! helpers keep the char/byte conversion in one place.

/// Number of chars in `s`.
pub(crate) fn len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of char index `at`, saturating at the end of the string.
pub(crate) fn byte_at(s: &str, at: usize) -> usize {
    s.char_indices().nth(at).map(|(b, _)| b).unwrap_or(s.len())
}

/// Substring between char indices `[start, end)`.
pub(crate) fn slice(s: &str, start: usize, end: usize) -> &str {
    &s[byte_at(s, start)..byte_at(s, end)]
}

/// Substring from char index `start` to the end.
pub(crate) fn slice_from(s: &str, start: usize) -> &str {
    &s[byte_at(s, start)..]
}

/// Char index of the first occurrence of `needle`.
pub(crate) fn index_of(s: &str, needle: &str) -> Option<usize> {
    s.find(needle).map(|b| len(&s[..b]))
}

/// Char indices of every occurrence of `needle`, overlapping occurrences
/// included (each search resumes one char after the previous hit).
pub(crate) fn indices_of(s: &str, needle: &str) -> Vec<usize> {
    let mut found = Vec::new();
    if needle.is_empty() {
        return found;
    }
    let mut from = 0usize;
    while let Some(rel) = slice_from(s, from).find(needle) {
        let at = from + len(&slice_from(s, from)[..rel]);
        found.push(at);
        from = at + 1;
    }
    found
}
