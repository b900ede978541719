//! Letters, words and the shortlex reduction ordering.

use std::cmp::Ordering;

/// The type for a letter of an alphabet.
///
/// Letters are plain integers; an alphabet of size up to 2^16 is
/// supported at this level, engines may impose tighter bounds
/// (the Knuth-Bendix rewriter encodes letters as single bytes).
pub type Letter = u16;

/// The type for a word over an alphabet, a finite sequence of letters.
pub type Word = Vec<Letter>;

/// Compare two words with respect to the shortlex ordering: shorter words
/// come first, words of equal length are compared lexicographically by
/// their letter values.
///
/// This is a reduction ordering: it is well-founded and compatible with
/// concatenation on both sides, and so can be used to orient rewriting
/// rules.
pub fn shortlex_compare(u: &[Letter], v: &[Letter]) -> Ordering {
    u.len().cmp(&v.len()).then_with(|| u.cmp(v))
}

/// Returns `true` if `u` is strictly greater than `v` in shortlex order.
pub fn shortlex_greater(u: &[Letter], v: &[Letter]) -> bool {
    shortlex_compare(u, v) == Ordering::Greater
}

/// Converts a string to a word, one letter per byte.
///
/// Intended for concise construction of words over human-readable
/// alphabets, in tests and examples:
/// ```
/// use semigroups::words;
/// assert_eq!(words::from_str("aba"), vec![97, 98, 97]);
/// ```
pub fn from_str(s: &str) -> Word {
    s.bytes().map(Letter::from).collect()
}

/// Converts a word back to a string, one byte per letter.
///
/// Letters above 255 are rendered as `<n>`.
pub fn to_display_string(w: &[Letter]) -> String {
    let mut out = String::with_capacity(w.len());
    for &a in w {
        if a < 256 {
            out.push(a as u8 as char);
        } else {
            out.push_str(&format!("<{}>", a));
        }
    }
    out
}

/// Replaces every non-overlapping occurrence of `from` in `w` by `to`,
/// scanning left to right.
pub(crate) fn replace_factor(w: &[Letter], from: &[Letter], to: &[Letter]) -> Word {
    let mut out = Word::with_capacity(w.len());
    let mut i = 0;
    while i < w.len() {
        if i + from.len() <= w.len() && !from.is_empty() && &w[i..i + from.len()] == from {
            out.extend_from_slice(to);
            i += from.len();
        } else {
            out.push(w[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortlex() {
        assert_eq!(shortlex_compare(&[], &[0]), Ordering::Less);
        assert_eq!(shortlex_compare(&[1], &[0, 0]), Ordering::Less);
        assert_eq!(shortlex_compare(&[1, 0], &[0, 1]), Ordering::Greater);
        assert_eq!(shortlex_compare(&[0, 1], &[0, 1]), Ordering::Equal);
        assert!(shortlex_greater(&[0, 0], &[1]));
    }

    #[test]
    fn factors() {
        let w = from_str("abcabc");
        assert_eq!(
            replace_factor(&w, &from_str("bc"), &from_str("x")),
            from_str("axax")
        );
        assert_eq!(replace_factor(&w, &from_str("cc"), &from_str("x")), w);
    }
}
