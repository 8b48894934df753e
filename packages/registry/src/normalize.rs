//! Text normalization for municipality matching.
//!
//! Applied symmetrically to the queried name and to every registry entry,
//! so "São Paulo", "SAO PAULO" and "sao paulo" compare equal. The result
//! is only ever used for comparison, never for display.

use unicode_normalization::UnicodeNormalization as _;
use unicode_normalization::char::is_combining_mark;

/// Lowercases `input`, decomposes accented characters (NFKD) and drops
/// the combining marks.
///
/// Compatibility decomposition can surface uppercase letters (`ℌ` → `H`),
/// hence the second lowercasing pass.
#[must_use]
pub fn normalize(input: &str) -> String {
    input
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}
