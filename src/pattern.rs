//! Compiled text patterns shared by the parsers of tool output.

use regex::Regex;

/// Compiles a pattern that is fixed at build time.
///
/// Every caller passes a literal covered by its module's tests.
#[allow(clippy::expect_used)]
pub fn fixed(pattern: &str) -> Regex {
    Regex::new(pattern).expect("fixed pattern compiles")
}
