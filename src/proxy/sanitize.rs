//! Clean-up applied to model replies before they reach the browser.

use std::sync::LazyLock;

use regex::Regex;

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

static STRAY_GLYPHS: LazyLock<Regex> = LazyLock::new(|| Regex::new("[｜▁]").expect("static regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Strips `<...>` segments, turns tokenizer artifacts (`｜`, `▁`) into spaces,
/// collapses whitespace runs to one space, and trims.
///
/// Idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
///
/// ```
/// use multilab::proxy::sanitize;
///
/// let raw = "<think>hmm</think>  Hello▁world｜\n\n<|end|>";
/// assert_eq!(sanitize(raw), "hmm Hello world");
/// ```
pub fn sanitize(content: &str) -> String {
    let text = MARKUP.replace_all(content, "");
    let text = STRAY_GLYPHS.replace_all(&text, " ");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_owned()
}
