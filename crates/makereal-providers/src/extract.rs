//! Pull generated code out of a model reply.

use std::sync::LazyLock;

use regex::Regex;

/// Replies whose code is shorter than this are treated as failed generations.
pub const MIN_CODE_LEN: usize = 30;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(python|javascript)([\s\S]*?)```").expect("static code fence pattern")
});

/// Body of the first fenced python or javascript block, or the whole message
/// when there is no such block or it is empty.
///
/// The body is returned as-is, including the newline after the language tag.
pub fn extract_code(message: &str) -> &str {
    CODE_FENCE
        .captures(message)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str())
        .filter(|code| !code.is_empty())
        .unwrap_or(message)
}
