//! Size heuristics for prompt text

/// Approximate chars per token for estimation
pub const CHARS_PER_TOKEN: usize = 4;

/// Rough token count: byte length / 4, truncating.
///
/// A size proxy, not a tokenizer. Budget decisions built on it must tolerate
/// being off by a wide margin.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / CHARS_PER_TOKEN
}

/// Cap `text` at `max_chars` characters, saying how long it was.
///
/// `keep_tail = false` keeps the head (inputs: the first lines matter most);
/// `keep_tail = true` keeps the tail (outputs: the last lines matter most).
/// Text already within the cap is returned unchanged.
pub fn truncate_with_indication(text: &str, max_chars: usize, keep_tail: bool) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    if keep_tail {
        let tail: String = text.chars().skip(total - max_chars).collect();
        format!("...(abridged from {total} chars)...{tail}")
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...(abridged from {total} chars)...")
    }
}
