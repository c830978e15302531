//! Stripping model control markup from responses
//!
//! Some local models answer with channel-tagged transcripts such as
//! `<|channel|>analysis<|message|>...<|end|><|start|>assistant<|channel|>final<|message|>...`.
//! Strategies are tried in order; the first that yields text wins.

use regex::Regex;
use std::sync::OnceLock;

type Strategy = fn(&str) -> Option<String>;

/// Extraction strategies, most specific first
const STRATEGIES: &[(&str, Strategy)] = &[
    ("final_channel", final_channel),
    ("strip_control_tokens", strip_control_tokens),
];

fn final_channel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<\|channel\|>final<\|message\|>(.*?)(?:<\|end\|>|$)")
            .expect("final channel regex")
    })
}

fn control_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<\|[^>]+\|>").expect("control token regex"))
}

/// Content of the `final` channel, if the response has one
fn final_channel(response: &str) -> Option<String> {
    final_channel_re()
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Remove every `<|...|>` token. Declines if that throws away more than half
/// the text, since then the tokens were probably not the only markup.
fn strip_control_tokens(response: &str) -> Option<String> {
    let stripped = control_token_re().replace_all(response, "");
    let stripped = stripped.trim();
    if stripped.len() * 2 < response.len() {
        return None;
    }
    Some(stripped.to_string())
}

/// Best-effort plain text of a model response
pub fn clean_response(response: &str) -> String {
    if response.is_empty() {
        return String::new();
    }
    for (name, strategy) in STRATEGIES {
        if let Some(text) = strategy(response) {
            crate::logging::debug(&format!("response cleaned with {name}"));
            return text;
        }
    }
    response.trim().to_string()
}
