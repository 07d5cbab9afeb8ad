//! Intent classification.
//!
//! The intent is a routing key only. Unknown hint strings pass through and
//! simply match no built-in heuristic.

use regex::Regex;
use std::sync::LazyLock;

use modelmux_types::protocol::openai::user_text;
use modelmux_types::protocol::ChatMessage;

pub const INTENT_CODE: &str = "code";
pub const INTENT_LONG: &str = "long";
pub const INTENT_TRANSLATE: &str = "translate";
pub const INTENT_SUMMARIZE: &str = "summarize";
pub const INTENT_VISION: &str = "vision";
pub const INTENT_AUDIO: &str = "audio";
pub const INTENT_DEFAULT: &str = "default";

/// Texts longer than this many characters classify as `long`.
pub const LONG_TEXT_CHARS: usize = 1800;

#[allow(clippy::expect_used, reason = "Static regex literals are verified by tests")]
static TRANSLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(translate|translation|translating)\b|\b(into|to) (english|french|spanish|german|italian|portuguese|chinese|japanese|korean|russian|ukrainian|arabic)\b",
    )
    .expect("translate regex")
});

#[allow(clippy::expect_used, reason = "Static regex literals are verified by tests")]
static SUMMARIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(summari[sz]e|summari[sz]ing|summary|tl;?dr|recap|key takeaways)\b")
        .expect("summarize regex")
});

#[allow(clippy::expect_used, reason = "Static regex literals are verified by tests")]
static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"```",
        r"|traceback \(most recent call last\)|exception in thread|panicked at|stack ?trace|segmentation fault",
        r"|\bat [\w.$]+\([\w]+\.(java|kt|scala):\d+\)",
        r"|\b(kubectl|helm|docker|npm|pip|cargo|git|sudo|apt-get|brew|bash)\b",
        r"|\b(select\b.+\bfrom|insert into|create table|alter table)\b",
        r"|\b(python|javascript|typescript|rust|golang|java|kotlin|swift|ruby|php)\b|c\+\+",
    ))
    .expect("code regex")
});

/// Signals extracted from the message list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentSignals {
    /// Concatenated user-role text
    pub text: String,
    pub has_image: bool,
    pub has_audio: bool,
}

impl IntentSignals {
    pub fn from_messages(messages: &[ChatMessage]) -> Self {
        Self {
            text: user_text(messages),
            has_image: messages.iter().any(ChatMessage::has_image),
            has_audio: messages.iter().any(ChatMessage::has_audio),
        }
    }
}

/// Map a caller hint onto a known intent, or pass it through verbatim.
///
/// Returns `None` for an empty hint.
pub fn normalize_hint(hint: &str) -> Option<String> {
    let trimmed = hint.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mapped = match trimmed.to_ascii_lowercase().as_str() {
        "vision" | "image" => INTENT_VISION,
        "audio" | "speech" => INTENT_AUDIO,
        "translate" | "translate/summarize" => INTENT_TRANSLATE,
        "summarize" | "summary" => INTENT_SUMMARIZE,
        "code" | "code/long" => INTENT_CODE,
        "long" => INTENT_LONG,
        "default" | "auto" => INTENT_DEFAULT,
        _ => return Some(trimmed.to_string()),
    };
    Some(mapped.to_string())
}

/// Classify a request. First match wins: hint, attachments, keywords, length.
pub fn classify(signals: &IntentSignals, hint: Option<&str>) -> String {
    if let Some(intent) = hint.and_then(normalize_hint) {
        return intent;
    }
    if signals.has_image {
        return INTENT_VISION.to_string();
    }
    if signals.has_audio {
        return INTENT_AUDIO.to_string();
    }

    let lowered = signals.text.to_lowercase();
    if TRANSLATE_RE.is_match(&lowered) {
        return INTENT_TRANSLATE.to_string();
    }
    if SUMMARIZE_RE.is_match(&lowered) {
        return INTENT_SUMMARIZE.to_string();
    }
    if CODE_RE.is_match(&lowered) {
        return INTENT_CODE.to_string();
    }
    if signals.text.chars().count() > LONG_TEXT_CHARS {
        return INTENT_LONG.to_string();
    }
    INTENT_DEFAULT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(t: &str) -> IntentSignals {
        IntentSignals { text: t.to_string(), ..Default::default() }
    }

    #[test]
    fn test_hint_normalization_table() {
        assert_eq!(normalize_hint("Image").as_deref(), Some("vision"));
        assert_eq!(normalize_hint("speech").as_deref(), Some("audio"));
        assert_eq!(normalize_hint("summary").as_deref(), Some("summarize"));
        assert_eq!(normalize_hint("code/long").as_deref(), Some("code"));
        assert_eq!(normalize_hint("translate/summarize").as_deref(), Some("translate"));
        assert_eq!(normalize_hint("auto").as_deref(), Some("default"));
        assert_eq!(normalize_hint("legal-review").as_deref(), Some("legal-review"));
        assert_eq!(normalize_hint("   "), None);
    }

    #[test]
    fn test_hint_wins_over_content() {
        let signals = IntentSignals { text: "```rust\nfn main(){}```".into(), has_image: true, has_audio: false };
        assert_eq!(classify(&signals, Some("translate")), "translate");
    }

    #[test]
    fn test_attachments_win_over_keywords() {
        let signals = IntentSignals { text: "summarize this".into(), has_image: true, has_audio: true };
        assert_eq!(classify(&signals, None), "vision");
        let signals = IntentSignals { text: "summarize this".into(), has_image: false, has_audio: true };
        assert_eq!(classify(&signals, None), "audio");
    }

    #[test]
    fn test_keyword_scan() {
        assert_eq!(classify(&text("Please translate this into French"), None), "translate");
        assert_eq!(classify(&text("Give me a TL;DR of the article"), None), "summarize");
        assert_eq!(classify(&text("why does ```let x = 1;``` fail"), None), "code");
        assert_eq!(classify(&text("kubectl get pods returns nothing"), None), "code");
        assert_eq!(classify(&text("SELECT id FROM users WHERE x"), None), "code");
        assert_eq!(classify(&text("Traceback (most recent call last):"), None), "code");
        assert_eq!(classify(&text("how do I write this in c++"), None), "code");
    }

    #[test]
    fn test_translate_is_checked_before_code() {
        assert_eq!(classify(&text("translate this python snippet"), None), "translate");
    }

    #[test]
    fn test_long_text_threshold() {
        assert_eq!(classify(&text(&"a ".repeat(900)), None), "default");
        assert_eq!(classify(&text(&"a ".repeat(901)), None), "long");
    }

    #[test]
    fn test_plain_text_is_default() {
        assert_eq!(classify(&text("hello there"), None), "default");
        assert_eq!(classify(&IntentSignals::default(), None), "default");
    }
}
