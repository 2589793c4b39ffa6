//! Crisis keyword detection.
//!
//! Presence-only matching against a fixed list of phrases. There is no
//! scoring or context: negations ("I would never hurt myself") still match and
//! indirect phrasing is missed. Treat a hit as a prompt to surface crisis
//! resources, not as a risk assessment.

use std::sync::LazyLock;

use regex::RegexSet;

const TERMS: [(&str, &str); 11] = [
    ("suicide", r"\bsuicid(?:e|al)\b"),
    ("kill myself", r"\bkill(?:ing)?\s+myself\b"),
    ("end my life", r"\bend(?:ing)?\s+(?:my\s+life|it\s+all)\b"),
    ("want to die", r"\b(?:want|wanna|going)\s+(?:to\s+)?die\b"),
    ("self harm", r"\bself[\s-]?harm(?:ing)?\b"),
    ("hurt myself", r"\bhurt(?:ing)?\s+myself\b"),
    ("cutting", r"\bcut(?:ting)?\s+myself\b"),
    ("no reason to live", r"\bno\s+reason\s+to\s+live\b"),
    ("better off dead", r"\bbetter\s+off\s+dead\b"),
    ("overdose", r"\boverdos(?:e|ing)\b"),
    ("can't go on", r"\bcan'?t\s+go\s+on\b"),
];

static CRISIS_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(TERMS.iter().map(|(_, pattern)| format!("(?i){pattern}"))).unwrap()
});

/// Labels of every crisis term present in `text`, in list order.
pub fn detect(text: &str) -> Vec<&'static str> {
    CRISIS_PATTERNS.matches(text).into_iter().map(|i| TERMS[i].0).collect()
}

pub fn is_crisis(text: &str) -> bool {
    CRISIS_PATTERNS.is_match(text)
}
