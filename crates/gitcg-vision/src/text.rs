use regex::Regex;

use crate::recognition::{TextMatch, TextReplacement};

/// Rewrite known OCR misreadings to their canonical text.
///
/// Every rule runs over the whole string, in order, whether or not an
/// earlier rule changed anything.
pub fn normalize_text(raw: &str, rules: &[TextReplacement]) -> String {
    let mut text = raw.to_string();
    for rule in rules {
        for misreading in rule.misreadings.iter().filter(|m| !m.is_empty()) {
            if text.contains(misreading.as_str()) {
                text = text.replace(misreading.as_str(), &rule.canonical);
            }
        }
    }
    text
}

/// Every configured requirement set must pass on its own. With none
/// configured, any non-blank text counts.
pub(crate) fn text_satisfies(text: &str, params: &TextMatch, patterns: &[Regex]) -> bool {
    if !params.has_requirements() {
        return !text.trim().is_empty();
    }

    let all = params.require_all.iter().all(|t| text.contains(t.as_str()));
    let any = params.require_any.is_empty()
        || params.require_any.iter().any(|t| text.contains(t.as_str()));
    let regex = patterns.iter().all(|p| p.is_match(text));

    all && any && regex
}
