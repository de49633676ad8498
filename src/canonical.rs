use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Labels that authoring tools put in front of a name ("Кластер: Лидерство").
const LEADING_LABELS: &[&str] = &[
    "список ресурсов",
    "кластер",
    "блок",
    "компетенция",
    "cluster",
    "block",
    "competency",
    "resources",
];

/// Continuation markers on split slides ("Лидерство (продолжение)").
const TRAILING_LABELS: &[&str] = &["продолжение", "continued", "cont"];

/// Matching key for free text: lower-case, no diacritics, punctuation folded to
/// spaces, single-spaced, with enumerations and decoration labels removed.
///
/// Idempotent: `canonicalize(&canonicalize(x)) == canonicalize(x)`.
pub fn canonicalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut words: Vec<&str> = folded.split_whitespace().collect();
    loop {
        let before = words.len();
        while words.len() > 1 && words[0].chars().all(|c| c.is_ascii_digit()) {
            words.remove(0);
        }
        for label in LEADING_LABELS {
            let label_words: Vec<&str> = label.split(' ').collect();
            if words.len() > label_words.len() && words.starts_with(&label_words) {
                words.drain(..label_words.len());
            }
        }
        while words.len() > 1 && words.last().is_some_and(|w| TRAILING_LABELS.contains(w)) {
            words.pop();
        }
        if words.len() == before {
            break;
        }
    }

    words.join(" ")
}

/// Stable identifier derived from a name.
pub fn slug(text: &str) -> String {
    canonicalize(text).replace(' ', "_")
}
