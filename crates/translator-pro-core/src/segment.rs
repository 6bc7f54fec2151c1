//! Structure-preserving sentence segmentation.
//!
//! Text is cut into lines first and then into sentences, so the translated
//! output can be laid out with the same blank-line cadence as the input.

use regex::Regex;
use std::sync::LazyLock;

/// A run of terminal punctuation and the whitespace after it
// Pattern is a literal and known to compile
#[allow(clippy::unwrap_used)]
static TERMINATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+\s*").unwrap());

/// One segment of the original text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextUnit {
    /// A trimmed, non-empty sentence to translate
    Sentence(String),
    /// A blank input line, carried through untranslated
    Blank,
}

impl TextUnit {
    pub const fn is_blank(&self) -> bool {
        matches!(self, Self::Blank)
    }

    /// Text as it appears in reassembled output
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sentence(text) => text,
            Self::Blank => "",
        }
    }
}

/// Split text into ordered units.
///
/// Every input line contributes at least one unit: a blank line (after
/// trimming) becomes [`TextUnit::Blank`], any other line one sentence per
/// terminator plus its trailing remainder.
pub fn segment(text: &str) -> Vec<TextUnit> {
    let mut units = Vec::new();

    for line in text.split('\n') {
        if line.trim().is_empty() {
            units.push(TextUnit::Blank);
            continue;
        }
        split_sentences(line, &mut units);
    }

    units
}

fn split_sentences(line: &str, units: &mut Vec<TextUnit>) {
    let mut start = 0;

    for terminator in TERMINATOR.find_iter(line) {
        push_sentence(&line[start..terminator.end()], units);
        start = terminator.end();
    }

    push_sentence(&line[start..], units);
}

fn push_sentence(fragment: &str, units: &mut Vec<TextUnit>) {
    let sentence = fragment.trim();
    if !sentence.is_empty() {
        units.push(TextUnit::Sentence(sentence.to_string()));
    }
}

/// Join units back into text, one unit per line.
pub fn reassemble<S: AsRef<str>>(units: &[S]) -> String {
    units
        .iter()
        .map(AsRef::<str>::as_ref)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut `text` after its first `max_tokens` whitespace-delimited tokens.
///
/// Hard cutoff: the tail is dropped, never re-split or summarized.
pub fn truncate_tokens(text: &str, max_tokens: usize) -> &str {
    if max_tokens == 0 {
        return "";
    }

    let mut count = 0;
    let mut in_token = false;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_token && count == max_tokens {
                return &text[..idx];
            }
            in_token = false;
        } else if !in_token {
            in_token = true;
            count += 1;
        }
    }

    text
}

impl AsRef<str> for TextUnit {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
