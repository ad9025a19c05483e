//! Text Normalizer
//!
//! Deterministic cleanup applied to every text before it reaches a model:
//! emoji expansion, URL removal, `@`/`#` removal, whitespace collapse and
//! truncation.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Default character limit applied after cleanup.
pub const DEFAULT_MAX_CHARS: usize = 512;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:[a-zA-Z0-9$-_@.&+!*\\(),]|%[0-9a-fA-F]{2})+")
        .expect("hardcoded regex is valid")
});

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("hardcoded regex is valid"));

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    max_chars: usize,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl TextNormalizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Normalize `text`. An empty return value means "empty after
    /// preprocessing" and must not be sent to a model.
    pub fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let expanded = expand_emoji(text);
        let without_urls = URL_PATTERN.replace_all(&expanded, "");
        let without_symbols: String = without_urls
            .chars()
            .filter(|c| *c != '@' && *c != '#')
            .collect();
        let collapsed = WHITESPACE.replace_all(&without_symbols, " ");

        truncate_chars(collapsed.trim(), self.max_chars)
    }
}

/// Replace every emoji grapheme with ` description ` (e.g. `😊` becomes
/// ` smiling_face_with_smiling_eyes `). Graphemes that are not emoji are kept.
fn expand_emoji(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for grapheme in text.graphemes(true) {
        // Plain ASCII such as '#' or digits must never match keycap emoji.
        if grapheme.is_ascii() {
            out.push_str(grapheme);
            continue;
        }
        match lookup_emoji(grapheme) {
            Some(emoji) => {
                out.push(' ');
                out.push_str(&describe(emoji.name()));
                out.push(' ');
            }
            None => out.push_str(grapheme),
        }
    }
    out
}

fn lookup_emoji(grapheme: &str) -> Option<&'static emojis::Emoji> {
    emojis::get(grapheme).or_else(|| {
        // Text-presentation forms carry no variation selector.
        let stripped: String = grapheme.chars().filter(|c| *c != '\u{FE0F}').collect();
        emojis::get(&stripped)
    })
}

/// `"thumbs up: medium skin tone"` -> `"thumbs_up_medium_skin_tone"`
fn describe(name: &str) -> String {
    let mut description = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_separator && !description.is_empty() {
                description.push('_');
            }
            pending_separator = false;
            description.push(c);
        } else {
            pending_separator = true;
        }
    }
    description
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
