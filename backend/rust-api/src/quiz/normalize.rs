use unicode_normalization::UnicodeNormalization;

const IDEOGRAPHIC_SPACE: char = '\u{3000}';

/// Canonical form used to compare typed answers with stored readings and
/// meanings: NFC, trimmed, lowercased, ideographic spaces turned into ASCII
/// spaces.
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfc().collect();
    composed
        .trim()
        .to_lowercase()
        .replace(IDEOGRAPHIC_SPACE, " ")
}
