//! Small text helpers shared by the verification and comparison heuristics.

/// Count whitespace-separated tokens containing at least one alphanumeric
/// character. Bullets, dashes and stray punctuation do not count.
#[must_use]
pub fn count_words(text: &str) -> usize {
    text.split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .count()
}

/// Lowercase, replace punctuation with spaces, collapse whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_words_ignores_punctuation_tokens() {
        assert_eq!(count_words("  Wear gloves - always!  \n\n * Wash hands"), 5);
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("-- * ##"), 0);
    }

    #[test]
    fn normalize_collapses_case_space_and_punctuation() {
        assert_eq!(normalize("Wear  Gloves,\nALWAYS!"), "wear gloves always");
        assert_eq!(normalize("pH-level: 7.0"), "ph level 7 0");
        assert_eq!(normalize("   "), "");
    }
}
