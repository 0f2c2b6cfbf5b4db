//! A cheap "is this English" heuristic for PR titles and bodies.

/// Whether `text` reads as English.
///
/// Counts alphabetic characters and requires at least `threshold` of them
/// to be ASCII letters. Text with no letters at all (empty bodies, pure
/// code or numbers) passes.
///
/// # Examples
///
/// ```
/// use benchsift_eligibility::english::is_english;
///
/// assert!(is_english("Fix overflow when parsing large headers", 0.8));
/// assert!(is_english("", 0.8));
/// assert!(!is_english("修复解析大型标头时的溢出问题", 0.8));
/// ```
pub fn is_english(text: &str, threshold: f64) -> bool {
    let (ascii, total) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(ascii, total), c| {
            (ascii + usize::from(c.is_ascii_alphabetic()), total + 1)
        });
    if total == 0 {
        return true;
    }
    ascii as f64 / total as f64 >= threshold
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accents_below_threshold_still_pass() {
        assert!(is_english("Handle café and naïve inputs in the tokenizer", 0.8));
    }

    #[test]
    fn mixed_script_fails_when_mostly_foreign() {
        assert!(!is_english("fix: исправить ошибку в парсере заголовков", 0.8));
    }

    #[test]
    fn digits_and_symbols_are_ignored() {
        assert!(is_english("1234 + 5678 == 6912 // 🚀", 0.8));
    }

    #[test]
    fn zero_threshold_accepts_anything() {
        assert!(is_english("日本語", 0.0));
    }

    #[test]
    fn counts_words() {
        assert_eq!(word_count("  one\ttwo\nthree  "), 3);
        assert_eq!(word_count(""), 0);
    }
}
