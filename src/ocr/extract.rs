/// Keeps only ASCII decimal digits from OCR output.
///
/// Whitespace, punctuation, letters and non-ASCII digits are dropped, so the
/// result is safe to hand back as the CAPTCHA answer.
pub fn extract_digits(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_digits() {
        assert_eq!(extract_digits("4821"), "4821");
        assert_eq!(extract_digits(" 48 21\n"), "4821");
        assert_eq!(extract_digits("4B2l-7."), "427");
        assert_eq!(extract_digits(""), "");
        assert_eq!(extract_digits("no digits"), "");
    }

    #[test]
    fn test_non_ascii_digits_are_dropped() {
        // Arabic-Indic and fullwidth digits
        assert_eq!(extract_digits("\u{0661}\u{0662}3\u{FF14}"), "3");
    }

    #[test]
    fn test_extract_digits_is_idempotent() {
        for text in ["12 34", "a1b2c3", "\t\n", "9\u{FF19}9", "0000"] {
            let once = extract_digits(text);
            assert_eq!(extract_digits(&once), once);
        }
    }
}
