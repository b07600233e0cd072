//! Input sanitization for values interpolated into modem command lines.
//!
//! `sms send` is executed by a shell on the modem as
//! `sms send <number> "<content>"`. The number is filtered down to dialable
//! characters and the content is escaped for a double-quoted shell string.

use crate::error::{ProtocolError, ProtocolResult};

/// GSM 03.38 default alphabet and extension table, minus ASCII letters and digits.
///
/// Greek capitals are written as escapes so they are not mistaken for Latin letters.
const GSM7_SYMBOLS: &str = concat!(
    " \r\n",
    "@£$¥èéùìòÇØøÅå_ÆæßÉ",
    "\u{0394}\u{03A6}\u{0393}\u{039B}\u{03A9}\u{03A0}\u{03A8}\u{03A3}\u{0398}\u{039E}",
    "!\"#%&'()*+,-./:;<=>?",
    "¡ÄÖÑÜ§¿äöñüà",
    "^{}\\[~]|\u{20AC}",
);

/// Keep only digits, `+`, `-`, parentheses and whitespace.
///
/// Everything else, including every shell metacharacter, is dropped. The
/// filter preserves order and is idempotent.
pub fn sanitize_phone_number(number: &str) -> String {
    number
        .chars()
        .filter(|&c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')') || c.is_whitespace())
        .collect()
}

/// Escape a message body for use inside a double-quoted shell string.
///
/// Backslash, double quote, dollar sign and backtick each gain a leading
/// backslash. Backslashes are escaped as themselves, so an escape added for
/// one character is never escaped again.
pub fn sanitize_message_body(content: &str) -> String {
    let mut escaped = String::with_capacity(content.len());
    for c in content.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Check that every character belongs to the GSM 7-bit alphabet.
///
/// Empty and whitespace-only (space, newline, carriage return) strings are valid.
pub fn is_gsm7_valid(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_ascii_alphanumeric() || GSM7_SYMBOLS.contains(c))
}

/// Validate an outbound message before any command is built from it.
pub fn validate_outbound(number: &str, content: &str) -> ProtocolResult<()> {
    let sanitized = sanitize_phone_number(number);
    if !sanitized.chars().any(|c| c.is_ascii_digit()) {
        return Err(ProtocolError::Validation("phone number contains no digits".to_string()));
    }
    if sanitized.contains(['\n', '\r']) {
        return Err(ProtocolError::Validation("phone number contains a line break".to_string()));
    }
    if content.is_empty() {
        return Err(ProtocolError::Validation("message content is empty".to_string()));
    }
    if !is_gsm7_valid(content) {
        return Err(ProtocolError::Validation(
            "message content contains characters outside the GSM 7-bit alphabet".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_number_valid_chars_preserved() {
        for number in ["+1234567890", "+1 (555) 123-4567", "+33 6 12 34 56 78", "555-1234"] {
            assert_eq!(sanitize_phone_number(number), number);
        }
    }

    #[test]
    fn test_phone_number_dangerous_chars_removed() {
        assert_eq!(sanitize_phone_number("+123; rm -rf /"), "+123  - ");
        assert_eq!(sanitize_phone_number("+123|echo test"), "+123 ");
        assert_eq!(sanitize_phone_number("+123$USER"), "+123");
        assert_eq!(sanitize_phone_number("+123`whoami`"), "+123");
        assert_eq!(sanitize_phone_number("+123&sudo"), "+123");
        assert_eq!(sanitize_phone_number("+1$(reboot)"), "+1()");
    }

    #[test]
    fn test_phone_number_idempotent_and_subset() {
        for input in ["", "   ", "+1 (555) 123-4567", "+123;`id`$(x)\n", "ünïcødé 42"] {
            let once = sanitize_phone_number(input);
            assert_eq!(sanitize_phone_number(&once), once);
            assert!(once.chars().all(|c| input.contains(c)));
        }
    }

    #[test]
    fn test_body_escapes() {
        assert_eq!(sanitize_message_body("Path: C:\\Users\\Test"), "Path: C:\\\\Users\\\\Test");
        assert_eq!(sanitize_message_body("He said \"hello\""), "He said \\\"hello\\\"");
        assert_eq!(sanitize_message_body("Price: $100"), "Price: \\$100");
        assert_eq!(sanitize_message_body("Code: `test`"), "Code: \\`test\\`");
        assert_eq!(
            sanitize_message_body("Test: $100 \"quote\" `code` C:\\path"),
            "Test: \\$100 \\\"quote\\\" \\`code\\` C:\\\\path"
        );
        assert_eq!(sanitize_message_body("Hello World Test"), "Hello World Test");
    }

    #[test]
    fn test_body_backslash_count() {
        for input in ["", "plain", "\\\"$`", "a\\\\b", "\\$HOME `ls` \"x\"", "\\\\\\"] {
            let count = |s: &str, c: char| s.chars().filter(|&x| x == c).count();
            let specials = count(input, '"') + count(input, '$') + count(input, '`');
            let escaped = sanitize_message_body(input);
            assert_eq!(count(&escaped, '\\'), 2 * count(input, '\\') + specials, "input {:?}", input);
        }
    }

    #[test]
    fn test_gsm7_accepts_alphabet() {
        assert!(is_gsm7_valid("Hello World"));
        assert!(is_gsm7_valid("Test message 123"));
        assert!(is_gsm7_valid("Price: £50 (50%)"));
        assert!(is_gsm7_valid("Cost: $100, email: user@example.com"));
        assert!(is_gsm7_valid("Euro: €10 [test] {data} C:\\folder ~|^"));
        assert!(is_gsm7_valid("èéùìò äöñüß ÄÖÑÜ§ ¡¿"));
        assert!(is_gsm7_valid("\u{0394}\u{03A9}\u{03A3}"));
        assert!(is_gsm7_valid("Line 1\nLine 2\r\nLine 3"));
    }

    #[test]
    fn test_gsm7_empty_and_whitespace() {
        assert!(is_gsm7_valid(""));
        assert!(is_gsm7_valid("   "));
        assert!(is_gsm7_valid("\n\n"));
    }

    #[test]
    fn test_gsm7_rejects_outside_alphabet() {
        assert!(!is_gsm7_valid("Hello 👋"));
        assert!(!is_gsm7_valid("🎉 Party"));
        assert!(!is_gsm7_valid("中文"));
        assert!(!is_gsm7_valid("Привет"));
        assert!(!is_gsm7_valid("Arrow →"));
        assert!(!is_gsm7_valid("Bullet •"));
        assert!(!is_gsm7_valid("Copyright ©"));
        assert!(!is_gsm7_valid("tab\there"));
    }

    #[test]
    fn test_validate_outbound() {
        assert!(validate_outbound("+1 (555) 123-4567", "Hi there").is_ok());
        assert!(matches!(validate_outbound("abc", "Hi"), Err(ProtocolError::Validation(_))));
        assert!(matches!(validate_outbound("+1\n2", "Hi"), Err(ProtocolError::Validation(_))));
        assert!(matches!(validate_outbound("+12", ""), Err(ProtocolError::Validation(_))));
        assert!(matches!(validate_outbound("+12", "Hi 😀"), Err(ProtocolError::Validation(_))));
    }
}
