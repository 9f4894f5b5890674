//! Control-character hygiene for anything that ends up in a log line or an
//! error message.
//!
//! Case ids, names and command arguments come from users. Written verbatim, a
//! value like `"demo\nINFO forged entry"` would start a new log record, so
//! every such value is escaped before it is formatted.

use std::borrow::Cow;
use std::fmt;

/// Escape every control character (`\n`, `\r`, `\u{7f}`, ...) in `input`.
///
/// Borrowed when nothing needs escaping, which is the common case.
pub fn escape_control(input: &str) -> Cow<'_, str> {
    if !input.chars().any(char::is_control) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        if c.is_control() {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// True if `input` holds a character that is never acceptable in a path or
/// identifier. TAB is tolerated; DEL and every other control character is not.
pub fn has_forbidden_chars(input: &str) -> bool {
    input.chars().any(|c| c.is_control() && c != '\t')
}

/// Display adapter that escapes on the fly, for use in `tracing` fields:
/// `info!(case = %Sanitized(id), "...")`.
#[derive(Clone, Copy)]
pub struct Sanitized<'a>(pub &'a str);

impl fmt::Display for Sanitized<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&escape_control(self.0))
    }
}

impl fmt::Debug for Sanitized<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_text_is_borrowed() {
        assert!(matches!(escape_control("Fluid/cavity2d"), Cow::Borrowed(_)));
    }

    #[test]
    fn newline_cannot_forge_a_record() {
        let escaped = escape_control("demo\nINFO forged entry");
        assert_eq!(escaped, "demo\\nINFO forged entry");
        assert!(!escaped.contains('\n'));
    }

    #[test]
    fn del_and_nul_are_escaped() {
        assert_eq!(escape_control("a\u{7f}b\0c"), "a\\u{7f}b\\u{0}c");
    }

    #[test]
    fn forbidden_chars_allow_tab_only() {
        assert!(!has_forbidden_chars("a\tb"));
        assert!(has_forbidden_chars("a\rb"));
        assert!(has_forbidden_chars("legit_case\u{7f}INJECTED"));
        assert!(!has_forbidden_chars("ünïcode ok"));
    }

    #[test]
    fn display_adapter_escapes() {
        assert_eq!(format!("{}", Sanitized("x\ny")), "x\\ny");
    }

    proptest! {
        #[test]
        fn escaped_output_has_no_control_chars(input in any::<String>()) {
            let escaped = escape_control(&input);
            prop_assert!(!escaped.chars().any(char::is_control));
        }
    }
}
