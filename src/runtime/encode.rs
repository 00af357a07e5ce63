//! HTML entity encoding for the `Write` path

use std::borrow::Cow;

/// Encode `input` for inclusion in HTML text or attribute content.
///
/// `& < > " '` become entities and characters in U+00A0..=U+00FF are written
/// as numeric references. Everything else passes through unchanged.
pub fn html_encode(input: &str) -> Cow<'_, str> {
    if !input.chars().any(needs_encoding) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\u{a0}'..='\u{ff}' => {
                out.push_str("&#");
                out.push_str(&u32::from(c).to_string());
                out.push(';');
            }
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn needs_encoding(c: char) -> bool {
    matches!(c, '&' | '<' | '>' | '"' | '\'' | '\u{a0}'..='\u{ff}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_borrowed() {
        assert!(matches!(html_encode("Hello Alex"), Cow::Borrowed("Hello Alex")));
    }

    #[test]
    fn test_markup_characters() {
        assert_eq!(
            html_encode(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_latin1_range_is_numeric() {
        assert_eq!(html_encode("caf\u{e9} \u{a0}"), "caf&#233; &#160;");
        assert_eq!(html_encode("\u{100}"), "\u{100}");
    }
}
