//! Markup character classes and escaping.
//!
//! Names follow the XML 1.0 (fifth edition) `Name` production without the
//! namespace colon. Legal characters follow the `Char` production.

/// Maximum length (in characters) of a name or value written inline.
pub const MAX_INLINE_LENGTH: usize = 255;

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        'A'..='Z'
        | '_'
        | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// Whether `name` can be used as an element or attribute name.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) => chars.all(is_name_char),
        _ => false,
    }
}

/// Whether `c` may appear in markup at all, escaped or not.
pub fn is_legal_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Whether the text contains a character that cannot be written even escaped.
pub fn has_illegal_chars(text: &str) -> bool {
    !text.chars().all(is_legal_char)
}

/// Length in characters.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Whether the text fits inline (attribute value or short name).
pub fn is_short(text: &str) -> bool {
    // byte length bounds char length from above
    text.len() <= MAX_INLINE_LENGTH || char_len(text) <= MAX_INLINE_LENGTH
}

/// Escape an attribute value for double-quoted output.
///
/// Whitespace other than space is written as character references so that
/// attribute value normalization in a conforming reader leaves it intact.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            other => out.push(other),
        }
    }
    out
}

/// Escape element text.
///
/// Carriage returns are written as character references so that line end
/// normalization does not turn them into line feeds.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\r' => out.push_str("&#13;"),
            other => out.push(other),
        }
    }
    out
}

/// Split a payload into CDATA section bodies.
///
/// A `]]>` inside the payload would close the section early, so the payload
/// is cut between `]]` and `>`; the pieces concatenate back to the input.
pub fn cdata_sections(value: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut rest = value;
    while let Some(pos) = rest.find("]]>") {
        sections.push(&rest[..pos + 2]);
        rest = &rest[pos + 2..];
    }
    sections.push(rest);
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("misc"));
        assert!(is_valid_name("_id"));
        assert!(is_valid_name("order-line.v2"));
        assert!(is_valid_name("größe"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1abc"));
        assert!(!is_valid_name("test$"));
        assert!(!is_valid_name("the value"));
        assert!(!is_valid_name("ns:tag"));
        assert!(!is_valid_name("a\0b"));
    }

    #[test]
    fn test_illegal_chars() {
        assert!(!has_illegal_chars("tab\tnewline\ncr\r"));
        assert!(has_illegal_chars("nul\0"));
        assert!(has_illegal_chars("bell\u{7}"));
        assert!(has_illegal_chars("\u{FFFE}"));
        assert!(!has_illegal_chars("emoji \u{1F600}"));
    }

    #[test]
    fn test_is_short_counts_chars() {
        assert!(is_short(&"a".repeat(255)));
        assert!(!is_short(&"a".repeat(256)));
        // 255 two-byte characters are still short
        assert!(is_short(&"é".repeat(255)));
        assert!(!is_short(&"é".repeat(256)));
    }

    #[test]
    fn test_escape_attr() {
        assert_eq!(
            escape_attr("a<b & \"c\">\n"),
            "a&lt;b &amp; &quot;c&quot;&gt;&#10;"
        );
    }

    #[test]
    fn test_escape_text_keeps_newlines() {
        assert_eq!(escape_text("x\ny\r\n"), "x\ny&#13;\n");
    }

    #[test]
    fn test_cdata_sections_split_closing_marker() {
        assert_eq!(cdata_sections("plain"), vec!["plain"]);
        assert_eq!(cdata_sections("a]]>b"), vec!["a]]", ">b"]);
        assert_eq!(cdata_sections("]]>]]>"), vec!["]]", ">]]", ">"]);
        for input in ["a]]>b", "]]>]]>", "x]]]>y", "]]"] {
            assert_eq!(cdata_sections(input).concat(), input);
            for section in cdata_sections(input) {
                assert!(!section.contains("]]>"));
            }
        }
    }
}
