//! Comment escaping for the submission encoding
//!
//! Comments travel inside a stream that uses `; : _ = £ § < > , " '` as
//! protocol delimiters; each of those literal characters is replaced by a
//! `$$#<codepoint>;` token so comment text can never collide with the
//! framing.

/// Characters reserved by the submission protocol and their escape tokens
const ESCAPES: &[(char, &str)] = &[
    (';', "$$#59;"),
    ('"', "$$#34;"),
    ('\'', "$$#39;"),
    (':', "$$#58;"),
    ('_', "$$#95;"),
    ('=', "$$#61;"),
    ('£', "$$#163;"),
    ('§', "$$#167;"),
    ('<', "$$#60;"),
    ('>', "$$#62;"),
    (',', "$$#44;"),
];

/// Replace every reserved character with its `$$#<codepoint>;` token
pub fn escape_comment(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ESCAPES.iter().find(|(raw, _)| *raw == ch) {
            Some((_, token)) => out.push_str(token),
            None => out.push(ch),
        }
    }
    out
}

/// Reverse [`escape_comment`]
///
/// `$$#<digits>;` sequences are decoded back to their character; anything
/// that does not form a complete token is kept literally, so text that was
/// never escaped passes through unchanged.
pub fn unescape_comment(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find("$$#") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 3..];
        match decode_token(after) {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &after[consumed..];
            }
            None => {
                out.push_str("$$#");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse the `<digits>;` tail of an escape token, returning the decoded
/// character and the number of bytes consumed
fn decode_token(tail: &str) -> Option<(char, usize)> {
    let end = tail.find(';')?;
    let digits = &tail[..end];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code: u32 = digits.parse().ok()?;
    Some((char::from_u32(code)?, end + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_every_reserved_character() {
        assert_eq!(escape_comment(";"), "$$#59;");
        assert_eq!(escape_comment("\""), "$$#34;");
        assert_eq!(escape_comment("'"), "$$#39;");
        assert_eq!(escape_comment(":"), "$$#58;");
        assert_eq!(escape_comment("_"), "$$#95;");
        assert_eq!(escape_comment("="), "$$#61;");
        assert_eq!(escape_comment("£"), "$$#163;");
        assert_eq!(escape_comment("§"), "$$#167;");
        assert_eq!(escape_comment("<"), "$$#60;");
        assert_eq!(escape_comment(">"), "$$#62;");
        assert_eq!(escape_comment(","), "$$#44;");
    }

    #[test]
    fn round_trip_with_every_special_character() {
        let original = "fuite d'eau; <grave>, \"vue\" : zone_3 = 100£ §fin";
        let escaped = escape_comment(original);
        assert!(!escaped.contains('£'), "delimiter survived escaping: {}", escaped);
        assert!(!escaped.contains('§'), "delimiter survived escaping: {}", escaped);
        assert_eq!(unescape_comment(&escaped), original);
    }

    #[test]
    fn plain_text_passes_through() {
        let text = "rien a signaler";
        assert_eq!(escape_comment(text), text);
        assert_eq!(unescape_comment(text), text);
    }

    #[test]
    fn incomplete_tokens_stay_literal() {
        assert_eq!(unescape_comment("$$#"), "$$#");
        assert_eq!(unescape_comment("$$#xx;"), "$$#xx;");
        assert_eq!(unescape_comment("$$#59"), "$$#59");
        assert_eq!(unescape_comment("prix $$ 100"), "prix $$ 100");
    }
}
