/// Normalises a raw token's bytes into the string a human (or the DSL's
/// `pretty_print`) should see it as, accounting for the Llama-family
/// convention of marking a leading space with a leading `_`/`▁` byte or the
/// literal `<0x20>` placeholder token, per spec §6's tokenizer contract.
pub fn normalize_display_token(token: &[u8]) -> String {
    if token == b"<0x20>" {
        return " ".to_string();
    }
    let text = String::from_utf8_lossy(token);
    if let Some(rest) = text.strip_prefix('\u{2581}') {
        format!(" {rest}")
    } else if let Some(rest) = text.strip_prefix('_') {
        format!(" {rest}")
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentencepiece_underscore_marks_leading_space() {
        assert_eq!(normalize_display_token("\u{2581}hello".as_bytes()), " hello");
    }

    #[test]
    fn llama_ascii_underscore_marks_leading_space() {
        assert_eq!(normalize_display_token(b"_world"), " world");
    }

    #[test]
    fn literal_space_placeholder() {
        assert_eq!(normalize_display_token(b"<0x20>"), " ");
    }

    #[test]
    fn ordinary_token_is_passed_through() {
        assert_eq!(normalize_display_token(b"hello"), "hello");
    }
}
