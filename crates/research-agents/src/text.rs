//! Small text helpers for prompts and progress details.

/// First `max` characters of `text`
pub fn head(text: &str, max: usize) -> &str {
    text.char_indices().nth(max).map_or(text, |(idx, _)| &text[..idx])
}

/// First `max` characters, with `...` appended when something was cut
pub fn ellipsize(text: &str, max: usize) -> String {
    let cut = head(text, max);
    if cut.len() < text.len() {
        format!("{cut}...")
    } else {
        text.to_owned()
    }
}

/// Outermost `open ... close` span, if any
pub fn outer_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (start < end).then(|| &text[start..=end])
}
