//! Text sanitizing for prompts and tag values

/// Replace every character outside printable ASCII with `?`
///
/// Newlines and tabs are kept.
pub fn sanitize_ascii(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\t' => c,
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '?',
        })
        .collect()
}

/// First `max_chars` characters of `input`
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}
