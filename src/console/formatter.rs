//! Text helpers for console output.

/// Find the largest char-boundary index <= `pos` in `s`.
fn floor_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut i = pos;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Cut `text` to at most `max_len` bytes on a char boundary, marking the cut
/// with `...`.
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    format!("{}...", &text[..floor_char_boundary(text, max_len)])
}

/// `m:ss` from milliseconds.
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// `1. first` / `2. second` ..., with continuation lines indented under the
/// item text.
pub fn numbered<I>(items: I) -> String
where
    I: IntoIterator<Item = String>,
{
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let prefix = format!("{}. ", i + 1);
            let indent = " ".repeat(prefix.len());
            let mut lines = item.lines();
            let mut out = format!("{prefix}{}", lines.next().unwrap_or_default());
            for line in lines {
                out.push('\n');
                out.push_str(&indent);
                out.push_str(line);
            }
            out
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Capitalize the first letter of every word: `late night` -> `Late Night`.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
