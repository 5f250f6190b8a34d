use tracing::debug;

/// Split `text` into segments of at most `max_chars` characters, breaking on
/// line boundaries where possible.
///
/// Lines are packed greedily into a segment, joined by `\n`. A single line that
/// is longer than `max_chars` is chopped into `max_chars`-sized pieces, each
/// emitted on its own. Whitespace-only segments are kept; callers decide
/// whether to skip them.
pub fn segment_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut segments = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let fits = match &current {
            Some((_, len)) => len + 1 + line_len <= max_chars,
            None => line_len <= max_chars,
        };

        if fits {
            match current.as_mut() {
                Some((buf, len)) => {
                    buf.push('\n');
                    buf.push_str(line);
                    *len += 1 + line_len;
                }
                None => current = Some((line.to_string(), line_len)),
            }
            continue;
        }

        if let Some((buf, _)) = current.take() {
            if !buf.is_empty() {
                segments.push(buf);
            }
        }

        if line_len > max_chars {
            debug!(
                "Line of {} chars exceeds limit {}; force-splitting",
                line_len, max_chars
            );
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                segments.push(piece.iter().collect());
            }
        } else {
            current = Some((line.to_string(), line_len));
        }
    }

    if let Some((buf, _)) = current {
        if !buf.is_empty() {
            segments.push(buf);
        }
    }

    segments
}
