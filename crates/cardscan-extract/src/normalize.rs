//! Text normalization for raw OCR output.

/// Normalize raw recognized text for line-oriented extraction.
///
/// - `\r\n` and `\r` become `\n`
/// - control characters other than `\n` and `\t` are dropped
/// - runs of spaces/tabs collapse to a single space
/// - every line is trimmed; leading/trailing blank lines are dropped
///
/// Pure function; internal line breaks are preserved.
pub fn normalize(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let lines: Vec<String> = unified
        .split('\n')
        .map(|line| {
            let mut out = String::with_capacity(line.len());
            let mut last_was_space = false;
            for ch in line.chars() {
                if ch.is_control() && ch != '\t' {
                    continue;
                }
                if ch == ' ' || ch == '\t' {
                    if !last_was_space {
                        out.push(' ');
                    }
                    last_was_space = true;
                } else {
                    out.push(ch);
                    last_was_space = false;
                }
            }
            out.trim().to_string()
        })
        .collect();

    // Drop blank lines at both ends, keep interior ones collapsed away
    let trimmed: Vec<&str> = lines
        .iter()
        .map(String::as_str)
        .skip_while(|l| l.is_empty())
        .collect();

    let mut result: Vec<&str> = trimmed.into_iter().filter(|l| !l.is_empty()).collect();
    while result.last().is_some_and(|l| l.is_empty()) {
        result.pop();
    }

    result.join("\n")
}
