//! Filesystem-safe names for rendered pages and batch archives.
//!
//! Names depend only on the page title (or URL when there is none), so
//! rendering the same page twice always lands on the same path.

const MAX_LEN: usize = 100;
const REPLACEMENT: char = '_';

/// Split a heading like `"Ch1: Intro"` into its running-head prefix and the
/// remaining label. Titles without a colon have no prefix.
pub fn split_title(title: &str) -> (Option<&str>, &str) {
    match title.split_once(':') {
        Some((prefix, rest)) => {
            let prefix = prefix.trim();
            let rest = rest.trim();
            let prefix = (!prefix.is_empty()).then_some(prefix);
            if rest.is_empty() {
                (prefix, title.trim())
            } else {
                (prefix, rest)
            }
        }
        None => (None, title.trim()),
    }
}

/// File stem for a rendered page: the title label when the page has a
/// non-empty title, otherwise the raw URL.
pub fn page_stem(title: Option<&str>, url: &str) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => sanitize(split_title(title).1),
        None => sanitize(url),
    }
}

/// Replace characters that are unsafe in file names, collapse runs of the
/// replacement, trim, cap the length and dodge reserved device names.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_replaced = false;
    for c in input.chars() {
        if is_forbidden(c) {
            if !prev_replaced {
                out.push(REPLACEMENT);
            }
            prev_replaced = true;
        } else {
            out.push(c);
            prev_replaced = false;
        }
    }

    let trimmed = out.trim_matches(&[REPLACEMENT, ' ', '.'][..]);
    let mut name: String = trimmed.chars().take(MAX_LEN).collect();
    let kept = name.trim_end_matches(&[REPLACEMENT, ' ', '.'][..]).len();
    name.truncate(kept);

    if name.is_empty() {
        name = "untitled".to_string();
    }
    if is_reserved_windows_name(&name) {
        name.push(REPLACEMENT);
    }
    name
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}' | '\u{7F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
