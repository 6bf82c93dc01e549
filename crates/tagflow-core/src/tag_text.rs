//! Pure string edits that add or remove one tag token.

use regex::Regex;

use crate::tags::{TAG_EXCLUDED_PUNCTUATION, match_block_ref, match_inline_code};

fn split_eol(text: &str) -> (&str, &str) {
    if let Some(body) = text.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = text.strip_suffix('\n') {
        (body, "\n")
    } else {
        (text, "")
    }
}

/// Append `tag` to a single line of text.
///
/// Trailing whitespace is trimmed first and the tag is followed by one space.
/// A trailing block reference (`^id`) stays the last token on the line. A
/// trailing `\n` or `\r\n` is preserved exactly once.
#[must_use]
pub fn add_tag_text(text: &str, tag: &str) -> String {
    let (body, eol) = split_eol(text);
    let body = body.trim_end();

    let mut out = match match_block_ref(body) {
        Some(block) => {
            let before = body[..block.start].trim_end();
            if before.is_empty() {
                format!("{tag} {}", block.text)
            } else {
                format!("{before} {tag} {}", block.text)
            }
        }
        None if body.is_empty() => format!("{tag} "),
        None => format!("{body} {tag} "),
    };
    out.push_str(eol);
    out
}

/// Remove the first whole-token occurrence of `tag` from a single line.
///
/// The whitespace run before the tag goes with it; whitespace after the tag is
/// left untouched. Occurrences inside inline code are not tags and are skipped.
/// Returns the input unchanged when the token is absent, so removing `#med`
/// never affects `#med_lo`.
#[must_use]
pub fn remove_tag_text(text: &str, tag: &str) -> String {
    if tag.is_empty() {
        return text.to_owned();
    }
    let pattern = format!(
        r"(?:^|\s+)({})(?:$|[\s{}])",
        regex::escape(tag),
        regex::escape(TAG_EXCLUDED_PUNCTUATION)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return text.to_owned();
    };
    let code = match_inline_code(text);
    let found = re.captures_iter(text).find_map(|caps| {
        let (whole, token) = (caps.get(0)?, caps.get(1)?);
        let in_code = code
            .iter()
            .any(|span| token.start() >= span.start && token.start() < span.end());
        (!in_code).then_some((whole, token))
    });
    let Some((whole, token)) = found else {
        return text.to_owned();
    };

    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..whole.start()]);
    out.push_str(&text[token.end()..]);
    out
}

/// Add `tag` to a possibly multi-line item text.
///
/// The tag goes on the last line, where a trailing block reference lives.
#[must_use]
pub fn add_tag_to_item(text: &str, tag: &str) -> String {
    match text.rsplit_once('\n') {
        Some((head, last)) => format!("{head}\n{}", add_tag_text(last, tag)),
        None => add_tag_text(text, tag),
    }
}

/// Remove `tag` from the first line of a multi-line item text that carries it.
#[must_use]
pub fn remove_tag_from_item(text: &str, tag: &str) -> String {
    let mut lines: Vec<String> = text.split('\n').map(str::to_owned).collect();
    for line in &mut lines {
        let updated = remove_tag_text(line, tag);
        if updated != *line {
            *line = updated;
            break;
        }
    }
    lines.join("\n")
}
