//! Tokenizers for tags, inline code spans and block references.
//!
//! Every pattern lives behind its own function so the exclusion rules can be
//! tested in isolation.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Punctuation that can never be part of a tag name.
pub const TAG_EXCLUDED_PUNCTUATION: &str = "+@,;.:!&*?'\"`()[]{}";

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"(?:^|\s)(#[^\s+@,;.:!&*?'"`()\[\]{}]+)"#));
static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"`.*?`"));
static WIKILINK_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\[\[.*?\]\]"));
static BLOCK_REF_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\s(\^[A-Za-z0-9-]+)$"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("built-in pattern {pattern} must compile: {err}"))
}

/// A matched slice of a line together with its byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a> {
    /// Matched text.
    pub text: &'a str,
    /// Byte offset of the match inside the scanned line.
    pub start: usize,
}

impl<'a> Span<'a> {
    /// Byte offset one past the end of the match.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start + self.text.len()
    }

    /// Matched text.
    #[must_use]
    pub const fn as_str(&self) -> &'a str {
        self.text
    }

    const fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end()
    }
}

/// Errors raised when user input is not a usable tag.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    /// Empty name, whitespace, or excluded punctuation.
    #[error("invalid tag name '{0}'")]
    InvalidName(String),
}

/// Find every backtick-delimited span on a single line.
///
/// Only fully closed spans count; an unterminated opener yields nothing.
#[must_use]
pub fn match_inline_code(line: &str) -> Vec<Span<'_>> {
    INLINE_CODE_RE
        .find_iter(line)
        .map(|m| Span {
            text: m.as_str(),
            start: m.start(),
        })
        .collect()
}

/// Find tag tokens (`#name`) on a single line.
///
/// A tag must start the line or follow whitespace. Any `#` inside a
/// `[[...]]` link is a heading or block reference and is skipped.
#[must_use]
pub fn match_tags(line: &str) -> Vec<Span<'_>> {
    let links: Vec<Span<'_>> = WIKILINK_RE
        .find_iter(line)
        .map(|m| Span {
            text: m.as_str(),
            start: m.start(),
        })
        .collect();

    TAG_RE
        .captures_iter(line)
        .filter_map(|caps| caps.get(1))
        .filter(|m| !links.iter().any(|link| link.contains(m.start())))
        .map(|m| Span {
            text: m.as_str(),
            start: m.start(),
        })
        .collect()
}

/// Find a trailing block reference (`^block-id`) on the trimmed line.
///
/// The returned span covers the `^id` token, not the whitespace before it.
#[must_use]
pub fn match_block_ref(line: &str) -> Option<Span<'_>> {
    let trimmed = line.trim_end();
    BLOCK_REF_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| Span {
            text: m.as_str(),
            start: m.start(),
        })
}

/// Check a tag name given without its leading `#`.
#[must_use]
pub fn is_tag_name_valid(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(is_tag_boundary)
}

/// True for characters that terminate a tag token.
#[must_use]
pub fn is_tag_boundary(ch: char) -> bool {
    ch.is_whitespace() || TAG_EXCLUDED_PUNCTUATION.contains(ch)
}

/// Accept `name` or `#name` and return the canonical `#name` form.
///
/// # Errors
/// Returns [`TagError::InvalidName`] when the name fails [`is_tag_name_valid`].
pub fn normalize_tag(input: &str) -> Result<String, TagError> {
    let trimmed = input.trim();
    let name = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if is_tag_name_valid(name) {
        Ok(format!("#{name}"))
    } else {
        Err(TagError::InvalidName(input.to_owned()))
    }
}

/// Collect the tag set of an item's text (all lines).
///
/// Tags inside inline code spans are ignored.
#[must_use]
pub fn extract_tags(text: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    for line in text.lines() {
        let code = match_inline_code(line);
        for tag in match_tags(line) {
            if code.iter().any(|span| span.contains(tag.start)) {
                continue;
            }
            tags.insert(tag.text.to_owned());
        }
    }
    tags
}

/// Every tag occurrence of an item's text in order, duplicates kept.
#[must_use]
pub fn tag_occurrences(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for line in text.lines() {
        let code = match_inline_code(line);
        for tag in match_tags(line) {
            if !code.iter().any(|span| span.contains(tag.start)) {
                found.push(tag.text.to_owned());
            }
        }
    }
    found
}

/// Return the part of `tag` after `namespace/`, if any.
///
/// `strip_namespace("#tpm/step/render/model", "#tpm/step")` yields `render/model`.
#[must_use]
pub fn strip_namespace<'a>(tag: &'a str, namespace: &str) -> Option<&'a str> {
    tag.strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
}
