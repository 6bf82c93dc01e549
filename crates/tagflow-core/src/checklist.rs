//! Structural matching of checklist lines and whole-document rewrites.
//!
//! Nothing here touches the filesystem: callers read the document, hand the
//! text in, and write back whatever [`rewrite_document`] returns.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::item::RawItem;
use crate::status::TaskStatus;

static CHECKLIST_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^([\s>]*)([0-9]+[.)]|[*+-])\s*(?:\[(.)\])?\s*(.*)$"));
static TASK_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^([\s>]*)([0-9]+[.)]|[*+-])\s+\[(.)\]\s*(.*)$"));
static LIST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^[\s>]*(?:[0-9]+[.)]|[*+-])\s"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("built-in pattern {pattern} must compile: {err}"))
}

/// A line split into its checklist parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecklistLine<'a> {
    /// Leading indentation and quote markers, verbatim.
    pub prefix: &'a str,
    /// List marker.
    pub marker: &'a str,
    /// Glyph between the brackets, when the line has brackets.
    pub status: Option<char>,
    /// Everything after the status.
    pub content: &'a str,
}

impl<'a> ChecklistLine<'a> {
    /// Match a list line, with or without a status bracket.
    #[must_use]
    pub fn parse(line: &'a str) -> Option<Self> {
        Self::from_captures(&CHECKLIST_RE, line)
    }

    /// Match a list line that carries a status bracket.
    #[must_use]
    pub fn parse_task(line: &'a str) -> Option<Self> {
        Self::from_captures(&TASK_ITEM_RE, line)
    }

    fn from_captures(re: &Regex, line: &'a str) -> Option<Self> {
        let caps = re.captures(line)?;
        Some(Self {
            prefix: caps.get(1).map_or("", |m| m.as_str()),
            marker: caps.get(2)?.as_str(),
            status: caps.get(3).and_then(|m| m.as_str().chars().next()),
            content: caps.get(4).map_or("", |m| m.as_str()),
        })
    }
}

/// Split a `\n`-separated line into its body and a trailing `\r`, if any.
///
/// Lines are numbered by `\n` alone, as in [`scan_document`], and every line
/// keeps its own ending.
fn split_carriage_return(line: &str) -> (&str, &str) {
    line.strip_suffix('\r').map_or((line, ""), |body| (body, "\r"))
}

/// Why a rewrite refused to touch the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The recorded line or span lies past the end of the document.
    LineOutOfRange,
    /// The recorded line is no longer a list item.
    NotAChecklistItem,
    /// The recorded line now holds different text.
    StaleText,
}

impl AbortReason {
    /// Short human readable description.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::LineOutOfRange => "line is past the end of the file",
            Self::NotAChecklistItem => "line is not a checklist item",
            Self::StaleText => "line text changed since the index was built",
        }
    }
}

/// Result of [`rewrite_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRewrite {
    /// Requested status and text already match.
    Unchanged,
    /// New full document text.
    Rewritten(String),
    /// Document left alone.
    Aborted(AbortReason),
}

/// True when applying `status`/`text` to `item` would change nothing.
#[must_use]
pub fn is_noop(item: &RawItem, status: TaskStatus, text: Option<&str>) -> bool {
    item.status == status && text.is_none_or(|text| text == item.text)
}

/// Rewrite the status (and optionally the text) of `item` inside `content`.
///
/// The recorded line is matched again before anything changes; a line that
/// moved, stopped being a list item, or carries different text aborts the
/// rewrite so a stale item can never clobber a concurrent edit. Indentation and
/// quote markers are reused verbatim and each line keeps its own line ending.
#[must_use]
pub fn rewrite_document(
    content: &str,
    item: &RawItem,
    status: TaskStatus,
    text: Option<&str>,
) -> DocumentRewrite {
    if is_noop(item, status, text) {
        return DocumentRewrite::Unchanged;
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let Some(raw) = lines.get(item.line) else {
        return DocumentRewrite::Aborted(AbortReason::LineOutOfRange);
    };
    let (current, eol) = split_carriage_return(raw);
    let Some(parsed) = ChecklistLine::parse(current) else {
        return DocumentRewrite::Aborted(AbortReason::NotAChecklistItem);
    };
    let known_first = item.first_line().trim();
    if parsed.content.trim() != known_first {
        return DocumentRewrite::Aborted(AbortReason::StaleText);
    }

    let head = |first: &str| {
        format!(
            "{}{} [{}] {first}{eol}",
            parsed.prefix,
            parsed.marker,
            status.glyph()
        )
    };

    let (replacement, end) = match text {
        Some(text) => {
            let end = item.end_line();
            if end > lines.len() {
                return DocumentRewrite::Aborted(AbortReason::LineOutOfRange);
            }
            let mut parts = text.lines();
            let mut replacement = vec![head(parts.next().unwrap_or_default())];
            replacement.extend(parts.map(|line| format!("{}\t{line}{eol}", parsed.prefix)));
            (replacement, end)
        }
        None => (vec![head(known_first)], item.line + 1),
    };

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + replacement.len());
    out.extend_from_slice(&lines[..item.line]);
    out.extend(replacement.iter().map(String::as_str));
    out.extend_from_slice(&lines[end..]);
    DocumentRewrite::Rewritten(out.join("\n"))
}

fn is_fence(line: &str) -> bool {
    let stripped = line.trim_start_matches(|c: char| c.is_whitespace() || c == '>');
    stripped.starts_with("```") || stripped.starts_with("~~~")
}

/// Collect every checklist item of a document.
///
/// An item continues on following lines that start with the item's prefix plus
/// extra whitespace and are neither blank nor list items themselves. Fenced
/// code blocks are skipped.
#[must_use]
pub fn scan_document(path: &str, content: &str) -> Vec<RawItem> {
    let lines: Vec<&str> = content.lines().collect();
    let mut items = Vec::new();
    let mut in_fence = false;
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        if is_fence(line) {
            in_fence = !in_fence;
            idx += 1;
            continue;
        }
        if in_fence {
            idx += 1;
            continue;
        }
        let Some(parsed) = ChecklistLine::parse_task(line) else {
            idx += 1;
            continue;
        };

        let mut text = parsed.content.trim_end().to_owned();
        let mut next = idx + 1;
        while let Some(candidate) = lines.get(next) {
            let Some(rest) = candidate.strip_prefix(parsed.prefix) else {
                break;
            };
            if candidate.trim().is_empty()
                || !rest.starts_with(char::is_whitespace)
                || LIST_ITEM_RE.is_match(candidate)
                || is_fence(candidate)
            {
                break;
            }
            text.push('\n');
            text.push_str(rest.trim());
            next += 1;
        }

        items.push(RawItem {
            path: path.to_owned(),
            line: idx,
            line_count: next - idx,
            symbol: parsed.marker.to_owned(),
            status: TaskStatus(parsed.status.unwrap_or(' ')),
            text,
        });
        idx = next;
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(line: usize, line_count: usize, status: char, text: &str) -> RawItem {
        RawItem {
            path: "note.md".into(),
            line,
            line_count,
            symbol: "-".into(),
            status: TaskStatus(status),
            text: text.into(),
        }
    }

    fn rewritten(outcome: DocumentRewrite) -> String {
        match outcome {
            DocumentRewrite::Rewritten(text) => text,
            other => panic!("expected rewrite, got {other:?}"),
        }
    }

    #[test]
    fn parses_markers_and_prefixes() {
        let Some(line) = ChecklistLine::parse("> \t1) [x] done thing") else {
            panic!("must parse");
        };
        assert_eq!(line.prefix, "> \t");
        assert_eq!(line.marker, "1)");
        assert_eq!(line.status, Some('x'));
        assert_eq!(line.content, "done thing");

        let Some(plain) = ChecklistLine::parse("* no brackets") else {
            panic!("must parse");
        };
        assert_eq!(plain.status, None);
        assert_eq!(plain.content, "no brackets");

        assert!(ChecklistLine::parse("plain paragraph").is_none());
        assert!(ChecklistLine::parse_task("- not a task").is_none());
    }

    #[test]
    fn mixed_line_endings_keep_scanner_numbering() {
        let doc = "- [ ] a\r\n- [ ] b\n- [ ] dup\r\n- [ ] dup\r\n";
        let items = scan_document("mixed.md", doc);
        assert_eq!(items.iter().map(|item| item.line).collect::<Vec<_>>(), vec![0, 1, 2, 3]);

        let out = rewritten(rewrite_document(doc, &items[2], TaskStatus::DONE, None));
        assert_eq!(out, "- [ ] a\r\n- [ ] b\n- [x] dup\r\n- [ ] dup\r\n");
        let out = rewritten(rewrite_document(doc, &items[1], TaskStatus::DONE, None));
        assert_eq!(out, "- [ ] a\r\n- [x] b\n- [ ] dup\r\n- [ ] dup\r\n");
    }

    #[test]
    fn crlf_text_rewrite_ends_every_new_line_with_crlf() {
        let doc = "- [ ] old\r\n  more\r\n- [ ] next\r\n";
        let out = rewritten(rewrite_document(
            doc,
            &item(0, 2, ' ', "old\nmore"),
            TaskStatus::OPEN,
            Some("new\nbody"),
        ));
        assert_eq!(out, "- [ ] new\r\n\tbody\r\n- [ ] next\r\n");
    }

    #[test]
    fn status_only_rewrite_keeps_indent_and_rest_of_file() {
        let doc = "# Title\n\t- [ ] first\n- [ ] second\n";
        let out = rewritten(rewrite_document(doc, &item(1, 1, ' ', "first"), TaskStatus::DONE, None));
        assert_eq!(out, "# Title\n\t- [x] first\n- [ ] second\n");
    }

    #[test]
    fn crlf_documents_stay_crlf() {
        let doc = "- [ ] a\r\n- [ ] b\r\n";
        let out = rewritten(rewrite_document(doc, &item(1, 1, ' ', "b"), TaskStatus::DONE, None));
        assert_eq!(out, "- [ ] a\r\n- [x] b\r\n");
    }

    #[test]
    fn text_rewrite_replaces_whole_multiline_span() {
        let doc = "> - [ ] old\n>   continued\n> - [ ] next\n";
        let target = item(0, 2, ' ', "old\ncontinued");
        let out = rewritten(rewrite_document(
            doc,
            &target,
            TaskStatus::OPEN,
            Some("new\nbody one\nbody two"),
        ));
        assert_eq!(out, "> - [ ] new\n> \tbody one\n> \tbody two\n> - [ ] next\n");
    }

    #[test]
    fn empty_text_rewrite_keeps_marker() {
        let doc = "1. [ ] numbered\n";
        let target = RawItem {
            symbol: "1.".into(),
            ..item(0, 1, ' ', "numbered")
        };
        let out = rewritten(rewrite_document(doc, &target, TaskStatus('/'), Some("")));
        assert_eq!(out, "1. [/] \n");
    }

    #[test]
    fn identical_request_is_unchanged() {
        let target = item(0, 1, 'x', "done");
        assert_eq!(
            rewrite_document("- [x] done", &target, TaskStatus::DONE, Some("done")),
            DocumentRewrite::Unchanged
        );
        assert_eq!(
            rewrite_document("garbage", &target, TaskStatus::DONE, None),
            DocumentRewrite::Unchanged
        );
    }

    #[test]
    fn stale_or_missing_lines_abort() {
        let doc = "- [ ] edited elsewhere\nplain\n";
        assert_eq!(
            rewrite_document(doc, &item(0, 1, ' ', "original"), TaskStatus::DONE, None),
            DocumentRewrite::Aborted(AbortReason::StaleText)
        );
        assert_eq!(
            rewrite_document(doc, &item(1, 1, ' ', "plain"), TaskStatus::DONE, None),
            DocumentRewrite::Aborted(AbortReason::NotAChecklistItem)
        );
        assert_eq!(
            rewrite_document(doc, &item(7, 1, ' ', "x"), TaskStatus::DONE, None),
            DocumentRewrite::Aborted(AbortReason::LineOutOfRange)
        );
        assert_eq!(
            rewrite_document(
                "- [ ] edited elsewhere",
                &item(0, 3, ' ', "edited elsewhere\na\nb"),
                TaskStatus::DONE,
                Some("x")
            ),
            DocumentRewrite::Aborted(AbortReason::LineOutOfRange)
        );
    }

    #[test]
    fn status_rewrite_matches_trimmed_first_line() {
        let doc = "- [ ]   padded text  \n";
        let out = rewritten(rewrite_document(
            doc,
            &item(0, 1, ' ', "padded text"),
            TaskStatus::DONE,
            None,
        ));
        assert_eq!(out, "- [x] padded text\n");
    }

    #[test]
    fn scan_collects_items_with_continuations() {
        let doc = "\
# Heading
- [ ] first #tpm/tag/hi
  more text
  - [x] nested child
- plain bullet
```
- [ ] inside fence
```
> 2. [/] quoted ^block
";
        let items = scan_document("dir/note.md", doc);
        assert_eq!(items.len(), 3);

        assert_eq!(items[0].line, 1);
        assert_eq!(items[0].line_count, 2);
        assert_eq!(items[0].text, "first #tpm/tag/hi\nmore text");
        assert_eq!(items[0].symbol, "-");

        assert_eq!(items[1].line, 3);
        assert_eq!(items[1].status, TaskStatus::DONE);
        assert_eq!(items[1].text, "nested child");

        assert_eq!(items[2].line, 8);
        assert_eq!(items[2].symbol, "2.");
        assert_eq!(items[2].status, TaskStatus('/'));
        assert_eq!(items[2].path, "dir/note.md");
    }

    #[test]
    fn scanned_items_rewrite_cleanly() {
        let doc = "- [ ] one\r\n\t- [ ] two\r\n";
        let items = scan_document("a.md", doc);
        assert_eq!(items.len(), 2);
        let out = rewritten(rewrite_document(doc, &items[1], TaskStatus::DONE, None));
        assert_eq!(out, "- [ ] one\r\n\t- [x] two\r\n");
    }
}
