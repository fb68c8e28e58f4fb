//! Line diff between a document's current text and a proposed rewrite.
//!
//! This is purely textual; nothing here interprets markdown.

use std::fmt::Write as _;

use serde::Serialize;
use similar::{ChangeTag, TextDiff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineKind {
    Equal,
    Insert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLine {
    pub kind: DiffLineKind,
    /// 1-indexed line number in the original text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_line: Option<usize>,
    /// 1-indexed line number in the proposed text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_line: Option<usize>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDiff {
    pub lines: Vec<DiffLine>,
    pub added: usize,
    pub removed: usize,
}

impl DocumentDiff {
    #[must_use]
    pub fn compute(original: &str, proposed: &str) -> Self {
        let diff = TextDiff::from_lines(original, proposed);
        let mut lines = Vec::new();
        let mut added = 0;
        let mut removed = 0;

        for change in diff.iter_all_changes() {
            let kind = match change.tag() {
                ChangeTag::Equal => DiffLineKind::Equal,
                ChangeTag::Insert => {
                    added += 1;
                    DiffLineKind::Insert
                }
                ChangeTag::Delete => {
                    removed += 1;
                    DiffLineKind::Delete
                }
            };
            lines.push(DiffLine {
                kind,
                old_line: change.old_index().map(|i| i + 1),
                new_line: change.new_index().map(|i| i + 1),
                text: change.value().trim_end_matches(['\n', '\r']).to_string(),
            });
        }

        Self {
            lines,
            added,
            removed,
        }
    }

    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.removed == 0
    }

    /// Render with one line of context around each change and `...` over gaps.
    #[must_use]
    pub fn to_unified(&self) -> String {
        let mut out = String::new();
        let mut last_emitted: Option<usize> = None;

        for (i, line) in self.lines.iter().enumerate() {
            let near_change = line.kind != DiffLineKind::Equal
                || (i > 0 && self.lines[i - 1].kind != DiffLineKind::Equal)
                || self
                    .lines
                    .get(i + 1)
                    .is_some_and(|next| next.kind != DiffLineKind::Equal);
            if !near_change {
                continue;
            }
            if let Some(last) = last_emitted
                && i - last > 1
            {
                out.push_str("...\n");
            }
            let marker = match line.kind {
                DiffLineKind::Equal => ' ',
                DiffLineKind::Insert => '+',
                DiffLineKind::Delete => '-',
            };
            let _ = writeln!(out, "{marker}{}", line.text);
            last_emitted = Some(i);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{DiffLineKind, DocumentDiff};

    #[test]
    fn identical_text_is_unchanged() {
        let diff = DocumentDiff::compute("a\nb\n", "a\nb\n");
        assert!(diff.is_unchanged());
        assert_eq!(diff.to_unified(), "");
    }

    #[test]
    fn counts_inserts_and_deletes() {
        let diff = DocumentDiff::compute("# Title\nold line\n", "# Title\nnew line\nextra\n");
        assert_eq!(diff.added, 2);
        assert_eq!(diff.removed, 1);
        let deleted = diff
            .lines
            .iter()
            .find(|l| l.kind == DiffLineKind::Delete)
            .unwrap();
        assert_eq!(deleted.text, "old line");
        assert_eq!(deleted.old_line, Some(2));
        assert_eq!(deleted.new_line, None);
    }

    #[test]
    fn empty_original_is_all_inserts() {
        let diff = DocumentDiff::compute("", "# Hi");
        assert_eq!(diff.added, 1);
        assert_eq!(diff.removed, 0);
        assert_eq!(diff.to_unified(), "+# Hi\n");
    }

    #[test]
    fn unified_elides_distant_context() {
        let original = "1\n2\n3\n4\n5\n6\n7\n";
        let proposed = "one\n2\n3\n4\n5\n6\nseven\n";
        let unified = DocumentDiff::compute(original, proposed).to_unified();
        assert!(unified.contains("-1\n+one\n 2\n"));
        assert!(unified.contains("...\n"));
        assert!(unified.ends_with(" 6\n-7\n+seven\n"));
    }
}
