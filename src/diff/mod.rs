//! Line-based comparison of two backup dumps.
//!
//! A comparison is a pure, single-pass pipeline: both dumps are split into
//! lines, the [align] engine derives a minimal edit script, adjacent
//! delete/insert pairs are coalesced into modifications and the result is
//! aggregated into counts plus an ordered change list. Nothing is cached and
//! concurrent comparisons share no state.

pub mod align;
pub mod document;

pub use align::{AlignedChange, Edit};
pub use document::{DocumentError, DumpDocument};

use derive_more::{Display, Error, From};

/// Classification of a single line in a comparison result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// One line of the comparison result.
///
/// Removed lines are numbered after the source dump; added, modified and
/// unchanged lines after the compared dump.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChangeRecord {
    pub line_number: usize,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub content: String,
}

/// Counts of the change list, one counter per [ChangeKind].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified + self.unchanged
    }
}

/// A complete comparison of two dumps.
///
/// Serializes to the wire shape consumed by the dashboard: the four counters
/// flattened next to the ordered `changes` list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ComparisonResult {
    #[serde(flatten)]
    pub summary: DiffSummary,
    pub changes: Vec<ChangeRecord>,
}

/// Limits applied to a single comparison.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct CompareOptions {
    /// Ceiling on the combined line count of both dumps. Bounds the memory
    /// of the quadratic alignment table.
    #[serde(default = "default_max_total_lines")]
    pub max_total_lines: usize,

    /// Treat an empty dump as an error instead of a zero-line document.
    #[serde(default)]
    pub reject_empty: bool,
}

fn default_max_total_lines() -> usize {
    10_000
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            max_total_lines: default_max_total_lines(),
            reject_empty: false,
        }
    }
}

/// Errors of a single comparison. None of these leave partial results behind.
#[derive(Debug, Display, Error, From)]
pub enum CompareError {
    /// One of the dumps could not be split into lines.
    #[display("{_0}")]
    #[from]
    Document(DocumentError),

    /// The pair exceeds the configured line ceiling.
    #[display("combined line count {lines} exceeds the configured ceiling of {limit} lines")]
    DocumentTooLarge { lines: usize, limit: usize },

    /// The alignment produced a change list that fails its own invariants.
    #[display("comparison produced an inconsistent change list")]
    InternalComputation,
}

/// Compare two raw dump contents line by line.
///
/// `source` is the base of the comparison; `target` is the dump compared
/// against it. Returns either a complete [ComparisonResult] or an error,
/// never a truncated change list.
pub fn compare(
    source: &str,
    target: &str,
    opts: &CompareOptions,
) -> Result<ComparisonResult, CompareError> {
    let source_doc = DumpDocument::parse(source)?;
    let target_doc = DumpDocument::parse(target)?;

    if opts.reject_empty && (source_doc.is_empty() || target_doc.is_empty()) {
        return Err(DocumentError::EmptyDocument.into());
    }

    let combined = source_doc.line_count() + target_doc.line_count();
    if combined > opts.max_total_lines {
        return Err(CompareError::DocumentTooLarge {
            lines: combined,
            limit: opts.max_total_lines,
        });
    }

    let script = align::align(source_doc.lines(), target_doc.lines());
    let aligned = align::coalesce(&script);
    log::trace!(
        target: "diff",
        "aligned {} vs {} lines into {} change records",
        source_doc.line_count(),
        target_doc.line_count(),
        aligned.len()
    );

    let changes = serialize_changes(&aligned, &source_doc, &target_doc)?;
    let summary = summarize(&changes);

    Ok(ComparisonResult { summary, changes })
}

/// Single pass over the finalized change list, one counter per type.
fn summarize(changes: &[ChangeRecord]) -> DiffSummary {
    let mut summary = DiffSummary::default();
    for change in changes {
        match change.kind {
            ChangeKind::Added => summary.added += 1,
            ChangeKind::Removed => summary.removed += 1,
            ChangeKind::Modified => summary.modified += 1,
            ChangeKind::Unchanged => summary.unchanged += 1,
        }
    }
    summary
}

/// Turn the aligned script into the public change list.
///
/// Verifies before returning that the added, modified and unchanged records
/// reproduce the compared dump in order; a mismatch means the alignment is
/// broken and surfaces as [CompareError::InternalComputation] instead of a
/// garbage diff.
fn serialize_changes(
    aligned: &[AlignedChange],
    source: &DumpDocument,
    target: &DumpDocument,
) -> Result<Vec<ChangeRecord>, CompareError> {
    let mut changes = Vec::with_capacity(aligned.len());
    for change in aligned {
        let record = match *change {
            AlignedChange::Unchanged { target_line, .. } => ChangeRecord {
                line_number: target_line,
                kind: ChangeKind::Unchanged,
                content: line_content(target, target_line)?,
            },
            AlignedChange::Removed { source_line } => ChangeRecord {
                line_number: source_line,
                kind: ChangeKind::Removed,
                content: line_content(source, source_line)?,
            },
            AlignedChange::Added { target_line } => ChangeRecord {
                line_number: target_line,
                kind: ChangeKind::Added,
                content: line_content(target, target_line)?,
            },
            AlignedChange::Modified { target_line, .. } => ChangeRecord {
                line_number: target_line,
                kind: ChangeKind::Modified,
                content: line_content(target, target_line)?,
            },
        };
        changes.push(record);
    }

    let reconstructed: Vec<&str> = changes
        .iter()
        .filter(|c| c.kind != ChangeKind::Removed)
        .map(|c| c.content.as_str())
        .collect();
    let target_lines: Vec<&str> = target.lines().iter().map(String::as_str).collect();
    if reconstructed != target_lines {
        return Err(CompareError::InternalComputation);
    }

    Ok(changes)
}

fn line_content(doc: &DumpDocument, line_number: usize) -> Result<String, CompareError> {
    doc.line(line_number)
        .map(str::to_string)
        .ok_or(CompareError::InternalComputation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str, target: &str) -> ComparisonResult {
        compare(source, target, &CompareOptions::default()).unwrap()
    }

    fn counts(result: &ComparisonResult) -> (usize, usize, usize, usize) {
        let s = result.summary;
        (s.added, s.removed, s.modified, s.unchanged)
    }

    #[test]
    fn identical_dumps_are_fully_unchanged() {
        let dump = "CREATE TABLE t\nINSERT INTO t VALUES (1)\n";
        let result = run(dump, dump);
        assert_eq!(counts(&result), (0, 0, 0, 2));
        assert!(result
            .changes
            .iter()
            .all(|c| c.kind == ChangeKind::Unchanged));
    }

    #[test]
    fn appended_line_is_reported_added() {
        let result = run("line1\nline2\n", "line1\nline2\nline3\n");
        assert_eq!(counts(&result), (1, 0, 0, 2));
        let added: Vec<_> = result
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Added)
            .collect();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].line_number, 3);
        assert_eq!(added[0].content, "line3");
    }

    #[test]
    fn replaced_line_is_reported_modified() {
        let result = run("a\nb\nc\n", "a\nx\nc\n");
        assert_eq!(counts(&result), (0, 0, 1, 2));
        let modified: Vec<_> = result
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Modified)
            .collect();
        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].line_number, 2);
        assert_eq!(modified[0].content, "x");
    }

    #[test]
    fn empty_source_reports_every_target_line_added() {
        let result = run("", "only line\n");
        assert_eq!(counts(&result), (1, 0, 0, 0));
        assert_eq!(result.changes[0].line_number, 1);
        assert_eq!(result.changes[0].content, "only line");
    }

    #[test]
    fn two_empty_dumps_compare_clean() {
        let result = run("", "");
        assert_eq!(counts(&result), (0, 0, 0, 0));
        assert!(result.changes.is_empty());
    }

    #[test]
    fn summary_counts_cover_every_record() {
        let result = run("a\nb\nc\nd\n", "a\nx\nc\ny\nz\n");
        assert_eq!(result.summary.total(), result.changes.len());
    }

    #[test]
    fn counts_are_symmetric_between_directions() {
        let a = "a\nb\nc\nd\n";
        let b = "a\nx\nc\ny\nz\n";
        let forward = run(a, b);
        let backward = run(b, a);
        assert_eq!(forward.summary.added, backward.summary.removed);
        assert_eq!(forward.summary.removed, backward.summary.added);
        assert_eq!(forward.summary.modified, backward.summary.modified);
        assert_eq!(forward.summary.unchanged, backward.summary.unchanged);
    }

    #[test]
    fn unchanged_and_target_side_records_reconstruct_the_target() {
        let a = "a\nb\nc\nd\ne\n";
        let b = "a\nx\nc\nz\n";
        let result = run(a, b);
        let rebuilt: Vec<&str> = result
            .changes
            .iter()
            .filter(|c| c.kind != ChangeKind::Removed)
            .map(|c| c.content.as_str())
            .collect();
        assert_eq!(rebuilt, ["a", "x", "c", "z"]);
    }

    #[test]
    fn script_with_original_content_reconstructs_the_source() {
        // Modified records carry the compared dump's content, so source
        // reconstruction goes through the aligned script, which keeps the
        // source line of every pairing.
        let source = DumpDocument::parse("a\nb\nc\nd\n").unwrap();
        let target = DumpDocument::parse("a\nx\nd\n").unwrap();
        let script = align::align(source.lines(), target.lines());
        let aligned = align::coalesce(&script);

        let mut rebuilt: Vec<&str> = Vec::new();
        for change in &aligned {
            match *change {
                AlignedChange::Unchanged { source_line, .. }
                | AlignedChange::Removed { source_line }
                | AlignedChange::Modified { source_line, .. } => {
                    rebuilt.push(source.line(source_line).unwrap());
                }
                AlignedChange::Added { .. } => {}
            }
        }
        assert_eq!(rebuilt, ["a", "b", "c", "d"]);
    }

    #[test]
    fn unchanged_records_reproduce_the_common_subsequence() {
        let result = run("a\nb\nc\n", "a\nc\nd\n");
        let common: Vec<&str> = result
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Unchanged)
            .map(|c| c.content.as_str())
            .collect();
        assert_eq!(common, ["a", "c"]);
    }

    #[test]
    fn removed_lines_use_source_numbering() {
        let result = run("keep\ndrop\n", "keep\n");
        let removed: Vec<_> = result
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Removed)
            .collect();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].line_number, 2);
        assert_eq!(removed[0].content, "drop");
    }

    #[test]
    fn oversized_pairs_are_rejected() {
        let opts = CompareOptions {
            max_total_lines: 3,
            ..Default::default()
        };
        let err = compare("a\nb\n", "a\nb\n", &opts).unwrap_err();
        assert!(matches!(
            err,
            CompareError::DocumentTooLarge { lines: 4, limit: 3 }
        ));
    }

    #[test]
    fn empty_input_errors_only_when_rejected() {
        let opts = CompareOptions {
            reject_empty: true,
            ..Default::default()
        };
        let err = compare("", "a\n", &opts).unwrap_err();
        assert!(matches!(
            err,
            CompareError::Document(DocumentError::EmptyDocument)
        ));
    }

    #[test]
    fn binary_content_is_rejected() {
        let err = compare("a\0b", "a", &CompareOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            CompareError::Document(DocumentError::UnsupportedContent)
        ));
    }

    #[test]
    fn result_serializes_to_the_dashboard_contract() {
        let result = run("a\n", "a\nb\n");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["added"], 1);
        assert_eq!(json["removed"], 0);
        assert_eq!(json["modified"], 0);
        assert_eq!(json["unchanged"], 1);
        assert_eq!(json["changes"][0]["type"], "unchanged");
        assert_eq!(json["changes"][1]["line_number"], 2);
        assert_eq!(json["changes"][1]["type"], "added");
        assert_eq!(json["changes"][1]["content"], "b");
    }

    #[test]
    fn whitespace_differences_are_meaningful() {
        let result = run("a \n", "a\n");
        assert_eq!(counts(&result), (0, 0, 1, 0));
    }
}
