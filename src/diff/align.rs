//! Alignment of two line sequences into a minimal edit script.
//!
//! The script is derived from the longest common subsequence of the two
//! sequences, computed with the classic dynamic program. When several minimal
//! scripts exist the walk favors earlier matches and emits deletions before
//! insertions, so the output is deterministic.

use std::collections::VecDeque;

/// One step of the minimal edit script transforming the source sequence
/// into the target sequence. Line numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    /// Line present in both sequences.
    Equal {
        source_line: usize,
        target_line: usize,
    },
    /// Line only present in the source sequence.
    Delete { source_line: usize },
    /// Line only present in the target sequence.
    Insert { target_line: usize },
}

/// A script entry after coalescing adjacent delete/insert pairs.
///
/// `Modified` keeps both sides of the pairing so the original content
/// remains reachable for source reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignedChange {
    Unchanged {
        source_line: usize,
        target_line: usize,
    },
    Removed {
        source_line: usize,
    },
    Added {
        target_line: usize,
    },
    Modified {
        source_line: usize,
        target_line: usize,
    },
}

/// Compute the minimal edit script between `source` and `target`.
///
/// The common prefix and suffix are matched up front so the quadratic
/// table only covers the differing middle of the two sequences.
pub fn align(source: &[String], target: &[String]) -> Vec<Edit> {
    let n = source.len();
    let m = target.len();

    let mut prefix = 0;
    while prefix < n && prefix < m && source[prefix] == target[prefix] {
        prefix += 1;
    }

    let mut suffix = 0;
    while suffix < n - prefix && suffix < m - prefix && source[n - 1 - suffix] == target[m - 1 - suffix]
    {
        suffix += 1;
    }

    let mut script = Vec::with_capacity(n.max(m));
    for offset in 0..prefix {
        script.push(Edit::Equal {
            source_line: offset + 1,
            target_line: offset + 1,
        });
    }

    let mid_source = &source[prefix..n - suffix];
    let mid_target = &target[prefix..m - suffix];
    align_middle(mid_source, mid_target, prefix, &mut script);

    for offset in 0..suffix {
        script.push(Edit::Equal {
            source_line: n - suffix + offset + 1,
            target_line: m - suffix + offset + 1,
        });
    }

    script
}

/// LCS dynamic program over the differing middle of the two sequences.
///
/// `table[i][j]` holds the LCS length of `source[i..]` and `target[j..]`;
/// the forward walk over the table favors earlier matches and prefers
/// deleting from the source when both directions are equally good.
fn align_middle(source: &[String], target: &[String], offset: usize, script: &mut Vec<Edit>) {
    let n = source.len();
    let m = target.len();
    if n == 0 && m == 0 {
        return;
    }

    let width = m + 1;
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if source[i] == target[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut i = 0;
    let mut j = 0;
    while i < n || j < m {
        if i < n && j < m && source[i] == target[j] {
            script.push(Edit::Equal {
                source_line: offset + i + 1,
                target_line: offset + j + 1,
            });
            i += 1;
            j += 1;
        } else if j >= m || (i < n && table[(i + 1) * width + j] >= table[i * width + j + 1]) {
            script.push(Edit::Delete {
                source_line: offset + i + 1,
            });
            i += 1;
        } else {
            script.push(Edit::Insert {
                target_line: offset + j + 1,
            });
            j += 1;
        }
    }
}

/// Reclassify adjacent delete/insert pairs as modifications.
///
/// Within a run of deletions directly followed by insertions the k-th
/// deletion pairs with the k-th insertion; pairing is purely positional,
/// no similarity scoring. Unpaired entries keep their original class.
pub fn coalesce(script: &[Edit]) -> Vec<AlignedChange> {
    let mut changes = Vec::with_capacity(script.len());
    let mut pending_deletes: VecDeque<usize> = VecDeque::new();

    for edit in script {
        match *edit {
            Edit::Equal {
                source_line,
                target_line,
            } => {
                flush_pending(&mut pending_deletes, &mut changes);
                changes.push(AlignedChange::Unchanged {
                    source_line,
                    target_line,
                });
            }
            Edit::Delete { source_line } => {
                pending_deletes.push_back(source_line);
            }
            Edit::Insert { target_line } => match pending_deletes.pop_front() {
                Some(source_line) => changes.push(AlignedChange::Modified {
                    source_line,
                    target_line,
                }),
                None => changes.push(AlignedChange::Added { target_line }),
            },
        }
    }
    flush_pending(&mut pending_deletes, &mut changes);

    changes
}

fn flush_pending(pending: &mut VecDeque<usize>, changes: &mut Vec<AlignedChange>) {
    while let Some(source_line) = pending.pop_front() {
        changes.push(AlignedChange::Removed { source_line });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_sequences_align_as_equal() {
        let a = lines(&["a", "b"]);
        let script = align(&a, &a);
        assert_eq!(
            script,
            [
                Edit::Equal {
                    source_line: 1,
                    target_line: 1
                },
                Edit::Equal {
                    source_line: 2,
                    target_line: 2
                },
            ]
        );
    }

    #[test]
    fn appended_line_becomes_insert() {
        let a = lines(&["line1", "line2"]);
        let b = lines(&["line1", "line2", "line3"]);
        let script = align(&a, &b);
        assert_eq!(script.last(), Some(&Edit::Insert { target_line: 3 }));
        assert_eq!(script.len(), 3);
    }

    #[test]
    fn replaced_line_is_delete_then_insert() {
        let a = lines(&["a", "b", "c"]);
        let b = lines(&["a", "x", "c"]);
        let script = align(&a, &b);
        assert_eq!(
            script,
            [
                Edit::Equal {
                    source_line: 1,
                    target_line: 1
                },
                Edit::Delete { source_line: 2 },
                Edit::Insert { target_line: 2 },
                Edit::Equal {
                    source_line: 3,
                    target_line: 3
                },
            ]
        );
    }

    #[test]
    fn ties_favor_deleting_from_the_source_first() {
        // No common line at all: every minimal script works, ours removes
        // the whole source before inserting the target.
        let a = lines(&["a", "b"]);
        let b = lines(&["x"]);
        let script = align(&a, &b);
        assert_eq!(
            script,
            [
                Edit::Delete { source_line: 1 },
                Edit::Delete { source_line: 2 },
                Edit::Insert { target_line: 1 },
            ]
        );
    }

    #[test]
    fn earlier_matches_are_preferred() {
        // "x" appears twice in the target; the match goes to the first one.
        let a = lines(&["x"]);
        let b = lines(&["x", "y", "x"]);
        let script = align(&a, &b);
        assert_eq!(
            script[0],
            Edit::Equal {
                source_line: 1,
                target_line: 1
            }
        );
    }

    #[test]
    fn script_length_is_edit_distance_plus_matches() {
        let a = lines(&["a", "b", "c", "d"]);
        let b = lines(&["a", "c", "e"]);
        // LCS = [a, c], so 2 deletions (b, d) and 1 insertion (e).
        let script = align(&a, &b);
        let matches = script
            .iter()
            .filter(|e| matches!(e, Edit::Equal { .. }))
            .count();
        assert_eq!(matches, 2);
        assert_eq!(script.len(), 5);
    }

    #[test]
    fn coalesce_pairs_adjacent_delete_and_insert() {
        let script = [
            Edit::Delete { source_line: 2 },
            Edit::Insert { target_line: 2 },
        ];
        assert_eq!(
            coalesce(&script),
            [AlignedChange::Modified {
                source_line: 2,
                target_line: 2
            }]
        );
    }

    #[test]
    fn coalesce_leaves_unpaired_deletes_removed() {
        let script = [
            Edit::Delete { source_line: 1 },
            Edit::Delete { source_line: 2 },
            Edit::Insert { target_line: 1 },
        ];
        assert_eq!(
            coalesce(&script),
            [
                AlignedChange::Modified {
                    source_line: 1,
                    target_line: 1
                },
                AlignedChange::Removed { source_line: 2 },
            ]
        );
    }

    #[test]
    fn coalesce_leaves_unpaired_inserts_added() {
        let script = [
            Edit::Delete { source_line: 1 },
            Edit::Insert { target_line: 1 },
            Edit::Insert { target_line: 2 },
        ];
        assert_eq!(
            coalesce(&script),
            [
                AlignedChange::Modified {
                    source_line: 1,
                    target_line: 1
                },
                AlignedChange::Added { target_line: 2 },
            ]
        );
    }

    #[test]
    fn coalesce_does_not_pair_across_unchanged_lines() {
        let script = [
            Edit::Delete { source_line: 1 },
            Edit::Equal {
                source_line: 2,
                target_line: 1,
            },
            Edit::Insert { target_line: 2 },
        ];
        assert_eq!(
            coalesce(&script),
            [
                AlignedChange::Removed { source_line: 1 },
                AlignedChange::Unchanged {
                    source_line: 2,
                    target_line: 1
                },
                AlignedChange::Added { target_line: 2 },
            ]
        );
    }
}
