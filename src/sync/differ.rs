use serde::Serialize;
use tracing::debug;

use crate::model::item::PresentationItem;

/// One step of an edit script turning an old list into a new one.
///
/// Steps apply in order, and each index refers to the list as it stands
/// after the steps before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DiffOp {
    Insert { index: usize, item: PresentationItem },
    Remove { index: usize },
    /// Same slot, different content
    Update { index: usize, item: PresentationItem },
}

/// Alignment step between the trimmed middles of both lists
enum Step {
    Keep(usize, usize),
    Delete,
    Add(usize),
}

/// Compute the edit script from `old` to `new`.
///
/// Slots are matched with [`PresentationItem::same_slot`] along a longest
/// common subsequence; matched slots whose content changed become updates.
/// Moved items come out as a remove plus an insert.
pub fn diff(old: &[PresentationItem], new: &[PresentationItem]) -> Vec<DiffOp> {
    let prefix = old
        .iter()
        .zip(new)
        .take_while(|(a, b)| a.same_slot(b))
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a.same_slot(b))
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops = Vec::new();
    for (i, (a, b)) in old[..prefix].iter().zip(&new[..prefix]).enumerate() {
        if a != b {
            ops.push(DiffOp::Update {
                index: i,
                item: b.clone(),
            });
        }
    }

    let mut pos = prefix;
    for step in align(old_mid, new_mid) {
        match step {
            Step::Keep(i, j) => {
                if old_mid[i] != new_mid[j] {
                    ops.push(DiffOp::Update {
                        index: pos,
                        item: new_mid[j].clone(),
                    });
                }
                pos += 1;
            }
            Step::Delete => ops.push(DiffOp::Remove { index: pos }),
            Step::Add(j) => {
                ops.push(DiffOp::Insert {
                    index: pos,
                    item: new_mid[j].clone(),
                });
                pos += 1;
            }
        }
    }

    let old_tail = &old[old.len() - suffix..];
    let new_tail = &new[new.len() - suffix..];
    for (a, b) in old_tail.iter().zip(new_tail) {
        if a != b {
            ops.push(DiffOp::Update {
                index: pos,
                item: b.clone(),
            });
        }
        pos += 1;
    }

    ops
}

/// Largest LCS table `align` builds; past this it replaces the whole middle.
const MAX_ALIGN_CELLS: usize = 4_000_000;

/// Longest-common-subsequence alignment on slot identity.
fn align(old: &[PresentationItem], new: &[PresentationItem]) -> Vec<Step> {
    let (n, m) = (old.len(), new.len());
    if n == 0 || m == 0 || n.saturating_mul(m) > MAX_ALIGN_CELLS {
        if n > 0 && m > 0 {
            debug!(old = n, new = m, "change too large to align, replacing all rows");
        }
        return (0..n)
            .map(|_| Step::Delete)
            .chain((0..m).map(Step::Add))
            .collect();
    }

    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let width = m + 1;
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if old[i].same_slot(&new[j]) {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut steps = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i].same_slot(&new[j]) {
            steps.push(Step::Keep(i, j));
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            steps.push(Step::Delete);
            i += 1;
        } else {
            steps.push(Step::Add(j));
            j += 1;
        }
    }
    steps.extend((i..n).map(|_| Step::Delete));
    steps.extend((j..m).map(Step::Add));
    steps
}

/// Apply an edit script produced by [`diff`] to a mirrored list.
///
/// # Panics
/// If an index is out of range for `items`, i.e. the script was computed
/// against a different list.
pub fn apply(items: &mut Vec<PresentationItem>, ops: &[DiffOp]) {
    for op in ops {
        match op {
            DiffOp::Insert { index, item } => items.insert(*index, item.clone()),
            DiffOp::Remove { index } => {
                items.remove(*index);
            }
            DiffOp::Update { index, item } => items[*index] = item.clone(),
        }
    }
}
