//! Free-extent index (component C): a transient ordered multiset of free
//! runs, rebuilt by scanning the bitmap once per allocation request and
//! discarded afterwards (§4.3). Never persisted, never incrementally
//! maintained — simplicity over an incremental-maintenance bug class.

use std::collections::BTreeSet;

use crate::bitmap::Bitmap;
use crate::layout::{Extent, MAX_EXTENT_LENGTH};

/// Ordered first by length descending, then by start_block ascending —
/// encoded directly into the `Ord` impl so a `BTreeSet` iterates
/// longest-extent-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeExtentKey {
    length: u32,
    start_block: u32,
}

impl Ord for FreeExtentKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .length
            .cmp(&self.length)
            .then(self.start_block.cmp(&other.start_block))
    }
}

impl PartialOrd for FreeExtentKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

pub struct FreeExtentIndex {
    tree: BTreeSet<FreeExtentKey>,
}

impl FreeExtentIndex {
    /// Scans `[data_start, total_blocks)` for maximal runs of clear bits,
    /// each capped at `MAX_EXTENT_LENGTH`.
    pub fn build(bitmap: &Bitmap, data_start: u32, total_blocks: u32) -> Self {
        let mut tree = BTreeSet::new();
        let mut run_start: Option<u32> = None;
        let mut run_len: u32 = 0;

        let flush = |tree: &mut BTreeSet<FreeExtentKey>, start: u32, len: u32| {
            let mut remaining = len;
            let mut block = start;
            while remaining > 0 {
                let take = remaining.min(MAX_EXTENT_LENGTH);
                tree.insert(FreeExtentKey {
                    length: take,
                    start_block: block,
                });
                block += take;
                remaining -= take;
            }
        };

        for block in data_start..total_blocks {
            if bitmap.is_set(block as usize) {
                if let Some(start) = run_start.take() {
                    flush(&mut tree, start, run_len);
                    run_len = 0;
                }
            } else {
                if run_start.is_none() {
                    run_start = Some(block);
                }
                run_len += 1;
            }
        }
        if let Some(start) = run_start {
            flush(&mut tree, start, run_len);
        }

        FreeExtentIndex { tree }
    }

    /// Iterates longest-available-extent-first; among equal lengths, lowest
    /// `start_block` first.
    pub fn iter(&self) -> impl Iterator<Item = Extent> + '_ {
        self.tree.iter().map(|k| Extent {
            start_block: k.start_block,
            length: k.length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_longest_first_then_lowest_start() {
        let mut bitmap = Bitmap::zeroed(32, 4);
        // mark everything used, then free two runs: [4,6) and [10,18)
        bitmap.set_range(0, 32);
        bitmap.clear_range(4, 2);
        bitmap.clear_range(10, 8);

        let index = FreeExtentIndex::build(&bitmap, 0, 32);
        let extents: Vec<Extent> = index.iter().collect();
        assert_eq!(
            extents,
            vec![
                Extent {
                    start_block: 10,
                    length: 8
                },
                Extent {
                    start_block: 4,
                    length: 2
                },
            ]
        );
    }

    #[test]
    fn caps_runs_at_max_extent_length() {
        let bitmap = Bitmap::zeroed(3000, 376);
        let index = FreeExtentIndex::build(&bitmap, 0, 3000);
        let extents: Vec<Extent> = index.iter().collect();
        assert_eq!(extents.len(), 3);
        assert_eq!(extents[0].length, MAX_EXTENT_LENGTH);
        assert_eq!(extents[2].length, 3000 - 2 * MAX_EXTENT_LENGTH);
    }
}
