//! In-memory mount state: the filetable plus each entry's resident
//! auxiliary buffers (component E, plus the ownership rules from §9's
//! design note on per-entry buffers).

use crate::bitmap::Bitmap;
use crate::layout::{DirSlot, Extent, FiletableEntry, Superblock};

/// One filetable slot plus whatever of its indirect-extent page / directory
/// block happens to be resident. Both buffers are owned exclusively by the
/// slot and freed at unmount (or at rmdir, for the directory buffer).
#[derive(Debug, Clone)]
pub struct FiletableSlot {
    pub entry: FiletableEntry,
    pub indirect_extents: Option<Vec<Extent>>,
    pub dir_entries: Option<Vec<DirSlot>>,
    pub dirty: bool,
}

impl FiletableSlot {
    pub fn free() -> Self {
        FiletableSlot {
            entry: FiletableEntry::Free,
            indirect_extents: None,
            dir_entries: None,
            dirty: false,
        }
    }
}

pub struct State {
    pub superblock: Superblock,
    pub bitmap: Bitmap,
    pub filetable: Vec<FiletableSlot>,
    pub super_dirty: bool,
    pub next_ino: u32,
}

impl State {
    pub fn find_free_entry(&self) -> Option<usize> {
        self.filetable.iter().position(|s| s.entry.is_free())
    }

    pub fn find_by_ino(&self, ino: u32) -> Option<usize> {
        self.filetable.iter().position(|s| s.entry.ino() == Some(ino))
    }

    /// Mints a fresh inode number: the root is always 1; every other value
    /// is a counter bumped past any currently resident collision (§4.5).
    pub fn mint_ino(&mut self) -> u32 {
        loop {
            let candidate = self.next_ino;
            self.next_ino = self.next_ino.wrapping_add(1).max(2);
            if self.find_by_ino(candidate).is_none() {
                return candidate;
            }
        }
    }
}
