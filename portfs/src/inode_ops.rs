//! Inode-level operations (component H): create, mkdir, lookup, unlink,
//! rmdir, setattr. Each operation rolls back its filetable slot on a
//! partial failure so a failed call never leaves a minted-but-orphaned ino.

use crate::error::{PortFsError, Result};
use crate::layout::{Extent, FiletableEntry, DIRECT_EXTENTS, S_IFDIR, S_IFREG};
use crate::mount::PortFs;
use crate::state::State;

impl PortFs {
    pub fn lookup(&self, state: &mut State, parent_idx: usize, name: &[u8]) -> Result<usize> {
        let ino = self
            .dir_find(state, parent_idx, name)?
            .ok_or(PortFsError::NotFound)?;
        state.find_by_ino(ino).ok_or(PortFsError::NotFound)
    }

    pub fn create(
        &self,
        state: &mut State,
        parent_idx: usize,
        name: &[u8],
        perm_bits: u16,
    ) -> Result<usize> {
        if !state.filetable[parent_idx].entry.is_dir() {
            return Err(PortFsError::NotDir);
        }
        let entry_idx = state.find_free_entry().ok_or(PortFsError::NoSpace)?;
        let ino = state.mint_ino();
        state.filetable[entry_idx].entry = FiletableEntry::File {
            ino,
            mode: S_IFREG | (perm_bits & 0o7777),
            size_in_bytes: 0,
            extent_count: 0,
            extents_block: 0,
            direct_extents: [Extent::default(); DIRECT_EXTENTS],
        };
        state.filetable[entry_idx].dirty = true;

        if let Err(e) = self.dir_add(state, parent_idx, name, ino) {
            state.filetable[entry_idx] = crate::state::FiletableSlot::free();
            return Err(e);
        }
        Ok(entry_idx)
    }

    pub fn mkdir(
        &self,
        state: &mut State,
        parent_idx: usize,
        name: &[u8],
        perm_bits: u16,
    ) -> Result<usize> {
        if !state.filetable[parent_idx].entry.is_dir() {
            return Err(PortFsError::NotDir);
        }
        let parent_ino = state.filetable[parent_idx]
            .entry
            .ino()
            .ok_or(PortFsError::Invalid)?;

        let entry_idx = state.find_free_entry().ok_or(PortFsError::NoSpace)?;
        let ino = state.mint_ino();
        state.filetable[entry_idx].entry = FiletableEntry::Dir {
            ino,
            mode: S_IFDIR | (perm_bits & 0o7777),
            size_in_bytes: 0,
            dir_block: 0,
            parent_dir_ino: parent_ino,
        };
        state.filetable[entry_idx].dirty = true;

        if let Err(e) = self.dir_add(state, parent_idx, name, ino) {
            state.filetable[entry_idx] = crate::state::FiletableSlot::free();
            return Err(e);
        }
        Ok(entry_idx)
    }

    /// Frees every block owned by `entry_idx` (direct extents, indirect
    /// extents, and the indirect page itself), leaving the slot `Free`.
    fn reclaim_file_blocks(&self, state: &mut State, entry_idx: usize) -> Result<()> {
        let (direct_extents, extent_count, extents_block) = match &state.filetable[entry_idx].entry
        {
            FiletableEntry::File {
                direct_extents,
                extent_count,
                extents_block,
                ..
            } => (*direct_extents, *extent_count as usize, *extents_block),
            _ => return Err(PortFsError::IsDir),
        };

        for ext in direct_extents.iter().take(extent_count.min(DIRECT_EXTENTS)) {
            state
                .bitmap
                .clear_range(ext.start_block as usize, ext.length as usize);
        }

        if extent_count > DIRECT_EXTENTS {
            self.ensure_indirect_resident(state, entry_idx)?;
            let indirect = state.filetable[entry_idx]
                .indirect_extents
                .take()
                .unwrap_or_default();
            for ext in &indirect {
                state
                    .bitmap
                    .clear_range(ext.start_block as usize, ext.length as usize);
            }
        }
        if extents_block != 0 {
            state.bitmap.clear(extents_block as usize);
        }
        Ok(())
    }

    pub fn unlink(&self, state: &mut State, parent_idx: usize, name: &[u8]) -> Result<()> {
        let ino = self
            .dir_find(state, parent_idx, name)?
            .ok_or(PortFsError::NotFound)?;
        let entry_idx = state.find_by_ino(ino).ok_or(PortFsError::NotFound)?;
        if state.filetable[entry_idx].entry.is_dir() {
            return Err(PortFsError::IsDir);
        }

        self.reclaim_file_blocks(state, entry_idx)?;
        state.filetable[entry_idx] = crate::state::FiletableSlot::free();
        self.dir_remove(state, parent_idx, name)?;
        Ok(())
    }

    pub fn rmdir(&self, state: &mut State, parent_idx: usize, name: &[u8]) -> Result<()> {
        let ino = self
            .dir_find(state, parent_idx, name)?
            .ok_or(PortFsError::NotFound)?;
        let entry_idx = state.find_by_ino(ino).ok_or(PortFsError::NotFound)?;
        if !state.filetable[entry_idx].entry.is_dir() {
            return Err(PortFsError::NotDir);
        }
        if !self.dir_is_empty(state, entry_idx)? {
            return Err(PortFsError::NotEmpty);
        }

        if let FiletableEntry::Dir { dir_block, .. } = &state.filetable[entry_idx].entry {
            if *dir_block != 0 {
                state.bitmap.clear(*dir_block as usize);
            }
        }
        state.filetable[entry_idx] = crate::state::FiletableSlot::free();
        self.dir_remove(state, parent_idx, name)?;
        Ok(())
    }

    /// Truncates or extends `entry_idx` to `new_size` bytes (§4.8 setattr).
    /// Shrinking walks extents tail-to-head, freeing whole blocks first and
    /// then trimming the extent that straddles the new boundary.
    pub fn setattr_size(&self, state: &mut State, entry_idx: usize, new_size: u64) -> Result<()> {
        if !matches!(state.filetable[entry_idx].entry, FiletableEntry::File { .. }) {
            return Err(PortFsError::IsDir);
        }
        let block_size = state.superblock.block_size as u64;
        let current_size = state.filetable[entry_idx].entry.size_in_bytes();

        if new_size == current_size {
            return Ok(());
        }
        if new_size > current_size {
            let allocated = self.allocated_size(state, entry_idx)?;
            if new_size > allocated {
                self.allocate(state, entry_idx, new_size - allocated)?;
            }
            state.filetable[entry_idx].entry.set_size_in_bytes(new_size);
            state.filetable[entry_idx].dirty = true;
            return Ok(());
        }

        let keep_blocks = new_size.div_ceil(block_size);
        self.ensure_indirect_resident(state, entry_idx)?;

        let extent_count = match &state.filetable[entry_idx].entry {
            FiletableEntry::File { extent_count, .. } => *extent_count as usize,
            _ => unreachable!(),
        };

        // walk from the last extent backwards, freeing whatever falls
        // beyond keep_blocks
        let mut idx = extent_count;
        let mut blocks_before_tail = {
            // blocks owned by extents [0, idx)
            let mut total = 0u64;
            let direct_extents = match &state.filetable[entry_idx].entry {
                FiletableEntry::File { direct_extents, .. } => *direct_extents,
                _ => unreachable!(),
            };
            let indirect = state.filetable[entry_idx]
                .indirect_extents
                .clone()
                .unwrap_or_default();
            for i in 0..extent_count {
                let len = if i < DIRECT_EXTENTS {
                    direct_extents[i].length
                } else {
                    indirect[i - DIRECT_EXTENTS].length
                };
                total += len as u64;
            }
            total
        };

        while idx > 0 {
            let (start, len) = {
                let direct_extents = match &state.filetable[entry_idx].entry {
                    FiletableEntry::File { direct_extents, .. } => *direct_extents,
                    _ => unreachable!(),
                };
                let indirect = state.filetable[entry_idx]
                    .indirect_extents
                    .clone()
                    .unwrap_or_default();
                let e = if idx - 1 < DIRECT_EXTENTS {
                    direct_extents[idx - 1]
                } else {
                    indirect[idx - 1 - DIRECT_EXTENTS]
                };
                (e.start_block, e.length)
            };

            let blocks_before_this = blocks_before_tail - len as u64;
            if blocks_before_this >= keep_blocks {
                // entire extent is beyond the new size: drop it
                state.bitmap.clear_range(start as usize, len as usize);
                self.clear_extent_slot(state, entry_idx, idx - 1)?;
                idx -= 1;
                blocks_before_tail = blocks_before_this;
            } else if blocks_before_tail > keep_blocks {
                // this extent straddles the boundary: trim its tail
                let new_len = (keep_blocks - blocks_before_this) as u32;
                let freed_from = start + new_len;
                let freed_len = len - new_len;
                state
                    .bitmap
                    .clear_range(freed_from as usize, freed_len as usize);
                self.resize_extent_slot(state, entry_idx, idx - 1, new_len)?;
                break;
            } else {
                break;
            }
        }

        // if everything now fits in direct extents, drop the indirect page
        let extent_count_after = match &state.filetable[entry_idx].entry {
            FiletableEntry::File { extent_count, .. } => *extent_count as usize,
            _ => unreachable!(),
        };
        if extent_count_after <= DIRECT_EXTENTS {
            if let FiletableEntry::File { extents_block, .. } =
                &mut state.filetable[entry_idx].entry
            {
                if *extents_block != 0 {
                    state.bitmap.clear(*extents_block as usize);
                    *extents_block = 0;
                }
            }
            state.filetable[entry_idx].indirect_extents = None;
        }

        state.filetable[entry_idx].entry.set_size_in_bytes(new_size);
        state.filetable[entry_idx].dirty = true;
        Ok(())
    }

    fn clear_extent_slot(&self, state: &mut State, entry_idx: usize, idx: usize) -> Result<()> {
        if idx < DIRECT_EXTENTS {
            if let FiletableEntry::File {
                direct_extents,
                extent_count,
                ..
            } = &mut state.filetable[entry_idx].entry
            {
                direct_extents[idx] = Extent::default();
                *extent_count -= 1;
            }
        } else {
            let indirect = state.filetable[entry_idx]
                .indirect_extents
                .as_mut()
                .unwrap();
            indirect.truncate(idx - DIRECT_EXTENTS);
            if let FiletableEntry::File { extent_count, .. } =
                &mut state.filetable[entry_idx].entry
            {
                *extent_count -= 1;
            }
        }
        Ok(())
    }

    fn resize_extent_slot(
        &self,
        state: &mut State,
        entry_idx: usize,
        idx: usize,
        new_len: u32,
    ) -> Result<()> {
        if idx < DIRECT_EXTENTS {
            if let FiletableEntry::File { direct_extents, .. } =
                &mut state.filetable[entry_idx].entry
            {
                direct_extents[idx].length = new_len;
            }
        } else {
            let indirect = state.filetable[entry_idx]
                .indirect_extents
                .as_mut()
                .unwrap();
            indirect[idx - DIRECT_EXTENTS].length = new_len;
        }
        Ok(())
    }
}
