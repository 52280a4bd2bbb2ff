//! Fixed-slot directory store (component F): one data block per directory,
//! carved into 68-byte `DirSlot` records, `.`/`..` synthesized on iteration
//! rather than stored (§4.6).

use portfs_codec::Decode;

use crate::error::{PortFsError, Result};
use crate::layout::{DirSlot, FiletableEntry, DIR_SLOT_SIZE, MAX_NAME_LENGTH};
use crate::mount::PortFs;
use crate::state::State;

impl PortFs {
    fn dir_capacity(&self, block_size: u32) -> usize {
        block_size as usize / DIR_SLOT_SIZE
    }

    /// Ensures `dir_idx`'s slot array is resident, allocating its single
    /// data block on first use.
    pub(crate) fn load_dir(&self, state: &mut State, dir_idx: usize) -> Result<()> {
        if state.filetable[dir_idx].dir_entries.is_some() {
            return Ok(());
        }
        if !state.filetable[dir_idx].entry.is_dir() {
            return Err(PortFsError::NotDir);
        }

        let block_size = state.superblock.block_size;
        let capacity = self.dir_capacity(block_size);

        let dir_block = match &state.filetable[dir_idx].entry {
            FiletableEntry::Dir { dir_block, .. } => *dir_block,
            _ => unreachable!(),
        };

        if dir_block == 0 {
            let data_start = state.superblock.data_start as usize;
            let total_blocks = state.superblock.total_blocks as usize;
            let block = state
                .bitmap
                .find_first_clear(data_start, total_blocks)
                .ok_or(PortFsError::NoSpace)? as u32;
            state.bitmap.set(block as usize);
            self.write_block(block, block_size, &vec![0u8; block_size as usize])?;

            if let FiletableEntry::Dir { dir_block, .. } = &mut state.filetable[dir_idx].entry {
                *dir_block = block;
            }
            state.filetable[dir_idx].dir_entries = Some(vec![DirSlot::free(); capacity]);
        } else {
            let mut page = vec![0u8; block_size as usize];
            self.read_block(dir_block, block_size, &mut page)?;
            let mut slots = Vec::with_capacity(capacity);
            let mut off = 0;
            for _ in 0..capacity {
                let (slot, n) = DirSlot::decode(&page[off..])?;
                off += n;
                slots.push(slot);
            }
            state.filetable[dir_idx].dir_entries = Some(slots);
        }
        state.filetable[dir_idx].dirty = true;
        Ok(())
    }

    /// Adds `name -> ino` to `dir_idx`. Fails with `NoSpace` if the
    /// directory block is full, rather than silently dropping the entry.
    pub fn dir_add(&self, state: &mut State, dir_idx: usize, name: &[u8], ino: u32) -> Result<()> {
        if name.is_empty() || name == b"." || name == b".." {
            return Err(PortFsError::Invalid);
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(PortFsError::NameTooLong);
        }
        self.load_dir(state, dir_idx)?;
        let slots = state.filetable[dir_idx].dir_entries.as_mut().unwrap();
        if slots.iter().any(|s| !s.is_free() && s.matches_name(name)) {
            return Err(PortFsError::Exists);
        }
        let free_idx = slots
            .iter()
            .position(|s| s.is_free())
            .ok_or(PortFsError::NoSpace)?;
        slots[free_idx] = DirSlot::new(name, ino);

        state.filetable[dir_idx].dirty = true;
        if let FiletableEntry::Dir { size_in_bytes, .. } = &mut state.filetable[dir_idx].entry {
            *size_in_bytes += DIR_SLOT_SIZE as u64;
        }
        Ok(())
    }

    pub fn dir_find(&self, state: &mut State, dir_idx: usize, name: &[u8]) -> Result<Option<u32>> {
        self.load_dir(state, dir_idx)?;
        let slots = state.filetable[dir_idx].dir_entries.as_ref().unwrap();
        Ok(slots
            .iter()
            .find(|s| !s.is_free() && s.matches_name(name))
            .map(|s| s.inode_number))
    }

    pub fn dir_remove(&self, state: &mut State, dir_idx: usize, name: &[u8]) -> Result<()> {
        self.load_dir(state, dir_idx)?;
        let slots = state.filetable[dir_idx].dir_entries.as_mut().unwrap();
        let slot = slots
            .iter_mut()
            .find(|s| !s.is_free() && s.matches_name(name))
            .ok_or(PortFsError::NotFound)?;
        *slot = DirSlot::free();
        state.filetable[dir_idx].dirty = true;
        if let FiletableEntry::Dir { size_in_bytes, .. } = &mut state.filetable[dir_idx].entry {
            *size_in_bytes = size_in_bytes.saturating_sub(DIR_SLOT_SIZE as u64);
        }
        Ok(())
    }

    /// True when the directory holds no entries besides the synthesized
    /// `.`/`..` (§4.8 rmdir precondition). A directory whose data block was
    /// never allocated (`dir_block == 0`) is empty by construction; this
    /// short-circuits before `load_dir` so the query never allocates one.
    pub fn dir_is_empty(&self, state: &mut State, dir_idx: usize) -> Result<bool> {
        if !state.filetable[dir_idx].entry.is_dir() {
            return Err(PortFsError::NotDir);
        }
        let dir_block = match &state.filetable[dir_idx].entry {
            FiletableEntry::Dir { dir_block, .. } => *dir_block,
            _ => unreachable!(),
        };
        if dir_block == 0 {
            return Ok(true);
        }
        self.load_dir(state, dir_idx)?;
        let slots = state.filetable[dir_idx].dir_entries.as_ref().unwrap();
        Ok(slots.iter().all(|s| s.is_free()))
    }

    /// Returns `.`, `..`, then every stored entry in slot order.
    pub fn dir_iterate(&self, state: &mut State, dir_idx: usize) -> Result<Vec<(Vec<u8>, u32)>> {
        self.load_dir(state, dir_idx)?;
        let self_ino = state.filetable[dir_idx].entry.ino().unwrap();
        let parent_ino = match &state.filetable[dir_idx].entry {
            FiletableEntry::Dir { parent_dir_ino, .. } => *parent_dir_ino,
            _ => return Err(PortFsError::NotDir),
        };

        let mut out = vec![(b".".to_vec(), self_ino), (b"..".to_vec(), parent_ino)];
        let slots = state.filetable[dir_idx].dir_entries.as_ref().unwrap();
        for s in slots {
            if !s.is_free() {
                out.push((s.name_bytes().to_vec(), s.inode_number));
            }
        }
        Ok(out)
    }
}
