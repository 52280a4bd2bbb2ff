//! Extent allocator (component D): best-fit over the free-extent index,
//! direct + indirect extent lists, 1.5x over-allocation on growth (§4.4).

use portfs_codec::Decode;

use crate::error::{PortFsError, Result};
use crate::free_extent::FreeExtentIndex;
use crate::layout::{Extent, FiletableEntry, DIRECT_EXTENTS, EXTENT_SIZE};
use crate::mount::PortFs;
use crate::state::State;

impl PortFs {
    fn indirect_capacity(&self, block_size: u32) -> usize {
        block_size as usize / EXTENT_SIZE
    }

    fn max_extents(&self, block_size: u32) -> usize {
        DIRECT_EXTENTS + self.indirect_capacity(block_size)
    }

    /// Ensures the indirect extent page for `entry_idx` is resident,
    /// allocating it if the file has none yet (§4.4 "Indirect-page
    /// initialization").
    pub(crate) fn ensure_indirect_resident(&self, state: &mut State, entry_idx: usize) -> Result<()> {
        let block_size = state.superblock.block_size;
        if state.filetable[entry_idx].indirect_extents.is_some() {
            return Ok(());
        }

        let extents_block = match &state.filetable[entry_idx].entry {
            FiletableEntry::File { extents_block, .. } => *extents_block,
            _ => return Err(PortFsError::Invalid),
        };

        if extents_block == 0 {
            let data_start = state.superblock.data_start as usize;
            let total_blocks = state.superblock.total_blocks as usize;
            let block = state
                .bitmap
                .find_first_clear(data_start, total_blocks)
                .ok_or(PortFsError::NoSpace)? as u32;
            state.bitmap.set(block as usize);
            self.write_block(block, block_size, &vec![0u8; block_size as usize])?;

            if let FiletableEntry::File { extents_block, .. } =
                &mut state.filetable[entry_idx].entry
            {
                *extents_block = block;
            }
            state.filetable[entry_idx].indirect_extents = Some(Vec::new());
        } else {
            let mut page = vec![0u8; block_size as usize];
            self.read_block(extents_block, block_size, &mut page)?;
            let existing_count = match &state.filetable[entry_idx].entry {
                FiletableEntry::File { extent_count, .. } => {
                    (*extent_count as usize).saturating_sub(DIRECT_EXTENTS)
                }
                _ => 0,
            };
            let mut extents = Vec::with_capacity(existing_count);
            let mut off = 0;
            for _ in 0..existing_count {
                let (ext, n) = Extent::decode(&page[off..])?;
                off += n;
                extents.push(ext);
            }
            state.filetable[entry_idx].indirect_extents = Some(extents);
        }
        state.filetable[entry_idx].dirty = true;
        Ok(())
    }

    fn push_extent(&self, state: &mut State, entry_idx: usize, ext: Extent) -> Result<()> {
        let block_size = state.superblock.block_size;
        let count = match &state.filetable[entry_idx].entry {
            FiletableEntry::File { extent_count, .. } => *extent_count as usize,
            _ => return Err(PortFsError::Invalid),
        };

        if count < DIRECT_EXTENTS {
            if let FiletableEntry::File {
                direct_extents,
                extent_count,
                ..
            } = &mut state.filetable[entry_idx].entry
            {
                direct_extents[count] = ext;
                *extent_count += 1;
            }
        } else {
            self.ensure_indirect_resident(state, entry_idx)?;
            let cap = self.indirect_capacity(block_size);
            let indirect = state.filetable[entry_idx]
                .indirect_extents
                .as_mut()
                .unwrap();
            if indirect.len() >= cap {
                return Err(PortFsError::NoSpace);
            }
            indirect.push(ext);
            if let FiletableEntry::File { extent_count, .. } =
                &mut state.filetable[entry_idx].entry
            {
                *extent_count += 1;
            }
        }
        state.filetable[entry_idx].dirty = true;
        Ok(())
    }

    /// Grows `entry_idx`'s extent list to cover at least `bytes` additional
    /// bytes, applying the 1.5x over-allocation policy.
    pub(crate) fn allocate(&self, state: &mut State, entry_idx: usize, bytes: u64) -> Result<()> {
        let block_size = state.superblock.block_size as u64;
        let whole_blocks = bytes.div_ceil(block_size);
        let mut remaining = (whole_blocks * 1500) / 1000;
        if remaining == 0 {
            return Ok(());
        }

        let data_start = state.superblock.data_start;
        let total_blocks = state.superblock.total_blocks;
        let index = FreeExtentIndex::build(&state.bitmap, data_start, total_blocks);

        let max_extents = self.max_extents(state.superblock.block_size);
        let block_size_u32 = state.superblock.block_size;

        for candidate in index.iter() {
            if remaining == 0 {
                break;
            }
            let count = match &state.filetable[entry_idx].entry {
                FiletableEntry::File { extent_count, .. } => *extent_count as usize,
                _ => return Err(PortFsError::Invalid),
            };
            if count >= max_extents {
                return Err(PortFsError::NoSpace);
            }

            // the index was snapshotted before this call started; part of
            // a candidate run may have since been claimed out of band by
            // ensure_indirect_resident (first crossing into the indirect
            // page grabs its own metadata block via a live bitmap scan).
            // trim to the still-free leading prefix rather than
            // double-assign a stolen block to both the indirect page and
            // a data extent; any freed tail is picked up by a later call.
            let mut live_len = 0u32;
            while live_len < candidate.length
                && !state.bitmap.is_set((candidate.start_block + live_len) as usize)
            {
                live_len += 1;
            }
            if live_len == 0 {
                continue;
            }

            let take = (live_len as u64).min(remaining) as u32;
            state
                .bitmap
                .set_range(candidate.start_block as usize, take as usize);
            let zero_block = vec![0u8; block_size as usize];
            for b in candidate.start_block..candidate.start_block + take {
                self.write_block(b, block_size_u32, &zero_block)?;
            }
            self.push_extent(
                state,
                entry_idx,
                Extent {
                    start_block: candidate.start_block,
                    length: take,
                },
            )?;
            remaining -= take as u64;
        }

        if remaining > 0 {
            return Err(PortFsError::NoSpace);
        }
        Ok(())
    }

    /// Sum of `length * block_size` over every extent the file owns. Brings
    /// the indirect page resident first when `extent_count` says there is
    /// one, so a freshly mounted file with overflow extents isn't
    /// under-reported (that under-report would make callers allocate
    /// extents the file already has).
    pub fn allocated_size(&self, state: &mut State, entry_idx: usize) -> Result<u64> {
        let block_size = state.superblock.block_size as u64;
        let extent_count = match &state.filetable[entry_idx].entry {
            FiletableEntry::File { extent_count, .. } => *extent_count as usize,
            _ => return Err(PortFsError::IsDir),
        };
        if extent_count > DIRECT_EXTENTS {
            self.ensure_indirect_resident(state, entry_idx)?;
        }

        let slot = &state.filetable[entry_idx];
        let mut total = 0u64;
        if let FiletableEntry::File { direct_extents, extent_count, .. } = &slot.entry {
            for (i, ext) in direct_extents.iter().enumerate() {
                if (i as u16) < *extent_count {
                    total += ext.length as u64;
                }
            }
        }
        if let Some(indirect) = &slot.indirect_extents {
            for ext in indirect {
                total += ext.length as u64;
            }
        }
        Ok(total * block_size)
    }
}
