//! File data read/write (component G): offset translation across the
//! direct + indirect extent lists, append-mode growth via the allocator.

use crate::error::{PortFsError, Result};
use crate::layout::{Extent, FiletableEntry, DIRECT_EXTENTS};
use crate::mount::PortFs;
use crate::state::State;

impl PortFs {
    /// Direct extents (up to `extent_count`) followed by indirect-page
    /// extents, loading the indirect page if the file has one.
    fn all_extents(&self, state: &mut State, entry_idx: usize) -> Result<Vec<Extent>> {
        let (direct_extents, extent_count) = match &state.filetable[entry_idx].entry {
            FiletableEntry::File {
                direct_extents,
                extent_count,
                ..
            } => (*direct_extents, *extent_count as usize),
            _ => return Err(PortFsError::IsDir),
        };

        let mut out = Vec::with_capacity(extent_count);
        for ext in direct_extents.iter().take(extent_count.min(DIRECT_EXTENTS)) {
            out.push(*ext);
        }
        if extent_count > DIRECT_EXTENTS {
            self.ensure_indirect_resident(state, entry_idx)?;
            let indirect = state.filetable[entry_idx]
                .indirect_extents
                .as_ref()
                .unwrap();
            out.extend_from_slice(indirect);
        }
        Ok(out)
    }

    /// Translates a byte offset into `(global_block, offset_in_block,
    /// bytes_left_in_this_block)`. Callers loop one block at a time, so
    /// the available span never crosses a block boundary even when the
    /// underlying extent spans many blocks. `Fault` if `pos` runs past the
    /// file's allocated extent range.
    fn translate(&self, state: &mut State, entry_idx: usize, pos: u64) -> Result<(u32, u64, u64)> {
        let block_size = state.superblock.block_size as u64;
        let extents = self.all_extents(state, entry_idx)?;

        let target_block_index = pos / block_size;
        let offset_in_block = pos % block_size;

        let mut blocks_seen = 0u64;
        for ext in &extents {
            let ext_blocks = ext.length as u64;
            if target_block_index < blocks_seen + ext_blocks {
                let within = target_block_index - blocks_seen;
                let global_block = ext.start_block as u64 + within;
                let bytes_left_in_block = block_size - offset_in_block;
                return Ok((global_block as u32, offset_in_block, bytes_left_in_block));
            }
            blocks_seen += ext_blocks;
        }
        Err(PortFsError::Fault)
    }

    /// Reads up to `buf.len()` bytes starting at `pos`, clamped to the
    /// file's logical size. Returns the number of bytes read.
    pub fn file_read(
        &self,
        state: &mut State,
        entry_idx: usize,
        pos: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        let size = state.filetable[entry_idx].entry.size_in_bytes();
        if pos >= size {
            return Ok(0);
        }
        let block_size = state.superblock.block_size as u64;
        let want = (buf.len() as u64).min(size - pos) as usize;

        let mut done = 0usize;
        while done < want {
            let cur = pos + done as u64;
            let (block, offset_in_block, avail) = self.translate(state, entry_idx, cur)?;
            let chunk = (want - done).min(avail as usize);

            let mut block_buf = vec![0u8; block_size as usize];
            self.read_block(block, block_size as u32, &mut block_buf)?;
            let start = offset_in_block as usize;
            buf[done..done + chunk].copy_from_slice(&block_buf[start..start + chunk]);
            done += chunk;
        }
        Ok(done)
    }

    /// Writes `data` starting at `pos`, growing the extent list first if
    /// `pos + data.len()` exceeds the currently allocated capacity. The
    /// logical size is only advanced once every extent write succeeds.
    pub fn file_write(
        &self,
        state: &mut State,
        entry_idx: usize,
        pos: u64,
        data: &[u8],
    ) -> Result<usize> {
        let needed_end = pos + data.len() as u64;
        let allocated = self.allocated_size(state, entry_idx)?;
        if needed_end > allocated {
            self.allocate(state, entry_idx, needed_end - allocated)?;
        }

        let block_size = state.superblock.block_size as u64;
        let mut done = 0usize;
        while done < data.len() {
            let cur = pos + done as u64;
            let (block, offset_in_block, avail) = self.translate(state, entry_idx, cur)?;
            let chunk = (data.len() - done).min(avail as usize);

            let mut block_buf = vec![0u8; block_size as usize];
            self.read_block(block, block_size as u32, &mut block_buf)?;
            let start = offset_in_block as usize;
            block_buf[start..start + chunk].copy_from_slice(&data[done..done + chunk]);
            self.write_block(block, block_size as u32, &block_buf)?;
            done += chunk;
        }

        let size = state.filetable[entry_idx].entry.size_in_bytes();
        if needed_end > size {
            state.filetable[entry_idx].entry.set_size_in_bytes(needed_end);
        }
        state.filetable[entry_idx].dirty = true;
        Ok(done)
    }
}
