//! Mount / sync / unmount lifecycle (component I).

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::sync::RwLock;

use log::{debug, info, warn};

use portfs_codec::{Decode, Encode};

use crate::bitmap::Bitmap;
use crate::error::{PortFsError, Result};
use crate::layout::{FiletableEntry, Superblock, FILETABLE_ENTRY_SIZE, MAGIC, SUPERBLOCK_SIZE};
use crate::state::{FiletableSlot, State};

pub const ROOT_INO: u32 = 1;

/// A mounted PortFS image: the backing file handle plus the coarse-locked
/// in-memory metadata (§5). The file handle needs no lock of its own —
/// every access goes through positioned (`pread`/`pwrite`-style) I/O.
pub struct PortFs {
    pub(crate) file: File,
    pub(crate) state: RwLock<State>,
}

fn check_invariants(sb: &Superblock) -> Result<()> {
    if sb.magic != MAGIC {
        return Err(PortFsError::Invalid);
    }
    if !(sb.filetable_start < sb.block_bitmap_start
        && sb.block_bitmap_start < sb.data_start
        && sb.data_start <= sb.total_blocks)
    {
        return Err(PortFsError::Invalid);
    }
    let filetable_bytes = sb.filetable_size as u64 * sb.block_size as u64;
    if sb.max_file_count as u64 * FILETABLE_ENTRY_SIZE as u64 > filetable_bytes {
        return Err(PortFsError::Invalid);
    }
    if sb.block_bitmap_size as u64 * sb.block_size as u64 * 8 < sb.total_blocks as u64 {
        return Err(PortFsError::Invalid);
    }
    Ok(())
}

impl PortFs {
    /// Opens the backing file, parses its layout, and installs a root
    /// directory, per §4.9.
    pub fn mount(path: &std::path::Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut sb_buf = [0u8; SUPERBLOCK_SIZE];
        file.read_exact_at(&mut sb_buf, 0)?;
        let (superblock, _) = Superblock::decode(&sb_buf)?;
        check_invariants(&superblock)?;

        let filetable_region_bytes =
            superblock.filetable_size as u64 * superblock.block_size as u64;
        let mut filetable_buf = vec![0u8; filetable_region_bytes as usize];
        file.read_exact_at(
            &mut filetable_buf,
            superblock.filetable_start as u64 * superblock.block_size as u64,
        )?;

        let mut filetable = Vec::with_capacity(superblock.max_file_count as usize);
        let mut off = 0usize;
        for _ in 0..superblock.max_file_count {
            let (entry, n) = FiletableEntry::decode(&filetable_buf[off..])?;
            off += n;
            filetable.push(FiletableSlot {
                entry,
                indirect_extents: None,
                dir_entries: None,
                dirty: false,
            });
        }

        let bitmap_region_bytes = superblock.block_bitmap_size as u64 * superblock.block_size as u64;
        let mut bitmap_buf = vec![0u8; bitmap_region_bytes as usize];
        file.read_exact_at(
            &mut bitmap_buf,
            superblock.block_bitmap_start as u64 * superblock.block_size as u64,
        )?;
        let bitmap = Bitmap::from_bytes(bitmap_buf, superblock.total_blocks as usize);

        let mut next_ino = ROOT_INO + 1;
        for slot in &filetable {
            if let Some(ino) = slot.entry.ino() {
                next_ino = next_ino.max(ino + 1);
            }
        }

        let mut state = State {
            superblock,
            bitmap,
            filetable,
            super_dirty: false,
            next_ino,
        };

        if state.find_by_ino(ROOT_INO).is_none() {
            let idx = state
                .find_free_entry()
                .ok_or(PortFsError::NoSpace)?;
            state.filetable[idx].entry = FiletableEntry::Dir {
                ino: ROOT_INO,
                mode: crate::layout::S_IFDIR | 0o755,
                size_in_bytes: 0,
                dir_block: 0,
                parent_dir_ino: ROOT_INO,
            };
            state.filetable[idx].dirty = true;
            info!("installed fresh root directory at ino {ROOT_INO}");
        }

        info!(
            "mounted image: block_size={} total_blocks={}",
            state.superblock.block_size, state.superblock.total_blocks
        );

        Ok(PortFs {
            file,
            state: RwLock::new(state),
        })
    }

    /// Reads one block. Takes `block_size` explicitly rather than locking
    /// `self.state` — every call site already holds that lock.
    pub(crate) fn read_block(&self, block: u32, block_size: u32, buf: &mut [u8]) -> Result<()> {
        self.file
            .read_exact_at(&mut buf[..block_size as usize], block as u64 * block_size as u64)?;
        Ok(())
    }

    pub(crate) fn write_block(&self, block: u32, block_size: u32, buf: &[u8]) -> Result<()> {
        self.file
            .write_all_at(&buf[..block_size as usize], block as u64 * block_size as u64)?;
        Ok(())
    }

    /// The coarse lock guarding every in-memory structure (§5). Callers
    /// (e.g. a FUSE adapter) take this once per request and pass the guard
    /// through to the operation methods.
    pub fn state(&self) -> &RwLock<State> {
        &self.state
    }

    /// Writes back superblock, filetable (plus resident indirect/dir
    /// buffers), and bitmap, then fsyncs the backing file (§4.9).
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let block_size = state.superblock.block_size;

        let mut sb_buf = [0u8; SUPERBLOCK_SIZE];
        state.superblock.encode(&mut sb_buf)?;
        self.file.write_all_at(&sb_buf, 0)?;

        let filetable_start = state.superblock.filetable_start as u64 * block_size as u64;
        let mut entry_buf = [0u8; FILETABLE_ENTRY_SIZE];
        for (idx, slot) in state.filetable.iter_mut().enumerate() {
            slot.entry.encode(&mut entry_buf)?;
            self.file
                .write_all_at(&entry_buf, filetable_start + (idx * FILETABLE_ENTRY_SIZE) as u64)?;

            if let (Some(indirect), FiletableEntry::File { extents_block, .. }) =
                (&slot.indirect_extents, &slot.entry)
            {
                if *extents_block != 0 && !indirect.is_empty() {
                    let mut page = vec![0u8; block_size as usize];
                    let mut off = 0;
                    for ext in indirect {
                        off += ext.encode(&mut page[off..])?;
                    }
                    self.write_block(*extents_block, block_size, &page)?;
                }
            }

            if let (Some(dir_entries), FiletableEntry::Dir { dir_block, .. }) =
                (&slot.dir_entries, &slot.entry)
            {
                if *dir_block != 0 {
                    let mut page = vec![0u8; block_size as usize];
                    let mut off = 0;
                    for d in dir_entries {
                        off += d.encode(&mut page[off..])?;
                    }
                    self.write_block(*dir_block, block_size, &page)?;
                }
            }

            slot.dirty = false;
        }

        let bitmap_start = state.superblock.block_bitmap_start as u64 * block_size as u64;
        self.file.write_all_at(state.bitmap.as_bytes(), bitmap_start)?;
        state.bitmap.clear_dirty();
        state.super_dirty = false;

        self.file.sync_all()?;
        debug!("sync complete");
        Ok(())
    }

    /// Syncs and releases in-memory buffers; the backing file is closed
    /// when `self` drops.
    pub fn unmount(self) -> Result<()> {
        self.sync()?;
        let mut state = self.state.write().unwrap();
        for slot in state.filetable.iter_mut() {
            slot.indirect_extents = None;
            slot.dir_entries = None;
        }
        warn!("unmounted");
        Ok(())
    }
}
