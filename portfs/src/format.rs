//! Image formatter (§4.13): lays out the superblock, filetable, and bitmap
//! regions over a freshly sized backing file and marks their blocks used.

use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::Path;

use portfs_codec::Encode;

use crate::bitmap::Bitmap;
use crate::error::Result;
use crate::layout::{
    FiletableEntry, Superblock, FILETABLE_ENTRY_SIZE, MAGIC, SUPERBLOCK_SIZE,
};

/// One inode slot per MiB of image size, matching the teacher's
/// capacity-to-size ratio for its filetable sizing.
const BYTES_PER_INODE: u64 = 1024 * 1024;

pub struct FormatOptions {
    pub image_size_bytes: u64,
    pub block_size: u32,
}

/// Creates (or truncates) `path` to `image_size_bytes` and writes a fresh
/// PortFS layout into it.
pub fn format_image(path: &Path, opts: FormatOptions) -> Result<()> {
    let block_size = opts.block_size as u64;
    let total_blocks = (opts.image_size_bytes / block_size) as u32;
    let max_file_count = (opts.image_size_bytes / BYTES_PER_INODE).max(1) as u32;

    let filetable_bytes = max_file_count as u64 * FILETABLE_ENTRY_SIZE as u64;
    let filetable_size = filetable_bytes.div_ceil(block_size) as u32;

    let bitmap_bytes = (total_blocks as u64).div_ceil(8);
    let block_bitmap_size = bitmap_bytes.div_ceil(block_size) as u32;

    let filetable_start = 1u32;
    let block_bitmap_start = filetable_start + filetable_size;
    let data_start = block_bitmap_start + block_bitmap_size;

    let superblock = Superblock {
        magic: MAGIC,
        block_size: opts.block_size,
        total_blocks,
        filetable_start,
        filetable_size,
        block_bitmap_start,
        block_bitmap_size,
        data_start,
        max_file_count,
        checksum: 0,
        last_mount_time: 0,
        last_write_time: 0,
        flags: 0,
    };

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.set_len(opts.image_size_bytes)?;

    let mut sb_buf = [0u8; SUPERBLOCK_SIZE];
    superblock.encode(&mut sb_buf)?;
    file.write_all_at(&sb_buf, 0)?;

    let mut entry_buf = [0u8; FILETABLE_ENTRY_SIZE];
    FiletableEntry::Free.encode(&mut entry_buf)?;
    let filetable_base = filetable_start as u64 * block_size;
    for i in 0..max_file_count as u64 {
        file.write_all_at(&entry_buf, filetable_base + i * FILETABLE_ENTRY_SIZE as u64)?;
    }

    // metadata blocks [0, data_start) are allocated up front so the
    // allocator never hands them out as free data blocks.
    let mut bitmap = Bitmap::zeroed(total_blocks as usize, block_bitmap_size as usize * opts.block_size as usize);
    bitmap.set_range(0, data_start as usize);
    let bitmap_base = block_bitmap_start as u64 * block_size;
    file.write_all_at(bitmap.as_bytes(), bitmap_base)?;

    file.sync_all()?;
    Ok(())
}
