//! On-disk record layout and big-endian codec (component A).
//!
//! Field order and width mirror the in-memory structs exactly; the codec's
//! only job is the endian transformation. Every record here round-trips
//! `decode(encode(x)) == x`.

use portfs_codec::{CodecError, Decode, Encode};

pub const MAGIC: u32 = 0x506F_5254;
pub const DIRECT_EXTENTS: usize = 4;
pub const MAX_NAME_LENGTH: usize = 64;
pub const MAX_EXTENT_LENGTH: u32 = 1024;

// Mode bits: high nibble is the type discriminant, matching the ext2-style
// convention the teacher's filetable inode uses (`EXT2_S_IFDIR`/`EXT2_S_IFREG`).
pub const S_IFMT: u16 = 0xF000;
pub const S_IFREG: u16 = 0x8000;
pub const S_IFDIR: u16 = 0x4000;

pub fn mode_is_dir(mode: u16) -> bool {
    mode & S_IFMT == S_IFDIR
}

pub fn mode_is_reg(mode: u16) -> bool {
    mode & S_IFMT == S_IFREG
}

/// A contiguous run of blocks owned by one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    pub start_block: u32,
    pub length: u32,
}

pub const EXTENT_SIZE: usize = 8;

impl Encode for Extent {
    fn encode(&self, target: &mut [u8]) -> Result<usize, CodecError> {
        let mut off = 0;
        off += self.start_block.encode(&mut target[off..])?;
        off += self.length.encode(&mut target[off..])?;
        Ok(off)
    }

    fn encoded_len(&self) -> usize {
        EXTENT_SIZE
    }
}

impl Decode for Extent {
    fn decode(input: &[u8]) -> Result<(Self, usize), CodecError> {
        let mut off = 0;
        let (start_block, n) = u32::decode(&input[off..])?;
        off += n;
        let (length, n) = u32::decode(&input[off..])?;
        off += n;
        Ok((
            Extent {
                start_block,
                length,
            },
            off,
        ))
    }
}

/// The on-disk superblock, located at block 0.
#[derive(Debug, Clone)]
pub struct Superblock {
    pub magic: u32,
    pub block_size: u32,
    pub total_blocks: u32,
    pub filetable_start: u32,
    pub filetable_size: u32,
    pub block_bitmap_start: u32,
    pub block_bitmap_size: u32,
    pub data_start: u32,
    pub max_file_count: u32,
    pub checksum: u32,
    pub last_mount_time: u64,
    pub last_write_time: u64,
    pub flags: u32,
}

pub const SUPERBLOCK_SIZE: usize = 4 * 10 + 8 * 2 + 4;

impl Encode for Superblock {
    fn encode(&self, target: &mut [u8]) -> Result<usize, CodecError> {
        let mut off = 0;
        off += self.magic.encode(&mut target[off..])?;
        off += self.block_size.encode(&mut target[off..])?;
        off += self.total_blocks.encode(&mut target[off..])?;
        off += self.filetable_start.encode(&mut target[off..])?;
        off += self.filetable_size.encode(&mut target[off..])?;
        off += self.block_bitmap_start.encode(&mut target[off..])?;
        off += self.block_bitmap_size.encode(&mut target[off..])?;
        off += self.data_start.encode(&mut target[off..])?;
        off += self.max_file_count.encode(&mut target[off..])?;
        off += self.checksum.encode(&mut target[off..])?;
        off += self.last_mount_time.encode(&mut target[off..])?;
        off += self.last_write_time.encode(&mut target[off..])?;
        off += self.flags.encode(&mut target[off..])?;
        Ok(off)
    }

    fn encoded_len(&self) -> usize {
        SUPERBLOCK_SIZE
    }
}

impl Decode for Superblock {
    fn decode(input: &[u8]) -> Result<(Self, usize), CodecError> {
        let mut off = 0;
        macro_rules! next {
            ($t:ty) => {{
                let (v, n) = <$t>::decode(&input[off..])?;
                off += n;
                v
            }};
        }
        let sb = Superblock {
            magic: next!(u32),
            block_size: next!(u32),
            total_blocks: next!(u32),
            filetable_start: next!(u32),
            filetable_size: next!(u32),
            block_bitmap_start: next!(u32),
            block_bitmap_size: next!(u32),
            data_start: next!(u32),
            max_file_count: next!(u32),
            checksum: next!(u32),
            last_mount_time: next!(u64),
            last_write_time: next!(u64),
            flags: next!(u32),
        };
        Ok((sb, off))
    }
}

/// The discriminated filetable entry (inode). `mode == 0` is the free-slot
/// sentinel; this is a tagged sum type, not an untagged union plus a boolean
/// helper (see design note in §9).
#[derive(Debug, Clone, PartialEq)]
pub enum FiletableEntry {
    Free,
    File {
        ino: u32,
        mode: u16,
        size_in_bytes: u64,
        extent_count: u16,
        extents_block: u32,
        direct_extents: [Extent; DIRECT_EXTENTS],
    },
    Dir {
        ino: u32,
        mode: u16,
        size_in_bytes: u64,
        dir_block: u32,
        parent_dir_ino: u32,
    },
}

// header (ino:4, mode:2, size:8) + union area (38 bytes, sized by the file
// variant: extent_count:2 + extents_block:4 + 4 direct extents * 8 = 38).
const HEADER_SIZE: usize = 4 + 2 + 8;
const UNION_SIZE: usize = 2 + 4 + DIRECT_EXTENTS * EXTENT_SIZE;
pub const FILETABLE_ENTRY_SIZE: usize = HEADER_SIZE + UNION_SIZE;

impl FiletableEntry {
    pub fn is_free(&self) -> bool {
        matches!(self, FiletableEntry::Free)
    }

    pub fn ino(&self) -> Option<u32> {
        match self {
            FiletableEntry::Free => None,
            FiletableEntry::File { ino, .. } | FiletableEntry::Dir { ino, .. } => Some(*ino),
        }
    }

    pub fn mode(&self) -> u16 {
        match self {
            FiletableEntry::Free => 0,
            FiletableEntry::File { mode, .. } | FiletableEntry::Dir { mode, .. } => *mode,
        }
    }

    pub fn size_in_bytes(&self) -> u64 {
        match self {
            FiletableEntry::Free => 0,
            FiletableEntry::File { size_in_bytes, .. }
            | FiletableEntry::Dir { size_in_bytes, .. } => *size_in_bytes,
        }
    }

    pub fn set_size_in_bytes(&mut self, new_size: u64) {
        match self {
            FiletableEntry::File { size_in_bytes, .. }
            | FiletableEntry::Dir { size_in_bytes, .. } => *size_in_bytes = new_size,
            FiletableEntry::Free => {}
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FiletableEntry::Dir { .. })
    }
}

impl Encode for FiletableEntry {
    fn encode(&self, target: &mut [u8]) -> Result<usize, CodecError> {
        if target.len() < FILETABLE_ENTRY_SIZE {
            return Err(CodecError::BufferTooSmall {
                need: FILETABLE_ENTRY_SIZE,
                got: target.len(),
            });
        }
        target[..FILETABLE_ENTRY_SIZE].fill(0);
        match self {
            FiletableEntry::Free => {}
            FiletableEntry::File {
                ino,
                mode,
                size_in_bytes,
                extent_count,
                extents_block,
                direct_extents,
            } => {
                let mut off = 0;
                off += ino.encode(&mut target[off..])?;
                off += mode.encode(&mut target[off..])?;
                off += size_in_bytes.encode(&mut target[off..])?;
                off += extent_count.encode(&mut target[off..])?;
                off += extents_block.encode(&mut target[off..])?;
                for ext in direct_extents {
                    off += ext.encode(&mut target[off..])?;
                }
            }
            FiletableEntry::Dir {
                ino,
                mode,
                size_in_bytes,
                dir_block,
                parent_dir_ino,
            } => {
                let mut off = 0;
                off += ino.encode(&mut target[off..])?;
                off += mode.encode(&mut target[off..])?;
                off += size_in_bytes.encode(&mut target[off..])?;
                off += dir_block.encode(&mut target[off..])?;
                off += parent_dir_ino.encode(&mut target[off..])?;
                let _ = off;
            }
        }
        Ok(FILETABLE_ENTRY_SIZE)
    }

    fn encoded_len(&self) -> usize {
        FILETABLE_ENTRY_SIZE
    }
}

impl Decode for FiletableEntry {
    fn decode(input: &[u8]) -> Result<(Self, usize), CodecError> {
        if input.len() < FILETABLE_ENTRY_SIZE {
            return Err(CodecError::BufferTooSmall {
                need: FILETABLE_ENTRY_SIZE,
                got: input.len(),
            });
        }
        let mut off = 0;
        let (ino, n) = u32::decode(&input[off..])?;
        off += n;
        let (mode, n) = u16::decode(&input[off..])?;
        off += n;
        let (size_in_bytes, n) = u64::decode(&input[off..])?;
        off += n;

        if mode == 0 {
            return Ok((FiletableEntry::Free, FILETABLE_ENTRY_SIZE));
        }

        let entry = if mode_is_dir(mode) {
            let (dir_block, n) = u32::decode(&input[off..])?;
            off += n;
            let (parent_dir_ino, _) = u32::decode(&input[off..])?;
            FiletableEntry::Dir {
                ino,
                mode,
                size_in_bytes,
                dir_block,
                parent_dir_ino,
            }
        } else {
            let (extent_count, n) = u16::decode(&input[off..])?;
            off += n;
            let (extents_block, n) = u32::decode(&input[off..])?;
            off += n;
            let mut direct_extents = [Extent::default(); DIRECT_EXTENTS];
            for slot in direct_extents.iter_mut() {
                let (ext, n) = Extent::decode(&input[off..])?;
                off += n;
                *slot = ext;
            }
            FiletableEntry::File {
                ino,
                mode,
                size_in_bytes,
                extent_count,
                extents_block,
                direct_extents,
            }
        };
        Ok((entry, FILETABLE_ENTRY_SIZE))
    }
}

/// A fixed directory-block slot: a 64-byte NUL-padded name plus inode number.
/// `inode_number == 0` marks a free slot.
#[derive(Debug, Clone, PartialEq)]
pub struct DirSlot {
    pub name: [u8; MAX_NAME_LENGTH],
    pub inode_number: u32,
}

pub const DIR_SLOT_SIZE: usize = MAX_NAME_LENGTH + 4;

impl DirSlot {
    pub fn free() -> Self {
        DirSlot {
            name: [0; MAX_NAME_LENGTH],
            inode_number: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.inode_number == 0
    }

    pub fn new(name: &[u8], inode_number: u32) -> Self {
        let mut buf = [0u8; MAX_NAME_LENGTH];
        buf[..name.len()].copy_from_slice(name);
        DirSlot {
            name: buf,
            inode_number,
        }
    }

    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_LENGTH);
        &self.name[..len]
    }

    pub fn matches_name(&self, name: &[u8]) -> bool {
        self.name_bytes() == name
    }
}

impl Encode for DirSlot {
    fn encode(&self, target: &mut [u8]) -> Result<usize, CodecError> {
        let mut off = 0;
        off += self.name.encode(&mut target[off..])?;
        off += self.inode_number.encode(&mut target[off..])?;
        Ok(off)
    }

    fn encoded_len(&self) -> usize {
        DIR_SLOT_SIZE
    }
}

impl Decode for DirSlot {
    fn decode(input: &[u8]) -> Result<(Self, usize), CodecError> {
        let mut off = 0;
        let (name, n) = <[u8; MAX_NAME_LENGTH]>::decode(&input[off..])?;
        off += n;
        let (inode_number, n) = u32::decode(&input[off..])?;
        off += n;
        Ok((DirSlot { name, inode_number }, off))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superblock_round_trip() {
        let sb = Superblock {
            magic: MAGIC,
            block_size: 4096,
            total_blocks: 256,
            filetable_start: 1,
            filetable_size: 2,
            block_bitmap_start: 3,
            block_bitmap_size: 1,
            data_start: 4,
            max_file_count: 1,
            checksum: 0,
            last_mount_time: 1_700_000_000,
            last_write_time: 1_700_000_001,
            flags: 0,
        };
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        sb.encode(&mut buf).unwrap();
        let (decoded, n) = Superblock::decode(&buf).unwrap();
        assert_eq!(n, SUPERBLOCK_SIZE);
        assert_eq!(decoded.magic, sb.magic);
        assert_eq!(decoded.total_blocks, sb.total_blocks);
        assert_eq!(decoded.last_write_time, sb.last_write_time);
    }

    #[test]
    fn filetable_entry_round_trip_free_file_dir() {
        let mut buf = [0u8; FILETABLE_ENTRY_SIZE];

        FiletableEntry::Free.encode(&mut buf).unwrap();
        let (decoded, _) = FiletableEntry::decode(&buf).unwrap();
        assert_eq!(decoded, FiletableEntry::Free);

        let file = FiletableEntry::File {
            ino: 7,
            mode: S_IFREG | 0o644,
            size_in_bytes: 123,
            extent_count: 2,
            extents_block: 0,
            direct_extents: [
                Extent {
                    start_block: 10,
                    length: 1,
                },
                Extent {
                    start_block: 20,
                    length: 3,
                },
                Extent::default(),
                Extent::default(),
            ],
        };
        file.encode(&mut buf).unwrap();
        let (decoded, _) = FiletableEntry::decode(&buf).unwrap();
        assert_eq!(decoded, file);

        let dir = FiletableEntry::Dir {
            ino: 1,
            mode: S_IFDIR | 0o755,
            size_in_bytes: 0,
            dir_block: 9,
            parent_dir_ino: 1,
        };
        dir.encode(&mut buf).unwrap();
        let (decoded, _) = FiletableEntry::decode(&buf).unwrap();
        assert_eq!(decoded, dir);
    }

    #[test]
    fn dir_slot_name_round_trip() {
        let slot = DirSlot::new(b"hello.txt", 42);
        let mut buf = [0u8; DIR_SLOT_SIZE];
        slot.encode(&mut buf).unwrap();
        let (decoded, _) = DirSlot::decode(&buf).unwrap();
        assert_eq!(decoded.name_bytes(), b"hello.txt");
        assert_eq!(decoded.inode_number, 42);
    }
}
