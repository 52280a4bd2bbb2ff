//! PortFS: a block-structured, single-backing-file filesystem with an
//! extent-based allocator, exposed through a blocking, coarsely-locked
//! mount handle suitable for driving a FUSE adapter.

mod alloc;
mod bitmap;
mod dir;
mod error;
mod free_extent;
pub mod format;
mod inode_ops;
mod io;
mod layout;
mod mount;
mod state;

pub use error::{PortFsError, Result};
pub use format::{format_image, FormatOptions};
pub use layout::{
    mode_is_dir, mode_is_reg, FiletableEntry, DIRECT_EXTENTS, MAX_EXTENT_LENGTH, MAX_NAME_LENGTH,
};
pub use mount::{PortFs, ROOT_INO};
pub use state::State;

use std::path::PathBuf;

/// Mount options, parsed from a `key=value,key=value` option string the way
/// a FUSE adapter binary receives `-o` arguments (§4.12).
#[derive(Debug, Clone)]
pub struct MountOptions {
    pub path: PathBuf,
}

impl MountOptions {
    pub fn parse(options: &str) -> Result<Self> {
        let mut path = None;
        for kv in options.split(',') {
            let kv = kv.trim();
            if kv.is_empty() {
                continue;
            }
            let mut parts = kv.splitn(2, '=');
            let key = parts.next().unwrap_or("");
            let value = parts.next().ok_or(PortFsError::Invalid)?;
            match key {
                "path" => path = Some(PathBuf::from(value)),
                _ => return Err(PortFsError::Invalid),
            }
        }
        let path = path.ok_or(PortFsError::Invalid)?;
        if !path.is_absolute() {
            return Err(PortFsError::Invalid);
        }
        Ok(MountOptions { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_options_requires_absolute_path() {
        assert!(MountOptions::parse("path=relative/path").is_err());
        assert!(MountOptions::parse("path=/abs/path").is_ok());
        assert!(MountOptions::parse("bogus=1").is_err());
    }
}
