use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use clap::Parser;
use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyWrite, Request,
};
use portfs::{mode_is_dir, PortFs, PortFsError};

const TTL: Duration = Duration::from_secs(1);

fn errno(e: &PortFsError) -> i32 {
    match e {
        PortFsError::NotFound => libc::ENOENT,
        PortFsError::Exists => libc::EEXIST,
        PortFsError::NotDir => libc::ENOTDIR,
        PortFsError::IsDir => libc::EISDIR,
        PortFsError::NotEmpty => libc::ENOTEMPTY,
        PortFsError::NameTooLong => libc::ENAMETOOLONG,
        PortFsError::NoSpace => libc::ENOSPC,
        PortFsError::Fault => libc::EFAULT,
        PortFsError::Oom => libc::ENOMEM,
        PortFsError::Invalid => libc::EINVAL,
        PortFsError::Io(_) => libc::EIO,
    }
}

fn attr_for(ino: u64, mode: u16, size: u64, block_size: u32) -> FileAttr {
    let kind = if mode_is_dir(mode) {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    let blocks = size.div_ceil(block_size as u64).max(1);
    let now = SystemTime::now();
    FileAttr {
        ino,
        size,
        blocks,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind,
        perm: (mode & 0o7777) as u16,
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: block_size,
        flags: 0,
    }
}

/// Adapts PortFS operations to the fuser VFS callback surface (§4.12).
struct Adapter {
    fs: PortFs,
}

impl Filesystem for Adapter {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let mut state = self.fs.state().write().unwrap();
        let block_size = state.superblock.block_size;
        let Some(parent_idx) = state.find_by_ino(parent as u32) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.lookup(&mut state, parent_idx, name.as_encoded_bytes()) {
            Ok(idx) => {
                let entry = &state.filetable[idx].entry;
                let attr = attr_for(
                    entry.ino().unwrap() as u64,
                    entry.mode(),
                    entry.size_in_bytes(),
                    block_size,
                );
                reply.entry(&TTL, &attr, 0);
            }
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let state = self.fs.state().read().unwrap();
        let block_size = state.superblock.block_size;
        match state.find_by_ino(ino as u32) {
            Some(idx) => {
                let entry = &state.filetable[idx].entry;
                let attr = attr_for(ino, entry.mode(), entry.size_in_bytes(), block_size);
                reply.attr(&TTL, &attr);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let mut state = self.fs.state().write().unwrap();
        let block_size = state.superblock.block_size;
        let Some(idx) = state.find_by_ino(ino as u32) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Some(new_size) = size {
            if let Err(e) = self.fs.setattr_size(&mut state, idx, new_size) {
                reply.error(errno(&e));
                return;
            }
        }
        let entry = &state.filetable[idx].entry;
        let attr = attr_for(ino, entry.mode(), entry.size_in_bytes(), block_size);
        reply.attr(&TTL, &attr);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut state = self.fs.state().write().unwrap();
        let Some(idx) = state.find_by_ino(ino as u32) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        match self.fs.file_read(&mut state, idx, offset as u64, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let mut state = self.fs.state().write().unwrap();
        let Some(idx) = state.find_by_ino(ino as u32) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.file_write(&mut state, idx, offset as u64, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let mut state = self.fs.state().write().unwrap();
        let block_size = state.superblock.block_size;
        let Some(parent_idx) = state.find_by_ino(parent as u32) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self
            .fs
            .create(&mut state, parent_idx, name.as_encoded_bytes(), mode as u16)
        {
            Ok(idx) => {
                let entry = &state.filetable[idx].entry;
                let attr = attr_for(
                    entry.ino().unwrap() as u64,
                    entry.mode(),
                    entry.size_in_bytes(),
                    block_size,
                );
                reply.created(&TTL, &attr, 0, 0, 0);
            }
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let mut state = self.fs.state().write().unwrap();
        let block_size = state.superblock.block_size;
        let Some(parent_idx) = state.find_by_ino(parent as u32) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self
            .fs
            .mkdir(&mut state, parent_idx, name.as_encoded_bytes(), mode as u16)
        {
            Ok(idx) => {
                let entry = &state.filetable[idx].entry;
                let attr = attr_for(
                    entry.ino().unwrap() as u64,
                    entry.mode(),
                    entry.size_in_bytes(),
                    block_size,
                );
                reply.entry(&TTL, &attr, 0);
            }
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let mut state = self.fs.state().write().unwrap();
        let Some(parent_idx) = state.find_by_ino(parent as u32) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.unlink(&mut state, parent_idx, name.as_encoded_bytes()) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let mut state = self.fs.state().write().unwrap();
        let Some(parent_idx) = state.find_by_ino(parent as u32) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.rmdir(&mut state, parent_idx, name.as_encoded_bytes()) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let mut state = self.fs.state().write().unwrap();
        let Some(idx) = state.find_by_ino(ino as u32) else {
            reply.error(libc::ENOENT);
            return;
        };
        let entries = match self.fs.dir_iterate(&mut state, idx) {
            Ok(e) => e,
            Err(e) => {
                reply.error(errno(&e));
                return;
            }
        };
        for (i, (name, entry_ino)) in entries.into_iter().enumerate().skip(offset as usize) {
            let kind = state
                .find_by_ino(entry_ino)
                .map(|i| state.filetable[i].entry.mode())
                .map(|m| {
                    if mode_is_dir(m) {
                        FileType::Directory
                    } else {
                        FileType::RegularFile
                    }
                })
                .unwrap_or(FileType::RegularFile);
            let full = reply.add(entry_ino as u64, (i + 1) as i64, kind, OsStr::new(
                std::str::from_utf8(&name).unwrap_or(""),
            ));
            if full {
                break;
            }
        }
        reply.ok();
    }
}

#[derive(Parser)]
#[command(author, version, about = "Mount a PortFS image via FUSE")]
struct Cli {
    /// Path to the PortFS image
    image: PathBuf,

    /// Mountpoint directory
    mountpoint: PathBuf,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let fs = match PortFs::mount(&cli.image) {
        Ok(fs) => fs,
        Err(e) => {
            log::error!("mount failed: {e}");
            std::process::exit(1);
        }
    };

    let options = vec![MountOption::FSName("portfs".to_string())];
    if let Err(e) = fuser::mount2(Adapter { fs }, &cli.mountpoint, &options) {
        log::error!("fuse session failed: {e}");
        std::process::exit(1);
    }
}
