use portfs::{format_image, FormatOptions, PortFs, ROOT_INO};
use tempfile::NamedTempFile;

fn fresh_image(size: u64) -> NamedTempFile {
    let tmp = NamedTempFile::new().unwrap();
    format_image(
        tmp.path(),
        FormatOptions {
            image_size_bytes: size,
            block_size: 4096,
        },
    )
    .unwrap();
    tmp
}

#[test]
fn format_mount_lists_empty_root() {
    let tmp = fresh_image(4 * 1024 * 1024);
    let fs = PortFs::mount(tmp.path()).unwrap();
    let mut state = fs.state().write().unwrap();
    let root_idx = state.find_by_ino(ROOT_INO).unwrap();
    let entries = fs.dir_iterate(&mut state, root_idx).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, b".");
    assert_eq!(entries[1].0, b"..");
}

#[test]
fn create_write_read_survives_remount() {
    let tmp = fresh_image(4 * 1024 * 1024);
    {
        let fs = PortFs::mount(tmp.path()).unwrap();
        let mut state = fs.state().write().unwrap();
        let root_idx = state.find_by_ino(ROOT_INO).unwrap();
        let file_idx = fs.create(&mut state, root_idx, b"hello.txt", 0o644).unwrap();
        fs.file_write(&mut state, file_idx, 0, b"hello, world").unwrap();
        drop(state);
        fs.unmount().unwrap();
    }

    let fs = PortFs::mount(tmp.path()).unwrap();
    let mut state = fs.state().write().unwrap();
    let root_idx = state.find_by_ino(ROOT_INO).unwrap();
    let file_idx = fs.lookup(&mut state, root_idx, b"hello.txt").unwrap();
    let mut buf = [0u8; 12];
    let n = fs.file_read(&mut state, file_idx, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello, world");
}

#[test]
fn extent_growth_crosses_into_indirect_page() {
    let tmp = fresh_image(64 * 1024 * 1024);
    let fs = PortFs::mount(tmp.path()).unwrap();
    let mut state = fs.state().write().unwrap();
    let root_idx = state.find_by_ino(ROOT_INO).unwrap();
    let file_idx = fs.create(&mut state, root_idx, b"big.bin", 0o644).unwrap();

    // fragment free space into single-block gaps, interspersed with
    // single-block files left in place, then eat every contiguous run
    // past them so only those gaps remain free. That forces the
    // allocator past the 4 direct extents into the indirect page.
    for i in 0..40 {
        let name = format!("pad{i}");
        let pad_idx = fs.create(&mut state, root_idx, name.as_bytes(), 0o644).unwrap();
        fs.file_write(&mut state, pad_idx, 0, &vec![1u8; 4096]).unwrap();
    }
    for i in 0..40 {
        if i % 2 == 0 {
            continue;
        }
        let name = format!("pad{i}");
        fs.unlink(&mut state, root_idx, name.as_bytes()).unwrap();
    }
    // everything past the 40 pad blocks is still one large contiguous run;
    // mark it used directly so the only free extents left are the 20
    // single-block gaps among the pads.
    let data_start = state.superblock.data_start as usize;
    let total_blocks = state.superblock.total_blocks as usize;
    state
        .bitmap
        .set_range(data_start + 40, total_blocks - (data_start + 40));

    let data = vec![7u8; 4096 * 10];
    fs.file_write(&mut state, file_idx, 0, &data).unwrap();
    let extent_count = match &state.filetable[file_idx].entry {
        portfs::FiletableEntry::File { extent_count, .. } => *extent_count,
        _ => unreachable!(),
    };
    assert!(extent_count as usize > portfs::DIRECT_EXTENTS);

    let mut readback = vec![0u8; data.len()];
    let n = fs.file_read(&mut state, file_idx, 0, &mut readback).unwrap();
    assert_eq!(n, data.len());
    assert_eq!(readback, data);
}

#[test]
fn truncate_shrink_then_extend() {
    let tmp = fresh_image(4 * 1024 * 1024);
    let fs = PortFs::mount(tmp.path()).unwrap();
    let mut state = fs.state().write().unwrap();
    let root_idx = state.find_by_ino(ROOT_INO).unwrap();
    let file_idx = fs.create(&mut state, root_idx, b"f.bin", 0o644).unwrap();
    fs.file_write(&mut state, file_idx, 0, &vec![9u8; 4096 * 3]).unwrap();

    fs.setattr_size(&mut state, file_idx, 4096).unwrap();
    assert_eq!(state.filetable[file_idx].entry.size_in_bytes(), 4096);

    fs.setattr_size(&mut state, file_idx, 4096 * 2).unwrap();
    let mut buf = vec![0u8; 4096 * 2];
    let n = fs.file_read(&mut state, file_idx, 0, &mut buf).unwrap();
    assert_eq!(n, buf.len());
    assert!(buf[4096..].iter().all(|&b| b == 0));
}

#[test]
fn unlink_reclaims_space_for_subsequent_allocation() {
    let tmp = fresh_image(64 * 1024 * 1024);
    let fs = PortFs::mount(tmp.path()).unwrap();
    let mut state = fs.state().write().unwrap();
    let root_idx = state.find_by_ino(ROOT_INO).unwrap();

    // exhaust the data region with a handful of large files, then confirm
    // unlink makes the space available again.
    let chunk = vec![1u8; 4 * 1024 * 1024];
    let mut idx = 0;
    let big_name = loop {
        let name = format!("big{idx}");
        let i = fs
            .create(&mut state, root_idx, name.as_bytes(), 0o644)
            .unwrap();
        if fs.file_write(&mut state, i, 0, &chunk).is_err() {
            fs.unlink(&mut state, root_idx, name.as_bytes()).unwrap();
            break format!("big{}", idx - 1);
        }
        idx += 1;
    };

    assert!(matches!(
        fs.create(&mut state, root_idx, b"overflow.bin", 0o644)
            .and_then(|i| fs.file_write(&mut state, i, 0, &chunk).map(|_| ())),
        Err(portfs::PortFsError::NoSpace)
    ));

    fs.unlink(&mut state, root_idx, big_name.as_bytes()).unwrap();

    let retry_idx = fs.create(&mut state, root_idx, b"retry.bin", 0o644).unwrap();
    fs.file_write(&mut state, retry_idx, 0, b"ok").unwrap();
}

#[test]
fn mkdir_rmdir_respects_not_empty() {
    let tmp = fresh_image(4 * 1024 * 1024);
    let fs = PortFs::mount(tmp.path()).unwrap();
    let mut state = fs.state().write().unwrap();
    let root_idx = state.find_by_ino(ROOT_INO).unwrap();

    let dir_idx = fs.mkdir(&mut state, root_idx, b"sub", 0o755).unwrap();
    fs.create(&mut state, dir_idx, b"inner.txt", 0o644).unwrap();

    assert!(matches!(
        fs.rmdir(&mut state, root_idx, b"sub"),
        Err(portfs::PortFsError::NotEmpty)
    ));

    fs.unlink(&mut state, dir_idx, b"inner.txt").unwrap();
    fs.rmdir(&mut state, root_idx, b"sub").unwrap();
    assert!(fs.lookup(&mut state, root_idx, b"sub").is_err());
}

#[test]
fn append_to_overflowed_file_after_remount() {
    let tmp = fresh_image(64 * 1024 * 1024);
    {
        let fs = PortFs::mount(tmp.path()).unwrap();
        let mut state = fs.state().write().unwrap();
        let root_idx = state.find_by_ino(ROOT_INO).unwrap();
        let file_idx = fs.create(&mut state, root_idx, b"big.bin", 0o644).unwrap();

        // fragment free space the same way as extent_growth_crosses_into_indirect_page,
        // then write the file so it overflows into the indirect page before unmounting.
        for i in 0..40 {
            let name = format!("pad{i}");
            let pad_idx = fs.create(&mut state, root_idx, name.as_bytes(), 0o644).unwrap();
            fs.file_write(&mut state, pad_idx, 0, &vec![1u8; 4096]).unwrap();
        }
        for i in 0..40 {
            if i % 2 == 0 {
                continue;
            }
            let name = format!("pad{i}");
            fs.unlink(&mut state, root_idx, name.as_bytes()).unwrap();
        }
        let data_start = state.superblock.data_start as usize;
        let total_blocks = state.superblock.total_blocks as usize;
        state
            .bitmap
            .set_range(data_start + 40, total_blocks - (data_start + 40));

        fs.file_write(&mut state, file_idx, 0, &vec![7u8; 4096 * 10]).unwrap();
        let extent_count = match &state.filetable[file_idx].entry {
            portfs::FiletableEntry::File { extent_count, .. } => *extent_count,
            _ => unreachable!(),
        };
        assert!(extent_count as usize > portfs::DIRECT_EXTENTS);

        drop(state);
        fs.unmount().unwrap();
    }

    // remount: every slot's indirect_extents buffer starts out None, so
    // appending without reading first must still see the file's true
    // allocated size (not just its 4 resident direct extents) or it will
    // under-report allocation, demand space it already has, and fail
    // NoSpace even though only a couple of blocks are actually needed.
    let fs = PortFs::mount(tmp.path()).unwrap();
    let mut state = fs.state().write().unwrap();
    let root_idx = state.find_by_ino(ROOT_INO).unwrap();
    let file_idx = fs.lookup(&mut state, root_idx, b"big.bin").unwrap();
    let old_size = state.filetable[file_idx].entry.size_in_bytes();

    let appended = vec![9u8; 4096 * 2];
    fs.file_write(&mut state, file_idx, old_size, &appended).unwrap();

    let mut full = vec![0u8; 4096 * 12];
    let n = fs.file_read(&mut state, file_idx, 0, &mut full).unwrap();
    assert_eq!(n, full.len());
    assert_eq!(&full[..4096 * 10], &vec![7u8; 4096 * 10][..]);
    assert_eq!(&full[4096 * 10..], &appended[..]);
}

#[test]
fn mkdir_rmdir_on_full_disk_does_not_allocate() {
    let tmp = fresh_image(4 * 1024 * 1024);
    let fs = PortFs::mount(tmp.path()).unwrap();
    let mut state = fs.state().write().unwrap();
    let root_idx = state.find_by_ino(ROOT_INO).unwrap();

    // warm up root's own directory block before exhausting space, since
    // mkdir needs to add an entry to root's (already-resident) block.
    fs.mkdir(&mut state, root_idx, b"warm", 0o755).unwrap();
    fs.rmdir(&mut state, root_idx, b"warm").unwrap();

    // simulate a full disk: mark every remaining free block used.
    let data_start = state.superblock.data_start as usize;
    let total_blocks = state.superblock.total_blocks as usize;
    state.bitmap.set_range(data_start, total_blocks - data_start);

    // mkdir allocates a filetable slot and a directory entry, not a data
    // block (a new directory's own block is lazy), so it still succeeds.
    fs.mkdir(&mut state, root_idx, b"d", 0o755).unwrap();

    // rmdir of a directory that was never written to must not try to
    // allocate its never-created data block just to check emptiness.
    fs.rmdir(&mut state, root_idx, b"d").unwrap();
    assert!(fs.lookup(&mut state, root_idx, b"d").is_err());
}

#[test]
fn name_length_boundaries() {
    let tmp = fresh_image(4 * 1024 * 1024);
    let fs = PortFs::mount(tmp.path()).unwrap();
    let mut state = fs.state().write().unwrap();
    let root_idx = state.find_by_ino(ROOT_INO).unwrap();

    let max_name = vec![b'a'; 64];
    assert!(fs.create(&mut state, root_idx, &max_name, 0o644).is_ok());

    let too_long = vec![b'b'; 65];
    assert!(matches!(
        fs.create(&mut state, root_idx, &too_long, 0o644),
        Err(portfs::PortFsError::NameTooLong)
    ));
}
