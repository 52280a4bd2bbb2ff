use thiserror::Error;

/// Error kinds surfaced at the VFS-facing boundary (see §7 of the design doc).
#[derive(Debug, Error)]
pub enum PortFsError {
    #[error("invalid argument")]
    Invalid,
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    Exists,
    #[error("not a directory")]
    NotDir,
    #[error("is a directory")]
    IsDir,
    #[error("directory not empty")]
    NotEmpty,
    #[error("name too long")]
    NameTooLong,
    #[error("no space left")]
    NoSpace,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("offset outside any extent")]
    Fault,
    #[error("out of memory")]
    Oom,
}

pub type Result<T> = core::result::Result<T, PortFsError>;

impl From<portfs_codec::CodecError> for PortFsError {
    fn from(_: portfs_codec::CodecError) -> Self {
        PortFsError::Invalid
    }
}
