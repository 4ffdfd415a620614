//! Error types shared by every component, with a single mapping onto the
//! errno values `fuser` expects at each reply site.

use thiserror::Error;

/// The crate-wide error type. Every fallible component operation returns
/// `Result<T, FsError>` rather than a raw `libc` int; only the FSBridge
/// layer converts to an errno via [`FsError::to_errno`].
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such object")]
    NoSuchObject,

    #[error("path locked by another writer")]
    Locked,

    #[error("object store transport error: {0}")]
    Transport(String),

    #[error("metadata store error: {0}")]
    Storage(String),

    #[error("operation not supported")]
    Unsupported,

    #[error("directory not empty")]
    NotEmpty,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Maps this error onto the errno value that should be passed to the
    /// corresponding `fuser::Reply*::error` call.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::NoSuchObject => libc::ENOENT,
            FsError::Locked => libc::EPERM,
            FsError::Transport(_) => libc::EIO,
            FsError::Storage(_) => libc::EIO,
            FsError::Unsupported => libc::EIO,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::Config(_) => libc::EINVAL,
            FsError::Io(_) => libc::EIO,
        }
    }
}

impl From<redb::Error> for FsError {
    fn from(e: redb::Error) -> Self {
        FsError::Storage(e.to_string())
    }
}

impl From<redb::TransactionError> for FsError {
    fn from(e: redb::TransactionError) -> Self {
        FsError::Storage(e.to_string())
    }
}

impl From<redb::TableError> for FsError {
    fn from(e: redb::TableError) -> Self {
        FsError::Storage(e.to_string())
    }
}

impl From<redb::StorageError> for FsError {
    fn from(e: redb::StorageError) -> Self {
        FsError::Storage(e.to_string())
    }
}

impl From<redb::CommitError> for FsError {
    fn from(e: redb::CommitError) -> Self {
        FsError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for FsError {
    fn from(e: bincode::Error) -> Self {
        FsError::Storage(format!("record codec: {e}"))
    }
}
