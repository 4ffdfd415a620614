//! Common imports shared by every `fs_bridge` submodule.

pub use fuser::{FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite};

pub use libc::{EBADF, EIO, EISDIR, ENOENT, ENOSYS, ENOTDIR};

pub use std::ffi::OsStr;
pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use crate::error::FsError;
pub use crate::meta::InodeRecord;

pub use super::{FsState, TTL};
