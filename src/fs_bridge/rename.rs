//! Rename is a declared non-goal: the source's own `file.go` returns
//! a hard "Rename is not supported" error rather than emulating one with
//! client-side copy-then-delete, and this bridge keeps that behavior.

use super::prelude::*;

pub fn rename(_fs: &mut FsState, _parent: u64, _name: &OsStr, _newparent: u64, _newname: &OsStr, _flags: u32, reply: ReplyEmpty) {
    reply.error(ENOSYS);
}
