use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::path::RelPath;

/// setuid bit
pub const MODE_SETUID: u32 = 0o4000;
/// setgid bit
pub const MODE_SETGID: u32 = 0o2000;
/// sticky bit
pub const MODE_STICKY: u32 = 0o1000;
/// plain rwx bits, without setuid/setgid/sticky
pub const MODE_BASE: u32 = 0o777;
/// every bit a [`Metadata::perms`] may carry
pub const MODE_ALL: u32 = MODE_BASE | MODE_SETUID | MODE_SETGID | MODE_STICKY;

/// extended attributes, keyed by name (BTreeMap for deterministic order)
pub type Xattrs = BTreeMap<String, Vec<u8>>;

/// file type enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FileType {
    #[default]
    Regular,
    Directory,
    Symlink,
    NamedPipe,
    Socket,
    CharDevice,
    BlockDevice,
    /// only ever seen in archive streams; never reported by a stat
    Hardlink,
}

impl FileType {
    /// single-character tag used in the canonical hash encoding
    pub fn tag(self) -> &'static str {
        match self {
            FileType::Regular => "F",
            FileType::Directory => "D",
            FileType::Symlink => "L",
            FileType::NamedPipe => "P",
            FileType::Socket => "S",
            FileType::CharDevice => "C",
            FileType::BlockDevice => "B",
            FileType::Hardlink => "H",
        }
    }

    /// get the type name for error messages
    pub fn type_name(self) -> &'static str {
        match self {
            FileType::Regular => "regular",
            FileType::Directory => "directory",
            FileType::Symlink => "symlink",
            FileType::NamedPipe => "fifo",
            FileType::Socket => "socket",
            FileType::CharDevice => "char_device",
            FileType::BlockDevice => "block_device",
            FileType::Hardlink => "hardlink",
        }
    }

    pub fn is_device(self) -> bool {
        matches!(self, FileType::CharDevice | FileType::BlockDevice)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// full identifying state of one filesystem entry
///
/// there is no atime or ctime: neither is stable enough to hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// path relative to the root of the fileset
    pub name: RelPath,
    pub kind: FileType,
    /// permission bits, including setuid/setgid/sticky
    pub perms: u32,
    pub uid: u32,
    pub gid: u32,
    /// regular files only
    pub size: u64,
    /// symlink target, or hardlink target path
    pub linkname: String,
    pub devmajor: u32,
    pub devminor: u32,
    pub mtime: DateTime<Utc>,
    pub xattrs: Xattrs,
}

impl Metadata {
    pub fn new(name: RelPath, kind: FileType) -> Self {
        Self {
            name,
            kind,
            ..Default::default()
        }
    }

    /// zero every field that has no meaning for this entry's type
    pub fn normalize(&mut self) {
        self.perms &= MODE_ALL;
        if self.kind != FileType::Regular {
            self.size = 0;
        }
        if !matches!(self.kind, FileType::Symlink | FileType::Hardlink) {
            self.linkname.clear();
        }
        if !self.kind.is_device() {
            self.devmajor = 0;
            self.devminor = 0;
        }
    }
}
