//! filesystem capability surface
//!
//! [`Fs`] is implemented once per backend; everything above it (placement,
//! scanning, walking) only talks to the trait. all paths are relative to the
//! backend's base, and every error coming out of an implementation has
//! already been normalized into an [`ErrorKind`](crate::ErrorKind).
//!
//! the trait itself does not enforce confinement. [`place_file`] and
//! [`scan_file`] do, on a best-effort basis: a concurrent actor can swap a
//! checked directory for a symlink between the check and the use, and no
//! attempt is made to close that race at this layer.

pub mod mkdir;
pub mod os;
pub mod place;
pub mod walk;

use std::io::{Read, Write};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::path::{clean, AbsPath, RelPath};
use crate::types::{FileType, Metadata};

pub use mkdir::{mkdir_all, repair_mtime};
pub use os::OsFs;
pub use place::{check_confinement, place_file, scan_file};
pub use walk::walk;

pub trait Fs {
    /// absolute location this filesystem is rooted at
    fn base_path(&self) -> &AbsPath;

    fn open_read(&self, path: &RelPath) -> Result<Box<dyn Read + Send>>;

    /// create a new regular file; fails if anything exists at `path`
    fn open_write(&self, path: &RelPath, perms: u32) -> Result<Box<dyn Write + Send>>;

    fn mkdir(&self, path: &RelPath, perms: u32) -> Result<()>;

    fn mklink(&self, path: &RelPath, target: &str) -> Result<()>;

    fn mkfifo(&self, path: &RelPath, perms: u32) -> Result<()>;

    /// `kind` must be a char or block device
    fn mkdevice(
        &self,
        path: &RelPath,
        kind: FileType,
        major: u32,
        minor: u32,
        perms: u32,
    ) -> Result<()>;

    fn mkhardlink(&self, path: &RelPath, target: &RelPath) -> Result<()>;

    /// change ownership without following a final symlink
    fn lchown(&self, path: &RelPath, uid: u32, gid: u32) -> Result<()>;

    fn chmod(&self, path: &RelPath, perms: u32) -> Result<()>;

    /// set atime and mtime on the entry itself, even if it is a symlink
    fn set_times_no_follow(&self, path: &RelPath, mtime: DateTime<Utc>) -> Result<()>;

    fn set_times(&self, path: &RelPath, mtime: DateTime<Utc>) -> Result<()>;

    fn set_xattr(&self, path: &RelPath, name: &str, value: &[u8]) -> Result<()>;

    /// metadata of whatever `path` resolves to, xattrs included
    fn stat(&self, path: &RelPath) -> Result<Metadata>;

    fn lstat(&self, path: &RelPath) -> Result<Metadata>;

    /// type of whatever `path` resolves to, without reading anything else
    fn kind_of(&self, path: &RelPath) -> Result<FileType>;

    /// mtime of the entry itself, without following a final symlink
    fn mtime_of(&self, path: &RelPath) -> Result<DateTime<Utc>>;

    /// names of a directory's children, in no particular order
    fn read_dir_names(&self, path: &RelPath) -> Result<Vec<String>>;

    /// symlink target, or `None` if `path` exists but is not a symlink
    fn readlink(&self, path: &RelPath) -> Result<Option<String>>;

    /// remove a file, symlink, special node, or empty directory
    fn remove(&self, path: &RelPath) -> Result<()>;

    /// resolve a symlink target found at `link` as if the base were `/`
    ///
    /// absolute targets and targets with more `..` than the link is deep
    /// still land inside the base. this is lexical and single-step: the
    /// result may itself be a symlink.
    fn resolve_link(&self, target: &str, link: &RelPath) -> RelPath {
        let cleaned = clean(target);
        if cleaned.starts_with('/') {
            return AbsPath::must(&cleaned).to_rel();
        }
        AbsPath::root()
            .join(&link.dir())
            .join(&RelPath::must(&cleaned))
            .to_rel()
    }
}
