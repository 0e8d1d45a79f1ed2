use crate::error::{Error, ErrorKind, Result};
use crate::fs::Fs;
use crate::path::RelPath;
use crate::types::FileType;

/// make sure `path` and all of its ancestors exist as directories
///
/// only a definite not-found sends us up to the parent. any other failure
/// (permission denied, a file where a directory should be) is returned
/// as-is, with the conflicting type named for the latter.
pub fn mkdir_all(afs: &dyn Fs, path: &RelPath, perms: u32) -> Result<()> {
    match afs.kind_of(path) {
        Ok(FileType::Directory) => return Ok(()),
        Ok(kind) => return Err(Error::not_a_directory(path, kind)),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    if !path.is_root() {
        mkdir_all(afs, &path.dir(), perms)?;
    }

    match afs.mkdir(path, perms) {
        Ok(()) => Ok(()),
        // lost a race with someone else creating it; fine if it's a dir
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let m = afs.lstat(path)?;
            if m.kind == FileType::Directory {
                Ok(())
            } else {
                Err(Error::not_a_directory(path, m.kind))
            }
        }
        Err(e) => Err(e),
    }
}

/// snapshot the mtime of `dir` and return a closure that puts it back
///
/// creating or removing children bumps a directory's mtime, which would
/// change its hash. take the snapshot before mutating, call the closure
/// after.
pub fn repair_mtime<'a>(
    afs: &'a dyn Fs,
    dir: &RelPath,
) -> Result<impl FnOnce() -> Result<()> + 'a> {
    let mtime = afs.mtime_of(dir)?;
    let dir = dir.clone();
    Ok(move || afs.set_times(&dir, mtime))
}
