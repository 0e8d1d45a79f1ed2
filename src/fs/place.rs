use std::io::{self, Read, Write};

use crate::error::{Error, ErrorKind, IoResultExt, Result};
use crate::fs::Fs;
use crate::path::RelPath;
use crate::types::{FileType, Metadata};

/// refuse to operate on `path` if any of its proper prefixes is a symlink
///
/// the refusal is unconditional: a symlink that would resolve back inside
/// the operating area is rejected too. the check is best-effort; the
/// filesystem can change between this call and the operation it guards.
pub fn check_confinement(afs: &dyn Fs, path: &RelPath) -> Result<()> {
    for prefix in path.prefixes() {
        if let Some(target) = afs.readlink(&prefix)? {
            return Err(Error::Breakout {
                path: path.to_string(),
                prefix: prefix.to_string(),
                target,
            });
        }
    }
    Ok(())
}

/// create (or replace) the entry described by `meta` and apply its attributes
///
/// `body` supplies the content of regular files and is ignored otherwise.
/// attributes are applied as ownership, mode, xattrs, then times: chown can
/// clear setuid bits and bump timestamps, so it has to come first.
///
/// an existing directory where a directory is wanted is kept and has its
/// attributes reconciled; anything else already at `meta.name` is removed.
/// the root is never removed: it must be described as a directory.
///
/// xattrs in the privileged `security.` and `trusted.` namespaces are
/// skipped with a warning when the kernel refuses them for lack of
/// privilege. every other xattr failure fails the placement.
pub fn place_file(afs: &dyn Fs, meta: &Metadata, body: Option<&mut dyn Read>) -> Result<()> {
    let path = &meta.name;
    if path.escapes() {
        return Err(Error::InvalidPath {
            path: path.to_string(),
            reason: "entry name climbs out of the fileset",
        });
    }
    if path.is_root() && meta.kind != FileType::Directory {
        return Err(Error::InvalidFilesystem(format!(
            "root entry must be a directory, not {}",
            meta.kind.type_name()
        )));
    }
    check_confinement(afs, path)?;

    let mut keep_dir = false;
    match afs.lstat(path) {
        Ok(existing)
            if existing.kind == FileType::Directory && meta.kind == FileType::Directory =>
        {
            keep_dir = true;
        }
        Ok(_) => afs.remove(path)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    match meta.kind {
        FileType::Regular => {
            let mut out = afs.open_write(path, meta.perms)?;
            if let Some(body) = body {
                io::copy(body, &mut out).with_path(path)?;
            }
            out.flush().with_path(path)?;
        }
        FileType::Directory => {
            if !keep_dir {
                afs.mkdir(path, meta.perms)?;
            }
        }
        FileType::Symlink => afs.mklink(path, &meta.linkname)?,
        FileType::NamedPipe => afs.mkfifo(path, meta.perms)?,
        FileType::CharDevice | FileType::BlockDevice => {
            afs.mkdevice(path, meta.kind, meta.devmajor, meta.devminor, meta.perms)?
        }
        FileType::Hardlink => {
            let target = RelPath::new(&meta.linkname)?;
            check_confinement(afs, &target)?;
            if let Some(link) = afs.readlink(&target)? {
                return Err(Error::Breakout {
                    path: path.to_string(),
                    prefix: target.to_string(),
                    target: link,
                });
            }
            // attributes belong to the shared inode, already set via the target
            return afs.mkhardlink(path, &target);
        }
        FileType::Socket => {
            return Err(Error::UnsupportedType {
                path: path.to_string(),
                kind: meta.kind.type_name(),
            })
        }
    }

    afs.lchown(path, meta.uid, meta.gid)?;
    if meta.kind != FileType::Symlink {
        afs.chmod(path, meta.perms)?;
    }
    for (name, value) in &meta.xattrs {
        match afs.set_xattr(path, name, value) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::PermissionDenied && is_privileged_xattr(name) => {
                tracing::warn!("skipping xattr {} on {}: {}", name, path, e);
            }
            Err(e) => return Err(e),
        }
    }
    if meta.kind == FileType::Symlink {
        afs.set_times_no_follow(path, meta.mtime)?;
    } else {
        afs.set_times(path, meta.mtime)?;
    }

    tracing::trace!("placed {} {}", meta.kind, path);
    Ok(())
}

/// namespaces only a privileged process may write
fn is_privileged_xattr(name: &str) -> bool {
    name.starts_with("security.") || name.starts_with("trusted.")
}

/// read the entry at `path`, refusing to traverse symlinked prefixes
///
/// only regular files come back with a reader; for every other type the
/// reader is `None`. the caller owns (and drops) the reader.
pub fn scan_file(
    afs: &dyn Fs,
    path: &RelPath,
) -> Result<(Metadata, Option<Box<dyn Read + Send>>)> {
    check_confinement(afs, path)?;
    let meta = afs.lstat(path)?;
    let body = match meta.kind {
        FileType::Regular => Some(afs.open_read(path)?),
        _ => None,
    };
    Ok((meta, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFs;
    use crate::path::AbsPath;
    use chrono::DateTime;
    use std::fs;
    use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};
    use tempfile::tempdir;

    fn test_fs() -> (tempfile::TempDir, OsFs) {
        let dir = tempdir().unwrap();
        let base = AbsPath::from_std_path(dir.path()).unwrap();
        (dir, OsFs::new(base))
    }

    fn meta(name: &str, kind: FileType, perms: u32) -> Metadata {
        let mut m = Metadata::new(RelPath::must(name), kind);
        m.perms = perms;
        m.uid = nix::unistd::getuid().as_raw();
        m.gid = nix::unistd::getgid().as_raw();
        m.mtime = DateTime::from_timestamp(1_234_567_890, 0).unwrap();
        m
    }

    #[test]
    fn test_place_regular_file() {
        let (dir, afs) = test_fs();
        let m = meta("file", FileType::Regular, 0o640);
        let mut body = &b"abc"[..];
        place_file(&afs, &m, Some(&mut body)).unwrap();

        let path = dir.path().join("file");
        assert_eq!(fs::read(&path).unwrap(), b"abc");
        let on_disk = fs::metadata(&path).unwrap();
        assert_eq!(on_disk.mode() & 0o7777, 0o640);
        assert_eq!(on_disk.mtime(), 1_234_567_890);
    }

    #[test]
    fn test_place_replaces_existing_file() {
        let (dir, afs) = test_fs();
        fs::write(dir.path().join("file"), "old content").unwrap();
        let m = meta("file", FileType::Regular, 0o644);
        let mut body = &b"new"[..];
        place_file(&afs, &m, Some(&mut body)).unwrap();
        assert_eq!(fs::read(dir.path().join("file")).unwrap(), b"new");
    }

    #[test]
    fn test_place_setuid_bits() {
        let (dir, afs) = test_fs();
        let m = meta("tool", FileType::Regular, 0o4755);
        place_file(&afs, &m, None).unwrap();
        let mode = fs::metadata(dir.path().join("tool")).unwrap().mode();
        assert_eq!(mode & 0o7777, 0o4755);
    }

    #[test]
    fn test_place_directory_then_root_onto_existing() {
        let (dir, afs) = test_fs();
        place_file(&afs, &meta("sub", FileType::Directory, 0o750), None).unwrap();
        assert!(dir.path().join("sub").is_dir());

        // the base already exists; placing the root reconciles attributes
        place_file(&afs, &meta("", FileType::Directory, 0o711), None).unwrap();
        let mode = fs::metadata(dir.path()).unwrap().mode();
        assert_eq!(mode & 0o777, 0o711);
        assert!(dir.path().join("sub").is_dir());
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_place_symlink_sets_own_times() {
        let (dir, afs) = test_fs();
        fs::write(dir.path().join("target"), "x").unwrap();
        let mut m = meta("link", FileType::Symlink, 0o777);
        m.linkname = "target".into();
        place_file(&afs, &m, None).unwrap();

        let link = fs::symlink_metadata(dir.path().join("link")).unwrap();
        assert!(link.file_type().is_symlink());
        assert_eq!(link.mtime(), 1_234_567_890);
        assert_ne!(
            fs::metadata(dir.path().join("target")).unwrap().mtime(),
            1_234_567_890
        );
    }

    #[test]
    fn test_place_fifo() {
        let (_dir, afs) = test_fs();
        place_file(&afs, &meta("pipe", FileType::NamedPipe, 0o600), None).unwrap();
        let back = afs.lstat(&RelPath::must("pipe")).unwrap();
        assert_eq!(back.kind, FileType::NamedPipe);
        assert_eq!(back.perms, 0o600);
    }

    #[test]
    fn test_place_fifo_without_opening_it() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_path_buf();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let afs = OsFs::new(AbsPath::from_std_path(&base).unwrap());
            let res = place_file(&afs, &meta("pipe", FileType::NamedPipe, 0o640), None);
            let _ = tx.send(res.map_err(|e| e.to_string()));
        });
        rx.recv_timeout(std::time::Duration::from_secs(10))
            .expect("placing a fifo blocked")
            .unwrap();
        let back = fs::symlink_metadata(dir.path().join("pipe")).unwrap();
        assert_eq!(back.mtime(), 1_234_567_890);
    }

    #[test]
    fn test_place_unreadable_file_gets_times() {
        let (dir, afs) = test_fs();
        let mut body: &[u8] = b"locked";
        place_file(&afs, &meta("locked", FileType::Regular, 0o000), Some(&mut body)).unwrap();
        let back = fs::symlink_metadata(dir.path().join("locked")).unwrap();
        assert_eq!(back.mode() & 0o7777, 0);
        assert_eq!(back.mtime(), 1_234_567_890);
        fs::set_permissions(dir.path().join("locked"), fs::Permissions::from_mode(0o600)).unwrap();
    }

    #[test]
    fn test_place_root_must_be_directory() {
        let (dir, afs) = test_fs();
        fs::write(dir.path().join("keep"), "x").unwrap();
        let mut m = meta("x", FileType::Regular, 0o644);
        m.name = RelPath::root();
        let mut body: &[u8] = b"clobber";
        let err = place_file(&afs, &m, Some(&mut body)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilesystem);
        assert!(dir.path().is_dir());
        assert_eq!(fs::read(dir.path().join("keep")).unwrap(), b"x");
    }

    #[test]
    fn test_place_unsettable_xattr_fails() {
        let (dir, afs) = test_fs();
        let mut m = meta("f", FileType::Regular, 0o644);
        m.xattrs.insert("bogus.k".into(), b"v".to_vec());
        let mut body: &[u8] = b"x";
        let err = place_file(&afs, &m, Some(&mut body)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(dir.path().join("f").exists());
    }

    #[test]
    fn test_place_user_xattr() {
        let (dir, afs) = test_fs();
        let check = dir.path().join("check");
        fs::write(&check, "").unwrap();
        if xattr::set(&check, "user.check", b"1").is_err() {
            // filesystem without user xattrs
            return;
        }

        let mut m = meta("f", FileType::Regular, 0o644);
        m.xattrs.insert("user.test".into(), b"value".to_vec());
        let mut body: &[u8] = b"x";
        place_file(&afs, &m, Some(&mut body)).unwrap();

        let back = afs.lstat(&RelPath::must("f")).unwrap();
        assert_eq!(back.xattrs.get("user.test").map(Vec::as_slice), Some(&b"value"[..]));
        assert_eq!(back.mtime.timestamp(), 1_234_567_890);
    }

    #[test]
    fn test_privileged_xattr_namespaces() {
        assert!(is_privileged_xattr("security.selinux"));
        assert!(is_privileged_xattr("trusted.overlay.opaque"));
        assert!(!is_privileged_xattr("user.test"));
        assert!(!is_privileged_xattr("bogus.k"));
    }

    #[test]
    fn test_place_socket_unsupported() {
        let (dir, afs) = test_fs();
        let err = place_file(&afs, &meta("sock", FileType::Socket, 0o755), None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { .. }));
        assert!(!dir.path().join("sock").exists());
    }

    #[test]
    fn test_place_breakout_through_symlinked_dir() {
        let (dir, afs) = test_fs();
        let outside = tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        symlink(outside.path(), dir.path().join("a/b")).unwrap();

        let mut body = &b"pwned"[..];
        let m = meta("a/b/c", FileType::Regular, 0o644);
        let err = place_file(&afs, &m, Some(&mut body)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Breakout);
        match err {
            Error::Breakout { path, prefix, .. } => {
                assert_eq!(path, "a/b/c");
                assert_eq!(prefix, "a/b");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!outside.path().join("c").exists());
    }

    #[test]
    fn test_place_breakout_even_when_link_stays_inside() {
        let (dir, afs) = test_fs();
        fs::create_dir(dir.path().join("real")).unwrap();
        symlink("real", dir.path().join("alias")).unwrap();

        let err = place_file(&afs, &meta("alias/f", FileType::Regular, 0o644), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Breakout);
        assert!(!dir.path().join("real/f").exists());
    }

    #[test]
    fn test_place_hardlink() {
        let (dir, afs) = test_fs();
        let mut body = &b"shared"[..];
        place_file(&afs, &meta("orig", FileType::Regular, 0o644), Some(&mut body)).unwrap();

        let mut link = meta("link", FileType::Hardlink, 0);
        link.linkname = "orig".into();
        place_file(&afs, &link, None).unwrap();

        let a = fs::metadata(dir.path().join("orig")).unwrap();
        let b = fs::metadata(dir.path().join("link")).unwrap();
        assert_eq!(a.ino(), b.ino());
    }

    #[test]
    fn test_place_hardlink_target_revalidated() {
        let (dir, afs) = test_fs();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret"), "s").unwrap();
        symlink(outside.path(), dir.path().join("escape")).unwrap();
        symlink(outside.path().join("secret"), dir.path().join("direct")).unwrap();

        let mut via_dir = meta("link1", FileType::Hardlink, 0);
        via_dir.linkname = "escape/secret".into();
        let err = place_file(&afs, &via_dir, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Breakout);

        let mut via_link = meta("link2", FileType::Hardlink, 0);
        via_link.linkname = "direct".into();
        let err = place_file(&afs, &via_link, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Breakout);
    }

    #[test]
    fn test_scan_regular_and_directory() {
        let (dir, afs) = test_fs();
        fs::write(dir.path().join("f"), "abc").unwrap();
        fs::create_dir(dir.path().join("d")).unwrap();

        let (m, body) = scan_file(&afs, &RelPath::must("f")).unwrap();
        assert_eq!(m.kind, FileType::Regular);
        let mut content = String::new();
        body.unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "abc");

        let (m, body) = scan_file(&afs, &RelPath::must("d")).unwrap();
        assert_eq!(m.kind, FileType::Directory);
        assert!(body.is_none());
    }

    #[test]
    fn test_scan_symlink_itself_is_fine() {
        let (dir, afs) = test_fs();
        symlink("/etc/passwd", dir.path().join("l")).unwrap();
        let (m, body) = scan_file(&afs, &RelPath::must("l")).unwrap();
        assert_eq!(m.kind, FileType::Symlink);
        assert_eq!(m.linkname, "/etc/passwd");
        assert!(body.is_none());
    }

    #[test]
    fn test_scan_through_symlinked_prefix() {
        let (dir, afs) = test_fs();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret"), "s").unwrap();
        symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = scan_file(&afs, &RelPath::must("link/secret")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Breakout);
    }
}
