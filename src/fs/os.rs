use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io::{Read, Write};
use std::os::unix::fs::{
    lchown, symlink, DirBuilderExt, FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt,
};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use nix::libc;
use nix::sys::stat::{makedev, mknod, Mode, SFlag};

use crate::error::{Error, IoResultExt, Result};
use crate::fs::Fs;
use crate::path::{AbsPath, RelPath};
use crate::types::{FileType, Metadata, Xattrs, MODE_ALL};

/// [`Fs`] backed by the host filesystem below a base directory
#[derive(Clone, Debug)]
pub struct OsFs {
    base: AbsPath,
}

impl OsFs {
    pub fn new(base: AbsPath) -> Self {
        Self { base }
    }

    fn full(&self, path: &RelPath) -> Result<PathBuf> {
        if path.escapes() {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "path climbs out of the filesystem base",
            });
        }
        Ok(self.base.join(path).as_path().to_path_buf())
    }

    fn metadata_of(
        &self,
        name: &RelPath,
        meta: &fs::Metadata,
        full: &Path,
        follow: bool,
    ) -> Result<Metadata> {
        let kind = file_type_of(meta);
        let mut out = Metadata::new(name.clone(), kind);
        out.perms = meta.mode() & MODE_ALL;
        out.uid = meta.uid();
        out.gid = meta.gid();
        out.size = meta.len();
        out.mtime = mtime_from(full, meta)?;
        if kind == FileType::Symlink {
            out.linkname = fs::read_link(full)
                .with_path(full.display())?
                .to_string_lossy()
                .into_owned();
        }
        if kind.is_device() {
            let rdev = meta.rdev();
            out.devmajor = nix::sys::stat::major(rdev) as u32;
            out.devminor = nix::sys::stat::minor(rdev) as u32;
        }
        out.xattrs = read_xattrs(full, follow)?;
        out.normalize();
        Ok(out)
    }
}

/// detect file type from std metadata
fn file_type_of(meta: &fs::Metadata) -> FileType {
    let ft = meta.file_type();
    if ft.is_file() {
        FileType::Regular
    } else if ft.is_dir() {
        FileType::Directory
    } else if ft.is_symlink() {
        FileType::Symlink
    } else if ft.is_block_device() {
        FileType::BlockDevice
    } else if ft.is_char_device() {
        FileType::CharDevice
    } else if ft.is_fifo() {
        FileType::NamedPipe
    } else {
        FileType::Socket
    }
}

/// mtime with nanoseconds; timestamps chrono cannot represent are an error
fn mtime_from(path: &Path, meta: &fs::Metadata) -> Result<DateTime<Utc>> {
    datetime_of(path, meta.mtime(), meta.mtime_nsec())
}

fn datetime_of(path: &Path, secs: i64, nsecs: i64) -> Result<DateTime<Utc>> {
    u32::try_from(nsecs)
        .ok()
        .and_then(|nsecs| DateTime::from_timestamp(secs, nsecs))
        .ok_or_else(|| {
            Error::InvalidFilesystem(format!(
                "{}: mtime {}.{:09} is out of range",
                path.display(),
                secs,
                nsecs
            ))
        })
}

/// read all extended attributes of a path; `follow` dereferences a symlink
fn read_xattrs(path: &Path, follow: bool) -> Result<Xattrs> {
    let mut xattrs = Xattrs::new();

    let listed = if follow {
        xattr::list_deref(path)
    } else {
        xattr::list(path)
    };
    let names: Vec<_> = match listed {
        Ok(iter) => iter.collect(),
        Err(e) => {
            // ENOTSUP/ENODATA means no xattr support or no xattrs, not an error
            if e.raw_os_error() == Some(libc::ENOTSUP)
                || e.raw_os_error() == Some(libc::ENODATA)
                || e.raw_os_error() == Some(libc::EOPNOTSUPP)
            {
                return Ok(xattrs);
            }
            return Err(e).with_path(path.display());
        }
    };

    for name in names {
        let Some(key) = name.to_str() else {
            tracing::warn!("skipping non-utf8 xattr {:?} on {}", name, path.display());
            continue;
        };
        let value = if follow {
            xattr::get_deref(path, &name)
        } else {
            xattr::get(path, &name)
        };
        match value {
            Ok(Some(value)) => {
                xattrs.insert(key.to_string(), value);
            }
            // removed between list and get
            Ok(None) => {}
            Err(e) if e.raw_os_error() == Some(libc::ENODATA) => {}
            Err(e) => return Err(e).with_path(path.display()),
        }
    }

    Ok(xattrs)
}

fn file_time(mtime: DateTime<Utc>) -> FileTime {
    FileTime::from_unix_time(mtime.timestamp(), mtime.timestamp_subsec_nanos())
}

impl Fs for OsFs {
    fn base_path(&self) -> &AbsPath {
        &self.base
    }

    fn open_read(&self, path: &RelPath) -> Result<Box<dyn Read + Send>> {
        let full = self.full(path)?;
        let file = File::open(&full).with_path(full.display())?;
        Ok(Box::new(file))
    }

    fn open_write(&self, path: &RelPath, perms: u32) -> Result<Box<dyn Write + Send>> {
        let full = self.full(path)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(perms & MODE_ALL)
            .open(&full)
            .with_path(full.display())?;
        Ok(Box::new(file))
    }

    fn mkdir(&self, path: &RelPath, perms: u32) -> Result<()> {
        let full = self.full(path)?;
        DirBuilder::new()
            .mode(perms & MODE_ALL)
            .create(&full)
            .with_path(full.display())
    }

    fn mklink(&self, path: &RelPath, target: &str) -> Result<()> {
        let full = self.full(path)?;
        symlink(target, &full).with_path(full.display())
    }

    fn mkfifo(&self, path: &RelPath, perms: u32) -> Result<()> {
        let full = self.full(path)?;
        nix::unistd::mkfifo(&full, Mode::from_bits_truncate(perms & MODE_ALL))
            .with_path(full.display())
    }

    fn mkdevice(
        &self,
        path: &RelPath,
        kind: FileType,
        major: u32,
        minor: u32,
        perms: u32,
    ) -> Result<()> {
        let sflag = match kind {
            FileType::CharDevice => SFlag::S_IFCHR,
            FileType::BlockDevice => SFlag::S_IFBLK,
            other => {
                return Err(Error::UnsupportedType {
                    path: path.to_string(),
                    kind: other.type_name(),
                })
            }
        };
        let full = self.full(path)?;
        let dev = makedev(major as u64, minor as u64);
        mknod(&full, sflag, Mode::from_bits_truncate(perms & MODE_ALL), dev)
            .with_path(full.display())
    }

    fn mkhardlink(&self, path: &RelPath, target: &RelPath) -> Result<()> {
        let full = self.full(path)?;
        let target = self.full(target)?;
        fs::hard_link(&target, &full).with_path(full.display())
    }

    fn lchown(&self, path: &RelPath, uid: u32, gid: u32) -> Result<()> {
        let full = self.full(path)?;
        lchown(&full, Some(uid), Some(gid)).with_path(full.display())
    }

    fn chmod(&self, path: &RelPath, perms: u32) -> Result<()> {
        let full = self.full(path)?;
        fs::set_permissions(&full, Permissions::from_mode(perms & MODE_ALL))
            .with_path(full.display())
    }

    fn set_times_no_follow(&self, path: &RelPath, mtime: DateTime<Utc>) -> Result<()> {
        let full = self.full(path)?;
        let t = file_time(mtime);
        filetime::set_symlink_file_times(&full, t, t).with_path(full.display())
    }

    fn set_times(&self, path: &RelPath, mtime: DateTime<Utc>) -> Result<()> {
        let full = self.full(path)?;
        // set by path: opening a fifo would block, and opening needs read access
        let resolved = fs::canonicalize(&full).with_path(full.display())?;
        let t = file_time(mtime);
        filetime::set_symlink_file_times(&resolved, t, t).with_path(full.display())
    }

    fn set_xattr(&self, path: &RelPath, name: &str, value: &[u8]) -> Result<()> {
        let full = self.full(path)?;
        xattr::set(&full, name, value).with_path(full.display())
    }

    fn stat(&self, path: &RelPath) -> Result<Metadata> {
        let full = self.full(path)?;
        let meta = fs::metadata(&full).with_path(full.display())?;
        self.metadata_of(path, &meta, &full, true)
    }

    fn lstat(&self, path: &RelPath) -> Result<Metadata> {
        let full = self.full(path)?;
        let meta = fs::symlink_metadata(&full).with_path(full.display())?;
        self.metadata_of(path, &meta, &full, false)
    }

    fn kind_of(&self, path: &RelPath) -> Result<FileType> {
        let full = self.full(path)?;
        let meta = fs::metadata(&full).with_path(full.display())?;
        Ok(file_type_of(&meta))
    }

    fn mtime_of(&self, path: &RelPath) -> Result<DateTime<Utc>> {
        let full = self.full(path)?;
        let meta = fs::symlink_metadata(&full).with_path(full.display())?;
        mtime_from(&full, &meta)
    }

    fn read_dir_names(&self, path: &RelPath) -> Result<Vec<String>> {
        let full = self.full(path)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&full).with_path(full.display())? {
            let entry = entry.with_path(full.display())?;
            let name = entry.file_name().into_string().map_err(|raw| Error::InvalidPath {
                path: format!("{}/{}", full.display(), raw.to_string_lossy()),
                reason: "file name is not valid utf-8",
            })?;
            names.push(name);
        }
        Ok(names)
    }

    fn readlink(&self, path: &RelPath) -> Result<Option<String>> {
        let full = self.full(path)?;
        match fs::read_link(&full) {
            Ok(target) => Ok(Some(target.to_string_lossy().into_owned())),
            Err(e) if e.raw_os_error() == Some(libc::EINVAL) => Ok(None),
            Err(e) => Err(e).with_path(full.display()),
        }
    }

    fn remove(&self, path: &RelPath) -> Result<()> {
        let full = self.full(path)?;
        let meta = fs::symlink_metadata(&full).with_path(full.display())?;
        if meta.is_dir() {
            fs::remove_dir(&full).with_path(full.display())
        } else {
            fs::remove_file(&full).with_path(full.display())
        }
    }
}
