use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::bucket::Bucket;
use crate::error::{Error, IoResultExt, Result};
use crate::filter::{FilesetFilters, Filters};
use crate::fs::{mkdir_all, place_file, repair_mtime, OsFs};
use crate::hash::{Hash, HashingReader};
use crate::ops::{Entry, EntrySink};
use crate::path::{AbsPath, RelPath};
use crate::types::{FileType, Metadata};
use crate::ware::WareId;

/// places entries below a target directory while hashing what it was given
///
/// the bucket records entries exactly as received, before unpack filters
/// are applied, so [`Unpacker::verify`] checks the ware itself rather than
/// how it was laid down.
pub struct Unpacker {
    afs: OsFs,
    filters: Filters,
    bucket: Bucket,
    /// every regular file placed so far, as received, for hardlinks
    contents: HashMap<RelPath, (Hash, Metadata)>,
}

impl Unpacker {
    /// prepare to unpack into `target`, creating it if needed
    pub fn new(target: &Path, filters: &FilesetFilters) -> Result<Self> {
        let filters = filters.for_unpack()?;
        let base = AbsPath::from_std_path(target)?;
        mkdir_all(&OsFs::new(AbsPath::root()), &base.to_rel(), 0o755)?;
        tracing::debug!("unpacking into {}", base);
        Ok(Self {
            afs: OsFs::new(base),
            filters,
            bucket: Bucket::new(),
            contents: HashMap::new(),
        })
    }

    /// place one entry, keeping its parent's mtime intact
    fn place(&self, meta: &Metadata, body: Option<&mut dyn Read>) -> Result<()> {
        if meta.name.is_root() {
            return place_file(&self.afs, meta, body);
        }
        let repair = repair_mtime(&self.afs, &meta.name.dir())?;
        place_file(&self.afs, meta, body)?;
        repair()
    }

    /// hash everything received so far
    pub fn finish(self, ware_type: &str) -> Result<WareId> {
        let entries = self.bucket.len();
        let id = WareId::new(ware_type, &self.bucket.hash()?);
        tracing::debug!("unpacked {} entries as {}", entries, id);
        Ok(id)
    }

    /// hash everything received and compare against `expected`
    pub fn verify(self, expected: &WareId) -> Result<WareId> {
        let actual = self.finish(&expected.ware_type)?;
        if actual.hash != expected.hash {
            return Err(Error::HashMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(actual)
    }
}

impl EntrySink for Unpacker {
    fn put(&mut self, meta: &Metadata, body: Option<&mut dyn Read>) -> Result<()> {
        let mut received = meta.clone();
        received.normalize();
        let mut placed = received.clone();
        self.filters.apply(&mut placed);

        let content_hash = match received.kind {
            FileType::Regular => {
                let mut empty = io::empty();
                let body: &mut dyn Read = match body {
                    Some(body) => body,
                    None => &mut empty,
                };
                let mut reader = HashingReader::new(body);
                self.place(&placed, Some(&mut reader))?;
                let (hash, _) = reader.finish().with_path(&received.name)?;
                self.contents
                    .insert(received.name.clone(), (hash, received.clone()));
                Some(hash)
            }
            FileType::Hardlink => {
                let target = RelPath::new(&received.linkname)?;
                let (hash, shared) = self.contents.get(&target).cloned().ok_or_else(|| {
                    Error::InvalidFilesystem(format!(
                        "hardlink {} points at {}, which is not an earlier regular file",
                        received.name, target
                    ))
                })?;
                self.place(&placed, None)?;
                // the link's own header attributes never reach the disk; it
                // hashes as the inode it shares, under its own name
                received = Metadata {
                    name: received.name,
                    ..shared
                };
                self.contents
                    .insert(received.name.clone(), (hash, received.clone()));
                Some(hash)
            }
            _ => {
                self.place(&placed, None)?;
                None
            }
        };

        tracing::trace!("unpacked {} {}", placed.kind, placed.name);
        self.bucket.record(received, content_hash);
        Ok(())
    }
}

/// place an archive's entries below `target` and check they hash to `ware_id`
///
/// on a mismatch the placed files are left as they are; the caller decides
/// whether to clean up.
pub fn unpack<I>(
    entries: I,
    target: &Path,
    ware_id: &WareId,
    filters: &FilesetFilters,
    cancel: &CancellationToken,
) -> Result<WareId>
where
    I: IntoIterator<Item = Result<Entry>>,
{
    let mut unpacker = Unpacker::new(target, filters)?;
    for entry in entries {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut entry = entry?;
        let body = entry.body.as_mut().map(|b| &mut **b as &mut dyn Read);
        unpacker.put(&entry.meta, body)?;
    }
    unpacker.verify(ware_id)
}
