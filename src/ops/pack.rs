use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::bucket::Bucket;
use crate::error::{IoResultExt, Result};
use crate::filter::FilesetFilters;
use crate::fs::{scan_file, walk, OsFs};
use crate::hash::HashingReader;
use crate::ops::EntrySink;
use crate::path::AbsPath;
use crate::ware::WareId;

/// hash the fileset at `src`, streaming every entry into `sink` if given
///
/// filters are validated in pack mode, so empty fields flatten ownership
/// and mtime. the sink sees entries after filtering, exactly as they are
/// hashed.
pub fn pack(
    src: &Path,
    ware_type: &str,
    filters: &FilesetFilters,
    mut sink: Option<&mut dyn EntrySink>,
    cancel: &CancellationToken,
) -> Result<WareId> {
    let filters = filters.for_pack()?;
    let afs = OsFs::new(AbsPath::from_std_path(src)?);
    let mut bucket = Bucket::new();
    tracing::debug!("packing {} as {}", src.display(), ware_type);

    walk(
        &afs,
        cancel,
        |found| {
            let (mut meta, body) = scan_file(&afs, &found.name)?;
            filters.apply(&mut meta);

            let content_hash = match body {
                Some(body) => {
                    let mut reader = HashingReader::new(body);
                    if let Some(sink) = sink.as_mut() {
                        sink.put(&meta, Some(&mut reader))?;
                    }
                    let (hash, size) = reader.finish().with_path(&meta.name)?;
                    meta.size = size;
                    Some(hash)
                }
                None => {
                    if let Some(sink) = sink.as_mut() {
                        sink.put(&meta, None)?;
                    }
                    None
                }
            };
            tracing::trace!("packed {} {}", meta.kind, meta.name);
            bucket.record(meta, content_hash);
            Ok(())
        },
        |_| Ok(()),
    )?;

    let entries = bucket.len();
    let hash = bucket.hash()?;
    let id = WareId::new(ware_type, &hash);
    tracing::debug!("packed {} entries from {} -> {}", entries, src.display(), id);
    Ok(id)
}

/// one input of [`pack_many`]
#[derive(Clone, Debug)]
pub struct PackJob {
    pub src: PathBuf,
    pub ware_type: String,
    pub filters: FilesetFilters,
}

/// pack independent filesets in parallel, one pipeline each
///
/// results come back in job order. if any job fails, one of the errors is
/// returned and the rest are discarded.
pub fn pack_many(jobs: &[PackJob], cancel: &CancellationToken) -> Result<Vec<WareId>> {
    jobs.par_iter()
        .map(|job| pack(&job.src, &job.ware_type, &job.filters, None, cancel))
        .collect()
}
