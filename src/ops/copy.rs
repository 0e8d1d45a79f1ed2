use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::filter::FilesetFilters;
use crate::ops::{pack, Unpacker};
use crate::ware::WareId;

/// pack `src` and unpack it at `dst` in one pass, without an archive
///
/// both sides hash independently; the copy only succeeds if they agree.
pub fn copy(
    src: &Path,
    dst: &Path,
    ware_type: &str,
    pack_filters: &FilesetFilters,
    unpack_filters: &FilesetFilters,
    cancel: &CancellationToken,
) -> Result<WareId> {
    let mut unpacker = Unpacker::new(dst, unpack_filters)?;
    let packed = pack(src, ware_type, pack_filters, Some(&mut unpacker), cancel)?;
    unpacker.verify(&packed)
}
