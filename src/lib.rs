//! fileset - content-addressed filesets
//!
//! turns a directory tree into a hash that depends only on its content and
//! POSIX metadata, and puts trees back down below a target directory
//! without letting symlinks steer writes outside of it.
//!
//! # Core concepts
//!
//! - **Fileset**: a directory tree with ownership, modes, mtimes, and xattrs
//! - **Ware**: a packed fileset, identified by a [`WareId`] (`type:hash`)
//! - **Bucket**: the unordered records seen while packing or unpacking
//! - **Filters**: which attributes survive packing and unpacking
//!
//! # Hash format
//!
//! every entry becomes a CBOR map with single-letter keys in a fixed order
//! (name, type, perms, uid, gid, mtime, then link target, device numbers,
//! and xattrs where they apply), ending in the file's content hash or the
//! list of its children's node hashes. the node bytes are hashed with
//! SHA-384; the root directory's node hash is the ware hash.
//!
//! # Example usage
//!
//! ```no_run
//! use fileset::{ops, FilesetFilters};
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//!
//! // hash a directory with the default (flattening) pack filters
//! let id = ops::pack(Path::new("/source"), "tar", &FilesetFilters::default(), None, &cancel).unwrap();
//!
//! // copy it elsewhere, verifying the copy hashes the same
//! let copied = ops::copy(
//!     Path::new("/source"),
//!     Path::new("/destination"),
//!     "tar",
//!     &FilesetFilters::default(),
//!     &FilesetFilters::default(),
//!     &cancel,
//! )
//! .unwrap();
//! assert_eq!(id, copied);
//! ```

mod config;
mod error;
mod hash;
mod ware;

pub mod bucket;
pub mod filter;
pub mod fs;
pub mod ops;
pub mod path;
pub mod types;

pub use bucket::{hash_bucket, Bucket, Record};
pub use config::Config;
pub use error::{Error, ErrorKind, IoResultExt, Result};
pub use filter::{FilesetFilters, FilterDefaults, Filters, IdFilter};
pub use hash::{ContentHasher, Hash, HashingReader, HASH_LEN};
pub use ops::{Entry, EntrySink};
pub use path::{AbsPath, RelPath};
pub use types::{FileType, Metadata};
pub use ware::{WareId, DEFAULT_WARE_TYPE};
