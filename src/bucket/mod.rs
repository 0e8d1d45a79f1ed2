//! unordered record collection feeding the tree hash
//!
//! a [`Bucket`] is filled during one walk (or one archive read), in
//! whatever order entries show up, and consumed once by [`Bucket::hash`].
//! before hashing, records are sorted by a key that makes every directory
//! a string prefix of its descendants: `./` plus the path, with a trailing
//! `/` on directories. the root directory's key is `./`.

mod treehash;

pub use treehash::hash_bucket;

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::types::{FileType, Metadata};

/// one observed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub meta: Metadata,
    /// content hash; regular files only
    pub content_hash: Option<Hash>,
}

impl Record {
    /// key that sorts every directory immediately before its descendants
    pub fn sort_key(&self) -> String {
        let mut key = String::with_capacity(self.meta.name.as_str().len() + 3);
        key.push_str("./");
        key.push_str(self.meta.name.as_str());
        if self.meta.kind == FileType::Directory && !self.meta.name.is_root() {
            key.push('/');
        }
        key
    }
}

/// append-only collection of records for one pack or unpack
#[derive(Debug, Default)]
pub struct Bucket {
    records: Vec<Record>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// add an observation; fields irrelevant to its type are zeroed first
    pub fn record(&mut self, mut meta: Metadata, content_hash: Option<Hash>) {
        meta.normalize();
        let content_hash = match meta.kind {
            FileType::Regular => content_hash,
            _ => None,
        };
        self.records.push(Record { meta, content_hash });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// consume the bucket, returning its records in hashing order
    ///
    /// the first record must be the root directory, keys must be unique,
    /// and no name may climb out of the fileset.
    pub fn into_sorted(self) -> Result<Vec<(String, Record)>> {
        let mut keyed: Vec<(String, Record)> = self
            .records
            .into_iter()
            .map(|r| (r.sort_key(), r))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        match keyed.first() {
            None => return Err(Error::InvalidFilesystem("empty fileset".into())),
            Some((_, r)) if !r.meta.name.is_root() => {
                return Err(Error::InvalidFilesystem(format!(
                    "first entry is {:?}, not the root",
                    r.meta.name.as_str()
                )));
            }
            Some((_, r)) if r.meta.kind != FileType::Directory => {
                return Err(Error::InvalidFilesystem(format!(
                    "root must be a directory, found {}",
                    r.meta.kind
                )));
            }
            Some(_) => {}
        }

        for (key, record) in &keyed {
            if record.meta.name.escapes() {
                return Err(Error::InvalidFilesystem(format!(
                    "entry {:?} climbs out of the fileset",
                    record.meta.name.as_str()
                )));
            }
            if record.meta.kind == FileType::Regular && record.content_hash.is_none() {
                return Err(Error::InvalidFilesystem(format!(
                    "file {:?} has no content hash",
                    key
                )));
            }
        }
        for pair in keyed.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(Error::InvalidFilesystem(format!(
                    "duplicate entry {:?}",
                    pair[0].0
                )));
            }
        }

        Ok(keyed)
    }

    /// reduce the bucket to its root tree hash
    pub fn hash(self) -> Result<Hash> {
        hash_bucket(self)
    }
}
