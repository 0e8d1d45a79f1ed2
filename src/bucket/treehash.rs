use std::collections::HashSet;

use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;

use crate::bucket::{Bucket, Record};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::types::{FileType, Xattrs};

/// compute the merkle root of everything recorded in `bucket`
///
/// each node is encoded as a CBOR map with a fixed key order and hashed;
/// a directory's node lists its children's hashes in sorted key order.
pub fn hash_bucket(bucket: Bucket) -> Result<Hash> {
    let records = bucket.into_sorted()?;
    let mut idx = 0;
    let root = fold(&records, &mut idx)?;
    if idx != records.len() {
        return Err(Error::InvalidFilesystem(format!(
            "visited {} of {} entries",
            idx,
            records.len()
        )));
    }
    Ok(root)
}

/// hash the node at `records[*idx]` and, for directories, its whole subtree
fn fold(records: &[(String, Record)], idx: &mut usize) -> Result<Hash> {
    let (key, record) = &records[*idx];
    *idx += 1;

    if record.meta.kind != FileType::Directory {
        return encode(&Node {
            record,
            children: None,
        });
    }

    let mut children = Vec::new();
    let mut names = HashSet::new();
    while let Some((child_key, child)) = records.get(*idx) {
        let Some(rest) = child_key.strip_prefix(key.as_str()) else {
            break;
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        if rest.contains('/') {
            return Err(Error::InvalidFilesystem(format!(
                "{:?} has no parent directory entry",
                child_key
            )));
        }
        if !names.insert(child.meta.name.last()) {
            return Err(Error::InvalidFilesystem(format!(
                "duplicate entry {:?}",
                child_key
            )));
        }
        children.push(fold(records, idx)?);
    }

    encode(&Node {
        record,
        children: Some(&children),
    })
}

fn encode(node: &Node<'_>) -> Result<Hash> {
    let mut buf = Vec::new();
    ciborium::into_writer(node, &mut buf)?;
    Ok(Hash::digest(&buf))
}

/// one entry as it is fed to the hash
struct Node<'a> {
    record: &'a Record,
    /// `Some` for directories
    children: Option<&'a [Hash]>,
}

impl Serialize for Node<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let meta = &self.record.meta;
        let has_link = meta.kind == FileType::Symlink;
        let has_dev = meta.kind.is_device();
        let has_xattrs = !meta.xattrs.is_empty();
        let has_body = self.children.is_some() || meta.kind == FileType::Regular;
        let len = 6 + [has_link, has_dev, has_xattrs, has_body]
            .iter()
            .filter(|b| **b)
            .count();

        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("n", meta.name.last())?;
        map.serialize_entry("t", meta.kind.tag())?;
        map.serialize_entry("p", &meta.perms)?;
        map.serialize_entry("u", &meta.uid)?;
        map.serialize_entry("g", &meta.gid)?;
        map.serialize_entry(
            "m",
            &(meta.mtime.timestamp(), meta.mtime.timestamp_subsec_nanos()),
        )?;
        if has_link {
            map.serialize_entry("l", &meta.linkname)?;
        }
        if has_dev {
            map.serialize_entry("d", &(meta.devmajor, meta.devminor))?;
        }
        if has_xattrs {
            map.serialize_entry("x", &XattrList(&meta.xattrs))?;
        }
        match self.children {
            Some(children) => map.serialize_entry("c", &ChildList(children))?,
            None => {
                if let Some(hash) = &self.record.content_hash {
                    map.serialize_entry("h", &Bytes(hash.as_bytes()))?;
                }
            }
        }
        map.end()
    }
}

/// CBOR byte string rather than an array of integers
struct Bytes<'a>(&'a [u8]);

impl Serialize for Bytes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

/// indefinite-length array of child node hashes
struct ChildList<'a>(&'a [Hash]);

impl Serialize for ChildList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for hash in self.0 {
            seq.serialize_element(&Bytes(hash.as_bytes()))?;
        }
        seq.end()
    }
}

/// indefinite-length array of `[key, value]` pairs, sorted by key
struct XattrList<'a>(&'a Xattrs);

impl Serialize for XattrList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for (key, value) in self.0 {
            seq.serialize_element(&(key, Bytes(value)))?;
        }
        seq.end()
    }
}
