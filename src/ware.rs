use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::Hash;

/// ware type used when a fileset is hashed without an archive encoding
pub const DEFAULT_WARE_TYPE: &str = "dir";

/// identifier of a packed fileset: `<type>:<hash>`
///
/// the type names the packing scheme; the hash is always the tree hash of
/// the fileset, independent of the scheme.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WareId {
    pub ware_type: String,
    pub hash: String,
}

impl WareId {
    pub fn new(ware_type: impl Into<String>, hash: &Hash) -> Self {
        Self {
            ware_type: ware_type.into(),
            hash: hash.to_hex(),
        }
    }
}

impl FromStr for WareId {
    type Err = Error;

    /// split on the first colon; the hash part may itself contain colons
    fn from_str(s: &str) -> Result<Self> {
        let (ware_type, hash) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidWareId(s.to_string()))?;
        Ok(Self {
            ware_type: ware_type.to_string(),
            hash: hash.to_string(),
        })
    }
}

impl fmt::Display for WareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ware_type, self.hash)
    }
}

impl Serialize for WareId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WareId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
