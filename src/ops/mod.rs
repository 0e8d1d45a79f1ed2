//! pack, unpack, and copy filesets

mod copy;
mod pack;
mod unpack;

use std::io::Read;

use crate::error::Result;
use crate::types::Metadata;

pub use copy::copy;
pub use pack::{pack, pack_many, PackJob};
pub use unpack::{unpack, Unpacker};

/// consumer of packed entries, e.g. an archive writer
///
/// entries arrive in walk order: a directory always before its contents.
/// `body` is set for regular files only and must be read to the end by
/// the sink or left for the caller to drain.
pub trait EntrySink {
    fn put(&mut self, meta: &Metadata, body: Option<&mut dyn Read>) -> Result<()>;
}

/// one entry produced by an archive reader
pub struct Entry {
    pub meta: Metadata,
    pub body: Option<Box<dyn Read>>,
}

impl Entry {
    pub fn new(meta: Metadata, body: Option<Box<dyn Read>>) -> Self {
        Self { meta, body }
    }
}
