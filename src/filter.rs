//! metadata filters
//!
//! users describe which attributes to keep, flatten, or override with a
//! handful of strings ([`FilesetFilters`]). those are validated once per
//! operation into [`Filters`], which is then applied to every entry.
//!
//! packing and unpacking have different defaults: packing flattens
//! ownership and mtime so the same content hashes the same on any machine;
//! unpacking hands files to the invoking user and keeps the ware's mtimes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Metadata, MODE_BASE};

/// uid every entry gets when packing with an empty uid filter
pub const DEFAULT_UID: u32 = 1000;
/// gid every entry gets when packing with an empty gid filter
pub const DEFAULT_GID: u32 = 1000;
/// 2010-01-01T00:00:00Z, the mtime every entry gets when packing with an
/// empty mtime filter
pub const DEFAULT_MTIME_UNIX: i64 = 1_262_304_000;

/// what an empty uid/gid filter means when unpacking
pub const UNPACK_DEFAULT_ID: IdFilter = IdFilter::Mine;
/// what an empty mtime filter means when unpacking: keep the ware's mtime
pub const UNPACK_DEFAULT_MTIME: Option<DateTime<Utc>> = None;

/// pack-mode defaults, injectable so tests can substitute their own
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterDefaults {
    pub uid: u32,
    pub gid: u32,
    pub mtime: DateTime<Utc>,
}

impl Default for FilterDefaults {
    fn default() -> Self {
        Self {
            uid: DEFAULT_UID,
            gid: DEFAULT_GID,
            mtime: DateTime::from_timestamp(DEFAULT_MTIME_UNIX, 0)
                .expect("default mtime is in range"),
        }
    }
}

/// raw, user-facing filter policy
///
/// - `uid`/`gid`: empty, `keep`, `mine` (unpack only), or an integer
/// - `mtime`: empty, `keep`, `@<unix seconds>`, or an RFC 3339 timestamp
/// - `sticky`: restore setuid/setgid/sticky bits (always on when packing)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesetFilters {
    pub uid: String,
    pub gid: String,
    pub mtime: String,
    pub sticky: bool,
}

/// normalized uid or gid policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdFilter {
    Keep,
    /// the invoking user's real id; unpack only
    Mine,
    Set(u32),
}

/// validated filters, ready to apply
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filters {
    pub uid: IdFilter,
    pub gid: IdFilter,
    /// `None` keeps whatever mtime the entry has
    pub mtime: Option<DateTime<Utc>>,
    pub sticky: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Pack,
    Unpack,
}

impl FilesetFilters {
    /// filters that preserve every attribute
    pub fn keep_all() -> Self {
        Self {
            uid: "keep".into(),
            gid: "keep".into(),
            mtime: "keep".into(),
            sticky: true,
        }
    }

    pub fn for_pack(&self) -> Result<Filters> {
        self.for_pack_with(&FilterDefaults::default())
    }

    pub fn for_pack_with(&self, defaults: &FilterDefaults) -> Result<Filters> {
        Ok(Filters {
            uid: parse_id("uid", &self.uid, Mode::Pack, IdFilter::Set(defaults.uid))?,
            gid: parse_id("gid", &self.gid, Mode::Pack, IdFilter::Set(defaults.gid))?,
            mtime: parse_mtime(&self.mtime, Some(defaults.mtime))?,
            sticky: true,
        })
    }

    pub fn for_unpack(&self) -> Result<Filters> {
        Ok(Filters {
            uid: parse_id("uid", &self.uid, Mode::Unpack, UNPACK_DEFAULT_ID)?,
            gid: parse_id("gid", &self.gid, Mode::Unpack, UNPACK_DEFAULT_ID)?,
            mtime: parse_mtime(&self.mtime, UNPACK_DEFAULT_MTIME)?,
            sticky: self.sticky,
        })
    }
}

fn parse_id(field: &'static str, raw: &str, mode: Mode, default: IdFilter) -> Result<IdFilter> {
    let invalid = |reason: &str| Error::InvalidFilter {
        field,
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    match raw {
        "" => Ok(default),
        "keep" => Ok(IdFilter::Keep),
        "mine" if mode == Mode::Pack => Err(invalid("\"mine\" is only valid when unpacking")),
        "mine" => Ok(IdFilter::Mine),
        s => s
            .parse::<u32>()
            .map(IdFilter::Set)
            .map_err(|_| invalid("must be \"keep\", \"mine\", or a non-negative integer")),
    }
}

fn parse_mtime(raw: &str, default: Option<DateTime<Utc>>) -> Result<Option<DateTime<Utc>>> {
    let invalid = |reason: String| Error::InvalidFilter {
        field: "mtime",
        value: raw.to_string(),
        reason,
    };
    match raw {
        "" => Ok(default),
        "keep" => Ok(None),
        s if s.starts_with('@') => {
            let secs: i64 = s[1..]
                .parse()
                .map_err(|_| invalid("expected \"@\" followed by unix seconds".into()))?;
            DateTime::from_timestamp(secs, 0)
                .map(Some)
                .ok_or_else(|| invalid("timestamp out of range".into()))
        }
        s => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| invalid(format!("not an RFC 3339 timestamp: {}", e))),
    }
}

impl Filters {
    /// rewrite `meta` in place according to this policy
    pub fn apply(&self, meta: &mut Metadata) {
        match self.uid {
            IdFilter::Keep => {}
            IdFilter::Mine => meta.uid = nix::unistd::getuid().as_raw(),
            IdFilter::Set(uid) => meta.uid = uid,
        }
        match self.gid {
            IdFilter::Keep => {}
            IdFilter::Mine => meta.gid = nix::unistd::getgid().as_raw(),
            IdFilter::Set(gid) => meta.gid = gid,
        }
        if let Some(mtime) = self.mtime {
            meta.mtime = mtime;
        }
        if !self.sticky {
            meta.perms &= MODE_BASE;
        }
    }
}
