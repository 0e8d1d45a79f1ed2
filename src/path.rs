//! lexical path values
//!
//! [`RelPath`] and [`AbsPath`] are always in canonical form (what [`clean`]
//! would return for them). each carries the byte offset where its final
//! segment starts, so `last()` never scans and `join()` only adds lengths.
//!
//! construction from a string that is not already canonical is refused.
//! these values are built from trusted inputs; names coming out of an
//! archive must additionally go through confinement checks before use.

use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// lexically normalize a slash-separated path
///
/// collapses repeated separators, drops `.` segments and resolves `..`
/// against preceding segments. rooted paths never climb above `/`; relative
/// paths keep leading `..` segments. the empty path cleans to `.`.
pub fn clean(p: &str) -> String {
    let rooted = p.starts_with('/');
    let mut out: Vec<&str> = Vec::new();

    for seg in p.split('/') {
        match seg {
            "" | "." => {}
            ".." => match out.last() {
                Some(&last) if last != ".." => {
                    out.pop();
                }
                _ if rooted => {}
                _ => out.push(".."),
            },
            seg => out.push(seg),
        }
    }

    let joined = out.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

fn last_segment_start(path: &str) -> usize {
    path.rfind('/').map(|i| i + 1).unwrap_or(0)
}

/// a canonical relative path; the empty value is "this directory"
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelPath {
    path: String,
    split: usize,
}

impl RelPath {
    /// the empty path
    pub fn root() -> Self {
        Self::default()
    }

    /// parse a canonical relative path. `"."` and `""` both name the root.
    pub fn new(s: &str) -> Result<Self> {
        if s.starts_with('/') {
            return Err(Error::InvalidPath {
                path: s.to_string(),
                reason: "absolute path where a relative path is required",
            });
        }
        let s = if s == "." { "" } else { s };
        if !s.is_empty() && clean(s) != s {
            return Err(Error::InvalidPath {
                path: s.to_string(),
                reason: "path is not in canonical form",
            });
        }
        Ok(Self {
            path: s.to_string(),
            split: last_segment_start(s),
        })
    }

    /// like [`RelPath::new`] but panics; for literals and other trusted input
    pub fn must(s: &str) -> Self {
        match Self::new(s) {
            Ok(p) => p,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// true if the path starts by climbing out of its base with `..`
    pub fn escapes(&self) -> bool {
        self.path == ".." || self.path.starts_with("../")
    }

    /// parent path; the root is its own parent
    pub fn dir(&self) -> RelPath {
        if self.split == 0 {
            return RelPath::root();
        }
        let dir = &self.path[..self.split - 1];
        RelPath {
            path: dir.to_string(),
            split: last_segment_start(dir),
        }
    }

    /// final segment, or `"."` for the root
    pub fn last(&self) -> &str {
        if self.path.is_empty() {
            "."
        } else {
            &self.path[self.split..]
        }
    }

    pub fn join(&self, other: &RelPath) -> RelPath {
        if other.is_root() {
            return self.clone();
        }
        if self.is_root() {
            return other.clone();
        }
        if other.escapes() {
            let cleaned = clean(&format!("{}/{}", self.path, other.path));
            let cleaned = if cleaned == "." { String::new() } else { cleaned };
            let split = last_segment_start(&cleaned);
            return RelPath {
                path: cleaned,
                split,
            };
        }
        RelPath {
            path: format!("{}/{}", self.path, other.path),
            split: self.path.len() + 1 + other.split,
        }
    }

    /// every proper prefix of this path, shortest first, excluding the root
    pub fn prefixes(&self) -> impl Iterator<Item = RelPath> + '_ {
        self.path
            .match_indices('/')
            .map(move |(i, _)| RelPath::must(&self.path[..i]))
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.path)
        }
    }
}

impl fmt::Debug for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelPath({:?})", self.to_string())
    }
}

/// a canonical rooted path; the default value is `/`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbsPath {
    path: String,
    split: usize,
}

impl Default for AbsPath {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            split: 1,
        }
    }
}

impl AbsPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(s: &str) -> Result<Self> {
        if !s.starts_with('/') {
            return Err(Error::InvalidPath {
                path: s.to_string(),
                reason: "relative path where an absolute path is required",
            });
        }
        if clean(s) != s {
            return Err(Error::InvalidPath {
                path: s.to_string(),
                reason: "path is not in canonical form",
            });
        }
        Ok(Self {
            path: s.to_string(),
            split: last_segment_start(s),
        })
    }

    pub fn must(s: &str) -> Self {
        match Self::new(s) {
            Ok(p) => p,
            Err(e) => panic!("{}", e),
        }
    }

    /// convert a std path from outside (cli args, tempdirs), cleaning it
    pub fn from_std_path(p: &Path) -> Result<Self> {
        let s = p.to_str().ok_or_else(|| Error::InvalidPath {
            path: p.to_string_lossy().into_owned(),
            reason: "path is not valid utf-8",
        })?;
        Self::new(&clean(s))
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.path)
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    pub fn dir(&self) -> AbsPath {
        if self.split <= 1 {
            return AbsPath::root();
        }
        let dir = &self.path[..self.split - 1];
        AbsPath {
            path: dir.to_string(),
            split: last_segment_start(dir),
        }
    }

    pub fn last(&self) -> &str {
        if self.is_root() {
            "."
        } else {
            &self.path[self.split..]
        }
    }

    /// append a relative path. leading `..` segments are resolved lexically
    /// and clamped at `/`, so the result never climbs above the root.
    pub fn join(&self, rel: &RelPath) -> AbsPath {
        if rel.is_root() {
            return self.clone();
        }
        if rel.escapes() {
            let cleaned = clean(&format!("{}/{}", self.path, rel.as_str()));
            let split = last_segment_start(&cleaned);
            return AbsPath {
                path: cleaned,
                split,
            };
        }
        if self.is_root() {
            return AbsPath {
                path: format!("/{}", rel.as_str()),
                split: 1 + rel.split,
            };
        }
        AbsPath {
            path: format!("{}/{}", self.path, rel.as_str()),
            split: self.path.len() + 1 + rel.split,
        }
    }

    /// strip the leading `/`, viewing this path relative to the root
    pub fn to_rel(&self) -> RelPath {
        let rel = &self.path[1..];
        RelPath {
            path: rel.to_string(),
            split: self.split.saturating_sub(1),
        }
    }
}

impl fmt::Display for AbsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl fmt::Debug for AbsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AbsPath({:?})", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        assert_eq!(clean(""), ".");
        assert_eq!(clean("a//b/./c/"), "a/b/c");
        assert_eq!(clean("a/../.."), "..");
        assert_eq!(clean("../a/../b"), "../b");
        assert_eq!(clean("/../../x"), "/x");
        assert_eq!(clean("/a/b/../.."), "/");
    }

    #[test]
    fn test_relpath_rejects_noncanonical() {
        assert!(RelPath::new("a/./b").is_err());
        assert!(RelPath::new("a//b").is_err());
        assert!(RelPath::new("a/").is_err());
        assert!(RelPath::new("./a").is_err());
        assert!(RelPath::new("a/../b").is_err());
    }

    #[test]
    fn test_relpath_rejects_absolute() {
        assert!(RelPath::new("/a").is_err());
        assert!(AbsPath::new("a").is_err());
    }

    #[test]
    #[should_panic]
    fn test_must_panics() {
        RelPath::must("/etc");
    }

    #[test]
    fn test_relpath_root() {
        let root = RelPath::new(".").unwrap();
        assert!(root.is_root());
        assert_eq!(root, RelPath::new("").unwrap());
        assert_eq!(root.last(), ".");
        assert_eq!(root.dir(), root);
        assert_eq!(root.to_string(), ".");
    }

    #[test]
    fn test_relpath_dir_last() {
        let p = RelPath::must("a/bc/def");
        assert_eq!(p.last(), "def");
        assert_eq!(p.dir(), RelPath::must("a/bc"));
        assert_eq!(p.dir().last(), "bc");
        assert_eq!(p.dir().dir(), RelPath::must("a"));
        assert_eq!(p.dir().dir().dir(), RelPath::root());
    }

    #[test]
    fn test_relpath_join_matches_parse() {
        let joined = RelPath::must("a/b").join(&RelPath::must("c/dd"));
        assert_eq!(joined, RelPath::must("a/b/c/dd"));
        assert_eq!(joined.last(), "dd");
        assert_eq!(joined.dir(), RelPath::must("a/b/c"));

        assert_eq!(RelPath::root().join(&RelPath::must("x")), RelPath::must("x"));
        assert_eq!(RelPath::must("x").join(&RelPath::root()), RelPath::must("x"));
    }

    #[test]
    fn test_relpath_join_climbing() {
        let p = RelPath::must("a/b").join(&RelPath::must("../c"));
        assert_eq!(p, RelPath::must("a/c"));
        let p = RelPath::must("a").join(&RelPath::must("../../c"));
        assert_eq!(p, RelPath::must("../c"));
        assert!(p.escapes());
        let p = RelPath::must("a").join(&RelPath::must(".."));
        assert!(p.is_root());
    }

    #[test]
    fn test_relpath_prefixes() {
        let p = RelPath::must("a/b/c");
        let prefixes: Vec<_> = p.prefixes().collect();
        assert_eq!(prefixes, vec![RelPath::must("a"), RelPath::must("a/b")]);
        assert_eq!(RelPath::must("a").prefixes().count(), 0);
    }

    #[test]
    fn test_abspath_root() {
        let root = AbsPath::root();
        assert_eq!(root.as_str(), "/");
        assert_eq!(root.last(), ".");
        assert_eq!(root.dir(), root);
    }

    #[test]
    fn test_abspath_join() {
        let p = AbsPath::root().join(&RelPath::must("a/b"));
        assert_eq!(p, AbsPath::must("/a/b"));
        assert_eq!(p.last(), "b");
        assert_eq!(p.dir(), AbsPath::must("/a"));
        assert_eq!(p.dir().dir(), AbsPath::root());

        let q = AbsPath::must("/x/y").join(&RelPath::must("z"));
        assert_eq!(q, AbsPath::must("/x/y/z"));
        assert_eq!(q.last(), "z");
    }

    #[test]
    fn test_abspath_join_clamps_at_root() {
        let p = AbsPath::must("/a").join(&RelPath::must("../../../etc"));
        assert_eq!(p, AbsPath::must("/etc"));
        let p = AbsPath::root().join(&RelPath::must(".."));
        assert!(p.is_root());
    }

    #[test]
    fn test_abspath_to_rel() {
        assert_eq!(AbsPath::must("/a/b").to_rel(), RelPath::must("a/b"));
        assert!(AbsPath::root().to_rel().is_root());
        assert_eq!(AbsPath::must("/a/b").to_rel().last(), "b");
    }
}
