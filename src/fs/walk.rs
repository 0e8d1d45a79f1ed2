use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::fs::Fs;
use crate::path::RelPath;
use crate::types::{FileType, Metadata};

/// visit every entry below the base of `afs`, directories twice
///
/// `pre` runs before a directory's children are visited, `post` after.
/// non-directories get both calls back to back. the walk never follows a
/// symlink, and only the children of directories on the current path are
/// ever held in memory.
///
/// siblings come in no particular order; callers that need one must sort.
pub fn walk<Pre, Post>(
    afs: &dyn Fs,
    cancel: &CancellationToken,
    mut pre: Pre,
    mut post: Post,
) -> Result<()>
where
    Pre: FnMut(&Metadata) -> Result<()>,
    Post: FnMut(&Metadata) -> Result<()>,
{
    let root = afs.lstat(&RelPath::root())?;
    visit(afs, cancel, &root, &mut pre, &mut post)
}

fn visit(
    afs: &dyn Fs,
    cancel: &CancellationToken,
    meta: &Metadata,
    pre: &mut dyn FnMut(&Metadata) -> Result<()>,
    post: &mut dyn FnMut(&Metadata) -> Result<()>,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    pre(meta)?;

    if meta.kind == FileType::Directory {
        let names = afs.read_dir_names(&meta.name)?;
        for name in names {
            let child = meta.name.join(&RelPath::new(&name)?);
            let child_meta = afs.lstat(&child)?;
            visit(afs, cancel, &child_meta, pre, post)?;
        }
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    post(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFs;
    use crate::path::AbsPath;
    use crate::ErrorKind;
    use std::fs;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    fn sample_tree() -> (tempfile::TempDir, OsFs) {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/f"), "f").unwrap();
        fs::write(dir.path().join("a/g"), "g").unwrap();
        fs::write(dir.path().join("top"), "t").unwrap();
        let afs = OsFs::new(AbsPath::from_std_path(dir.path()).unwrap());
        (dir, afs)
    }

    #[test]
    fn test_walk_visits_everything_once_each_way() {
        let (_dir, afs) = sample_tree();
        let mut pres = Vec::new();
        let mut posts = Vec::new();
        walk(
            &afs,
            &CancellationToken::new(),
            |m| {
                pres.push(m.name.to_string());
                Ok(())
            },
            |m| {
                posts.push(m.name.to_string());
                Ok(())
            },
        )
        .unwrap();

        let mut sorted_pre = pres.clone();
        sorted_pre.sort();
        assert_eq!(sorted_pre, vec![".", "a", "a/b", "a/b/f", "a/g", "top"]);
        assert_eq!(pres.first().unwrap(), ".");
        assert_eq!(posts.last().unwrap(), ".");
        assert_eq!(posts.len(), pres.len());
    }

    #[test]
    fn test_walk_children_between_pre_and_post() {
        let (_dir, afs) = sample_tree();
        let mut events = Vec::new();
        let events_post = std::cell::RefCell::new(Vec::new());
        walk(
            &afs,
            &CancellationToken::new(),
            |m| {
                events.push(format!("pre {}", m.name));
                Ok(())
            },
            |m| {
                events_post.borrow_mut().push(format!("post {}", m.name));
                Ok(())
            },
        )
        .unwrap();
        // every post of a/b's subtree lands before a/b's own post
        let posts = events_post.into_inner();
        let pos = |s: &str| posts.iter().position(|e| e == s).unwrap();
        assert!(pos("post a/b/f") < pos("post a/b"));
        assert!(pos("post a/b") < pos("post a"));
        assert!(pos("post a/g") < pos("post a"));
        assert!(pos("post top") < pos("post ."));
        let pre_pos = |s: &str| events.iter().position(|e| e == s).unwrap();
        assert!(pre_pos("pre a") < pre_pos("pre a/b"));
        assert!(pre_pos("pre a/b") < pre_pos("pre a/b/f"));
    }

    #[test]
    fn test_walk_does_not_follow_symlinks() {
        let (dir, afs) = sample_tree();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret"), "s").unwrap();
        symlink(outside.path(), dir.path().join("link")).unwrap();

        let mut seen = Vec::new();
        walk(
            &afs,
            &CancellationToken::new(),
            |m| {
                seen.push((m.name.to_string(), m.kind));
                Ok(())
            },
            |_| Ok(()),
        )
        .unwrap();
        assert!(seen.contains(&("link".to_string(), FileType::Symlink)));
        assert!(!seen.iter().any(|(n, _)| n.starts_with("link/")));
    }

    #[test]
    fn test_walk_stops_on_callback_error() {
        let (_dir, afs) = sample_tree();
        let mut count = 0;
        let err = walk(
            &afs,
            &CancellationToken::new(),
            |m| {
                count += 1;
                if m.name.as_str() == "a" {
                    return Err(Error::InvalidFilesystem("stop".into()));
                }
                Ok(())
            },
            |_| Ok(()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilesystem);
        assert!(count <= 3);
    }

    #[test]
    fn test_walk_cancelled() {
        let (_dir, afs) = sample_tree();
        let cancel = CancellationToken::new();
        let mut visited = 0;
        let err = walk(
            &afs,
            &cancel,
            |_| {
                visited += 1;
                cancel.cancel();
                Ok(())
            },
            |_| Ok(()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_walk_single_file_base() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("only"), "x").unwrap();
        let afs = OsFs::new(AbsPath::from_std_path(&dir.path().join("only")).unwrap());
        let mut kinds = Vec::new();
        walk(
            &afs,
            &CancellationToken::new(),
            |m| {
                kinds.push(m.kind);
                Ok(())
            },
            |_| Ok(()),
        )
        .unwrap();
        assert_eq!(kinds, vec![FileType::Regular]);
    }
}
