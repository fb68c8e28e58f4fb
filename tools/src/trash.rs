//! Reversible deletion.
//!
//! [`FileStore::delete`](crate::FileStore::delete) asks a [`Trash`] first and only
//! removes permanently when the trash reports failure.

use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};

pub trait Trash: Debug + Send + Sync {
    fn trash(&self, path: &Path) -> io::Result<()>;
}

/// Moves entries into a single directory, suffixing names on collision.
///
/// Rename cannot cross filesystems; that failure is reported so the caller can
/// fall back to permanent removal.
#[derive(Debug, Clone)]
pub struct DirTrash {
    dir: PathBuf,
}

impl DirTrash {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<root>/.trash`: same filesystem as the notes, hidden from listings by default.
    #[must_use]
    pub fn in_root(root: &Path) -> Self {
        Self::new(root.join(".trash"))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn free_slot(&self, name: &str) -> PathBuf {
        let first = self.dir.join(name);
        if !first.exists() {
            return first;
        }
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
        let mut n = 1usize;
        loop {
            let candidate = self.dir.join(format!("{name}.{stamp}.{n}"));
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }
}

impl Trash for DirTrash {
    fn trash(&self, path: &Path) -> io::Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        std::fs::create_dir_all(&self.dir)?;
        let dest = self.free_slot(&name);
        std::fs::rename(path, &dest)?;
        tracing::debug!(from = %path.display(), to = %dest.display(), "Moved to trash");
        Ok(())
    }
}

/// A trash that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrash;

impl Trash for NoTrash {
    fn trash(&self, _path: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no trash available",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{DirTrash, NoTrash, Trash};
    use std::fs;

    #[test]
    fn dir_trash_moves_and_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let trash = DirTrash::new(dir.path().join("trash"));

        let first = dir.path().join("a.md");
        fs::write(&first, "one").unwrap();
        trash.trash(&first).unwrap();

        fs::write(&first, "two").unwrap();
        trash.trash(&first).unwrap();

        assert!(!first.exists());
        let entries = fs::read_dir(trash.dir()).unwrap().count();
        assert_eq!(entries, 2);
        assert_eq!(fs::read_to_string(trash.dir().join("a.md")).unwrap(), "one");
    }

    #[test]
    fn no_trash_always_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.md");
        fs::write(&file, "x").unwrap();
        assert!(NoTrash.trash(&file).is_err());
        assert!(file.exists());
    }
}
