use std::fs;
use std::path::{Path, PathBuf};

use quire_utils::atomic_write;

pub const MAX_RECENT_FILES: usize = 10;

/// Most-recent-first list of opened files, persisted as a JSON array.
///
/// Entries whose file has disappeared are pruned on load. Persistence failures
/// are logged and otherwise ignored: the list is a convenience, not state the
/// rest of the system depends on.
#[derive(Debug, Clone)]
pub struct RecentFiles {
    path: PathBuf,
    entries: Vec<String>,
}

impl RecentFiles {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut entries: Vec<String> = fs::read_to_string(&path)
            .ok()
            .and_then(|content| match serde_json::from_str(&content) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Ignoring unreadable recent files list: {e}");
                    None
                }
            })
            .unwrap_or_default();

        let before = entries.len();
        entries.retain(|entry| Path::new(entry).is_file());
        entries.truncate(MAX_RECENT_FILES);
        let recent = Self { path, entries };
        if recent.entries.len() != before {
            recent.persist();
        }
        recent
    }

    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        crate::quire_home().map(|home| home.join("recent.json"))
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Move `file` to the front, dropping the oldest entry past the cap.
    pub fn touch(&mut self, file: &str) {
        self.entries.retain(|entry| entry != file);
        self.entries.insert(0, file.to_string());
        self.entries.truncate(MAX_RECENT_FILES);
        self.persist();
    }

    /// Remove `target` and everything below it.
    pub fn remove_under(&mut self, target: &str) {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !Path::new(entry).starts_with(Path::new(target)));
        if self.entries.len() != before {
            self.persist();
        }
    }

    /// Rewrite entries under `old` to live under `new` after a rename or move.
    pub fn rename_prefix(&mut self, old: &str, new: &str) {
        let old = Path::new(old);
        let mut changed = false;
        for entry in &mut self.entries {
            if let Ok(rest) = Path::new(entry.as_str()).strip_prefix(old) {
                let moved = if rest.as_os_str().is_empty() {
                    PathBuf::from(new)
                } else {
                    Path::new(new).join(rest)
                };
                *entry = moved.to_string_lossy().into_owned();
                changed = true;
            }
        }
        if changed {
            self.persist();
        }
    }

    fn persist(&self) {
        if let Some(parent) = self.path.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            tracing::warn!(path = %parent.display(), "Failed to create recent files dir: {e}");
            return;
        }
        let json = match serde_json::to_vec_pretty(&self.entries) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize recent files: {e}");
                return;
            }
        };
        if let Err(e) = atomic_write(&self.path, &json) {
            tracing::warn!(path = %self.path.display(), "Failed to persist recent files: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_RECENT_FILES, RecentFiles};
    use std::fs;

    fn seed(dir: &std::path::Path, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                fs::write(&path, "x").unwrap();
                path.to_string_lossy().into_owned()
            })
            .collect()
    }

    #[test]
    fn touch_is_most_recent_first_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let files = seed(dir.path(), &["a.md", "b.md"]);
        let mut recent = RecentFiles::load(dir.path().join("recent.json"));
        recent.touch(&files[0]);
        recent.touch(&files[1]);
        recent.touch(&files[0]);
        assert_eq!(recent.entries(), &[files[0].clone(), files[1].clone()]);
    }

    #[test]
    fn list_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..MAX_RECENT_FILES + 3).map(|i| format!("{i}.md")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let files = seed(dir.path(), &refs);
        let mut recent = RecentFiles::load(dir.path().join("recent.json"));
        for file in &files {
            recent.touch(file);
        }
        assert_eq!(recent.entries().len(), MAX_RECENT_FILES);
        assert_eq!(recent.entries()[0], *files.last().unwrap());
    }

    #[test]
    fn load_prunes_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = seed(dir.path(), &["keep.md", "gone.md"]);
        let list_path = dir.path().join("recent.json");
        {
            let mut recent = RecentFiles::load(&list_path);
            recent.touch(&files[0]);
            recent.touch(&files[1]);
        }
        fs::remove_file(&files[1]).unwrap();
        let recent = RecentFiles::load(&list_path);
        assert_eq!(recent.entries(), &[files[0].clone()]);
    }

    #[test]
    fn remove_under_drops_descendants() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let files = seed(dir.path(), &["sub/a.md", "sub-other.md"]);
        let mut recent = RecentFiles::load(dir.path().join("recent.json"));
        recent.touch(&files[0]);
        recent.touch(&files[1]);
        recent.remove_under(&dir.path().join("sub").to_string_lossy());
        assert_eq!(recent.entries(), &[files[1].clone()]);
    }

    #[test]
    fn rename_prefix_rewrites_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("old")).unwrap();
        let files = seed(dir.path(), &["old/a.md"]);
        let mut recent = RecentFiles::load(dir.path().join("recent.json"));
        recent.touch(&files[0]);
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        recent.rename_prefix(&old.to_string_lossy(), &new.to_string_lossy());
        assert_eq!(
            recent.entries()[0],
            new.join("a.md").to_string_lossy().into_owned()
        );
    }
}
