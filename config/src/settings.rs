use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use quire_utils::atomic_write;

const DEFAULT_EXCLUDED_FOLDERS: &[&str] = &[".git", "node_modules", ".obsidian", ".trash"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub root_directory: PathBuf,
    #[serde(default)]
    pub excluded_extensions: BTreeSet<String>,
    #[serde(default)]
    pub excluded_folders: BTreeSet<String>,
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub root_directory: Option<String>,
    pub excluded_extensions: Option<Vec<String>>,
    pub excluded_folders: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write settings at {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

impl Settings {
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root_directory: root.into(),
            excluded_extensions: BTreeSet::new(),
            excluded_folders: DEFAULT_EXCLUDED_FOLDERS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    #[must_use]
    pub fn default_root() -> PathBuf {
        dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Quire")
    }

    #[must_use]
    pub fn is_excluded_folder(&self, name: &str) -> bool {
        self.excluded_folders.contains(name)
    }

    /// `ext` may be given with or without a leading dot; matching is case-insensitive.
    #[must_use]
    pub fn is_excluded_extension(&self, ext: &str) -> bool {
        let normalized = normalize_extension(ext);
        !normalized.is_empty() && self.excluded_extensions.contains(&normalized)
    }

    /// Create the root directory if it does not exist yet.
    pub fn ensure_root(&self) -> Result<(), SettingsError> {
        ensure_directory(&self.root_directory)
    }

    fn apply(&self, update: SettingsUpdate) -> Result<Self, SettingsError> {
        let mut next = self.clone();
        if let Some(root) = update.root_directory {
            let trimmed = root.trim();
            if trimmed.is_empty() {
                return Err(SettingsError::Invalid(
                    "rootDirectory must not be empty".to_string(),
                ));
            }
            let root = PathBuf::from(trimmed);
            if !root.is_absolute() {
                return Err(SettingsError::Invalid(
                    "rootDirectory must be an absolute path".to_string(),
                ));
            }
            next.root_directory = root;
        }
        if let Some(extensions) = update.excluded_extensions {
            next.excluded_extensions = extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .filter(|ext| !ext.is_empty())
                .collect();
        }
        if let Some(folders) = update.excluded_folders {
            next.excluded_folders = folders
                .iter()
                .map(|folder| folder.trim().to_string())
                .filter(|folder| !folder.is_empty())
                .collect();
        }
        Ok(next)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn ensure_directory(path: &Path) -> Result<(), SettingsError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "Created root directory");
    }
    let readable = fs::read_dir(path).is_ok();
    if !path.is_dir() || !readable {
        return Err(SettingsError::Invalid(format!(
            "{} is not a readable directory",
            path.display()
        )));
    }
    Ok(())
}

/// The single settings document and the file it is persisted to.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    current: Settings,
}

impl SettingsStore {
    /// Load from `path`, writing a default document if the file does not exist.
    pub fn load_or_default(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let current = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| {
                tracing::warn!(path = %path.display(), "Failed to parse settings: {source}");
                SettingsError::Parse {
                    path: path.clone(),
                    source,
                }
            })?
        } else {
            let settings = Settings::with_root(Settings::default_root());
            persist(&path, &settings)?;
            settings
        };
        current.ensure_root()?;
        Ok(Self { path, current })
    }

    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        crate::quire_home().map(|home| home.join("settings.json"))
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.current
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate and persist an update. On error nothing changes, in memory or on disk.
    pub fn update(&mut self, update: SettingsUpdate) -> Result<&Settings, SettingsError> {
        let next = self.current.apply(update)?;
        next.ensure_root()?;
        persist(&self.path, &next)?;
        tracing::info!(root = %next.root_directory.display(), "Settings updated");
        self.current = next;
        Ok(&self.current)
    }
}

fn persist(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let write_err = |source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let json = serde_json::to_vec_pretty(settings).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, &json).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::{Settings, SettingsStore, SettingsUpdate};
    use std::fs;

    fn store_with_root(dir: &std::path::Path) -> SettingsStore {
        let path = dir.join("settings.json");
        let settings = Settings::with_root(dir.join("notes"));
        fs::write(&path, serde_json::to_string(&settings).unwrap()).unwrap();
        SettingsStore::load_or_default(path).unwrap()
    }

    #[test]
    fn load_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_root(dir.path());
        assert!(dir.path().join("notes").is_dir());
        assert!(store.settings().is_excluded_folder(".git"));
    }

    #[test]
    fn update_normalizes_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_root(dir.path());
        store
            .update(SettingsUpdate {
                excluded_extensions: Some(vec![".PNG".into(), "pdf".into(), " ".into()]),
                ..SettingsUpdate::default()
            })
            .unwrap();
        let settings = store.settings();
        assert!(settings.is_excluded_extension("png"));
        assert!(settings.is_excluded_extension(".pdf"));
        assert_eq!(settings.excluded_extensions.len(), 2);
    }

    #[test]
    fn relative_root_is_rejected_and_nothing_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_root(dir.path());
        let before = store.settings().clone();
        let on_disk_before = fs::read_to_string(store.path()).unwrap();

        let result = store.update(SettingsUpdate {
            root_directory: Some("relative/notes".into()),
            ..SettingsUpdate::default()
        });

        assert!(result.is_err());
        assert_eq!(store.settings(), &before);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), on_disk_before);
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_root(dir.path());
        let new_root = dir.path().join("elsewhere");
        store
            .update(SettingsUpdate {
                root_directory: Some(new_root.to_string_lossy().into_owned()),
                excluded_folders: Some(vec!["drafts".into()]),
                ..SettingsUpdate::default()
            })
            .unwrap();
        assert!(new_root.is_dir());

        let reloaded = SettingsStore::load_or_default(store.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.settings().root_directory, new_root);
        assert!(reloaded.settings().is_excluded_folder("drafts"));
        assert!(!reloaded.settings().is_excluded_folder(".git"));
    }
}
