//! Sandboxed CRUD over the notes directory.
//!
//! Every path argument goes through [`PathSandbox::resolve`] before any
//! filesystem call. Operations never overwrite: a name collision is reported
//! as [`ToolError::AlreadyExists`].

use std::cmp::Ordering;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use quire_config::{RecentFiles, Settings};
use quire_types::{FileNode, NodeKind};
use quire_utils::{AtomicWriteOptions, atomic_write_with_options};

use crate::sandbox::PathSandbox;
use crate::trash::{DirTrash, Trash};
use crate::{ToolError, io_error};

/// How a delete was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    Trashed,
    Removed,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    sandbox: PathSandbox,
    settings: Settings,
    trash: Arc<dyn Trash>,
    recent: Option<Arc<Mutex<RecentFiles>>>,
}

impl FileStore {
    /// Store rooted at `settings.root_directory`, trashing into `<root>/.trash`.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        let sandbox = PathSandbox::new(&settings.root_directory);
        let trash = Arc::new(DirTrash::in_root(sandbox.root()));
        Self {
            sandbox,
            settings,
            trash,
            recent: None,
        }
    }

    #[must_use]
    pub fn with_trash(mut self, trash: Arc<dyn Trash>) -> Self {
        self.trash = trash;
        self
    }

    #[must_use]
    pub fn with_recent(mut self, recent: Arc<Mutex<RecentFiles>>) -> Self {
        self.recent = Some(recent);
        self
    }

    #[must_use]
    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.sandbox.root()
    }

    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        self.sandbox.resolve(path)
    }

    /// Recursive listing of `path`, created first if it does not exist yet.
    ///
    /// Excluded folders and extensions are dropped; directories sort before
    /// files and both sort by name.
    pub fn read_directory(&self, path: &str) -> Result<Vec<FileNode>, ToolError> {
        let dir = self.resolve(path)?;
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(io_error(path))?;
            tracing::info!(path, "Created missing directory");
        }
        if !dir.is_dir() {
            return Err(ToolError::Validation {
                message: format!("{path} is not a directory"),
            });
        }
        self.build_tree(&dir).map_err(io_error(path))
    }

    fn build_tree(&self, dir: &Path) -> io::Result<Vec<FileNode>> {
        let mut nodes = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_symlink() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            if file_type.is_dir() {
                if self.settings.is_excluded_folder(&name) {
                    continue;
                }
                let children = match self.build_tree(&path) {
                    Ok(children) => children,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "Skipping unreadable directory: {e}");
                        Vec::new()
                    }
                };
                nodes.push(FileNode {
                    name,
                    path: display(&path),
                    kind: NodeKind::Directory,
                    extension: None,
                    children: Some(children),
                });
            } else {
                let extension = path
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
                if extension
                    .as_deref()
                    .is_some_and(|ext| self.settings.is_excluded_extension(ext))
                {
                    continue;
                }
                nodes.push(FileNode {
                    name,
                    path: display(&path),
                    kind: NodeKind::File,
                    extension,
                    children: None,
                });
            }
        }
        nodes.sort_by(compare_nodes);
        Ok(nodes)
    }

    pub fn read_file(&self, path: &str) -> Result<String, ToolError> {
        let file = self.existing(path)?;
        if !file.is_file() {
            return Err(ToolError::NotAFile {
                path: path.to_string(),
            });
        }
        fs::read_to_string(&file).map_err(io_error(path))
    }

    /// Atomically replace (or create) a file and return its size on disk afterwards.
    pub fn write_file(&self, path: &str, content: &str) -> Result<u64, ToolError> {
        let file = self.resolve(path)?;
        if file.is_dir() {
            return Err(ToolError::NotAFile {
                path: path.to_string(),
            });
        }
        if !file.parent().is_some_and(Path::is_dir) {
            return Err(ToolError::NotFound {
                path: path.to_string(),
            });
        }
        atomic_write_with_options(&file, content.as_bytes(), AtomicWriteOptions::document())
            .map_err(io_error(path))?;
        let written = fs::metadata(&file).map_err(io_error(path))?.len();
        tracing::debug!(path, bytes = written, "File written");
        Ok(written)
    }

    /// Create a file under `parent`, or a directory when `initial_content` is `None`.
    pub fn create(
        &self,
        parent: &str,
        name: &str,
        initial_content: Option<&str>,
    ) -> Result<String, ToolError> {
        let name = validate_name(name)?;
        let parent_dir = self.existing(parent)?;
        if !parent_dir.is_dir() {
            return Err(ToolError::Validation {
                message: format!("{parent} is not a directory"),
            });
        }
        let target = self.resolve(&display(&parent_dir.join(name)))?;
        let shown = display(&target);
        if target.exists() {
            return Err(ToolError::AlreadyExists { path: shown });
        }

        match initial_content {
            None => fs::create_dir(&target).map_err(io_error(&shown))?,
            Some(content) => {
                let mut file = fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&target)
                    .map_err(io_error(&shown))?;
                file.write_all(content.as_bytes())
                    .map_err(io_error(&shown))?;
            }
        }
        tracing::info!(path = %shown, directory = initial_content.is_none(), "Created");
        Ok(shown)
    }

    /// Rename in place; returns the new path.
    pub fn rename(&self, old_path: &str, new_name: &str) -> Result<String, ToolError> {
        let new_name = validate_name(new_name)?;
        let source = self.existing(old_path)?;
        self.refuse_root(&source, "rename")?;
        let parent = source.parent().ok_or_else(|| ToolError::Validation {
            message: format!("{old_path} has no parent directory"),
        })?;
        let target = self.resolve(&display(&parent.join(new_name)))?;
        if target == source {
            return Ok(display(&target));
        }
        let shown = display(&target);
        if target.exists() {
            return Err(ToolError::AlreadyExists { path: shown });
        }
        fs::rename(&source, &target).map_err(io_error(old_path))?;
        self.update_recent(|recent| recent.rename_prefix(&display(&source), &shown));
        tracing::info!(from = old_path, to = %shown, "Renamed");
        Ok(shown)
    }

    /// Move `source` into `target_dir`; returns the new path.
    pub fn move_to(&self, source_path: &str, target_dir: &str) -> Result<String, ToolError> {
        let source = self.existing(source_path)?;
        self.refuse_root(&source, "move")?;
        let target_parent = self.existing(target_dir)?;
        if !target_parent.is_dir() {
            return Err(ToolError::Validation {
                message: format!("{target_dir} is not a directory"),
            });
        }
        if target_parent.starts_with(&source) {
            return Err(ToolError::Validation {
                message: format!("cannot move {source_path} into itself"),
            });
        }
        let name = source.file_name().ok_or_else(|| ToolError::Validation {
            message: format!("{source_path} has no file name"),
        })?;
        let target = self.resolve(&display(&target_parent.join(name)))?;
        if target == source {
            return Ok(display(&target));
        }
        let shown = display(&target);
        if target.exists() {
            return Err(ToolError::AlreadyExists { path: shown });
        }
        fs::rename(&source, &target).map_err(io_error(source_path))?;
        self.update_recent(|recent| recent.rename_prefix(&display(&source), &shown));
        tracing::info!(from = source_path, to = %shown, "Moved");
        Ok(shown)
    }

    /// Trash `path` when asked and possible, otherwise remove it recursively.
    pub fn delete(&self, path: &str, use_trash: bool) -> Result<DeleteMode, ToolError> {
        let target = self.resolve(path)?;
        let meta = fs::symlink_metadata(&target).map_err(io_error(path))?;
        self.refuse_root(&target, "delete")?;

        let mode = match use_trash.then(|| self.trash.trash(&target)) {
            Some(Ok(())) => DeleteMode::Trashed,
            Some(Err(e)) => {
                tracing::warn!(path, "Trash unavailable, deleting permanently: {e}");
                remove(&target, &meta).map_err(io_error(path))?;
                DeleteMode::Removed
            }
            None => {
                remove(&target, &meta).map_err(io_error(path))?;
                DeleteMode::Removed
            }
        };
        self.update_recent(|recent| recent.remove_under(&display(&target)));
        tracing::info!(path, ?mode, "Deleted");
        Ok(mode)
    }

    /// Copy next to the original as `name copy.ext`, `name copy 2.ext`, ...
    pub fn duplicate(&self, path: &str) -> Result<String, ToolError> {
        let source = self.existing(path)?;
        self.refuse_root(&source, "duplicate")?;
        let parent = source.parent().ok_or_else(|| ToolError::Validation {
            message: format!("{path} has no parent directory"),
        })?;

        let is_dir = source.is_dir();
        let (stem, ext) = split_name(&source, is_dir);
        let target = (1usize..)
            .map(|n| {
                let suffix = if n == 1 {
                    " copy".to_string()
                } else {
                    format!(" copy {n}")
                };
                parent.join(format!("{stem}{suffix}{ext}"))
            })
            .find(|candidate| !candidate.exists())
            .ok_or_else(|| ToolError::AlreadyExists {
                path: path.to_string(),
            })?;
        let target = self.resolve(&display(&target))?;
        let shown = display(&target);

        if is_dir {
            copy_dir(&source, &target).map_err(io_error(&shown))?;
        } else {
            fs::copy(&source, &target).map_err(io_error(&shown))?;
        }
        tracing::info!(from = path, to = %shown, "Duplicated");
        Ok(shown)
    }

    /// Record `path` as opened.
    /// Record `path` as most recently used, under its resolved form so
    /// delete, rename and move can find it again.
    pub fn touch_recent(&self, path: &str) {
        match self.resolve(path) {
            Ok(resolved) => {
                let shown = display(&resolved);
                self.update_recent(|recent| recent.touch(&shown));
            }
            Err(e) => tracing::debug!(path, "Not recorded as recent: {e}"),
        }
    }

    fn existing(&self, path: &str) -> Result<PathBuf, ToolError> {
        let resolved = self.resolve(path)?;
        if !resolved.exists() {
            return Err(ToolError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(resolved)
    }

    fn refuse_root(&self, path: &Path, op: &str) -> Result<(), ToolError> {
        if self.sandbox.is_root(path) {
            return Err(ToolError::Validation {
                message: format!("cannot {op} the root directory"),
            });
        }
        Ok(())
    }

    fn update_recent(&self, f: impl FnOnce(&mut RecentFiles)) {
        if let Some(recent) = &self.recent {
            match recent.lock() {
                Ok(mut guard) => f(&mut guard),
                Err(_) => tracing::warn!("Recent files lock poisoned; skipping update"),
            }
        }
    }
}

fn compare_nodes(a: &FileNode, b: &FileNode) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

fn validate_name(name: &str) -> Result<&str, ToolError> {
    let trimmed = name.trim();
    let invalid = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ToolError::Validation {
            message: format!("invalid name: {name:?}"),
        });
    }
    Ok(trimmed)
}

fn split_name(path: &Path, is_dir: bool) -> (String, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if is_dir {
        return (name, String::new());
    }
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => (
            stem.to_string_lossy().into_owned(),
            format!(".{}", ext.to_string_lossy()),
        ),
        _ => (name, String::new()),
    }
}

fn remove(path: &Path, meta: &fs::Metadata) -> io::Result<()> {
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dest = to.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir(&entry.path(), &dest)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
