use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use super::ToolError;

/// Confines path arguments to a single root directory.
///
/// Both the root and every candidate are resolved the same way: made absolute
/// (relative candidates are taken relative to the root), normalized lexically,
/// and then canonicalized through their nearest existing ancestor so symlinks
/// cannot be used to step outside. The result must equal the root or sit below
/// it component-wise, which keeps `/docs` from admitting `/docs-other`.
///
/// Resolution only reads metadata; nothing here creates or mutates files.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let absolute = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            root: resolve(&absolute),
        }
    }

    /// One-shot form of [`PathSandbox::resolve`].
    pub fn validate(path: &str, root: &Path) -> Result<PathBuf, ToolError> {
        Self::new(root).resolve(path)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` and require it to be the root or a descendant of it.
    ///
    /// Denials carry only the caller-supplied path, never the resolved one.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        if path.trim().is_empty() {
            return Err(ToolError::Validation {
                message: "path must not be empty".to_string(),
            });
        }
        if path.contains('\0') {
            return Err(ToolError::Validation {
                message: "path contains a NUL byte".to_string(),
            });
        }

        let input = Path::new(path);
        let joined = if input.is_absolute() {
            input.to_path_buf()
        } else {
            self.root.join(input)
        };
        let resolved = resolve(&joined);

        if !resolved.starts_with(&self.root) {
            tracing::warn!(path, "Path outside root directory rejected");
            return Err(ToolError::AccessDenied {
                path: path.to_string(),
            });
        }
        Ok(resolved)
    }

    /// Whether `path` is the root itself.
    #[must_use]
    pub fn is_root(&self, path: &Path) -> bool {
        path == self.root
    }
}

fn resolve(path: &Path) -> PathBuf {
    canonicalize_nearest(&normalize_lexically(path))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Canonicalize the longest existing prefix and re-append the rest.
fn canonicalize_nearest(path: &Path) -> PathBuf {
    let mut missing: Vec<OsString> = Vec::new();
    let mut current = path;
    loop {
        if let Ok(canonical) = std::fs::canonicalize(current) {
            let mut out = canonical;
            for part in missing.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PathSandbox;
    use crate::ToolError;
    use std::fs;

    fn setup() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap().join("docs");
        fs::create_dir(&root).unwrap();
        (dir, root)
    }

    #[test]
    fn root_itself_is_allowed() {
        let (_dir, root) = setup();
        let resolved = PathSandbox::validate(&root.to_string_lossy(), &root).unwrap();
        assert_eq!(resolved, root);
    }

    #[test]
    fn descendant_is_allowed_even_if_missing() {
        let (_dir, root) = setup();
        let target = root.join("sub/new.md");
        let resolved = PathSandbox::validate(&target.to_string_lossy(), &root).unwrap();
        assert_eq!(resolved, target);
    }

    #[test]
    fn sibling_sharing_a_prefix_is_denied() {
        let (dir, root) = setup();
        let sibling = dir.path().canonicalize().unwrap().join("docs-other");
        fs::create_dir(&sibling).unwrap();
        let attempted = sibling.join("x.md");
        let err = PathSandbox::validate(&attempted.to_string_lossy(), &root).unwrap_err();
        assert!(matches!(err, ToolError::AccessDenied { .. }));
    }

    #[test]
    fn parent_traversal_is_denied() {
        let (_dir, root) = setup();
        let attempted = format!("{}/../secret.md", root.display());
        assert!(matches!(
            PathSandbox::validate(&attempted, &root),
            Err(ToolError::AccessDenied { .. })
        ));
        assert!(matches!(
            PathSandbox::validate("../secret.md", &root),
            Err(ToolError::AccessDenied { .. })
        ));
    }

    #[test]
    fn inner_traversal_that_stays_inside_is_allowed() {
        let (_dir, root) = setup();
        let resolved = PathSandbox::validate("notes/../a.md", &root).unwrap();
        assert_eq!(resolved, root.join("a.md"));
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let (_dir, root) = setup();
        assert_eq!(
            PathSandbox::validate("a.md", &root).unwrap(),
            root.join("a.md")
        );
    }

    #[test]
    fn denial_does_not_reveal_resolved_path() {
        let (_dir, root) = setup();
        let err = PathSandbox::validate("../../etc/passwd", &root).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("../../etc/passwd"));
        assert!(!message.contains(&*root.to_string_lossy()));
    }

    #[test]
    fn empty_path_is_a_validation_error() {
        let (_dir, root) = setup();
        assert!(matches!(
            PathSandbox::validate("  ", &root),
            Err(ToolError::Validation { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_denied() {
        let (dir, root) = setup();
        let outside = dir.path().canonicalize().unwrap().join("outside");
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();
        let attempted = root.join("link/file.md");
        assert!(matches!(
            PathSandbox::validate(&attempted.to_string_lossy(), &root),
            Err(ToolError::AccessDenied { .. })
        ));
    }
}
