//! Recursive markdown search under the sandbox root.
//!
//! Both searches skip hidden directories and the configured excluded folders,
//! visit entries in path order, and stop at [`MAX_SEARCH_RESULTS`].

use std::path::Path;

use ignore::{DirEntry, WalkBuilder};
use serde::Serialize;

use quire_config::Settings;

pub const MAX_SEARCH_RESULTS: usize = 200;
const MAX_LINE_CHARS: usize = 240;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMatch {
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMatch {
    pub path: String,
    pub line_number: usize,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResults<T> {
    pub matches: Vec<T>,
    pub truncated: bool,
}

/// Markdown files whose name contains `pattern` (case-insensitive); all of them when `None`.
#[must_use]
pub fn find_markdown_files(
    root: &Path,
    settings: &Settings,
    pattern: Option<&str>,
) -> SearchResults<FileMatch> {
    let needle = pattern
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_lowercase);
    let mut matches = Vec::new();
    let mut truncated = false;

    for path in markdown_files(root, settings) {
        let name = file_name(&path);
        if needle
            .as_deref()
            .is_some_and(|needle| !name.to_lowercase().contains(needle))
        {
            continue;
        }
        if matches.len() == MAX_SEARCH_RESULTS {
            truncated = true;
            break;
        }
        matches.push(FileMatch {
            path: path.to_string_lossy().into_owned(),
            name,
        });
    }
    SearchResults { matches, truncated }
}

/// Lines containing `query` (case-insensitive) in markdown files whose name
/// contains `file_pattern`.
#[must_use]
pub fn search_markdown_content(
    root: &Path,
    settings: &Settings,
    query: &str,
    file_pattern: Option<&str>,
) -> SearchResults<LineMatch> {
    let needle = query.to_lowercase();
    let file_needle = file_pattern
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_lowercase);
    let mut matches = Vec::new();
    let mut truncated = false;

    'files: for path in markdown_files(root, settings) {
        if file_needle
            .as_deref()
            .is_some_and(|needle| !file_name(&path).to_lowercase().contains(needle))
        {
            continue;
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %path.display(), "Skipping unreadable file: {e}");
                continue;
            }
        };
        for (idx, line) in content.lines().enumerate() {
            if !line.to_lowercase().contains(&needle) {
                continue;
            }
            if matches.len() == MAX_SEARCH_RESULTS {
                truncated = true;
                break 'files;
            }
            matches.push(LineMatch {
                path: path.to_string_lossy().into_owned(),
                line_number: idx + 1,
                line: clip(line.trim_end()),
            });
        }
    }
    SearchResults { matches, truncated }
}

fn markdown_files(root: &Path, settings: &Settings) -> impl Iterator<Item = std::path::PathBuf> {
    let excluded = settings.excluded_folders.clone();
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .filter_entry(move |entry| keep_entry(entry, &excluded));

    builder.build().filter_map(|entry| match entry {
        Ok(entry) => {
            let is_file = entry.file_type().is_some_and(|t| t.is_file());
            (is_file && is_markdown(entry.path())).then(|| entry.into_path())
        }
        Err(e) => {
            tracing::debug!("Search walk error: {e}");
            None
        }
    })
}

fn keep_entry(entry: &DirEntry, excluded: &std::collections::BTreeSet<String>) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !name.starts_with('.') && !excluded.contains(name.as_ref())
}

pub(crate) fn is_markdown(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn clip(line: &str) -> String {
    match line.char_indices().nth(MAX_LINE_CHARS) {
        Some((end, _)) => format!("{}...", &line[..end]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_SEARCH_RESULTS, find_markdown_files, search_markdown_content};
    use quire_config::Settings;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, Settings) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("projects")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("Todo.md"), "# Tasks\n- buy milk\n- Fix bike\n").unwrap();
        fs::write(root.join("projects/roadmap.md"), "Q1: fix search\n").unwrap();
        fs::write(root.join("projects/notes.txt"), "fix everything\n").unwrap();
        fs::write(root.join(".hidden/secret.md"), "fix secret\n").unwrap();
        fs::write(root.join("node_modules/pkg/readme.md"), "fix deps\n").unwrap();
        let settings = Settings::with_root(&root);
        (dir, settings)
    }

    #[test]
    fn filename_search_is_case_insensitive_and_markdown_only() {
        let (_dir, settings) = fixture();
        let root = &settings.root_directory;
        let found = find_markdown_files(root, &settings, Some("TODO"));
        assert_eq!(found.matches.len(), 1);
        assert_eq!(found.matches[0].name, "Todo.md");

        let all = find_markdown_files(root, &settings, None);
        let names: Vec<&str> = all.matches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Todo.md", "roadmap.md"]);
        assert!(!all.truncated);
    }

    #[test]
    fn content_search_reports_line_numbers() {
        let (_dir, settings) = fixture();
        let found =
            search_markdown_content(&settings.root_directory, &settings, "fix", None);
        let hits: Vec<(String, usize)> = found
            .matches
            .iter()
            .map(|m| (m.line.clone(), m.line_number))
            .collect();
        assert_eq!(
            hits,
            [("- Fix bike".to_string(), 3), ("Q1: fix search".to_string(), 1)]
        );
    }

    #[test]
    fn content_search_honours_file_pattern() {
        let (_dir, settings) = fixture();
        let found = search_markdown_content(
            &settings.root_directory,
            &settings,
            "fix",
            Some("road"),
        );
        assert_eq!(found.matches.len(), 1);
        assert!(found.matches[0].path.ends_with("roadmap.md"));
    }

    #[test]
    fn results_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let body = "match\n".repeat(MAX_SEARCH_RESULTS + 5);
        fs::write(root.join("big.md"), body).unwrap();
        let settings = Settings::with_root(&root);
        let found = search_markdown_content(&root, &settings, "match", None);
        assert_eq!(found.matches.len(), MAX_SEARCH_RESULTS);
        assert!(found.truncated);
    }
}
