//! Project file discovery.
//!
//! Walks a project's source root collecting files whose extension is in
//! the include list and whose relative path matches no exclusion.
//! Excluded directories are pruned from the walk, not just filtered.

use crate::config::project::ProjectConfig;
use crate::error::IndexingError;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// A candidate file found during discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Absolute path on disk
    pub abs_path: PathBuf,
    /// Path relative to the project source root
    pub rel_path: String,
}

/// Discover all indexable files under `root` for a project. Results are
/// sorted by relative path so runs are deterministic across hosts.
pub fn discover_files(root: &Path, project: &ProjectConfig) -> Result<Vec<DiscoveredFile>> {
    if !root.is_dir() {
        return Err(IndexingError::SourceNotFound(root.display().to_string()).into());
    }

    let mut files = Vec::new();

    let walk_root = root.to_path_buf();
    let exclude_project = project.clone();
    let walker = WalkBuilder::new(root)
        // Only the project's own include/exclude rules apply.
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            let rel = match entry.path().strip_prefix(&walk_root) {
                Ok(rel) => rel,
                Err(_) => return true,
            };
            let rel = rel.to_string_lossy();
            rel.is_empty() || !exclude_project.should_exclude_path(&rel)
        })
        .build();

    for entry in walker {
        let entry = entry.context("failed to read directory entry")?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        if !project.should_include_file(&rel_path) {
            continue;
        }

        files.push(DiscoveredFile {
            abs_path: path.to_path_buf(),
            rel_path,
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::project::ProjectChunking;
    use std::collections::HashMap;
    use std::fs;

    fn project(extensions: &[&str], excludes: &[&str]) -> ProjectConfig {
        ProjectConfig {
            project_id: "walker-test".to_string(),
            display_name: "Walker".to_string(),
            source_path: PathBuf::from("."),
            include_extensions: extensions.iter().map(|s| s.to_string()).collect(),
            exclude_paths: excludes.iter().map(|s| s.to_string()).collect(),
            chunking: ProjectChunking::default(),
            metadata: HashMap::new(),
        }
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "content").unwrap();
    }

    #[test]
    fn collects_included_extensions_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "main.go");
        touch(dir.path(), "README.md");
        touch(dir.path(), "script.py");

        let files = discover_files(dir.path(), &project(&[".go", ".md"], &[])).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["README.md", "main.go"]);
    }

    #[test]
    fn prunes_excluded_directories() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/app.go");
        touch(dir.path(), "vendor/dep/dep.go");
        touch(dir.path(), "deep/vendor/other/x.go");

        let files = discover_files(dir.path(), &project(&[".go"], &["vendor/"])).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["src/app.go"]);
    }

    #[test]
    fn excludes_by_basename_glob() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pkg/server.go");
        touch(dir.path(), "pkg/server_test.go");

        let files = discover_files(dir.path(), &project(&[".go"], &["*_test.go"])).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["pkg/server.go"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        assert!(discover_files(&gone, &project(&[".go"], &[])).is_err());
    }

    #[test]
    fn output_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "z.md");
        touch(dir.path(), "a.md");
        touch(dir.path(), "m/n.md");

        let files = discover_files(dir.path(), &project(&[".md"], &[])).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["a.md", "m/n.md", "z.md"]);
    }
}
