//! Knowledge folder scanner.
//!
//! Walks `knowledge.root`, keeps files matching `include_globs` and not
//! matching `exclude_globs` (plus the built-in `.git`, `target` and
//! `node_modules` excludes), and returns them sorted by relative path so
//! ingestion order is deterministic.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::KnowledgeConfig;
use crate::error::{RagError, Result};

/// A file selected for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeFile {
    pub path: PathBuf,
    /// Path relative to the knowledge root, `/`-separated.
    pub source_path: String,
}

pub fn scan_folder(config: &KnowledgeConfig, root: &Path) -> Result<Vec<KnowledgeFile>> {
    if !root.is_dir() {
        return Err(RagError::ingest(
            root.display().to_string(),
            "knowledge root does not exist or is not a directory",
        ));
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry =
            entry.map_err(|e| RagError::ingest(root.display().to_string(), e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(KnowledgeFile {
            path: path.to_path_buf(),
            source_path: rel_str,
        });
    }

    files.sort_by(|a, b| a.source_path.cmp(&b.source_path));

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Config(format!("invalid glob set: {}", e)))
}
