//! Work-list discovery.
//!
//! Each immediate subdirectory of the root is a collection; every regular
//! file underneath it (recursively) is one document, named by its path
//! relative to the collection directory. Hidden entries are skipped.
//! Ordering is lexicographic so repeated runs produce identical batches.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use granary_core::{CollectionSpec, IngestBatch};

/// Build the batch for a root directory.
pub fn discover_batch(root: &Path) -> Result<IngestBatch> {
    let mut entries: Vec<_> = fs::read_dir(root)
        .with_context(|| format!("Failed to read root directory {}", root.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to list {}", root.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut collections = Vec::new();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let mut documents = Vec::new();
        collect_documents(&path, &path, &mut documents)?;
        documents.sort();
        collections.push(CollectionSpec::new(name, documents));
    }

    Ok(IngestBatch::new(collections))
}

fn collect_documents(base: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            collect_documents(base, &path, out)?;
        } else if path.is_file() {
            let relative = path.strip_prefix(base).unwrap_or(&path);
            out.push(relative.to_string_lossy().into_owned());
        }
    }
    Ok(())
}
