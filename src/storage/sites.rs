use std::{io, path::Path};

use walkdir::WalkDir;

/// Error listing the configured sites.
#[derive(Debug, thiserror::Error)]
#[error("Failed to list sites in {path}: {source}")]
pub struct SitesError {
    path: String,
    source: walkdir::Error,
}

/// List the entry names of a sites directory.
///
/// Only the immediate children are listed, files and symlinks alike. Entries
/// whose names are not valid UTF-8 are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the directory itself cannot be read. A missing
/// directory is reported as [`io::ErrorKind::NotFound`] by the underlying
/// error.
pub fn site_names(sites_directory: &Path) -> Result<Vec<String>, SitesError> {
    let mut names = Vec::new();

    for entry in WalkDir::new(sites_directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| SitesError {
            path: sites_directory.display().to_string(),
            source,
        })?;

        match entry.file_name().to_str() {
            Some(name) => names.push(name.to_string()),
            None => tracing::warn!("Skipping non UTF-8 site entry {}", entry.path().display()),
        }
    }

    Ok(names)
}

impl SitesError {
    /// Whether the sites directory does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.source
            .io_error()
            .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
    }
}
