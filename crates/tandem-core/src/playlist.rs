//! Playlist store
//!
//! A playlist is a plain text file, one record per line, in the form
//! `name,locator`. The name is display text; the locator is whatever the
//! host hands to [`DeckControl::load`](crate::session::DeckControl::load),
//! usually a file path. The split is on the first comma only, so locators
//! may themselves contain commas.
//!
//! Loading is forgiving about individual records: a malformed line is
//! skipped with a warning rather than failing the whole file.

use std::path::Path;

use anyhow::{Context, Result};

/// One playlist record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    /// Display name
    pub name: String,
    /// Source locator, fed to track loading
    pub locator: String,
}

impl PlaylistEntry {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }
}

/// Load a playlist file
///
/// Blank lines and malformed records are skipped; an unreadable file is an
/// error.
pub fn load_playlist(path: &Path) -> Result<Vec<PlaylistEntry>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read playlist file: {:?}", path))?;

    let mut entries = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_entry(line) {
            Some(entry) => entries.push(entry),
            None => log::warn!(
                "Skipping malformed playlist line {} in {:?}: {:?}",
                line_no + 1,
                path,
                line
            ),
        }
    }

    log::info!("Loaded {} playlist entries from {:?}", entries.len(), path);
    Ok(entries)
}

/// Save a playlist file in the same `name,locator` format
///
/// Creates parent directories if they don't exist.
pub fn save_playlist(entries: &[PlaylistEntry], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create playlist directory: {:?}", parent))?;
    }

    let mut contents = String::new();
    for entry in entries {
        contents.push_str(&entry.name);
        contents.push(',');
        contents.push_str(&entry.locator);
        contents.push('\n');
    }

    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write playlist file: {:?}", path))?;
    Ok(())
}

/// Parse one `name,locator` record (split on the first comma)
fn parse_entry(line: &str) -> Option<PlaylistEntry> {
    let (name, locator) = line.split_once(',')?;
    let name = name.trim();
    let locator = locator.trim();
    if name.is_empty() || locator.is_empty() {
        return None;
    }
    Some(PlaylistEntry::new(name, locator))
}
