//! Utility functions shared across the crate.

use std::path::PathBuf;

/// Get the user's config directory following XDG conventions.
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`.
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Name of the downloadable translation for an uploaded file.
///
/// The base name is everything before the first `.`, so
/// `report.final.pdf` becomes `translated_report.txt`.
pub fn translated_file_name(original: &str) -> String {
    let file_name = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let base = file_name.split('.').next().unwrap_or_default();
    let base = if base.is_empty() { "output" } else { base };
    format!("translated_{base}.txt")
}

/// Lowercased extension of a file name, without the dot
pub fn file_extension(name: &str) -> Option<String> {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}
