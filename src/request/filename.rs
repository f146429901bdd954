//! Destination naming for downloads.

use std::io;
use std::path::{Component, Path, PathBuf};

use url::Url;

/// Resolves the destination inside `directory`.
///
/// A caller-supplied `name` is used as given but may only contain plain
/// path components (sub-directories are allowed, `..` and absolute paths are
/// not). Without a name, the final path segment of `final_url` is used.
pub(crate) fn destination_path(
    directory: &Path,
    name: Option<&str>,
    final_url: &Url,
) -> io::Result<PathBuf> {
    match name {
        Some(name) => {
            let relative = Path::new(name);
            let plain = relative.components().next().is_some()
                && relative
                    .components()
                    .all(|component| matches!(component, Component::Normal(_)));
            if plain {
                Ok(directory.join(relative))
            } else {
                Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{name:?} is not a relative file name"),
                ))
            }
        }
        None => Ok(directory.join(filename_from_url(final_url))),
    }
}

/// Percent-decoded, sanitized last path segment, or `download_{timestamp}.bin`.
#[must_use]
pub fn filename_from_url(url: &Url) -> String {
    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
        return sanitize_filename(&decoded);
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("download_{timestamp}.bin")
}

/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |` and control characters) and neutralizes dot segments.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match sanitized.as_str() {
        "" => "_".to_string(),
        "." | ".." => sanitized.replace('.', "_"),
        _ => sanitized,
    }
}
