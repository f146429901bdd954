//! File names for one batch of downloads sharing an output directory.

use std::collections::HashSet;
use std::path::Path;

use fetcher_core::request::filename_from_url;
use url::Url;

/// Highest numeric suffix tried before falling back to a timestamp.
const MAX_SUFFIX: usize = 1000;

/// Assigns every URL its own file name inside `dir`.
///
/// Names come from the last path segment of each URL. A name already used
/// earlier in the batch, or already present on disk, gets a numeric suffix:
/// `001.jpg`, then `001_1.jpg`, `001_2.jpg`, ...
pub fn plan_names(dir: &Path, urls: &[String]) -> Vec<String> {
    let mut taken = HashSet::new();
    urls.iter()
        .map(|raw| {
            let base = Url::parse(raw)
                .map_or_else(|_| "download.bin".to_string(), |url| filename_from_url(&url));
            let name = unique_name(dir, &base, &taken);
            taken.insert(name.clone());
            name
        })
        .collect()
}

fn unique_name(dir: &Path, filename: &str, taken: &HashSet<String>) -> String {
    let free = |candidate: &str| !taken.contains(candidate) && !dir.join(candidate).exists();
    if free(filename) {
        return filename.to_string();
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    };
    for i in 1..MAX_SUFFIX {
        let candidate = format!("{stem}_{i}{ext}");
        if free(&candidate) {
            return candidate;
        }
    }

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{stem}_{nanos}_{}{ext}", taken.len())
}
