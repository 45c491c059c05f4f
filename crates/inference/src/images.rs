//! Discovery of a job's input images and parsing of capture metadata
//! embedded in their filenames.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::InputError;

/// First image extension in a lowercased filename.
static IMAGE_EXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(jpg|jpeg|png)").expect("valid regex"));

/// UUIDv4: 8-4-4-4-12 hex digits with version and variant nibbles.
static UUID_V4_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([a-fA-F0-9]{8}-[a-fA-F0-9]{4}-4[a-fA-F0-9]{3}-[89abAB][a-fA-F0-9]{3}-[a-fA-F0-9]{12})",
    )
    .expect("valid regex")
});

/// `_YYYYMMDD_HHMMSS` followed by `_`, `.` or end of name.
static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(?P<ts>\d{8}_\d{6})(?:_|\.|$)").expect("valid regex"));

/// Find the images in `dir`, sorted by path.
///
/// A file counts as an image when its name contains `.jpg`, `.jpeg` or
/// `.png` (case-insensitive). Anything after that extension (download
/// suffixes and the like) is stripped by renaming the file in place.
/// A missing directory yields no images.
pub async fn find_images(dir: &Path) -> Result<Vec<PathBuf>, InputError> {
    let unreadable = |source: std::io::Error| InputError::Unreadable {
        dir: dir.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(unreadable(e)),
    };

    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let Some(cleaned) = clean_image_name(&file_name) else {
            continue;
        };

        let cleaned_path = dir.join(cleaned);
        if cleaned != file_name {
            tokio::fs::rename(entry.path(), &cleaned_path)
                .await
                .map_err(unreadable)?;
            tracing::debug!(from = %file_name, to = %cleaned, "Renamed input image");
        }
        images.push(cleaned_path);
    }

    images.sort();
    Ok(images)
}

/// Truncate `file_name` right after its first image extension, or `None`
/// if it has none.
pub fn clean_image_name(file_name: &str) -> Option<&str> {
    // ASCII lowercasing keeps byte offsets aligned with the original.
    let lower = file_name.to_ascii_lowercase();
    IMAGE_EXT_RE
        .find(&lower)
        .map(|m| &file_name[..m.end()])
}

/// Extract a UUIDv4 image id from the file name, or `""`.
pub fn parse_image_id(path: &Path) -> &str {
    let name = file_name(path);
    UUID_V4_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map_or("", |m| m.as_str())
}

/// Extract a `YYYYMMDD_HHMMSS` capture timestamp from the file name, or `""`.
pub fn parse_image_timestamp(path: &Path) -> &str {
    let name = file_name(path);
    TIMESTAMP_RE
        .captures(name)
        .and_then(|c| c.name("ts"))
        .map_or("", |m| m.as_str())
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}
