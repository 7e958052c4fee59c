//! Canonical draft image naming.
//!
//! Every stored draft image is named `Draft-<shortId>-<NN>.<ext>`:
//!
//! - `shortId` = last six characters of the item id
//! - `NN` = sequence number, zero-padded to at least two digits
//! - `ext` = lower-cased extension of the uploaded file, `jpg` when absent
//!
//! # Examples
//!
//! ```
//! use thrift_core::naming::generate_filename;
//!
//! assert_eq!(generate_filename("item-abc123", 5, "photo.JPEG"), "Draft-abc123-05.jpeg");
//! assert_eq!(generate_filename("item-abc123", 1, "scan"), "Draft-abc123-01.jpg");
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Prefix shared by every canonical draft filename.
pub const FILENAME_PREFIX: &str = "Draft";

/// Extension used when the uploaded file has none.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Number of trailing item id characters embedded in filenames.
pub const SHORT_ID_LEN: usize = 6;

/// Image extensions accepted for upload (lower-case).
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "heic", "heif", "bmp", "tiff",
];

/// Matches `Draft-<6 chars>-<2+ digits>.<ext>`.
///
/// Two or more digits are accepted so that numbers past 99 (which widen the
/// field) are still recognised as taken.
static CANONICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Draft-(.{6})-(\d{2,})\.([A-Za-z0-9]+)$").expect("valid regex")
});

/// Last [`SHORT_ID_LEN`] characters of an item id (the whole id if shorter).
pub fn short_id(item_id: &str) -> &str {
    let skip = item_id.chars().count().saturating_sub(SHORT_ID_LEN);
    match item_id.char_indices().nth(skip) {
        Some((idx, _)) => &item_id[idx..],
        None => item_id,
    }
}

/// Lower-cased extension of `original_filename`, or [`DEFAULT_EXTENSION`].
///
/// Extensions that are empty or contain anything but ASCII alphanumerics
/// fall back to the default, since the result ends up in a path.
pub fn extension_of(original_filename: &str) -> String {
    match original_filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// Returns `true` if the upload's extension is an accepted image type.
///
/// Files without an extension are accepted and stored as `jpg`.
pub fn is_supported_image(original_filename: &str) -> bool {
    if !original_filename.contains('.') {
        return true;
    }
    SUPPORTED_IMAGE_EXTENSIONS.contains(&extension_of(original_filename).as_str())
}

/// Build the canonical filename for an item's `sequence`-th image.
pub fn generate_filename(item_id: &str, sequence: u32, original_filename: &str) -> String {
    format!(
        "{FILENAME_PREFIX}-{}-{sequence:02}.{}",
        short_id(item_id),
        extension_of(original_filename)
    )
}

/// Reject filenames that could escape an item's image directory.
pub fn validate_filename(filename: &str) -> Result<(), CoreError> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0'])
    {
        return Err(CoreError::Validation(format!(
            "Invalid image filename '{filename}'"
        )));
    }
    Ok(())
}

/// Extract the sequence number from a canonical filename.
///
/// Returns `None` for names that do not follow the canonical pattern; those
/// are treated as foreign data that never conflicts.
pub fn parse_sequence_number(filename: &str) -> Option<u32> {
    CANONICAL_RE
        .captures(filename)
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}
