use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Minimum accepted length of a draft item id.
///
/// Canonical filenames embed the last six characters of the id, so anything
/// shorter cannot produce a stable short id.
pub const MIN_ITEM_ID_LEN: usize = 6;

/// Maximum accepted length of a draft item id.
pub const MAX_ITEM_ID_LEN: usize = 128;

/// Validate an externally supplied draft item id.
///
/// Item ids double as directory names under the upload root, so only ASCII
/// alphanumerics, `-` and `_` are accepted.
pub fn validate_item_id(item_id: &str) -> Result<(), CoreError> {
    let len = item_id.len();
    if !(MIN_ITEM_ID_LEN..=MAX_ITEM_ID_LEN).contains(&len) {
        return Err(CoreError::Validation(format!(
            "item_id must be between {MIN_ITEM_ID_LEN} and {MAX_ITEM_ID_LEN} characters, got {len}"
        )));
    }
    if let Some(bad) = item_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(CoreError::Validation(format!(
            "item_id contains invalid character '{bad}'"
        )));
    }
    Ok(())
}
