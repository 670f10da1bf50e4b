/// File-message interface point. The blob upload is an external
/// collaborator; the core only computes the unique storage key.
use uuid::Uuid;

/// Derive a unique storage key for an uploaded file, preserving the
/// original extension.
pub fn storage_key(file_name: &str) -> String {
    let id = Uuid::new_v4();
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => format!("{}.{}", id, ext),
        _ => id.to_string(),
    }
}
