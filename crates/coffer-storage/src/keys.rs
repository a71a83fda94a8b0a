//! Shared key generation for storage backends.

use uuid::Uuid;

/// Generate a new blob key: `blobs/{tenant_id}/{uuid}.{ext}` (no dot when the
/// extension is empty).
pub fn blob_key(tenant_id: Uuid, extension: &str) -> String {
    let ext = sanitize_extension(extension);
    if ext.is_empty() {
        format!("blobs/{}/{}", tenant_id, Uuid::new_v4())
    } else {
        format!("blobs/{}/{}.{}", tenant_id, Uuid::new_v4(), ext)
    }
}

/// Key of the preview image for one catalog row. Thumbnails are per row, never shared.
pub fn thumbnail_key(tenant_id: Uuid, upload_id: Uuid) -> String {
    format!("thumbnails/{}/{}.jpg", tenant_id, upload_id)
}

/// Reject keys that could escape the backend root.
pub fn validate_key(storage_key: &str) -> Result<(), String> {
    if storage_key.is_empty() {
        return Err("Storage key is empty".to_string());
    }
    if storage_key.contains("..") || storage_key.starts_with('/') || storage_key.contains('\\') {
        return Err("Storage key contains invalid characters".to_string());
    }
    Ok(())
}

fn sanitize_extension(extension: &str) -> String {
    extension
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(16)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key_layout() {
        let tenant = Uuid::new_v4();
        let key = blob_key(tenant, ".PDF");
        assert!(key.starts_with(&format!("blobs/{}/", tenant)));
        assert!(key.ends_with(".pdf"));
        assert!(validate_key(&key).is_ok());

        let bare = blob_key(tenant, "");
        assert!(!bare.contains('.'));
    }

    #[test]
    fn test_extension_cannot_inject_path() {
        let key = blob_key(Uuid::new_v4(), "../../etc");
        assert!(validate_key(&key).is_ok());
        assert!(key.ends_with(".etc"));
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        assert!(validate_key("../secret").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key("thumbnails/a/b.jpg").is_ok());
    }
}
