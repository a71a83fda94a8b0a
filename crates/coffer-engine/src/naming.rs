use coffer_core::AppError;

const MAX_FILE_NAME_LENGTH: usize = 255;

/// Check a display name and return it trimmed. Names are stored as given, so
/// this rejects rather than rewrites.
pub fn validate_file_name(file_name: &str) -> Result<String, AppError> {
    let name = file_name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("File name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_FILE_NAME_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "File name exceeds {} characters",
            MAX_FILE_NAME_LENGTH
        )));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(AppError::InvalidInput(
            "File name must not contain path separators".to_string(),
        ));
    }
    if name == "." || name == ".." {
        return Err(AppError::InvalidInput(
            "File name contains invalid path traversal".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Lowercased extension of `file_name`, or `bin` when there is none.
pub fn extension_of(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

pub fn mime_type_for(extension: &str) -> String {
    mime_guess::from_ext(extension)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_file_name() {
        assert_eq!(validate_file_name("  report.pdf ").unwrap(), "report.pdf");
        assert_eq!(validate_file_name("my report (1).pdf").unwrap(), "my report (1).pdf");
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("a/b.txt").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_extension_and_mime() {
        assert_eq!(extension_of("Photo.JPG"), "jpg");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "bin");
        assert_eq!(mime_type_for("png"), "image/png");
        assert_eq!(mime_type_for("pdf"), "application/pdf");
        assert_eq!(mime_type_for("zzz-unknown"), "application/octet-stream");
    }
}
