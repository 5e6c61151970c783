//! Upload validation and local persistence of uploaded files.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::info;

/// Extensions accepted by the upload endpoints.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf"];

/// A file received from a multipart upload, with its name already secured.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

pub fn is_allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduces a client-supplied name to a flat, ASCII-only file name that cannot
/// escape the upload directory. Returns `None` when nothing usable is left.
pub fn secure_filename(filename: &str) -> Option<String> {
    let spaced: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Writes the upload into `dir`, overwriting any file of the same name.
pub async fn save_upload(dir: &Path, file: &UploadedFile) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(&file.filename);
    tokio::fs::write(&path, &file.data).await?;
    info!("Saved upload {} ({} bytes)", path.display(), file.data.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_extension_allowed_case_insensitive() {
        assert!(is_allowed_file("resume.pdf"));
        assert!(is_allowed_file("Resume.PDF"));
        assert!(is_allowed_file("archive.tar.pdf"));
    }

    #[test]
    fn test_other_extensions_rejected() {
        assert!(!is_allowed_file("resume.docx"));
        assert!(!is_allowed_file("notes.txt"));
        assert!(!is_allowed_file("pdf"));
        assert!(!is_allowed_file(""));
        assert!(!is_allowed_file("resume.pdf.exe"));
    }

    #[test]
    fn test_secure_filename_flattens_paths() {
        assert_eq!(
            secure_filename("../../etc/passwd").as_deref(),
            Some("etc_passwd")
        );
        assert_eq!(
            secure_filename("C:\\Users\\jane\\cv.pdf").as_deref(),
            Some("C_Users_jane_cv.pdf")
        );
    }

    #[test]
    fn test_secure_filename_normalizes_whitespace_and_symbols() {
        assert_eq!(
            secure_filename("  My Resume (final).pdf ").as_deref(),
            Some("My_Resume_final.pdf")
        );
        assert_eq!(secure_filename(".hidden.pdf").as_deref(), Some("hidden.pdf"));
    }

    #[test]
    fn test_secure_filename_rejects_empty_result() {
        assert_eq!(secure_filename("..."), None);
        assert_eq!(secure_filename("ßüñ"), None);
        assert_eq!(secure_filename(""), None);
    }

    #[tokio::test]
    async fn test_save_upload_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("uploads");
        let file = UploadedFile {
            filename: "cv.pdf".to_string(),
            data: Bytes::from_static(b"%PDF-1.4"),
        };

        let path = save_upload(&dir, &file).await.unwrap();

        assert_eq!(path, dir.join("cv.pdf"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-1.4");
    }
}
