//! Input resolution: turn the user-supplied path or URL into a local PDF file.
//!
//! pdfium opens files by path, so URL inputs are downloaded into a `TempDir`
//! that lives as long as the returned [`ResolvedInput`]. Local files are
//! checked for existence, readability and the `%PDF` magic bytes before any
//! other stage runs.

use crate::error::ExtractError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the PDF lives in a temp directory kept alive by `_temp_dir`.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

/// Validate a local file: it must exist, be readable and start with `%PDF`.
pub fn resolve_local(path: &Path) -> Result<ResolvedInput, ExtractError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(ExtractError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(ExtractError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(ExtractError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    info!("Downloading PDF from: {}", url);

    let download_err = |reason: String| ExtractError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_err(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            download_err(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(download_err(format!("HTTP {}", response.status())));
    }

    let temp_dir = TempDir::new().map_err(|e| ExtractError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(filename_from_url(url));

    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_err(e.to_string()))?;

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(ExtractError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ExtractError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_segments() {
        assert_eq!(filename_from_url("https://a.org/x/paper.pdf"), "paper.pdf");
        assert_eq!(filename_from_url("https://arxiv.org/pdf/1706"), "downloaded.pdf");
        assert_eq!(filename_from_url("not a url"), "downloaded.pdf");
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_local(&dir.path().join("nope.pdf")).err().unwrap();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[test]
    fn directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_local(dir.path()).err().unwrap();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04 not a pdf").unwrap();
        let err = resolve_local(f.path()).err().unwrap();
        match err {
            ExtractError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        let resolved = resolve_local(f.path()).unwrap();
        assert_eq!(resolved.path(), f.path());
    }
}
