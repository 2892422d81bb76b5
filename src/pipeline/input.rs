//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! Extraction works on an in-memory byte slice, so a URL is downloaded
//! straight into memory and a local file is read whole. The `%PDF` magic
//! is checked here so callers get a meaningful error rather than a pdfium
//! failure further down.

use crate::error::Pdf2CsvError;
use std::path::PathBuf;
use tracing::{debug, info};

/// A PDF ready for extraction.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    /// File name used for display and session identity.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to PDF bytes.
///
/// URLs are downloaded with a `timeout_secs` limit; anything else is
/// treated as a local path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2CsvError> {
    let resolved = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    check_magic(&resolved.name, &resolved.bytes)?;
    Ok(resolved)
}

/// Reject byte buffers that do not start with `%PDF`.
pub fn check_magic(name: &str, bytes: &[u8]) -> Result<(), Pdf2CsvError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(Pdf2CsvError::NotAPdf {
        name: name.to_string(),
        magic,
    })
}

async fn read_local(path_str: &str) -> Result<ResolvedInput, Pdf2CsvError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Pdf2CsvError::PermissionDenied { path: path.clone() },
        std::io::ErrorKind::NotFound => Pdf2CsvError::FileNotFound { path: path.clone() },
        _ if path.is_dir() => Pdf2CsvError::InvalidInput {
            input: path_str.to_string(),
        },
        _ => Pdf2CsvError::FileNotFound { path: path.clone() },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path_str.to_string());

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(ResolvedInput { name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2CsvError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Pdf2CsvError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            Pdf2CsvError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Pdf2CsvError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(&classify)?;

    if !response.status().is_success() {
        return Err(Pdf2CsvError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(&classify)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(ResolvedInput {
        name: filename_from_url(url),
        bytes: bytes.to_vec(),
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
