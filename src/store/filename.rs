//! Filename handling for stored document content.

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Longest filename kept, in bytes. Stays well below the 255-byte limit
/// of common filesystems once a numeric suffix is added.
const MAX_FILENAME_BYTES: usize = 200;

/// Longer trailing segments are treated as part of the stem.
const MAX_EXTENSION_BYTES: usize = 16;

/// Filename used when nothing usable is left after sanitizing.
const FALLBACK_FILENAME: &str = "document.pdf";

/// Highest numeric suffix tried before giving up on a unique name.
const MAX_SUFFIX: usize = 1000;

/// Sanitizes a filename for safe filesystem use.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters with `_`, rewrites dot
/// segments, and truncates overly long stems while keeping the extension.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    let sanitized = if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    };

    if sanitized.len() <= MAX_FILENAME_BYTES {
        return sanitized;
    }
    let (stem, ext) = match split_extension(&sanitized) {
        (stem, ext) if ext.len() <= MAX_EXTENSION_BYTES => (stem, ext),
        _ => (sanitized.as_str(), ""),
    };
    let truncated = truncate_to_bytes(stem, MAX_FILENAME_BYTES - ext.len());
    format!("{}{ext}", truncated.trim_end())
}

/// Name of the content file for an attachment: the dedup key followed by
/// its display filename.
#[must_use]
pub fn content_filename(remote_key: &str, filename: &str) -> String {
    sanitize_filename(&format!("{remote_key}_{filename}"))
}

/// Filename for a stored attachment: the remote filename when present,
/// otherwise `"<title>.pdf"`.
#[must_use]
pub fn document_filename(remote_filename: Option<&str>, title: &str) -> String {
    let candidate = match remote_filename.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{title}.pdf"),
    };
    let sanitized = sanitize_filename(&candidate);
    let (stem, _) = split_extension(&sanitized);
    if stem.trim_matches(['_', '.', ' ']).is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Writes `bytes` to a new file in `dir`, never overwriting an existing one.
///
/// Tries `name.pdf`, then `name_2.pdf`, `name_3.pdf`, ... and claims the first
/// free name atomically, so concurrent writers never share a path.
///
/// # Errors
///
/// Returns the underlying IO error, or `AlreadyExists` when every suffix is taken.
pub async fn write_unique_file(dir: &Path, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let filename = document_filename(Some(filename), "");
    let (stem, ext) = split_extension(&filename);

    for suffix in 1..MAX_SUFFIX {
        let candidate = if suffix == 1 {
            dir.join(&filename)
        } else {
            dir.join(format!("{stem}_{suffix}{ext}"))
        };

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };

        if let Err(e) = write_all(&mut file, bytes).await {
            drop(file);
            let _ = tokio::fs::remove_file(&candidate).await;
            return Err(e);
        }
        return Ok(candidate);
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free filename for {filename} in {}", dir.display()),
    ))
}

async fn write_all(file: &mut tokio::fs::File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

fn truncate_to_bytes(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file/name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file\\name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("a:b*c?.pdf"), "a_b_c_.pdf");
        assert_eq!(sanitize_filename("file<name>.pdf"), "file_name_.pdf");
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename("."), "_");
        assert_eq!(sanitize_filename(".."), "__");
    }

    #[test]
    fn test_sanitize_filename_preserves_valid_chars() {
        assert_eq!(sanitize_filename("file (1).pdf"), "file (1).pdf");
        assert_eq!(sanitize_filename("日本語.pdf"), "日本語.pdf");
    }

    #[test]
    fn test_sanitize_filename_truncates_long_stem_keeping_extension() {
        let long = format!("{}.pdf", "x".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.ends_with(".pdf"));
        assert_eq!(sanitized.len(), MAX_FILENAME_BYTES);
    }

    #[test]
    fn test_multibyte_title_truncated_by_bytes_on_char_boundary() {
        let filename = document_filename(None, &"論".repeat(120));
        assert!(filename.len() <= MAX_FILENAME_BYTES, "{} bytes", filename.len());
        assert!(filename.ends_with(".pdf"));
        assert!(filename.trim_end_matches(".pdf").chars().all(|c| c == '論'));
    }

    #[test]
    fn test_overlong_extension_counts_as_stem() {
        let name = format!("a.{}", "b".repeat(300));
        let sanitized = sanitize_filename(&name);
        assert_eq!(sanitized.len(), MAX_FILENAME_BYTES);
        assert!(sanitized.starts_with("a.b"));
    }

    #[test]
    fn test_content_filename_leads_with_key() {
        assert_eq!(content_filename("ATT00001", "Full Text PDF.pdf"), "ATT00001_Full Text PDF.pdf");
        let long = content_filename("ATT00001", &format!("{}.pdf", "論".repeat(120)));
        assert!(long.starts_with("ATT00001_"));
        assert!(long.len() <= MAX_FILENAME_BYTES);
    }

    #[test]
    fn test_document_filename_prefers_remote_name() {
        assert_eq!(document_filename(Some("paper.pdf"), "Title"), "paper.pdf");
    }

    #[test]
    fn test_document_filename_synthesizes_from_title() {
        assert_eq!(
            document_filename(None, "On Things: A Study"),
            "On Things_ A Study.pdf"
        );
        assert_eq!(document_filename(Some("  "), "Untitled"), "Untitled.pdf");
    }

    #[test]
    fn test_document_filename_falls_back_when_nothing_usable() {
        assert_eq!(document_filename(None, "///"), FALLBACK_FILENAME);
    }

    #[tokio::test]
    async fn test_write_unique_file_adds_suffix_on_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_unique_file(dir.path(), "paper.pdf", b"one")
            .await
            .unwrap();
        let second = write_unique_file(dir.path(), "paper.pdf", b"two")
            .await
            .unwrap();

        assert_eq!(first, dir.path().join("paper.pdf"));
        assert_eq!(second, dir.path().join("paper_2.pdf"));
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_write_unique_file_stays_under_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_unique_file(dir.path(), "../../escape.pdf", b"x")
            .await
            .unwrap();
        assert!(path.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_write_unique_file_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("personal");
        let path = write_unique_file(&nested, "a.pdf", b"x").await.unwrap();
        assert_eq!(path, nested.join("a.pdf"));
    }
}
