//! Extension selection for stored blobs

use std::path::Path;

/// Extension used when neither the filename nor the MIME type identifies the content
pub const FALLBACK_EXTENSION: &str = "bin";

/// Canonical extension for a MIME type, if known
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    // Parameters such as `; charset=utf-8` do not affect the extension
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let ext = match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/heif" => "heif",
        "image/tiff" => "tiff",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "text/html" => "html",
        "text/markdown" => "md",
        "application/json" => "json",
        "application/zip" => "zip",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        _ => return None,
    };
    Some(ext)
}

/// Extension for a stored blob.
///
/// A filename extension wins over the MIME type; an unknown MIME type falls
/// back to [`FALLBACK_EXTENSION`].
pub fn resolve_extension(filename: Option<&str>, mime_type: Option<&str>) -> String {
    let from_name = filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase());

    from_name
        .or_else(|| mime_type.and_then(extension_for_mime).map(str::to_string))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_extension_wins() {
        assert_eq!(resolve_extension(Some("receipt.PDF"), Some("image/png")), "pdf");
    }

    #[test]
    fn test_mime_used_without_filename_extension() {
        assert_eq!(resolve_extension(Some("IMG_0001"), Some("image/jpeg")), "jpg");
        assert_eq!(resolve_extension(None, Some("text/plain; charset=utf-8")), "txt");
    }

    #[test]
    fn test_unknown_falls_back() {
        assert_eq!(resolve_extension(None, Some("application/x-unknown")), "bin");
        assert_eq!(resolve_extension(None, None), "bin");
    }

    #[test]
    fn test_suspicious_extension_ignored() {
        // Extensions become part of a file name; anything non-alphanumeric is dropped
        assert_eq!(resolve_extension(Some("a.tar gz"), Some("application/zip")), "zip");
    }
}
