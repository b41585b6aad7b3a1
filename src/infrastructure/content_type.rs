//! Content-type to file-extension mapping for stored images

/// File extension (with leading dot) for an image content type. Parameters
/// such as `; charset=...` are stripped; unknown or missing types fall back
/// to `.jpg`.
pub fn extension_for_content_type(content_type: Option<&str>) -> &'static str {
    let Some(raw) = content_type else {
        return ".jpg";
    };

    let normalized = raw
        .split(';')
        .next()
        .unwrap_or(raw)
        .trim()
        .to_ascii_lowercase();

    match normalized.as_str() {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        _ => ".jpg",
    }
}
