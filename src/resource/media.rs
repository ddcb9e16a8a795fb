//! Media type inference from a resource location.

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

const MEDIA_TYPES: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "application/javascript; charset=utf-8"),
    ("mjs", "application/javascript; charset=utf-8"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("xml", "application/xml"),
    ("txt", "text/plain; charset=utf-8"),
    ("csv", "text/csv; charset=utf-8"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("ico", "image/x-icon"),
    ("webp", "image/webp"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("pdf", "application/pdf"),
    ("wasm", "application/wasm"),
    ("mp4", "video/mp4"),
    ("zip", "application/zip"),
];

/// Media type for a path-like location, by extension.
pub fn media_type_for(location: &str) -> &'static str {
    let file_name = location.rsplit('/').next().unwrap_or(location);
    let Some((_, extension)) = file_name.rsplit_once('.') else {
        return DEFAULT_MEDIA_TYPE;
    };
    let extension = extension.to_ascii_lowercase();

    MEDIA_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, media)| *media)
        .unwrap_or(DEFAULT_MEDIA_TYPE)
}

/// Whether gzip is worth applying to this media type.
pub fn is_compressible(media_type: &str) -> bool {
    media_type.starts_with("text/")
        || media_type.contains("javascript")
        || media_type.contains("json")
        || media_type.contains("xml")
}
