use std::path::Path;

/// Known extensions and the content type uploaded for them.
const KNOWN_TYPES: &[(&str, &str)] = &[
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("txt", "text/plain"),
];

/// Content type for `path`, judged by its extension (case-insensitive).
/// Unknown or missing extensions get `default`.
pub fn infer_content_type(path: &Path, default: &str) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| {
            KNOWN_TYPES
                .iter()
                .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        })
        .map(|(_, content_type)| content_type.to_string())
        .unwrap_or_else(|| default.to_string())
}
