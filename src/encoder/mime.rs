//! Filename → content type guessing.

/// Fallback for filenames whose extension is unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Maps a filename to a MIME type.
pub trait MimeLookup {
    /// The MIME type for `filename`'s extension, if known.
    fn lookup(&self, filename: &str) -> Option<String>;
}

/// Extension table lookup backed by `mime_guess`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MimeGuessLookup;

impl MimeLookup for MimeGuessLookup {
    fn lookup(&self, filename: &str) -> Option<String> {
        mime_guess::from_path(filename)
            .first_raw()
            .map(str::to_string)
    }
}

impl<F: Fn(&str) -> Option<String>> MimeLookup for F {
    fn lookup(&self, filename: &str) -> Option<String> {
        self(filename)
    }
}

/// Best-effort content type for an upload.
///
/// Returns `None` for a missing or empty filename, otherwise the looked-up
/// type or [`DEFAULT_CONTENT_TYPE`].
pub fn guess_content_type(filename: Option<&str>, lookup: &dyn MimeLookup) -> Option<String> {
    match filename {
        Some(name) if !name.is_empty() => Some(
            lookup
                .lookup(name)
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        ),
        _ => None,
    }
}
