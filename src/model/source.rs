//! File upload inputs: byte sources, the four accepted spec shapes, and
//! per-part headers.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;

/// A blocking, readable upload source.
///
/// Every `Read + Seek + Send` type is a `FileLike` that can be rewound and
/// size-probed. Plain readers can be wrapped in [`NonSeekable`].
pub trait FileLike: Read + Send {
    /// Reposition at the start before rendering.
    fn reset(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "source cannot be rewound",
        ))
    }

    /// Size of the body this source renders, without consuming it.
    /// `None` when it cannot be determined cheaply.
    fn probe_len(&mut self) -> Option<u64> {
        None
    }

    /// `true` for sources that decode to text instead of yielding raw bytes.
    /// Such sources are rejected.
    fn is_text_mode(&self) -> bool {
        false
    }
}

impl<T: Read + Seek + Send> FileLike for T {
    fn reset(&mut self) -> io::Result<()> {
        self.seek(SeekFrom::Start(0)).map(drop)
    }

    // Rendering always restarts from offset 0, so the end offset is the
    // rendered size. The current position is restored afterwards.
    fn probe_len(&mut self) -> Option<u64> {
        let current = self.stream_position().ok()?;
        let end = self.seek(SeekFrom::End(0)).ok()?;
        self.seek(SeekFrom::Start(current)).ok()?;
        Some(end)
    }
}

/// Wraps a reader that cannot seek (pipes, sockets, decoders).
///
/// Rendering reads it from wherever it currently is and the content length
/// is reported as unknown.
#[derive(Debug)]
pub struct NonSeekable<R>(pub R);

impl<R: Read> Read for NonSeekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + Send> FileLike for NonSeekable<R> {}

/// One item produced by an asynchronous upload source.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Binary(Bytes),
    /// Text chunks mean the producer was opened in text mode; they fail
    /// rendering.
    Text(String),
}

impl From<Bytes> for StreamChunk {
    fn from(b: Bytes) -> Self {
        Self::Binary(b)
    }
}

impl From<Vec<u8>> for StreamChunk {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(b))
    }
}

impl From<&'static [u8]> for StreamChunk {
    fn from(b: &'static [u8]) -> Self {
        Self::Binary(Bytes::from_static(b))
    }
}

impl From<String> for StreamChunk {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&'static str> for StreamChunk {
    fn from(s: &'static str) -> Self {
        Self::Text(s.to_string())
    }
}

/// A type-erased async producer of upload chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = io::Result<StreamChunk>> + Send>>;

/// Where a file part's body comes from.
pub enum FileSource {
    /// In-memory bytes.
    Bytes(Bytes),
    /// In-memory text, encoded as UTF-8.
    Text(String),
    /// A file opened for each render and closed when the render finishes
    /// or is dropped.
    Path(PathBuf),
    /// A caller-owned blocking reader.
    Reader(Box<dyn FileLike>),
    /// An async chunk producer. Only the async render path accepts it.
    Stream(ChunkStream),
}

impl FileSource {
    pub fn reader<R: FileLike + 'static>(reader: R) -> Self {
        Self::Reader(Box::new(reader))
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Wrap an async stream whose items convert to [`StreamChunk`].
    pub fn stream<S, T>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<T>> + Send + 'static,
        T: Into<StreamChunk>,
    {
        Self::Stream(Box::pin(stream.map(|item| item.map(Into::into))))
    }

    /// Base name used as the filename of a bare source.
    pub(crate) fn base_name(&self) -> Option<String> {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    pub(crate) fn is_text_mode(&self) -> bool {
        match self {
            Self::Reader(reader) => reader.is_text_mode(),
            _ => false,
        }
    }

    /// In-memory content, if any.
    pub(crate) fn in_memory(&self) -> Option<Bytes> {
        match self {
            Self::Bytes(b) => Some(b.clone()),
            Self::Text(s) => Some(Bytes::copy_from_slice(s.as_bytes())),
            _ => None,
        }
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(&s.len()).finish(),
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for FileSource {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<u8>> for FileSource {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(b))
    }
}

impl From<&[u8]> for FileSource {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(b))
    }
}

impl<const N: usize> From<&[u8; N]> for FileSource {
    fn from(b: &[u8; N]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<String> for FileSource {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for FileSource {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<PathBuf> for FileSource {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<&Path> for FileSource {
    fn from(p: &Path) -> Self {
        Self::Path(p.to_path_buf())
    }
}

impl From<std::fs::File> for FileSource {
    fn from(f: std::fs::File) -> Self {
        Self::reader(f)
    }
}

/// Ordered extra headers of a file part. Lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    entries: Vec<(String, String)>,
}

impl PartHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping insertion order.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PartHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// The accepted shapes of a file upload.
///
/// All shapes resolve to the same record (`filename`, `source`,
/// `content_type`, `headers`) when the file field is built.
#[derive(Debug)]
pub enum FileSpec {
    /// Filename and source; the content type is guessed from the filename.
    Simple {
        filename: Option<String>,
        source: FileSource,
    },
    /// Filename, source and an explicit content type (`None` guesses).
    WithType {
        filename: Option<String>,
        source: FileSource,
        content_type: Option<String>,
    },
    /// Filename, source, content type and extra part headers.
    WithTypeAndHeaders {
        filename: Option<String>,
        source: FileSource,
        content_type: Option<String>,
        headers: PartHeaders,
    },
    /// Just a source. The filename is the base name of its path, or
    /// `upload`.
    Bare(FileSource),
}

impl FileSpec {
    pub fn simple(filename: impl Into<String>, source: impl Into<FileSource>) -> Self {
        Self::Simple {
            filename: Some(filename.into()),
            source: source.into(),
        }
    }

    pub fn with_type(
        filename: impl Into<String>,
        source: impl Into<FileSource>,
        content_type: impl Into<String>,
    ) -> Self {
        Self::WithType {
            filename: Some(filename.into()),
            source: source.into(),
            content_type: Some(content_type.into()),
        }
    }

    pub fn with_headers(
        filename: impl Into<String>,
        source: impl Into<FileSource>,
        content_type: Option<String>,
        headers: PartHeaders,
    ) -> Self {
        Self::WithTypeAndHeaders {
            filename: Some(filename.into()),
            source: source.into(),
            content_type,
            headers,
        }
    }

    pub fn bare(source: impl Into<FileSource>) -> Self {
        Self::Bare(source.into())
    }
}
