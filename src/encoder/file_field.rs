//! File upload fields.
//!
//! A file part's body is produced in chunks. In-memory sources yield a single
//! chunk; readers and paths are read in fixed-size chunks; async streams are
//! consumed as they produce. Paths are opened per render and the handle is
//! owned by the render state, so dropping an unfinished render closes it.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use tracing::trace;

use super::escape::format_form_param;
use super::mime::{guess_content_type, MimeGuessLookup, MimeLookup};
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{FormError, Result};
use crate::model::source::{FileLike, FileSource, FileSpec, PartHeaders, StreamChunk};

const TEXT_MODE_ERROR: &str =
    "Multipart file uploads must be opened in binary mode, not text mode.";

/// Progress of one render of a file body.
#[derive(Debug, Default)]
pub(crate) enum BodyState {
    #[default]
    Pending,
    Reader,
    File {
        file: File,
        path: PathBuf,
    },
    Done,
}

/// A single file item within a multipart body.
#[derive(Debug)]
pub struct FileField {
    pub name: String,
    filename: Option<String>,
    headers: PartHeaders,
    source: FileSource,
    chunk_size: usize,
    rendered_headers: Option<Bytes>,
    memory_body: Option<Bytes>,
}

impl FileField {
    /// Build a file field, guessing content types with `mime_guess`.
    pub fn new(name: impl Into<String>, spec: FileSpec) -> Result<Self> {
        Self::with_lookup(name, spec, &MimeGuessLookup)
    }

    /// Build a file field with a custom filename → MIME lookup.
    ///
    /// Content type precedence: an explicit type, then a guess from the
    /// filename. Neither is used if the extra headers already carry a
    /// `Content-Type` (matched without regard to case).
    pub fn with_lookup(
        name: impl Into<String>,
        spec: FileSpec,
        lookup: &dyn MimeLookup,
    ) -> Result<Self> {
        let (filename, source, content_type, mut headers) = match spec {
            FileSpec::Simple { filename, source } => (filename, source, None, PartHeaders::new()),
            FileSpec::WithType {
                filename,
                source,
                content_type,
            } => (filename, source, content_type, PartHeaders::new()),
            FileSpec::WithTypeAndHeaders {
                filename,
                source,
                content_type,
                headers,
            } => (filename, source, content_type, headers),
            FileSpec::Bare(source) => {
                let filename = source.base_name().unwrap_or_else(|| "upload".to_string());
                (Some(filename), source, None, PartHeaders::new())
            }
        };

        let content_type =
            content_type.or_else(|| guess_content_type(filename.as_deref(), lookup));
        if let Some(content_type) = content_type {
            if !headers.contains("Content-Type") {
                headers.insert("Content-Type", content_type);
            }
        }

        if source.is_text_mode() {
            return Err(FormError::validation(TEXT_MODE_ERROR));
        }

        Ok(Self {
            name: name.into(),
            filename,
            headers,
            source,
            chunk_size: DEFAULT_CHUNK_SIZE,
            rendered_headers: None,
            memory_body: None,
        })
    }

    /// Read size for reader and path sources. Zero keeps the current size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Extra part headers, including the resolved `Content-Type`.
    pub fn headers(&self) -> &PartHeaders {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut FileSource {
        &mut self.source
    }

    /// `Content-Disposition` with name and filename, then the extra headers,
    /// then the blank line.
    pub fn render_headers(&mut self) -> Bytes {
        if let Some(headers) = &self.rendered_headers {
            return headers.clone();
        }

        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(b"Content-Disposition: form-data; ");
        out.extend_from_slice(&format_form_param("name", &self.name));
        if let Some(filename) = self.filename.as_deref().filter(|f| !f.is_empty()) {
            out.extend_from_slice(b"; ");
            out.extend_from_slice(&format_form_param("filename", filename));
        }
        for (key, value) in self.headers.iter() {
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
        }
        out.extend_from_slice(b"\r\n\r\n");

        let headers = Bytes::from(out);
        self.rendered_headers = Some(headers.clone());
        headers
    }

    /// Rendered size of headers plus body, or `None` when the body size
    /// cannot be known without reading it.
    pub fn length(&mut self) -> Option<u64> {
        let headers = self.render_headers().len() as u64;
        if let Some(body) = self.memory_body() {
            return Some(headers + body.len() as u64);
        }

        let body = match &mut self.source {
            FileSource::Path(path) => probe_path_len(path),
            FileSource::Reader(reader) => reader.probe_len(),
            FileSource::Bytes(_) | FileSource::Text(_) | FileSource::Stream(_) => None,
        };
        body.map(|len| headers + len)
    }

    /// Blocking iterator over the body chunks.
    pub fn render_data(&mut self) -> FileBody<'_> {
        FileBody {
            field: self,
            state: BodyState::Pending,
        }
    }

    /// Headers followed by the body chunks, blocking.
    pub fn render(&mut self) -> impl Iterator<Item = Result<Bytes>> + '_ {
        let headers = self.render_headers();
        std::iter::once(Ok(headers)).chain(self.render_data())
    }

    /// Async stream over the body chunks. Accepts every source kind.
    pub fn arender_data(&mut self) -> impl Stream<Item = Result<Bytes>> + Send + '_ {
        futures_util::stream::unfold(
            (self, BodyState::Pending),
            |(field, mut state)| async move {
                match field.next_chunk_async(&mut state).await {
                    Ok(Some(chunk)) => Some((Ok(chunk), (field, state))),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), (field, BodyState::Done))),
                }
            },
        )
    }

    fn memory_body(&mut self) -> Option<Bytes> {
        if self.memory_body.is_none() {
            self.memory_body = self.source.in_memory();
        }
        self.memory_body.clone()
    }

    /// Prepare a non-memory source for reading.
    fn open_body(&mut self) -> Result<BodyState> {
        match &mut self.source {
            FileSource::Stream(_) => Err(FormError::validation(
                "async stream sources cannot be rendered by the blocking producer",
            )),
            FileSource::Reader(reader) => {
                if reader.is_text_mode() {
                    return Err(FormError::validation(TEXT_MODE_ERROR));
                }
                if let Err(e) = reader.reset() {
                    trace!(field = %self.name, error = %e, "Source cannot be rewound");
                }
                Ok(BodyState::Reader)
            }
            FileSource::Path(path) => {
                let file = File::open(&*path).map_err(|e| FormError::io(path.clone(), e))?;
                Ok(BodyState::File {
                    file,
                    path: path.clone(),
                })
            }
            FileSource::Bytes(_) | FileSource::Text(_) => Ok(BodyState::Done),
        }
    }

    /// Next body chunk for the blocking producer, `None` once exhausted.
    pub(crate) fn next_chunk(&mut self, state: &mut BodyState) -> Result<Option<Bytes>> {
        if let BodyState::Pending = state {
            if let Some(body) = self.memory_body() {
                *state = BodyState::Done;
                return Ok(Some(body));
            }
            *state = self.open_body()?;
        }

        let chunk = match state {
            BodyState::Pending | BodyState::Done => return Ok(None),
            BodyState::Reader => match &mut self.source {
                FileSource::Reader(reader) => read_chunk(reader.as_mut(), self.chunk_size)?,
                _ => None,
            },
            BodyState::File { file, path } => read_chunk(file, self.chunk_size)
                .map_err(|e| FormError::io(path.clone(), e))?,
        };

        if let Some(chunk) = &chunk {
            trace!(field = %self.name, len = chunk.len(), "Read file chunk");
        } else {
            *state = BodyState::Done;
        }
        Ok(chunk)
    }

    /// Next body chunk for the async producer. Async streams are polled
    /// directly; every other source goes through the blocking path.
    pub(crate) async fn next_chunk_async(
        &mut self,
        state: &mut BodyState,
    ) -> Result<Option<Bytes>> {
        if !matches!(self.source, FileSource::Stream(_)) {
            return self.next_chunk(state);
        }
        let FileSource::Stream(stream) = &mut self.source else {
            return Ok(None);
        };
        if let BodyState::Done = state {
            return Ok(None);
        }

        match stream.next().await {
            Some(Ok(StreamChunk::Binary(chunk))) => Ok(Some(chunk)),
            Some(Ok(StreamChunk::Text(_))) => {
                *state = BodyState::Done;
                Err(FormError::validation(TEXT_MODE_ERROR))
            }
            Some(Err(e)) => {
                *state = BodyState::Done;
                Err(e.into())
            }
            None => {
                *state = BodyState::Done;
                Ok(None)
            }
        }
    }
}

/// Read up to `chunk_size` bytes. `None` at end of input.
/// Size of a path source, taken from the opened file the same way reader
/// sources are probed. Special files (procfs, FIFOs, devices) report `None`.
fn probe_path_len(path: &Path) -> Option<u64> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        trace!(path = %path.display(), "Not a regular file, length unknown");
        return None;
    }
    let len = File::open(path).ok()?.probe_len();
    if len.is_none() {
        trace!(path = %path.display(), "File cannot seek to its end, length unknown");
    }
    len
}

fn read_chunk<R: Read + ?Sized>(
    reader: &mut R,
    chunk_size: usize,
) -> std::io::Result<Option<Bytes>> {
    let mut buf = Vec::with_capacity(chunk_size);
    reader.take(chunk_size as u64).read_to_end(&mut buf)?;
    if buf.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Bytes::from(buf)))
    }
}

/// Blocking chunk iterator returned by [`FileField::render_data`].
///
/// Dropping it before exhaustion closes any file it opened.
pub struct FileBody<'a> {
    field: &'a mut FileField,
    state: BodyState,
}

impl Iterator for FileBody<'_> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.field.next_chunk(&mut self.state) {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => {
                self.state = BodyState::Done;
                Some(Err(e))
            }
        }
    }
}
