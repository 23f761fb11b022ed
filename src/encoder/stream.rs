//! The multipart message: ordered fields framed by a boundary.
//!
//! Parts are laid out as
//!
//! ```text
//! --{boundary}\r\n{headers}{body}\r\n      (once per field)
//! --{boundary}--\r\n
//! ```
//!
//! Scalar fields come first, in form data order with list values expanded
//! in place, followed by file fields in input order.

use std::borrow::BorrowMut;

use bytes::Bytes;
use futures_core::Stream;
use tracing::debug;

use super::boundary::{generate_boundary, validate_boundary, EntropySource, OsEntropy};
use super::data_field::DataField;
use super::file_field::FileField;
use super::frame::{pull_async, pull_blocking, Frame, Framer};
use super::mime::{MimeGuessLookup, MimeLookup};
use super::Field;
use crate::config::{EncoderConfig, DEFAULT_CHUNK_SIZE};
use crate::error::Result;
use crate::model::source::FileSpec;
use crate::model::value::{FormData, FormValue};

/// Request content as streaming `multipart/form-data`.
///
/// Built once from form data and files; only the per-field render caches
/// change afterwards. Rendering is strictly sequential: do not drive two
/// producers over the same message at once.
#[derive(Debug)]
pub struct MultipartStream {
    boundary: Bytes,
    content_type: String,
    delimiter: Bytes,
    closing: Bytes,
    fields: Vec<Field>,
}

impl MultipartStream {
    /// Build a message with a random boundary and default settings.
    pub fn new<I, K>(data: FormData, files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, FileSpec)>,
        K: Into<String>,
    {
        Self::builder().build(data, files)
    }

    pub fn builder() -> MultipartBuilder {
        MultipartBuilder::default()
    }

    pub fn boundary(&self) -> &[u8] {
        &self.boundary
    }

    /// `multipart/form-data; boundary=...`
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Exact encoded size, or `None` if any file's size is unknown up front.
    pub fn content_length(&mut self) -> Option<u64> {
        let boundary_len = self.boundary.len() as u64;
        let mut length = 0u64;

        for field in &mut self.fields {
            let Some(field_length) = field.length() else {
                debug!(field = %field.name(), "Field length unknown, content length indeterminate");
                return None;
            };
            length += 2 + boundary_len + 2; // --{boundary}\r\n
            length += field_length;
            length += 2; // \r\n
        }

        length += 2 + boundary_len + 4; // --{boundary}--\r\n
        Some(length)
    }

    /// Request headers describing this body: `Content-Length` when the size
    /// is known, `Transfer-Encoding: chunked` otherwise, plus `Content-Type`.
    pub fn headers(&mut self) -> Vec<(&'static str, String)> {
        let content_type = self.content_type.clone();
        match self.content_length() {
            Some(length) => vec![
                ("Content-Length", length.to_string()),
                ("Content-Type", content_type),
            ],
            None => {
                debug!("Falling back to chunked transfer encoding");
                vec![
                    ("Transfer-Encoding", "chunked".to_string()),
                    ("Content-Type", content_type),
                ]
            }
        }
    }

    /// Blocking iterator over the encoded body.
    pub fn iter_chunks(&mut self) -> Chunks<&mut Self> {
        Chunks::new(self)
    }

    /// Async stream over the encoded body. File fields backed by async
    /// streams are awaited; other sources are read inline.
    pub fn aiter_chunks(&mut self) -> impl Stream<Item = Result<Bytes>> + Send + '_ {
        async_chunks(self)
    }

    /// Owning async stream, for transports that need a `'static` body.
    pub fn into_async_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        async_chunks(self)
    }

    /// Render the whole body into one buffer.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.content_length().unwrap_or(0) as usize);
        for chunk in self.iter_chunks() {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

impl IntoIterator for MultipartStream {
    type Item = Result<Bytes>;
    type IntoIter = Chunks<MultipartStream>;

    fn into_iter(self) -> Self::IntoIter {
        Chunks::new(self)
    }
}

impl<'a> IntoIterator for &'a mut MultipartStream {
    type Item = Result<Bytes>;
    type IntoIter = Chunks<&'a mut MultipartStream>;

    fn into_iter(self) -> Self::IntoIter {
        Chunks::new(self)
    }
}

/// Blocking producer of the encoded body, borrowed or owning.
///
/// Dropping it mid-body closes any file a path source opened.
pub struct Chunks<S> {
    message: S,
    framer: Framer,
}

impl<S: BorrowMut<MultipartStream>> Chunks<S> {
    fn new(message: S) -> Self {
        Self {
            message,
            framer: Framer::new(),
        }
    }
}

impl<S: BorrowMut<MultipartStream>> Iterator for Chunks<S> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        let message: &mut MultipartStream = self.message.borrow_mut();
        loop {
            match self
                .framer
                .next_frame(&message.delimiter, &message.closing, &mut message.fields)?
            {
                Frame::Bytes(chunk) => return Some(Ok(chunk)),
                Frame::Body => {
                    let pulled = match self.framer.body() {
                        Some((index, state)) => pull_blocking(&mut message.fields, index, state),
                        None => Ok(None),
                    };
                    if let Some(item) = self.framer.settle(pulled) {
                        return Some(item);
                    }
                }
            }
        }
    }
}

fn async_chunks<S>(message: S) -> impl Stream<Item = Result<Bytes>> + Send
where
    S: BorrowMut<MultipartStream> + Send,
{
    futures_util::stream::unfold(
        (message, Framer::new()),
        |(mut message, mut framer)| async move {
            let item = loop {
                let msg: &mut MultipartStream = message.borrow_mut();
                match framer.next_frame(&msg.delimiter, &msg.closing, &mut msg.fields)? {
                    Frame::Bytes(chunk) => break Ok(chunk),
                    Frame::Body => {
                        let pulled = match framer.body() {
                            Some((index, state)) => pull_async(&mut msg.fields, index, state).await,
                            None => Ok(None),
                        };
                        if let Some(item) = framer.settle(pulled) {
                            break item;
                        }
                    }
                }
            };
            Some((item, (message, framer)))
        },
    )
}

/// Configures and builds a [`MultipartStream`].
pub struct MultipartBuilder {
    boundary: Option<Bytes>,
    entropy: Box<dyn EntropySource + Send>,
    lookup: Box<dyn MimeLookup + Send>,
    chunk_size: usize,
}

impl Default for MultipartBuilder {
    fn default() -> Self {
        Self {
            boundary: None,
            entropy: Box::new(OsEntropy),
            lookup: Box::new(MimeGuessLookup),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl MultipartBuilder {
    /// Use a fixed boundary instead of a random one. Must be ASCII.
    pub fn boundary(mut self, boundary: impl Into<Bytes>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Randomness used when no boundary is given.
    pub fn entropy(mut self, entropy: impl EntropySource + Send + 'static) -> Self {
        self.entropy = Box::new(entropy);
        self
    }

    /// Filename → content type lookup for files without an explicit type.
    pub fn mime_lookup(mut self, lookup: impl MimeLookup + Send + 'static) -> Self {
        self.lookup = Box::new(lookup);
        self
    }

    /// Read size for file-backed sources. Zero keeps the default.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    /// Apply loaded configuration.
    pub fn config(mut self, config: &EncoderConfig) -> Self {
        self.chunk_size = config.effective_chunk_size();
        if let Some(boundary) = &config.boundary {
            self.boundary = Some(Bytes::copy_from_slice(boundary.as_bytes()));
        }
        self
    }

    /// Resolve the boundary and lay out the fields.
    pub fn build<I, K>(mut self, data: FormData, files: I) -> Result<MultipartStream>
    where
        I: IntoIterator<Item = (K, FileSpec)>,
        K: Into<String>,
    {
        let boundary = match self.boundary.take() {
            Some(boundary) => {
                validate_boundary(&boundary)?;
                boundary
            }
            None => generate_boundary(self.entropy.as_mut())?,
        };

        let mut fields = Vec::new();
        for (name, value) in data {
            match value {
                FormValue::Single(value) => fields.push(Field::Data(DataField::new(name, value))),
                FormValue::List(values) => fields.extend(
                    values
                        .into_iter()
                        .map(|value| Field::Data(DataField::new(name.clone(), value))),
                ),
            }
        }
        let data_fields = fields.len();

        for (name, spec) in files {
            let field = FileField::with_lookup(name, spec, self.lookup.as_ref())?
                .with_chunk_size(self.chunk_size);
            fields.push(Field::File(field));
        }

        // Boundary was checked to be ASCII above.
        let boundary_text = String::from_utf8_lossy(&boundary);
        let content_type = format!("multipart/form-data; boundary={boundary_text}");
        let delimiter = Bytes::from(format!("--{boundary_text}\r\n"));
        let closing = Bytes::from(format!("--{boundary_text}--\r\n"));

        debug!(
            data_fields,
            file_fields = fields.len() - data_fields,
            boundary_len = boundary.len(),
            "Built multipart message"
        );

        Ok(MultipartStream {
            boundary,
            content_type,
            delimiter,
            closing,
            fields,
        })
    }
}
