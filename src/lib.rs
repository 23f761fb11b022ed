//! `formwire`: a streaming `multipart/form-data` encoder.
//!
//! This crate turns named form values and file uploads into a request body
//! framed per RFC 2046 / RFC 7578. Bodies can be pulled as a blocking
//! iterator or an async stream, file-backed sources are read in chunks
//! instead of being buffered, and the exact `Content-Length` is computed up
//! front whenever every source's size is known.
//!
//! ```
//! use formwire::{FileSpec, FormData, MultipartStream};
//!
//! let data = FormData::new().field("a", "1").list("b", ["x", "y"]);
//! let files = vec![("f", FileSpec::simple("t.txt", "hi"))];
//! let mut body = MultipartStream::builder()
//!     .boundary("BOUND")
//!     .build(data, files)
//!     .unwrap();
//!
//! let bytes = body.to_bytes().unwrap();
//! assert_eq!(body.content_length(), Some(bytes.len() as u64));
//! assert!(bytes.ends_with(b"--BOUND--\r\n"));
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod model;
pub mod parser;

pub use encoder::data_field::DataField;
pub use encoder::file_field::FileField;
pub use encoder::stream::{Chunks, MultipartBuilder, MultipartStream};
pub use encoder::Field;
pub use error::{FormError, Result};
pub use model::source::{FileLike, FileSource, FileSpec, NonSeekable, PartHeaders, StreamChunk};
pub use model::value::{FormData, FormValue, PrimitiveValue};
pub use parser::content_type::boundary_from_content_type;
