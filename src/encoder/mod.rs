//! Multipart encoding: parameter escaping, boundaries, field rendering and
//! the message orchestrator.

pub mod boundary;
pub mod data_field;
pub mod escape;
pub mod file_field;
mod frame;
pub mod mime;
pub mod stream;

use data_field::DataField;
use file_field::FileField;

/// One part of a multipart message.
#[derive(Debug)]
pub enum Field {
    Data(DataField),
    File(FileField),
}

impl Field {
    pub fn name(&self) -> &str {
        match self {
            Self::Data(field) => &field.name,
            Self::File(field) => &field.name,
        }
    }

    /// Rendered headers plus body, `None` if the body size is unknown.
    pub fn length(&mut self) -> Option<u64> {
        match self {
            Self::Data(field) => Some(field.length()),
            Self::File(field) => field.length(),
        }
    }

    pub(crate) fn render_headers(&mut self) -> bytes::Bytes {
        match self {
            Self::Data(field) => field.render_headers(),
            Self::File(field) => field.render_headers(),
        }
    }
}
