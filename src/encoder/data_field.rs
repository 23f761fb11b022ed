//! Scalar form fields.

use bytes::Bytes;

use super::escape::format_form_param;
use crate::error::{FormError, Result};
use crate::model::value::PrimitiveValue;

/// A single named form value within a multipart body.
///
/// Headers and body are rendered on first use and cached; later renders
/// return the cached bytes even if `name` or `value` changed in between.
#[derive(Debug, Clone)]
pub struct DataField {
    pub name: String,
    pub value: PrimitiveValue,
    headers: Option<Bytes>,
    data: Option<Bytes>,
}

impl DataField {
    pub fn new(name: impl Into<String>, value: impl Into<PrimitiveValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            headers: None,
            data: None,
        }
    }

    /// Build a field from a name given as raw bytes. Names that are not
    /// valid UTF-8 text are rejected.
    pub fn from_raw_name(name: &[u8], value: impl Into<PrimitiveValue>) -> Result<Self> {
        let name = std::str::from_utf8(name).map_err(|e| {
            FormError::validation(format!(
                "field name must be text, got {:?} ({e})",
                String::from_utf8_lossy(name)
            ))
        })?;
        Ok(Self::new(name, value))
    }

    /// `Content-Disposition: form-data; name="..."` followed by the blank line.
    pub fn render_headers(&mut self) -> Bytes {
        let name = &self.name;
        self.headers
            .get_or_insert_with(|| {
                let mut out = Vec::with_capacity(name.len() + 48);
                out.extend_from_slice(b"Content-Disposition: form-data; ");
                out.extend_from_slice(&format_form_param("name", name));
                out.extend_from_slice(b"\r\n\r\n");
                Bytes::from(out)
            })
            .clone()
    }

    pub fn render_data(&mut self) -> Bytes {
        let value = &self.value;
        self.data.get_or_insert_with(|| value.to_bytes()).clone()
    }

    /// Rendered size of headers plus body. Always known.
    pub fn length(&mut self) -> u64 {
        (self.render_headers().len() + self.render_data().len()) as u64
    }

    /// The two chunks of this part: headers, then body.
    pub fn render(&mut self) -> [Bytes; 2] {
        [self.render_headers(), self.render_data()]
    }
}
