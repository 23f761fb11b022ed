//! Input data model: form values and file upload sources.

pub mod source;
pub mod value;
