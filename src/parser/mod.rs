//! Header parsing helpers for collaborators that receive multipart bodies.

pub mod content_type;
