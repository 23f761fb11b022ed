//! `Content-Type` header parsing.

/// Extract the boundary token from a `multipart/form-data` content type.
///
/// Follows RFC 2046 §5.1.1: the value must start with `multipart/form-data`,
/// parameters are `;`-separated, the `boundary=` name is matched without
/// regard to case, and surrounding double quotes are stripped.
///
/// ```
/// use formwire::parser::content_type::boundary_from_content_type;
///
/// let ct: &[u8] = b"multipart/form-data; boundary=\"abc123\"";
/// assert_eq!(boundary_from_content_type(Some(ct)), Some(&b"abc123"[..]));
/// assert_eq!(boundary_from_content_type(Some(&b"text/plain"[..])), None);
/// ```
pub fn boundary_from_content_type(content_type: Option<&[u8]>) -> Option<&[u8]> {
    const PARAM: &[u8] = b"boundary=";

    let content_type = content_type?;
    if !content_type.starts_with(b"multipart/form-data") || !content_type.contains(&b';') {
        return None;
    }

    content_type
        .split(|&b| b == b';')
        .map(<[u8]>::trim_ascii)
        .find(|section| {
            section.len() >= PARAM.len() && section[..PARAM.len()].eq_ignore_ascii_case(PARAM)
        })
        .map(|section| strip_quotes(&section[PARAM.len()..]))
}

fn strip_quotes(mut value: &[u8]) -> &[u8] {
    while let [b'"', rest @ ..] = value {
        value = rest;
    }
    while let [rest @ .., b'"'] = value {
        value = rest;
    }
    value
}
