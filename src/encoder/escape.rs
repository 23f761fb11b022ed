//! HTML5 form-style escaping of `Content-Disposition` parameters.

/// Render `name="value"` with the value escaped the way browsers encode
/// multipart form parameters.
///
/// - `"` becomes `%22`
/// - `\` becomes `\\`
/// - control characters `0x00..=0x1F` except ESC (`0x1B`) become `%XX`
///   (uppercase hex)
///
/// Everything else is emitted unchanged as UTF-8.
pub fn format_form_param(name: &str, value: &str) -> Vec<u8> {
    let mut out = String::with_capacity(name.len() + value.len() + 3);
    out.push_str(name);
    out.push_str("=\"");
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("%22"),
            '\\' => out.push_str("\\\\"),
            '\x1B' => out.push(ch),
            c if u32::from(c) <= 0x1F => out.push_str(&format!("%{:02X}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
    out.into_bytes()
}
