//! Integration tests for multipart encoding: wire bytes, ordering, lengths,
//! escaping, caching, and the blocking and async producers.

use std::io::{self, Cursor, Write};

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::json;

use formwire::{
    boundary_from_content_type, DataField, Field, FileField, FileSource, FileSpec, FormData,
    FormError, MultipartStream, NonSeekable, PartHeaders, Result,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn bounded<K: Into<String>>(data: FormData, files: Vec<(K, FileSpec)>) -> MultipartStream {
    init_tracing();
    MultipartStream::builder()
        .boundary("BOUND")
        .build(data, files)
        .unwrap()
}

fn concat_blocking(message: &mut MultipartStream) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for chunk in message.iter_chunks() {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

async fn concat_async(chunks: impl Stream<Item = Result<Bytes>>) -> Result<Vec<u8>> {
    let mut chunks = std::pin::pin!(chunks);
    let mut out = Vec::new();
    while let Some(chunk) = chunks.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

/// Reverse the form parameter escaping: `\\` → `\`, `%XX` → byte.
fn unescape_param(rendered: &str, name: &str) -> String {
    let prefix = format!("{name}=\"");
    let inner = rendered
        .strip_prefix(&prefix)
        .and_then(|rest| rest.strip_suffix('"'))
        .expect("quoted parameter");

    let bytes = inner.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if bytes.get(i + 1) == Some(&b'\\') => {
                out.push(b'\\');
                i += 2;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                out.push(u8::from_str_radix(hex, 16).unwrap());
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).unwrap()
}

// ─── Wire format ────────────────────────────────────────────────────

#[test]
fn test_concrete_scenario_bytes() {
    let data = FormData::new().field("a", "1").list("b", ["x", "y"]);
    let files = vec![("f", FileSpec::simple("t.txt", "hi"))];
    let mut message = bounded(data, files);

    let expected: &[u8] = b"--BOUND\r\n\
Content-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n\
--BOUND\r\n\
Content-Disposition: form-data; name=\"b\"\r\n\r\nx\r\n\
--BOUND\r\n\
Content-Disposition: form-data; name=\"b\"\r\n\r\ny\r\n\
--BOUND\r\n\
Content-Disposition: form-data; name=\"f\"; filename=\"t.txt\"\r\nContent-Type: text/plain\r\n\r\nhi\r\n\
--BOUND--\r\n";

    let body = concat_blocking(&mut message).unwrap();
    assert_eq!(body, expected);
    assert_eq!(message.content_length(), Some(expected.len() as u64));
    assert_eq!(
        message.headers(),
        vec![
            ("Content-Length", expected.len().to_string()),
            ("Content-Type", "multipart/form-data; boundary=BOUND".to_string()),
        ]
    );
}

#[test]
fn test_owned_iteration_matches_borrowed() {
    let build = || bounded(FormData::new().field("k", 3.0), vec![("f", FileSpec::simple("a.bin", vec![1u8, 2, 3]))]);
    let mut borrowed = build();
    let expected = borrowed.to_bytes().unwrap();

    let owned: Vec<u8> = build()
        .into_iter()
        .map(|chunk| chunk.unwrap())
        .flat_map(|chunk| chunk.to_vec())
        .collect();
    assert_eq!(owned, expected);
    assert!(expected
        .windows(b"\r\n\r\n3.0\r\n".len())
        .any(|w| w == b"\r\n\r\n3.0\r\n"));
}

// ─── Ordering ───────────────────────────────────────────────────────

#[test]
fn test_scalar_fields_precede_files_in_input_order() {
    let data = FormData::from_json(&json!({
        "z": "first",
        "list": [1, 2.5, true, null],
        "a": "last",
    }))
    .unwrap();
    let files = vec![
        ("upload2", FileSpec::simple("b.txt", "b")),
        ("upload1", FileSpec::simple("a.txt", "a")),
    ];
    let message = bounded(data, files);

    let names: Vec<&str> = message.fields().iter().map(Field::name).collect();
    assert_eq!(
        names,
        vec!["z", "list", "list", "list", "list", "a", "upload2", "upload1"]
    );

    let values: Vec<String> = message
        .fields()
        .iter()
        .filter_map(|field| match field {
            Field::Data(data) if data.name == "list" => Some(data.value.canonical_text()),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec!["1", "2.5", "true", ""]);
}

// ─── Lengths ────────────────────────────────────────────────────────

#[test]
fn test_length_matches_bytes_for_file_sources() {
    let mut named = tempfile::NamedTempFile::new().unwrap();
    named.write_all(&vec![b'p'; 200_000]).unwrap();
    named.flush().unwrap();

    let mut handle = tempfile::tempfile().unwrap();
    handle.write_all(b"handle contents").unwrap();

    let mut cursor = Cursor::new(b"cursor contents".to_vec());
    cursor.set_position(6);

    let files = vec![
        ("path", FileSpec::bare(FileSource::path(named.path()))),
        ("handle", FileSpec::simple("h.dat", handle)),
        ("cursor", FileSpec::simple("c.json", FileSource::reader(cursor))),
        ("memory", FileSpec::simple("m.txt", "memory contents")),
    ];
    let mut message = bounded(FormData::new().field("n", 7), files);

    let length = message.content_length().expect("all sizes known");
    let body = concat_blocking(&mut message).unwrap();
    assert_eq!(length, body.len() as u64);
    assert_eq!(message.headers()[0], ("Content-Length", length.to_string()));

    // A second render yields the same body.
    assert_eq!(concat_blocking(&mut message).unwrap(), body);
}

#[test]
fn test_unknown_length_switches_to_chunked() {
    let files = vec![
        ("known", FileSpec::simple("k.txt", "known")),
        ("piped", FileSpec::simple("p.txt", FileSource::reader(NonSeekable(&b"piped"[..])))),
    ];
    let mut message = bounded(FormData::new(), files);

    assert_eq!(message.content_length(), None);
    assert_eq!(
        message.headers(),
        vec![
            ("Transfer-Encoding", "chunked".to_string()),
            ("Content-Type", "multipart/form-data; boundary=BOUND".to_string()),
        ]
    );

    let body = concat_blocking(&mut message).unwrap();
    assert!(body.ends_with(b"piped\r\n--BOUND--\r\n"));
}

#[test]
fn test_missing_path_is_unknown_length_and_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone.bin");
    let mut message = bounded(
        FormData::new(),
        vec![("f", FileSpec::bare(FileSource::path(&missing)))],
    );

    assert_eq!(message.content_length(), None);
    let err = concat_blocking(&mut message).unwrap_err();
    match err {
        FormError::Io { path, .. } => assert_eq!(path, missing),
        other => panic!("expected I/O error, got {other:?}"),
    }
}

// ─── File field behaviour ───────────────────────────────────────────

#[test]
fn test_bare_path_uses_base_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.csv");
    std::fs::write(&path, "a,b\n").unwrap();

    let field = FileField::new("doc", FileSpec::bare(FileSource::path(&path))).unwrap();
    assert_eq!(field.filename(), Some("report.csv"));
    assert_eq!(field.content_type(), Some("text/csv"));
}

#[test]
fn test_custom_headers_render_in_order() {
    let headers: PartHeaders = [("X-Checksum", "abc"), ("Content-Language", "en")]
        .into_iter()
        .collect();
    let mut message = bounded(
        FormData::new(),
        vec![("f", FileSpec::with_headers("t.txt", "hi", None, headers))],
    );
    let body = String::from_utf8(message.to_bytes().unwrap()).unwrap();
    assert!(body.contains(
        "filename=\"t.txt\"\r\nX-Checksum: abc\r\nContent-Language: en\r\nContent-Type: text/plain\r\n\r\nhi"
    ));
}

/// Number of descriptors this process holds open on `path`.
#[cfg(target_os = "linux")]
fn open_handles_to(path: &std::path::Path) -> usize {
    let target = std::fs::canonicalize(path).unwrap();
    std::fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
        .filter(|link| *link == target)
        .count()
}

#[cfg(target_os = "linux")]
fn chunked_file_message(path: &std::path::Path) -> MultipartStream {
    MultipartStream::builder()
        .boundary("B")
        .chunk_size(100)
        .build(FormData::new(), vec![("f", FileSpec::bare(FileSource::path(path)))])
        .unwrap()
}

#[cfg(target_os = "linux")]
#[test]
fn test_dropping_iterator_mid_body_releases_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");
    std::fs::write(&path, [7u8; 1000]).unwrap();
    let mut message = chunked_file_message(&path);

    {
        let mut chunks = message.iter_chunks();
        for _ in 0..4 {
            chunks.next().unwrap().unwrap();
        }
        assert_eq!(open_handles_to(&path), 1);
    }
    assert_eq!(open_handles_to(&path), 0);

    let body = message.to_bytes().unwrap();
    assert_eq!(Some(body.len() as u64), message.content_length());
    assert_eq!(open_handles_to(&path), 0);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_dropping_async_stream_mid_body_releases_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");
    std::fs::write(&path, [7u8; 1000]).unwrap();
    let mut message = chunked_file_message(&path);

    {
        let mut chunks = std::pin::pin!(message.aiter_chunks());
        for _ in 0..4 {
            chunks.next().await.unwrap().unwrap();
        }
        assert_eq!(open_handles_to(&path), 1);
    }
    assert_eq!(open_handles_to(&path), 0);

    let body = concat_async(message.aiter_chunks()).await.unwrap();
    assert_eq!(Some(body.len() as u64), message.content_length());
}

#[cfg(target_os = "linux")]
#[test]
fn test_procfs_path_falls_back_to_chunked() {
    let mut message = bounded(
        FormData::new(),
        vec![("status", FileSpec::bare(FileSource::path("/proc/self/status")))],
    );
    assert_eq!(message.content_length(), None);
    let headers = message.headers();
    assert!(headers.contains(&("Transfer-Encoding", "chunked".to_string())));
    assert!(!headers.iter().any(|(k, _)| *k == "Content-Length"));

    let body = concat_blocking(&mut message).unwrap();
    assert!(body.windows(5).any(|w| w == b"Name:"));
}

// ─── Escaping ───────────────────────────────────────────────────────

#[test]
fn test_escaped_names_decode_back() {
    let originals = [
        "plain",
        "quote\"inside",
        "back\\slash",
        "line\r\nbreak",
        "tab\tand\x00nul\x1f",
        "esc\x1bkept",
        "ünïcødé \"mixed\\\x01",
    ];

    for original in originals {
        let mut field = DataField::new(original, "v");
        let headers = String::from_utf8(field.render_headers().to_vec()).unwrap();
        let param = headers
            .strip_prefix("Content-Disposition: form-data; ")
            .and_then(|h| h.strip_suffix("\r\n\r\n"))
            .unwrap();
        assert!(!param[6..param.len() - 1].contains('"'), "unescaped quote in {param:?}");
        assert_eq!(unescape_param(param, "name"), original);
    }
}

// ─── Boundary ───────────────────────────────────────────────────────

#[test]
fn test_boundary_extraction() {
    assert_eq!(
        boundary_from_content_type(Some(&b"multipart/form-data; boundary=\"abc123\""[..])),
        Some(&b"abc123"[..])
    );
    assert_eq!(boundary_from_content_type(Some(&b"text/plain"[..])), None);
}

#[test]
fn test_generated_boundary_round_trips_through_header() {
    let message = MultipartStream::new(FormData::new(), Vec::<(String, FileSpec)>::new()).unwrap();
    assert_eq!(message.boundary().len(), 32);
    assert_eq!(
        boundary_from_content_type(Some(message.content_type().as_bytes())),
        Some(message.boundary())
    );
}

// ─── Caching ────────────────────────────────────────────────────────

#[test]
fn test_render_twice_returns_cached_bytes() {
    let mut data = DataField::new("a", "original");
    let first = data.render();
    data.value = "mutated".into();
    assert_eq!(data.render(), first);

    let mut file = FileField::new("f", FileSpec::simple("t.txt", "original")).unwrap();
    let first: Vec<Bytes> = file.render().collect::<Result<_>>().unwrap();
    *file.source_mut() = FileSource::from("mutated");
    let second: Vec<Bytes> = file.render().collect::<Result<_>>().unwrap();
    assert_eq!(first, second);
}

// ─── Validation ─────────────────────────────────────────────────────

#[test]
fn test_invalid_form_data_is_rejected() {
    let err = FormData::from_json(&json!({"nested": {"x": 1}})).unwrap_err();
    assert!(err.is_validation());

    let err = DataField::from_raw_name(b"\xc3\x28", "v").unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_blocking_render_rejects_async_source() {
    let source = FileSource::stream(stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"x"))]));
    let mut message = bounded(FormData::new(), vec![("f", FileSpec::simple("s.bin", source))]);
    assert_eq!(message.content_length(), None);

    let results: Vec<Result<Bytes>> = message.iter_chunks().collect();
    let last = results.last().unwrap();
    assert!(matches!(last, Err(e) if e.is_validation()));
    // Delimiter and headers were emitted before the failure ended the body.
    assert_eq!(results.len(), 3);
}

// ─── Async producer ─────────────────────────────────────────────────

#[tokio::test]
async fn test_async_matches_blocking_for_sync_sources() {
    let data = FormData::new().field("a", "1").list("b", ["x", "y"]);
    let build = || {
        bounded(
            data.clone(),
            vec![
                ("f", FileSpec::simple("t.txt", "hi")),
                ("r", FileSpec::simple("r.bin", FileSource::reader(Cursor::new(vec![9u8; 70_000])))),
            ],
        )
    };

    let blocking = build().to_bytes().unwrap();
    let mut message = build();
    let streamed = concat_async(message.aiter_chunks()).await.unwrap();
    assert_eq!(streamed, blocking);
    assert_eq!(message.content_length(), Some(streamed.len() as u64));
}

#[tokio::test]
async fn test_async_stream_source() {
    let chunks = vec![
        Ok::<_, io::Error>(Bytes::from_static(b"hello ")),
        Ok(Bytes::from_static(b"world")),
    ];
    let message = bounded(
        FormData::new().field("k", "v"),
        vec![("f", FileSpec::simple("s.txt", FileSource::stream(stream::iter(chunks))))],
    );

    let body = concat_async(message.into_async_stream()).await.unwrap();
    let body = String::from_utf8(body).unwrap();
    assert!(body.ends_with(
        "filename=\"s.txt\"\r\nContent-Type: text/plain\r\n\r\nhello world\r\n--BOUND--\r\n"
    ));
}

#[tokio::test]
async fn test_async_text_chunks_are_rejected() {
    let source = FileSource::stream(stream::iter(vec![Ok::<_, io::Error>("text mode")]));
    let mut message = bounded(FormData::new(), vec![("f", FileSpec::simple("s.txt", source))]);

    let err = concat_async(message.aiter_chunks()).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_async_read_error_propagates_and_ends_stream() {
    let chunks = vec![
        Ok(Bytes::from_static(b"partial")),
        Err(io::Error::other("connection reset")),
        Ok(Bytes::from_static(b"never")),
    ];
    let mut message = bounded(
        FormData::new(),
        vec![("f", FileSpec::simple("s.bin", FileSource::stream(stream::iter(chunks))))],
    );

    let items: Vec<Result<Bytes>> = message.aiter_chunks().collect().await;
    assert!(matches!(items.last(), Some(Err(FormError::Io { .. }))));
    assert_eq!(&items[2].as_ref().unwrap()[..], b"partial");
    assert_eq!(items.len(), 4);
}
