use bytes::Bytes;
use futures_util::stream;
use http::StatusCode;
use multipart_ota::{
    FileDisposition, FileInfo, FormData, FormField, FormHandler, MultipartDecoder, Rejection, SizeLimit,
};

#[derive(Debug, Default, PartialEq)]
struct Collected {
    fields: Vec<(String, String)>,
    files: Vec<(String, String, Vec<u8>)>,
    file_completions: usize,
    done: bool,
}

impl FormHandler for Collected {
    fn on_field(&mut self, field: FormField) -> Result<(), Rejection> {
        self.fields.push((field.name().to_owned(), field.text()));
        Ok(())
    }

    fn on_file(&mut self, file: &FileInfo) -> Result<FileDisposition, Rejection> {
        self.files.push((file.name.clone(), file.file_name.clone(), Vec::new()));
        Ok(FileDisposition::Accept)
    }

    fn on_file_chunk(&mut self, data: &[u8]) -> Result<(), Rejection> {
        if let Some(file) = self.files.last_mut() {
            file.2.extend_from_slice(data);
        }
        Ok(())
    }

    fn on_file_complete(&mut self) -> Result<(), Rejection> {
        self.file_completions += 1;
        Ok(())
    }

    fn on_complete(&mut self) -> Result<(), Rejection> {
        self.done = true;
        Ok(())
    }
}

const BODY: &str = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"My Field\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"File Field\"; filename=\"a-text-file.txt\"\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";

fn decode_chunks<'a, I>(boundary: &str, chunks: I) -> (multipart_ota::Result<()>, Collected)
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut decoder = MultipartDecoder::new(boundary, FormData::new(Collected::default()));
    for chunk in chunks {
        assert_eq!(decoder.write(chunk), chunk.len());
    }
    let result = decoder.finish();
    (result, decoder.into_handler().into_handler())
}

#[tokio::test]
async fn test_multipart_basic() {
    let stream = stream::iter(
        BODY.chars()
            .map(|ch| ch.to_string())
            .map(|part| Ok::<_, std::io::Error>(Bytes::copy_from_slice(part.as_bytes()))),
    );

    let mut decoder = MultipartDecoder::new("X-BOUNDARY", FormData::new(Collected::default()));
    assert_eq!(decoder.write_stream(stream).await, Ok(()));

    let collected = decoder.into_handler().into_handler();
    assert_eq!(collected.fields, vec![("My Field".to_owned(), "abcd".to_owned())]);
    assert_eq!(
        collected.files,
        vec![(
            "File Field".to_owned(),
            "a-text-file.txt".to_owned(),
            b"Hello world\nHello\r\nWorld\rAgain".to_vec()
        )]
    );
    assert_eq!(collected.file_completions, 1);
    assert!(collected.done);
}

#[tokio::test]
async fn test_multipart_empty() {
    let stream = stream::iter(
        "--X-BOUNDARY--\r\n"
            .chars()
            .map(|ch| Ok::<_, std::io::Error>(Bytes::from(ch.to_string()))),
    );

    let mut decoder = MultipartDecoder::new("X-BOUNDARY", FormData::new(Collected::default()));
    assert_eq!(decoder.write_stream(stream).await, Ok(()));
    assert_eq!(
        decoder.into_handler().into_handler(),
        Collected {
            done: true,
            ..Collected::default()
        }
    );
}

#[tokio::test]
async fn test_stream_error_latches() {
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(b"--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nab")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset")),
        Ok(Bytes::from_static(b"\r\n--X-BOUNDARY--\r\n")),
    ];

    let mut decoder = MultipartDecoder::new("X-BOUNDARY", FormData::new(Collected::default()));
    let err = decoder.write_stream(stream::iter(chunks)).await.unwrap_err();
    assert_eq!(err, multipart_ota::Error::StreamReadFailed("connection reset".to_owned()));
    assert_eq!(decoder.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!decoder.handler().handler().done);
}

#[cfg(feature = "tokio-io")]
#[tokio::test]
async fn test_write_reader() {
    let mut decoder = MultipartDecoder::new("X-BOUNDARY", FormData::new(Collected::default()));
    assert_eq!(decoder.write_reader(BODY.as_bytes()).await, Ok(()));
    assert_eq!(decoder.handler().handler().files.len(), 1);
}

#[test]
fn test_boundary_split_invariance() {
    let body = BODY.as_bytes();
    let (expected_result, expected) = decode_chunks("X-BOUNDARY", std::iter::once(body));
    assert_eq!(expected_result, Ok(()));

    for split in 0..=body.len() {
        let (a, b) = body.split_at(split);
        let (result, collected) = decode_chunks("X-BOUNDARY", vec![a, b]);
        assert_eq!(result, Ok(()), "split at {}", split);
        assert_eq!(collected, expected, "split at {}", split);
    }
}

#[test]
fn test_chunk_sizes() {
    let body = BODY.as_bytes();
    let (_, expected) = decode_chunks("X-BOUNDARY", std::iter::once(body));

    for size in 1..=body.len() {
        let (result, collected) = decode_chunks("X-BOUNDARY", body.chunks(size));
        assert_eq!(result, Ok(()), "chunk size {}", size);
        assert_eq!(collected, expected, "chunk size {}", size);
    }
}

#[test]
fn test_file_body_is_forwarded_exactly() {
    let content: &[u8] = b"\r\n--X-BOUNDAR\r\n-\r\n--X-BOUNDAR-Y\r\r\n\n--\x00\xff";
    let mut body = b"preamble\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x\"\r\n\r\n".to_vec();
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n--X-BOUNDARY--");

    for size in 1..=body.len() {
        let (result, collected) = decode_chunks("X-BOUNDARY", body.chunks(size));
        assert_eq!(result, Ok(()), "chunk size {}", size);
        assert_eq!(collected.files.len(), 1);
        assert_eq!(collected.files[0].2, content, "chunk size {}", size);
        assert_eq!(collected.file_completions, 1);
    }
}

#[test]
fn test_lenient_line_breaks_around_delimiters() {
    let body = b"--X-BOUNDARY  \nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\n--X-BOUNDARY\t\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\n2\r\n--X-BOUNDARY--";
    let (result, collected) = decode_chunks("X-BOUNDARY", std::iter::once(&body[..]));
    assert_eq!(result, Ok(()));
    assert_eq!(
        collected.fields,
        vec![("a".to_owned(), "1".to_owned()), ("b".to_owned(), "2".to_owned())]
    );
}

#[test]
fn test_header_lines_require_crlf() {
    let body = b"--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"a\"\n\r\n1\r\n--X-BOUNDARY--";
    let (result, collected) = decode_chunks("X-BOUNDARY", std::iter::once(&body[..]));
    assert_eq!(result, Err(multipart_ota::Error::MalformedHeaderLine { byte: b'\n' }));
    assert_eq!(result.unwrap_err().status(), StatusCode::BAD_REQUEST);
    assert!(collected.fields.is_empty());
}

#[test]
fn test_malformed_delimiter_latches() {
    let mut decoder = MultipartDecoder::new("X-BOUNDARY", FormData::new(Collected::default()));
    decoder.write(b"--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--X-BOUNDARY!");
    assert_eq!(decoder.error(), Some(&multipart_ota::Error::MalformedDelimiter { byte: b'!' }));

    for _ in 0..3 {
        assert_eq!(decoder.write(b"\r\n--X-BOUNDARY--\r\n"), 18);
        assert_eq!(decoder.error(), Some(&multipart_ota::Error::MalformedDelimiter { byte: b'!' }));
    }
    assert!(decoder.handler().handler().fields.is_empty());
    assert_eq!(decoder.finish(), Err(multipart_ota::Error::MalformedDelimiter { byte: b'!' }));
}

#[test]
fn test_long_boundary_is_truncated() {
    let boundary = "b".repeat(100);
    let truncated = &boundary[..70];
    let body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nvalue\r\n--{}--\r\n",
        truncated, truncated
    );
    let (result, collected) = decode_chunks(&boundary, body.as_bytes().chunks(3));
    assert_eq!(result, Ok(()));
    assert_eq!(collected.fields, vec![("a".to_owned(), "value".to_owned())]);
}

#[test]
fn test_header_block_limit() {
    let mut decoder = MultipartDecoder::with_size_limit(
        "X-BOUNDARY",
        FormData::new(Collected::default()),
        &SizeLimit::new().header_block(32),
    );
    decoder.write(BODY.as_bytes());
    let err = decoder.finish().unwrap_err();
    assert_eq!(err, multipart_ota::Error::HeaderSizeExceeded { limit: 32 });
    assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn test_truncated_body_releases_file() {
    let body = b"--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x\"\r\n\r\npartial";
    let (result, collected) = decode_chunks("X-BOUNDARY", std::iter::once(&body[..]));
    assert_eq!(result, Err(multipart_ota::Error::IncompleteStream));
    assert_eq!(collected.files[0].2, b"partial");
    assert_eq!(collected.file_completions, 1);
    assert!(!collected.done);
}

#[cfg(feature = "json")]
#[test]
fn test_json_field() {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Meta {
        version: String,
        build: u32,
    }

    struct JsonForm(Option<Meta>);

    impl FormHandler for JsonForm {
        fn on_field(&mut self, field: FormField) -> Result<(), Rejection> {
            self.0 = Some(field.json().map_err(Rejection::from)?);
            Ok(())
        }
    }

    let body = b"--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"meta\"\r\nContent-Type: application/json\r\n\r\n{\"version\":\"1.2.0\",\"build\":7}\r\n--X-BOUNDARY--\r\n";
    let mut decoder = MultipartDecoder::new("X-BOUNDARY", FormData::new(JsonForm(None)));
    decoder.write(body);
    assert_eq!(decoder.finish(), Ok(()));
    assert_eq!(
        decoder.into_handler().into_handler().0,
        Some(Meta {
            version: "1.2.0".to_owned(),
            build: 7
        })
    );
}
