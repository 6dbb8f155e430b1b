use std::borrow::Cow;

use bytes::{Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use http::header::{self, HeaderMap};
use http::StatusCode;
#[cfg(feature = "json")]
use serde::de::DeserializeOwned;

use crate::content_disposition::ContentDisposition;
use crate::multipart::PartHandler;
use crate::size_limit::SizeLimit;
use crate::Rejection;

/// A form field without a `filename`, collected in memory.
#[derive(Debug, Clone)]
pub struct FormField {
    name: String,
    content_type: Option<mime::Mime>,
    idx: usize,
    value: Bytes,
}

impl FormField {
    /// The field name found in the `Content-Disposition` header.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the content type of the field.
    pub fn content_type(&self) -> Option<&mime::Mime> {
        self.content_type.as_ref()
    }

    /// The index of the part within the multipart body.
    pub fn index(&self) -> usize {
        self.idx
    }

    pub fn bytes(&self) -> &Bytes {
        &self.value
    }

    pub fn into_bytes(self) -> Bytes {
        self.value
    }

    /// Decodes the value as text using the charset of the part's
    /// `Content-Type`, falling back to `utf-8`.
    pub fn text(&self) -> String {
        self.text_with_charset("utf-8")
    }

    /// Decodes the value as text using the charset of the part's
    /// `Content-Type`, falling back to `default_encoding`.
    pub fn text_with_charset(&self, default_encoding: &str) -> String {
        let encoding_name = self
            .content_type()
            .and_then(|mime| mime.get_param(mime::CHARSET))
            .map(|charset| charset.as_str())
            .unwrap_or(default_encoding);

        let encoding = Encoding::for_label(encoding_name.as_bytes()).unwrap_or(UTF_8);

        let (text, _, _) = encoding.decode(&self.value);

        match text {
            Cow::Owned(s) => s,
            Cow::Borrowed(s) => String::from(s),
        }
    }

    /// Deserializes the value as JSON.
    ///
    /// # Optional
    ///
    /// This requires the optional `json` feature to be enabled.
    #[cfg(feature = "json")]
    pub fn json<T: DeserializeOwned>(&self) -> crate::Result<T> {
        serde_json::from_slice(&self.value).map_err(|err| crate::Error::DecodeJson(err.to_string()))
    }
}

/// Describes a file part before its body arrives.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub file_name: String,
    pub content_type: Option<mime::Mime>,
    pub index: usize,
}

/// What to do with the body of an offered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDisposition {
    /// Stream the body to [`FormHandler::on_file_chunk`].
    Accept,
    /// Drop the body silently.
    Skip,
}

/// Application hooks for `multipart/form-data` requests.
pub trait FormHandler {
    /// Invoked with every complete field that has no `filename`. Accepts
    /// everything by default.
    fn on_field(&mut self, _field: FormField) -> Result<(), Rejection> {
        Ok(())
    }

    /// Invoked when a part with a `filename` starts. Rejects every file with
    /// `406 Not Acceptable` by default.
    fn on_file(&mut self, _file: &FileInfo) -> Result<FileDisposition, Rejection> {
        Err(Rejection::new(StatusCode::NOT_ACCEPTABLE))
    }

    /// Invoked with consecutive pieces of an accepted file's body.
    fn on_file_chunk(&mut self, _data: &[u8]) -> Result<(), Rejection> {
        Ok(())
    }

    /// Invoked when an accepted file's body is complete, or when the message
    /// ended in the middle of it.
    fn on_file_complete(&mut self) -> Result<(), Rejection> {
        Ok(())
    }

    /// Invoked after the closing delimiter.
    fn on_complete(&mut self) -> Result<(), Rejection> {
        Ok(())
    }
}

enum CurrentPart {
    None,
    Field {
        name: String,
        content_type: Option<mime::Mime>,
        idx: usize,
        value: BytesMut,
        limit: usize,
    },
    File {
        accepted: bool,
    },
}

/// Adapts a [`FormHandler`] to the part level [`PartHandler`] interface by
/// routing each part to the field or the file path.
pub struct FormData<H> {
    handler: H,
    size_limit: SizeLimit,
    current: CurrentPart,
    next_idx: usize,
}

impl<H: FormHandler> FormData<H> {
    pub fn new(handler: H) -> FormData<H> {
        FormData::with_size_limit(handler, SizeLimit::default())
    }

    pub fn with_size_limit(handler: H, size_limit: SizeLimit) -> FormData<H> {
        FormData {
            handler,
            size_limit,
            current: CurrentPart::None,
            next_idx: 0,
        }
    }

    pub fn size_limit(&self) -> &SizeLimit {
        &self.size_limit
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

impl<H: FormHandler> PartHandler for FormData<H> {
    fn on_part_headers(&mut self, headers: &HeaderMap) -> Result<(), Rejection> {
        let idx = self.next_idx;
        self.next_idx += 1;

        let content_disposition = ContentDisposition::parse(headers)
            .ok_or_else(|| Rejection::bad_request("part without form-data Content-Disposition name"))?;

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<mime::Mime>().ok());

        self.current = match content_disposition.file_name {
            None => {
                let limit = self
                    .size_limit
                    .extract_size_limit_for(Some(&content_disposition.field_name));
                debug!("form field '{}'", content_disposition.field_name);
                CurrentPart::Field {
                    name: content_disposition.field_name,
                    content_type,
                    idx,
                    value: BytesMut::new(),
                    limit,
                }
            }
            Some(file_name) => {
                let file = FileInfo {
                    name: content_disposition.field_name,
                    file_name,
                    content_type,
                    index: idx,
                };
                debug!("form file '{}' ({})", file.name, file.file_name);
                let disposition = self.handler.on_file(&file)?;
                CurrentPart::File {
                    accepted: disposition == FileDisposition::Accept,
                }
            }
        };

        Ok(())
    }

    fn on_part_body(&mut self, data: &[u8]) -> Result<(), Rejection> {
        match &mut self.current {
            CurrentPart::Field { name, value, limit, .. } => {
                if value.len() + data.len() > *limit {
                    return Err(crate::Error::FieldSizeExceeded {
                        limit: *limit,
                        field_name: Some(name.clone()),
                    }
                    .into());
                }
                value.extend_from_slice(data);
                Ok(())
            }
            CurrentPart::File { accepted: true } => self.handler.on_file_chunk(data),
            CurrentPart::File { accepted: false } | CurrentPart::None => Ok(()),
        }
    }

    fn on_part_complete(&mut self) -> Result<(), Rejection> {
        match std::mem::replace(&mut self.current, CurrentPart::None) {
            CurrentPart::Field {
                name,
                content_type,
                idx,
                value,
                ..
            } => self.handler.on_field(FormField {
                name,
                content_type,
                idx,
                value: value.freeze(),
            }),
            CurrentPart::File { accepted: true } => self.handler.on_file_complete(),
            CurrentPart::File { accepted: false } | CurrentPart::None => Ok(()),
        }
    }

    fn on_complete(&mut self) -> Result<(), Rejection> {
        self.handler.on_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MultipartDecoder;

    #[derive(Default)]
    struct Form {
        fields: Vec<(String, String)>,
        files: Vec<(String, String, Vec<u8>)>,
        completed_files: usize,
    }

    impl FormHandler for Form {
        fn on_field(&mut self, field: FormField) -> Result<(), Rejection> {
            self.fields.push((field.name().to_owned(), field.text()));
            Ok(())
        }

        fn on_file(&mut self, file: &FileInfo) -> Result<FileDisposition, Rejection> {
            if file.name == "skip" {
                return Ok(FileDisposition::Skip);
            }
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
            self.completed_files += 1;
            Ok(())
        }
    }

    fn decode<H: FormHandler>(body: &[u8], form: FormData<H>) -> (crate::Result<()>, H) {
        let mut decoder = MultipartDecoder::new("B", form);
        decoder.write(body);
        let result = decoder.finish();
        (result, decoder.into_handler().into_handler())
    }

    #[test]
    fn test_field_and_file_routing() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nvalue\r\n--B\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"x\"\r\n\r\n\x00\x01\r\n\x02\r\n--B\r\nContent-Disposition: form-data; name=\"skip\"; filename=\"y\"\r\n\r\nzzz\r\n--B--\r\n";
        let (result, form) = decode(body, FormData::new(Form::default()));
        assert_eq!(result, Ok(()));
        assert_eq!(form.fields, vec![("f".to_owned(), "value".to_owned())]);
        assert_eq!(
            form.files,
            vec![("upload".to_owned(), "x".to_owned(), b"\x00\x01\r\n\x02".to_vec())]
        );
        assert_eq!(form.completed_files, 1);
    }

    #[test]
    fn test_default_handler_rejects_files() {
        struct FieldsOnly;
        impl FormHandler for FieldsOnly {}

        let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x\"\r\n\r\ndata\r\n--B--\r\n";
        let (result, _) = decode(body, FormData::new(FieldsOnly));
        assert_eq!(result.unwrap_err().status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn test_part_without_disposition_is_bad_request() {
        let body = b"--B\r\nContent-Type: text/plain\r\n\r\ndata\r\n--B--\r\n";
        let (result, _) = decode(body, FormData::new(Form::default()));
        assert_eq!(result.unwrap_err().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_field_size_limit() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\ntoo long\r\n--B--\r\n";
        let form = FormData::with_size_limit(Form::default(), SizeLimit::new().for_field("note", 4));
        let (result, form) = decode(body, form);
        assert_eq!(result.unwrap_err().status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(form.fields.is_empty());
    }

    #[test]
    fn test_field_text_with_charset() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"t\"\r\nContent-Type: text/plain; charset=iso-8859-1\r\n\r\ncaf\xe9\r\n--B--\r\n";
        let (result, form) = decode(body, FormData::new(Form::default()));
        assert_eq!(result, Ok(()));
        assert_eq!(form.fields, vec![("t".to_owned(), "café".to_owned())]);
    }
}
