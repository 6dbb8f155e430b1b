use http::header::{self, HeaderMap};

use crate::constants;

/// The `Content-Disposition: form-data; name="..."; filename="..."` header of
/// one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContentDisposition {
    pub(crate) field_name: String,
    pub(crate) file_name: Option<String>,
}

impl ContentDisposition {
    /// Returns `None` unless the part carries a `form-data` disposition with a
    /// `name` parameter.
    pub fn parse(headers: &HeaderMap) -> Option<ContentDisposition> {
        let value = headers.get(header::CONTENT_DISPOSITION)?;
        let value = String::from_utf8_lossy(value.as_bytes());

        let mut params = value.split(';').map(str::trim);
        if !params.next()?.eq_ignore_ascii_case(constants::FORM_DATA) {
            return None;
        }

        let mut field_name = None;
        let mut file_name = None;

        for param in params {
            if field_name.is_none() {
                if let Some(name) = strip_param(param, constants::FIELD_NAME_PARAM) {
                    field_name = Some(unquote(name).to_owned());
                }
            }
            if file_name.is_none() {
                if let Some(name) = strip_param(param, constants::FILE_NAME_PARAM) {
                    file_name = Some(unquote(name).to_owned());
                }
            }
        }

        Some(ContentDisposition {
            field_name: field_name?,
            file_name,
        })
    }
}

fn strip_param<'a>(param: &'a str, prefix: &str) -> Option<&'a str> {
    if param.len() >= prefix.len() && param.is_char_boundary(prefix.len()) {
        let (key, value) = param.split_at(prefix.len());
        if key.eq_ignore_ascii_case(prefix) {
            return Some(value);
        }
    }
    None
}

fn unquote(value: &str) -> &str {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}
