use std::convert::TryFrom;

use bytes::BytesMut;
use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::constants::{CR, LF};
use crate::state::HeaderPhase;

/// Incrementally parses the `name: value CRLF ... CRLF` header block of one
/// part. Partial names and values are kept across calls.
pub(crate) struct HeaderParser {
    phase: HeaderPhase,
    name: BytesMut,
    value: BytesMut,
    headers: HeaderMap,
    consumed: usize,
    limit: usize,
}

impl HeaderParser {
    pub fn new(limit: usize) -> Self {
        HeaderParser {
            phase: HeaderPhase::LineStart,
            name: BytesMut::new(),
            value: BytesMut::new(),
            headers: HeaderMap::new(),
            consumed: 0,
            limit,
        }
    }

    /// Prepares for the header block of the next part.
    pub fn reset(&mut self) {
        self.phase = HeaderPhase::LineStart;
        self.name.clear();
        self.value.clear();
        self.headers.clear();
        self.consumed = 0;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Feeds header bytes. Returns the number of bytes that belonged to the
    /// header block once the terminating blank line was seen, `None` if more
    /// header bytes are expected.
    pub fn parse(&mut self, data: &[u8]) -> crate::Result<Option<usize>> {
        for (idx, &byte) in data.iter().enumerate() {
            self.consumed += 1;
            if self.consumed > self.limit {
                return Err(crate::Error::HeaderSizeExceeded { limit: self.limit });
            }

            match self.phase {
                HeaderPhase::LineStart => match byte {
                    CR => self.phase = HeaderPhase::BlankLineCr,
                    LF => return Err(crate::Error::MalformedHeaderLine { byte }),
                    b':' => return Err(crate::Error::EmptyHeaderName),
                    _ => {
                        self.name.clear();
                        self.name.extend_from_slice(&[byte]);
                        self.phase = HeaderPhase::Name;
                    }
                },
                HeaderPhase::Name => match byte {
                    b':' => {
                        if trim(&self.name).is_empty() {
                            return Err(crate::Error::EmptyHeaderName);
                        }
                        self.value.clear();
                        self.phase = HeaderPhase::Value;
                    }
                    CR | LF => return Err(crate::Error::HeaderNameLineBreak),
                    _ => self.name.extend_from_slice(&[byte]),
                },
                HeaderPhase::Value => match byte {
                    CR => {
                        self.commit()?;
                        self.phase = HeaderPhase::LineCr;
                    }
                    LF => return Err(crate::Error::MalformedHeaderLine { byte }),
                    _ => self.value.extend_from_slice(&[byte]),
                },
                HeaderPhase::LineCr => {
                    if byte != LF {
                        return Err(crate::Error::MalformedHeaderLine { byte });
                    }
                    self.phase = HeaderPhase::LineStart;
                }
                HeaderPhase::BlankLineCr => {
                    if byte != LF {
                        return Err(crate::Error::MalformedHeaderLine { byte });
                    }
                    return Ok(Some(idx + 1));
                }
            }
        }

        Ok(None)
    }

    fn commit(&mut self) -> crate::Result<()> {
        let name = trim(&self.name);
        let value = trim(&self.value);

        let header_name = HeaderName::try_from(name).map_err(|err| crate::Error::DecodeHeaderName {
            name: String::from_utf8_lossy(name).into_owned(),
            cause: err.to_string(),
        })?;

        let header_value = HeaderValue::try_from(value).map_err(|err| crate::Error::DecodeHeaderValue {
            value: value.to_vec(),
            cause: err.to_string(),
        })?;

        self.headers.append(header_name, header_value);
        Ok(())
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |idx| idx + 1);
    &bytes[start..end]
}
