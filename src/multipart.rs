use futures_util::pin_mut;
use futures_util::stream::{Stream, TryStreamExt};
use http::header::HeaderMap;
use http::StatusCode;
#[cfg(feature = "tokio-io")]
use tokio::io::AsyncRead;
#[cfg(feature = "tokio-io")]
use tokio_util::io::ReaderStream;

use crate::headers::HeaderParser;
use crate::scanner::{BoundaryScanner, ScanEvent};
use crate::size_limit::SizeLimit;
use crate::state::PartPhase;
use crate::Rejection;

/// Receives the pieces of a multipart body as the decoder finds them.
///
/// Returning a [`Rejection`] from any of the fallible hooks stops the decode;
/// the rejection's status becomes the outcome status.
pub trait PartHandler {
    /// Text before the first delimiter. Usually irrelevant.
    fn on_preamble(&mut self, _data: &[u8]) {}

    /// Text after the closing delimiter. Usually irrelevant.
    fn on_epilogue(&mut self, _data: &[u8]) {}

    /// Invoked at the beginning of each part once its headers are parsed.
    fn on_part_headers(&mut self, headers: &HeaderMap) -> Result<(), Rejection>;

    /// Invoked repeatedly with consecutive pieces of the current part's body.
    fn on_part_body(&mut self, data: &[u8]) -> Result<(), Rejection>;

    /// Invoked when the delimiter after a part was found.
    ///
    /// Also invoked, with its result ignored, when the message ends in the
    /// middle of a part body, so that resources held for the part can be
    /// released.
    fn on_part_complete(&mut self) -> Result<(), Rejection>;

    /// Invoked once the whole message was decoded successfully.
    fn on_complete(&mut self) -> Result<(), Rejection> {
        Ok(())
    }
}

impl<H: PartHandler + ?Sized> PartHandler for &mut H {
    fn on_preamble(&mut self, data: &[u8]) {
        (**self).on_preamble(data)
    }

    fn on_epilogue(&mut self, data: &[u8]) {
        (**self).on_epilogue(data)
    }

    fn on_part_headers(&mut self, headers: &HeaderMap) -> Result<(), Rejection> {
        (**self).on_part_headers(headers)
    }

    fn on_part_body(&mut self, data: &[u8]) -> Result<(), Rejection> {
        (**self).on_part_body(data)
    }

    fn on_part_complete(&mut self) -> Result<(), Rejection> {
        (**self).on_part_complete()
    }

    fn on_complete(&mut self) -> Result<(), Rejection> {
        (**self).on_complete()
    }
}

struct PartParser {
    phase: PartPhase,
    headers: HeaderParser,
    next_part_idx: usize,
}

impl PartParser {
    fn data<H: PartHandler>(&mut self, data: &[u8], handler: &mut H) -> crate::Result<()> {
        match self.phase {
            PartPhase::Preamble => handler.on_preamble(data),
            PartPhase::Epilogue => handler.on_epilogue(data),
            PartPhase::Headers => {
                if let Some(header_len) = self.headers.parse(data)? {
                    self.phase = PartPhase::Body;
                    debug!("part {} headers complete", self.next_part_idx - 1);

                    handler.on_part_headers(self.headers.headers())?;

                    if header_len < data.len() {
                        handler.on_part_body(&data[header_len..])?;
                    }
                }
            }
            PartPhase::Body => handler.on_part_body(data)?,
        }
        Ok(())
    }

    fn delimiter<H: PartHandler>(&mut self, last: bool, handler: &mut H) -> crate::Result<()> {
        match self.phase {
            PartPhase::Preamble => {}
            PartPhase::Body => handler.on_part_complete()?,
            PartPhase::Headers => return Err(crate::Error::DelimiterInHeaders),
            PartPhase::Epilogue => return Err(crate::Error::DelimiterAfterClose),
        }

        if last {
            debug!("closing delimiter after {} part(s)", self.next_part_idx);
            self.phase = PartPhase::Epilogue;
        } else {
            self.phase = PartPhase::Headers;
            self.headers.reset();
            self.next_part_idx += 1;
        }
        Ok(())
    }
}

/// Decodes a `multipart/*` body pushed to it in arbitrarily sized chunks.
///
/// The decoder never buffers the body. It keeps at most one delimiter's worth
/// of bytes between calls, plus the header block of the current part.
///
/// # Examples
///
/// ```
/// use http::header::HeaderMap;
/// use multipart_ota::{MultipartDecoder, PartHandler, Rejection};
///
/// #[derive(Default)]
/// struct Collect(Vec<u8>);
///
/// impl PartHandler for Collect {
///     fn on_part_headers(&mut self, _headers: &HeaderMap) -> Result<(), Rejection> {
///         Ok(())
///     }
///
///     fn on_part_body(&mut self, data: &[u8]) -> Result<(), Rejection> {
///         self.0.extend_from_slice(data);
///         Ok(())
///     }
///
///     fn on_part_complete(&mut self) -> Result<(), Rejection> {
///         Ok(())
///     }
/// }
///
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
/// let mut decoder = MultipartDecoder::new("X-BOUNDARY", Collect::default());
///
/// for chunk in data.as_bytes().chunks(5) {
///     decoder.write(chunk);
/// }
///
/// assert!(decoder.finish().is_ok());
/// assert_eq!(decoder.handler().0, b"abcd");
/// ```
pub struct MultipartDecoder<H> {
    scanner: BoundaryScanner,
    parts: PartParser,
    handler: H,
    error: Option<crate::Error>,
    finished: bool,
}

impl<H: PartHandler> MultipartDecoder<H> {
    /// Construct a new `MultipartDecoder` for the given boundary, which is
    /// truncated to 70 bytes.
    pub fn new<B: AsRef<str>>(boundary: B, handler: H) -> MultipartDecoder<H> {
        MultipartDecoder::with_size_limit(boundary, handler, &SizeLimit::default())
    }

    /// Construct a new `MultipartDecoder` whose part header blocks are bounded
    /// by `size_limit`.
    pub fn with_size_limit<B: AsRef<str>>(boundary: B, handler: H, size_limit: &SizeLimit) -> MultipartDecoder<H> {
        MultipartDecoder {
            scanner: BoundaryScanner::new(boundary.as_ref()),
            parts: PartParser {
                phase: PartPhase::Preamble,
                headers: HeaderParser::new(size_limit.header_block),
                next_part_idx: 0,
            },
            handler,
            error: None,
            finished: false,
        }
    }

    /// Feeds the next chunk of the body.
    ///
    /// Always reports the whole chunk as consumed, also after the decode
    /// failed or finished; the outcome is observed through [`finish`],
    /// [`error`] and [`status`].
    ///
    /// [`finish`]: MultipartDecoder::finish
    /// [`error`]: MultipartDecoder::error
    /// [`status`]: MultipartDecoder::status
    pub fn write(&mut self, chunk: &[u8]) -> usize {
        if self.error.is_none() && !self.finished {
            let MultipartDecoder {
                scanner,
                parts,
                handler,
                ..
            } = self;

            let result = scanner.scan(chunk, |event| match event {
                ScanEvent::Data(data) => parts.data(data, handler),
                ScanEvent::Delimiter { last } => parts.delimiter(last, handler),
            });

            if let Err(err) = result {
                self.latch(err);
            }
        }

        chunk.len()
    }

    /// Signals the end of the body and returns the outcome of the decode.
    ///
    /// Calling it again returns the same outcome.
    pub fn finish(&mut self) -> crate::Result<()> {
        if !self.finished && self.error.is_none() {
            if let Err(err) = self.complete() {
                self.latch(err);
            }
        }
        self.finished = true;

        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn complete(&mut self) -> crate::Result<()> {
        if self.scanner.in_open_close_delimiter() {
            self.parts.delimiter(true, &mut self.handler)?;
        }

        match self.parts.phase {
            PartPhase::Epilogue => {
                let residue = self.scanner.residue();
                if !residue.is_empty() {
                    self.handler.on_epilogue(residue);
                }
                self.scanner.clear_residue();

                self.handler.on_complete()?;
                Ok(())
            }
            PartPhase::Body => {
                let _ = self.handler.on_part_complete();
                Err(crate::Error::IncompleteStream)
            }
            PartPhase::Preamble | PartPhase::Headers => Err(crate::Error::IncompleteStream),
        }
    }

    fn latch(&mut self, err: crate::Error) {
        warn!("multipart decode failed: {}", err);
        self.error = Some(err);
    }

    /// Drives the decoder from a stream of chunks, then finishes it.
    pub async fn write_stream<S, O, E>(&mut self, stream: S) -> crate::Result<()>
    where
        S: Stream<Item = Result<O, E>>,
        O: AsRef<[u8]>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        pin_mut!(stream);

        loop {
            match stream.try_next().await {
                Ok(Some(chunk)) => {
                    self.write(chunk.as_ref());
                }
                Ok(None) => break,
                Err(err) => {
                    let err: Box<dyn std::error::Error + Send + Sync> = err.into();
                    if self.error.is_none() {
                        self.latch(crate::Error::StreamReadFailed(err.to_string()));
                    }
                    break;
                }
            }
        }

        self.finish()
    }

    /// Drives the decoder from an [`AsyncRead`] reader, then finishes it.
    ///
    /// # Optional
    ///
    /// This requires the optional `tokio-io` feature to be enabled.
    #[cfg(feature = "tokio-io")]
    pub async fn write_reader<R: AsyncRead>(&mut self, reader: R) -> crate::Result<()> {
        self.write_stream(ReaderStream::new(reader)).await
    }

    /// `true` unless the decode failed.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// `true` once [`finish`](MultipartDecoder::finish) was called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn error(&self) -> Option<&crate::Error> {
        self.error.as_ref()
    }

    /// The response status for the decode so far: `200 OK`, or the status
    /// derived from the latched error.
    pub fn status(&self) -> StatusCode {
        self.error.as_ref().map_or(StatusCode::OK, crate::Error::status)
    }

    /// The section of the body the decoder is currently in.
    pub fn phase(&self) -> PartPhase {
        self.parts.phase
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
