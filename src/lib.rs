//! A streaming `multipart/form-data` decoder and a signed firmware update
//! installer, for devices that cannot hold a request body in memory.
//!
//! The [`MultipartDecoder`] is pushed the body in chunks of any size and hands
//! the parts it finds to a [`PartHandler`]. [`FormData`] turns those parts
//! into form fields and files for a [`FormHandler`], and [`FirmwareUpload`]
//! streams an uploaded file into a [`FirmwareInstaller`], which verifies the
//! package signature before the new image is allowed to boot.
//!
//! # Examples
//!
//! ```
//! use multipart_ota::{FileDisposition, FileInfo, FormData, FormField, FormHandler, MultipartDecoder, Rejection};
//!
//! #[derive(Default)]
//! struct Upload {
//!     note: String,
//!     file: Vec<u8>,
//! }
//!
//! impl FormHandler for Upload {
//!     fn on_field(&mut self, field: FormField) -> Result<(), Rejection> {
//!         self.note = field.text();
//!         Ok(())
//!     }
//!
//!     fn on_file(&mut self, _file: &FileInfo) -> Result<FileDisposition, Rejection> {
//!         Ok(FileDisposition::Accept)
//!     }
//!
//!     fn on_file_chunk(&mut self, data: &[u8]) -> Result<(), Rejection> {
//!         self.file.extend_from_slice(data);
//!         Ok(())
//!     }
//! }
//!
//! # fn run() -> multipart_ota::Result<()> {
//! let content_type = "multipart/form-data; boundary=X-BOUNDARY";
//! let body = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"data\"; filename=\"a.bin\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
//!
//! let boundary = multipart_ota::parse_boundary(content_type)?;
//! let mut decoder = MultipartDecoder::new(boundary, FormData::new(Upload::default()));
//!
//! for chunk in body.as_bytes().chunks(7) {
//!     decoder.write(chunk);
//! }
//! decoder.finish()?;
//!
//! let upload = decoder.into_handler().into_handler();
//! assert_eq!(upload.note, "hello");
//! assert_eq!(upload.file, b"abcd");
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! ## Optional features
//!
//! * `log` (default): logs decoding and install progress through the `log`
//!   facade.
//! * `json`: adds [`FormField::json`].
//! * `tokio-io`: adds [`MultipartDecoder::write_reader`].

#[macro_use]
mod macros;

pub use error::{Error, Rejection};
pub use firmware::FirmwareInstaller;
pub use form_data::{FileDisposition, FileInfo, FormData, FormField, FormHandler};
pub use multipart::{MultipartDecoder, PartHandler};
pub use size_limit::SizeLimit;
pub use state::PartPhase;
pub use upload::FirmwareUpload;

mod buffer;
mod constants;
mod content_disposition;
mod error;
pub mod firmware;
mod form_data;
mod headers;
mod multipart;
mod scanner;
mod size_limit;
mod state;
mod upload;

/// A Result type often returned from methods that can have `multipart-ota`
/// errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> crate::Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(|err| crate::Error::DecodeContentType(err.to_string()))?;

    if m.type_() != mime::MULTIPART {
        return Err(crate::Error::NoMultipart);
    }

    if m.subtype() != mime::FORM_DATA {
        return Err(crate::Error::UnsupportedSubtype {
            subtype: m.subtype().as_str().to_owned(),
        });
    }

    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().trim_matches('"').to_owned())
        .filter(|name| !name.is_empty())
        .ok_or(crate::Error::NoBoundary)
}
