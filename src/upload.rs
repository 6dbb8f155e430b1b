use http::StatusCode;

use crate::firmware::{BootConfig, FirmwareInstaller, Flash, Verifier};
use crate::form_data::{FileDisposition, FileInfo, FormHandler};
use crate::Rejection;

const DEFAULT_FIELD_NAME: &str = "firmware";

/// A [`FormHandler`] that installs the update package uploaded as a file.
///
/// Exactly one file is accepted, under the field name `firmware` unless
/// configured otherwise. Its bytes stream into a [`FirmwareInstaller`], and
/// once the message is complete the install outcome decides the response
/// status: image problems are `400 Bad Request`, device problems `500
/// Internal Server Error`.
///
/// # Examples
///
/// ```
/// use ed25519_dalek::SigningKey;
/// use multipart_ota::firmware::{
///     Ed25519Verifier, FirmwareInstaller, FlashLayout, MemoryBootConfig, MemoryFlash, SlotTable, UpdatePackage,
/// };
/// use multipart_ota::{FirmwareUpload, FormData, MultipartDecoder};
///
/// let key = SigningKey::from_bytes(&[7; 32]);
/// let package = UpdatePackage::new().image(0x10_2000, vec![1; 64]).sign(&key).unwrap();
///
/// let mut body = b"--B\r\nContent-Disposition: form-data; name=\"firmware\"; filename=\"fw.bin\"\r\n\r\n".to_vec();
/// body.extend_from_slice(&package);
/// body.extend_from_slice(b"\r\n--B--\r\n");
///
/// let installer = FirmwareInstaller::new(
///     MemoryFlash::new(0x40_0000),
///     MemoryBootConfig::new(SlotTable::new(vec![0x2000, 0x10_2000], 0)),
///     Ed25519Verifier::new(key.verifying_key()),
///     FlashLayout::new(0x40_0000),
/// );
/// let mut decoder = MultipartDecoder::new("B", FormData::new(FirmwareUpload::new(installer)));
/// decoder.write(&body);
///
/// assert!(decoder.finish().is_ok());
/// ```
pub struct FirmwareUpload<F: Flash, B, V> {
    installer: FirmwareInstaller<F, B, V>,
    field_name: String,
    received: bool,
}

impl<F, B, V> FirmwareUpload<F, B, V>
where
    F: Flash,
    B: BootConfig,
    V: Verifier,
{
    pub fn new(installer: FirmwareInstaller<F, B, V>) -> FirmwareUpload<F, B, V> {
        FirmwareUpload {
            installer,
            field_name: DEFAULT_FIELD_NAME.to_owned(),
            received: false,
        }
    }

    /// Accepts the package under `name` instead of `firmware`.
    pub fn with_field_name<N: Into<String>>(mut self, name: N) -> FirmwareUpload<F, B, V> {
        self.field_name = name.into();
        self
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// The result of the upload so far.
    pub fn outcome(&self) -> crate::Result<()> {
        if !self.received {
            return Err(Rejection::bad_request("no firmware file uploaded").into());
        }

        match self.installer.error() {
            Some(err) => Err(err.clone()),
            None if self.installer.is_complete() => Ok(()),
            None => Err(crate::Error::IncompleteUpdate),
        }
    }

    pub fn installer(&self) -> &FirmwareInstaller<F, B, V> {
        &self.installer
    }

    pub fn into_installer(self) -> FirmwareInstaller<F, B, V> {
        self.installer
    }
}

impl<F, B, V> FormHandler for FirmwareUpload<F, B, V>
where
    F: Flash,
    B: BootConfig,
    V: Verifier,
{
    fn on_file(&mut self, file: &FileInfo) -> Result<FileDisposition, Rejection> {
        if file.name != self.field_name {
            return Err(
                Rejection::new(StatusCode::NOT_ACCEPTABLE).with_reason(format!("unexpected file field '{}'", file.name))
            );
        }
        if self.received {
            return Err(Rejection::bad_request("more than one firmware file"));
        }

        info!("receiving firmware '{}'", file.file_name);
        self.received = true;
        Ok(FileDisposition::Accept)
    }

    fn on_file_chunk(&mut self, data: &[u8]) -> Result<(), Rejection> {
        self.installer.write(data);
        Ok(())
    }

    fn on_file_complete(&mut self) -> Result<(), Rejection> {
        // The outcome stays latched in the installer and is reported by
        // `on_complete`.
        if let Err(err) = self.installer.finish() {
            debug!("firmware file ended with a failed install: {}", err);
        }
        Ok(())
    }

    fn on_complete(&mut self) -> Result<(), Rejection> {
        self.outcome().map_err(Rejection::from)
    }
}
