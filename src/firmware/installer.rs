use std::io;

use super::envelope::{EnvelopeHeader, Fill, ImageHeader};
use super::signature::Verifier;
use super::slot::{select_slot, FlashLayout, SlotTable};
use super::{BootConfig, Flash, UPDATE_MAGIC};

/// The section of the update package the installer expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    ReadingEnvelopeHeader,
    ReadingImageHeader,
    SkippingImage,
    FlashingImage,
    ReadingChecksum,
    Complete,
    Error,
}

/// Installs a signed update package while it streams in.
///
/// The first image that fits a free slot is written to flash, every other
/// image is skipped. Every byte before the signature trailer is hashed, and
/// the slot becomes the boot slot only after the signature verified. When the
/// signature does not match, the first sector of the written slot is erased so
/// the unverified image can never boot.
///
/// # Examples
///
/// ```
/// use ed25519_dalek::SigningKey;
/// use multipart_ota::firmware::{
///     Ed25519Verifier, FirmwareInstaller, FlashLayout, MemoryBootConfig, MemoryFlash, SlotTable, UpdatePackage,
/// };
///
/// let key = SigningKey::from_bytes(&[7; 32]);
/// let package = UpdatePackage::new().image(0x10_2000, vec![0x5a; 64]).sign(&key).unwrap();
///
/// let flash = MemoryFlash::new(0x40_0000);
/// let boot = MemoryBootConfig::new(SlotTable::new(vec![0x2000, 0x10_2000], 0));
/// let verifier = Ed25519Verifier::new(key.verifying_key());
/// let mut installer = FirmwareInstaller::new(flash, boot, verifier, FlashLayout::new(0x40_0000));
///
/// for chunk in package.chunks(100) {
///     installer.write(chunk);
/// }
///
/// assert!(installer.finish().is_ok());
/// assert_eq!(installer.boot_config().committed(), Some(1));
/// ```
pub struct FirmwareInstaller<F: Flash, B, V> {
    flash: F,
    boot: B,
    verifier: V,
    layout: FlashLayout,
    table: SlotTable,
    state: UpdateState,
    header: Fill<[u8; 8]>,
    signature: Fill<Vec<u8>>,
    images_left: u32,
    remaining: u32,
    address: u32,
    slot: Option<usize>,
    writer: Option<F::Writer>,
    error: Option<crate::Error>,
}

impl<F, B, V> FirmwareInstaller<F, B, V>
where
    F: Flash,
    B: BootConfig,
    V: Verifier,
{
    /// Creates an installer. The slot table is read from `boot` once, here.
    pub fn new(flash: F, boot: B, verifier: V, layout: FlashLayout) -> FirmwareInstaller<F, B, V> {
        let table = boot.snapshot();
        let signature = Fill::new(vec![0; verifier.signature_len()]);

        FirmwareInstaller {
            flash,
            boot,
            verifier,
            layout,
            table,
            state: UpdateState::ReadingEnvelopeHeader,
            header: Fill::new([0; 8]),
            signature,
            images_left: 0,
            remaining: 0,
            address: 0,
            slot: None,
            writer: None,
            error: None,
        }
    }

    /// Feeds the next piece of the package.
    ///
    /// Always reports the whole input as consumed. Once the installer
    /// completed or failed, further input is discarded.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let mut input = data;

        while !input.is_empty() {
            match self.state {
                UpdateState::ReadingEnvelopeHeader => {
                    input = self.fill_header(input);
                    if self.header.is_complete() {
                        let header = EnvelopeHeader::from_fill(&self.header);
                        if header.magic == UPDATE_MAGIC {
                            info!("starting firmware update with {} image(s)", header.count);
                            self.images_left = header.count;
                            self.next_image();
                        } else {
                            self.fail(crate::Error::UnrecognizedFormat { magic: header.magic });
                        }
                    }
                }
                UpdateState::ReadingImageHeader => {
                    input = self.fill_header(input);
                    if self.header.is_complete() {
                        let image = ImageHeader::from_fill(&self.header);
                        self.start_image(image);
                    }
                }
                UpdateState::FlashingImage => {
                    let (chunk, rest) = input.split_at(self.image_chunk_len(input));
                    input = rest;

                    if let Err(err) = self.write_flash(chunk) {
                        self.fail(err);
                        continue;
                    }
                    self.verifier.update(chunk);
                    self.remaining -= chunk.len() as u32;

                    if self.remaining == 0 {
                        self.finish_image();
                    }
                }
                UpdateState::SkippingImage => {
                    let (chunk, rest) = input.split_at(self.image_chunk_len(input));
                    input = rest;

                    self.verifier.update(chunk);
                    self.remaining -= chunk.len() as u32;

                    if self.remaining == 0 {
                        self.next_image();
                    }
                }
                UpdateState::ReadingChecksum => {
                    let n = self.signature.fill(input);
                    input = &input[n..];
                    if self.signature.is_complete() {
                        self.verify();
                    }
                }
                UpdateState::Complete | UpdateState::Error => break,
            }
        }

        data.len()
    }

    /// Signals the end of the package and returns the outcome of the install.
    ///
    /// A package that ended before its signature was complete fails with
    /// [`IncompleteUpdate`](crate::Error::IncompleteUpdate). Calling it again
    /// returns the same outcome.
    pub fn finish(&mut self) -> crate::Result<()> {
        match self.state {
            UpdateState::Complete => Ok(()),
            UpdateState::Error => Err(self.latched_error()),
            _ => {
                self.fail(crate::Error::IncompleteUpdate);
                Err(self.latched_error())
            }
        }
    }

    fn latched_error(&self) -> crate::Error {
        self.error.clone().unwrap_or(crate::Error::IncompleteUpdate)
    }

    fn fill_header<'a>(&mut self, input: &'a [u8]) -> &'a [u8] {
        let n = self.header.fill(input);
        self.verifier.update(&input[..n]);
        &input[n..]
    }

    fn image_chunk_len(&self, input: &[u8]) -> usize {
        input.len().min(self.remaining as usize)
    }

    fn start_image(&mut self, image: ImageHeader) {
        self.remaining = image.size;

        if self.slot.is_none() {
            if let Some(index) = select_slot(&image, &self.table, &self.layout) {
                let address = self.table.slots[index];
                info!(
                    "updating slot {} ({:#010x}..{:#010x})",
                    index,
                    address,
                    u64::from(address) + u64::from(image.size)
                );
                self.slot = Some(index);

                match self.flash.begin_write(address) {
                    Ok(writer) => {
                        self.writer = Some(writer);
                        self.address = address;
                        self.state = UpdateState::FlashingImage;
                        if self.remaining == 0 {
                            self.finish_image();
                        }
                    }
                    Err(err) => self.fail(crate::Error::FlashWrite {
                        address,
                        cause: err.to_string(),
                    }),
                }
                return;
            }
        }

        info!(
            "ignoring image for {:#010x}..{:#010x}",
            image.address,
            u64::from(image.address) + u64::from(image.size)
        );
        self.state = UpdateState::SkippingImage;
        if self.remaining == 0 {
            self.next_image();
        }
    }

    fn write_flash(&mut self, chunk: &[u8]) -> crate::Result<()> {
        let address = self.address;
        let writer = self.writer.as_mut().ok_or_else(|| crate::Error::FlashWrite {
            address,
            cause: "no open write session".to_owned(),
        })?;

        self.flash
            .write_chunk(writer, chunk)
            .map_err(|err| crate::Error::FlashWrite {
                address,
                cause: err.to_string(),
            })?;

        self.address = address.wrapping_add(chunk.len() as u32);
        Ok(())
    }

    fn finish_image(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = self.flash.finish_write(writer) {
                self.fail(crate::Error::FlashWrite {
                    address: self.address,
                    cause: err.to_string(),
                });
                return;
            }
        }
        self.next_image();
    }

    fn next_image(&mut self) {
        if self.images_left > 0 {
            self.images_left -= 1;
            self.header.reset();
            self.state = UpdateState::ReadingImageHeader;
        } else {
            self.state = UpdateState::ReadingChecksum;
            if self.signature.is_complete() {
                self.verify();
            }
        }
    }

    fn verify(&mut self) {
        if self.verifier.verify(self.signature.bytes()) {
            info!("signature verified");

            match self.slot {
                Some(index) => match self.boot.commit_active_slot(index) {
                    Ok(()) => {
                        info!("slot {} activated", index);
                        self.state = UpdateState::Complete;
                    }
                    Err(cause) => self.fail(crate::Error::ActivationFailed { slot: index, cause }),
                },
                None => self.fail(crate::Error::NoSuitableSlot),
            }
        } else {
            if let Some(index) = self.slot {
                let sector = self.table.slots[index] / self.layout.sector_size;
                warn!("erasing sector {} to keep the unverified image in slot {} from booting", sector, index);
                if let Err(err) = self.flash.erase_sector(sector) {
                    warn!("failed to erase sector {}: {}", sector, err);
                }
            }
            self.fail(crate::Error::SignatureMismatch);
        }
    }

    fn fail(&mut self, err: crate::Error) {
        warn!("firmware update failed: {}", err);
        self.writer = None;
        self.state = UpdateState::Error;
        self.error = Some(err);
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// `true` once the update was verified and activated.
    pub fn is_complete(&self) -> bool {
        self.state == UpdateState::Complete
    }

    /// `true` unless the install failed.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&crate::Error> {
        self.error.as_ref()
    }

    /// The slot the package is being written to, once one was chosen.
    pub fn selected_slot(&self) -> Option<usize> {
        self.slot
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn boot_config(&self) -> &B {
        &self.boot
    }

    pub fn into_parts(self) -> (F, B, V) {
        (self.flash, self.boot, self.verifier)
    }
}

impl<F, B, V> io::Write for FirmwareInstaller<F, B, V>
where
    F: Flash,
    B: BootConfig,
    V: Verifier,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(FirmwareInstaller::write(self, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::{Ed25519Verifier, MemoryBootConfig, MemoryFlash, UpdatePackage};
    use ed25519_dalek::SigningKey;

    const FLASH_SIZE: u32 = 0x40_0000;

    type Installer = FirmwareInstaller<MemoryFlash, MemoryBootConfig, Ed25519Verifier>;

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[7; 32])
    }

    fn installer(slots: Vec<u32>, active: usize) -> Installer {
        FirmwareInstaller::new(
            MemoryFlash::new(FLASH_SIZE),
            MemoryBootConfig::new(SlotTable::new(slots, active)),
            Ed25519Verifier::new(key().verifying_key()),
            FlashLayout::new(FLASH_SIZE),
        )
    }

    #[test]
    fn test_install_byte_by_byte() {
        let image: Vec<u8> = (0..32).collect();
        let package = UpdatePackage::new().image(0x10_2000, image.clone()).sign(&key()).unwrap();

        let mut installer = installer(vec![0x2000, 0x10_2000], 0);
        for byte in &package {
            assert_eq!(installer.write(std::slice::from_ref(byte)), 1);
        }

        assert_eq!(installer.state(), UpdateState::Complete);
        assert_eq!(installer.finish(), Ok(()));
        assert_eq!(installer.selected_slot(), Some(1));
        assert_eq!(installer.flash().read(0x10_2000, 32), &image[..]);
        assert_eq!(installer.boot_config().committed(), Some(1));
    }

    #[test]
    fn test_states_follow_package_sections() {
        let package = UpdatePackage::new().image(0x10_2000, vec![1; 8]).sign(&key()).unwrap();
        let mut installer = installer(vec![0x2000, 0x10_2000], 0);

        assert_eq!(installer.state(), UpdateState::ReadingEnvelopeHeader);
        installer.write(&package[..8]);
        assert_eq!(installer.state(), UpdateState::ReadingImageHeader);
        installer.write(&package[8..16]);
        assert_eq!(installer.state(), UpdateState::FlashingImage);
        installer.write(&package[16..24]);
        assert_eq!(installer.state(), UpdateState::ReadingChecksum);
        installer.write(&package[24..]);
        assert_eq!(installer.state(), UpdateState::Complete);
    }

    #[test]
    fn test_bad_magic() {
        let mut installer = installer(vec![0x2000, 0x10_2000], 0);
        installer.write(&[0x2b, 0xf0, 0x1a, 0xf0, 1, 0, 0]);
        assert!(installer.is_ok());
        installer.write(&[0]);
        assert_eq!(
            installer.error(),
            Some(&crate::Error::UnrecognizedFormat { magic: 0xf01a_f02b })
        );
        assert!(installer.flash().data().iter().all(|&b| b == 0xff));
    }

    #[test]
    fn test_only_first_fitting_image_is_flashed() {
        let package = UpdatePackage::new()
            .image(0x10_2000, vec![1; 16])
            .image(0x2000, vec![2; 16])
            .image(0x10_2000, vec![3; 16])
            .sign(&key())
            .unwrap();

        let mut installer = installer(vec![0x2000, 0x10_2000], 0);
        installer.write(&package);
        assert_eq!(installer.finish(), Ok(()));
        assert_eq!(installer.flash().read(0x10_2000, 16), &[1; 16]);
        assert_eq!(installer.flash().read(0x2000, 16), &[0xff; 16]);
    }

    #[test]
    fn test_zero_size_images() {
        let package = UpdatePackage::new()
            .image(0x2000, Vec::new())
            .image(0x10_2000, Vec::new())
            .sign(&key())
            .unwrap();

        let mut installer = installer(vec![0x2000, 0x10_2000], 0);
        installer.write(&package);
        assert_eq!(installer.finish(), Ok(()));
        assert_eq!(installer.boot_config().committed(), Some(1));
    }

    #[test]
    fn test_flash_failure_latches() {
        let package = UpdatePackage::new().image(0x10_2000, vec![1; 16]).sign(&key()).unwrap();
        let mut flash = MemoryFlash::new(FLASH_SIZE);
        flash.fail_writes(true);

        let mut installer = FirmwareInstaller::new(
            flash,
            MemoryBootConfig::new(SlotTable::new(vec![0x2000, 0x10_2000], 0)),
            Ed25519Verifier::new(key().verifying_key()),
            FlashLayout::new(FLASH_SIZE),
        );
        assert_eq!(installer.write(&package), package.len());
        assert_eq!(installer.state(), UpdateState::Error);

        let err = installer.finish().unwrap_err();
        assert!(matches!(err, crate::Error::FlashWrite { address: 0x10_2000, .. }));
        assert_eq!(err.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(installer.boot_config().committed(), None);
    }

    #[test]
    fn test_activation_failure() {
        let package = UpdatePackage::new().image(0x10_2000, vec![1; 16]).sign(&key()).unwrap();
        let mut boot = MemoryBootConfig::new(SlotTable::new(vec![0x2000, 0x10_2000], 0));
        boot.refuse_commit(true);

        let mut installer = FirmwareInstaller::new(
            MemoryFlash::new(FLASH_SIZE),
            boot,
            Ed25519Verifier::new(key().verifying_key()),
            FlashLayout::new(FLASH_SIZE),
        );
        installer.write(&package);
        assert!(matches!(
            installer.finish(),
            Err(crate::Error::ActivationFailed { slot: 1, .. })
        ));
    }

    #[test]
    fn test_mismatch_erases_slot_sector_of_layout() {
        let layout = FlashLayout::new(FLASH_SIZE).sector_size(0x2000);
        let mut package = UpdatePackage::new().image(0x10_4000, vec![1; 0x3000]).sign(&key()).unwrap();
        package[20] ^= 0x01;

        let mut installer = FirmwareInstaller::new(
            MemoryFlash::from_layout(&layout),
            MemoryBootConfig::new(SlotTable::new(vec![0x4000, 0x10_4000], 0)),
            Ed25519Verifier::new(key().verifying_key()),
            layout,
        );
        installer.write(&package);

        assert_eq!(installer.finish(), Err(crate::Error::SignatureMismatch));
        assert_eq!(installer.flash().erased_sectors(), &[0x10_4000 / 0x2000]);
        assert!(installer.flash().read(0x10_4000, 0x2000).iter().all(|&b| b == 0xff));
        assert_eq!(installer.flash().read(0x10_6000, 0x1000), &[1; 0x1000][..]);
    }

    #[test]
    fn test_truncated_package() {
        let package = UpdatePackage::new().image(0x10_2000, vec![1; 16]).sign(&key()).unwrap();
        let mut installer = installer(vec![0x2000, 0x10_2000], 0);
        installer.write(&package[..package.len() - 1]);
        assert_eq!(installer.state(), UpdateState::ReadingChecksum);
        assert_eq!(installer.finish(), Err(crate::Error::IncompleteUpdate));
        assert_eq!(installer.finish(), Err(crate::Error::IncompleteUpdate));
        assert_eq!(installer.boot_config().committed(), None);
    }

    #[test]
    fn test_trailing_bytes_are_discarded() {
        let mut package = UpdatePackage::new().image(0x10_2000, vec![1; 16]).sign(&key()).unwrap();
        package.extend_from_slice(b"\r\n\r\n");

        let mut installer = installer(vec![0x2000, 0x10_2000], 0);
        assert_eq!(installer.write(&package), package.len());
        assert_eq!(installer.write(b"more"), 4);
        assert!(installer.is_complete());
    }

    #[test]
    fn test_io_write() {
        use std::io::Write;

        let package = UpdatePackage::new().image(0x10_2000, vec![9; 40]).sign(&key()).unwrap();
        let mut installer = installer(vec![0x2000, 0x10_2000], 0);
        std::io::copy(&mut &package[..], &mut installer).unwrap();
        installer.flush().unwrap();
        assert!(installer.is_complete());
    }
}
