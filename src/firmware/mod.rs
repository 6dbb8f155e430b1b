//! Signed firmware update packages, installed while they stream in.
//!
//! A package is laid out as follows, all integers little-endian `u32`s:
//!
//! ```text
//! [magic][image count]
//! [target address][size][image bytes]   (image count times)
//! [signature]                            (64 bytes, Ed25519ph)
//! ```
//!
//! The signature covers every byte before it. The [`FirmwareInstaller`]
//! writes the first image that fits a free slot to flash while hashing the
//! whole package, and activates the slot only after the signature verified.

use std::fmt::Display;

pub use self::envelope::ImageHeader;
pub use self::installer::{FirmwareInstaller, UpdateState};
pub use self::memory::{MemoryBootConfig, MemoryFlash, MemoryFlashError, MemoryWriter};
pub use self::package::UpdatePackage;
pub use self::signature::{Ed25519Verifier, Verifier};
pub use self::slot::{select_slot, FlashLayout, SlotTable};

mod envelope;
mod installer;
mod memory;
mod package;
mod signature;
mod slot;

/// The first four bytes of every update package.
pub const UPDATE_MAGIC: u32 = 0xf01a_f02a;

/// The default erase unit of the flash.
pub const SECTOR_SIZE: u32 = 4096;

/// Flash is mapped into the same 1 MiB address window repeatedly.
pub const ADDRESS_WINDOW_MASK: u32 = 0x000f_ffff;

/// Sectors at the end of flash that hold system parameters.
pub const RESERVED_SECTORS: u32 = 7;

/// Length of the Ed25519 signature trailer.
pub const SIGNATURE_LEN: usize = 64;

/// Raw flash access.
///
/// A write session is opened for one image with [`begin_write`], fed
/// consecutive chunks and closed with [`finish_write`].
///
/// [`begin_write`]: Flash::begin_write
/// [`finish_write`]: Flash::finish_write
pub trait Flash {
    /// State of one open write session.
    type Writer;
    type Error: Display;

    fn begin_write(&mut self, address: u32) -> Result<Self::Writer, Self::Error>;

    fn write_chunk(&mut self, writer: &mut Self::Writer, data: &[u8]) -> Result<(), Self::Error>;

    fn finish_write(&mut self, writer: Self::Writer) -> Result<(), Self::Error>;

    /// Erases the sector with the given index, i.e. the bytes starting at
    /// `sector * sector_size`.
    ///
    /// The installer derives `sector` from the sector size of its
    /// [`FlashLayout`], so the two must describe the same chip.
    fn erase_sector(&mut self, sector: u32) -> Result<(), Self::Error>;
}

/// The boot loader's slot configuration.
pub trait BootConfig {
    /// The current slot configuration. Read once per install.
    fn snapshot(&self) -> SlotTable;

    /// Makes `index` the slot booted from now on.
    fn commit_active_slot(&mut self, index: usize) -> Result<(), String>;
}

impl<F: Flash + ?Sized> Flash for &mut F {
    type Writer = F::Writer;
    type Error = F::Error;

    fn begin_write(&mut self, address: u32) -> Result<Self::Writer, Self::Error> {
        (**self).begin_write(address)
    }

    fn write_chunk(&mut self, writer: &mut Self::Writer, data: &[u8]) -> Result<(), Self::Error> {
        (**self).write_chunk(writer, data)
    }

    fn finish_write(&mut self, writer: Self::Writer) -> Result<(), Self::Error> {
        (**self).finish_write(writer)
    }

    fn erase_sector(&mut self, sector: u32) -> Result<(), Self::Error> {
        (**self).erase_sector(sector)
    }
}

impl<B: BootConfig + ?Sized> BootConfig for &mut B {
    fn snapshot(&self) -> SlotTable {
        (**self).snapshot()
    }

    fn commit_active_slot(&mut self, index: usize) -> Result<(), String> {
        (**self).commit_active_slot(index)
    }
}
