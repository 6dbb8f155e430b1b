use std::ops::Range;

use super::envelope::ImageHeader;
use super::{ADDRESS_WINDOW_MASK, RESERVED_SECTORS, SECTOR_SIZE};

/// The boot loader's slots as seen when an install starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    /// Start address of each slot. A slot extends up to the next higher slot
    /// start, or to the end of usable flash.
    pub slots: Vec<u32>,
    /// The slot currently booted.
    pub active: usize,
    /// A slot the boot loader may select through a GPIO pin.
    pub pinned: Option<usize>,
}

impl SlotTable {
    pub fn new<S: Into<Vec<u32>>>(slots: S, active: usize) -> SlotTable {
        SlotTable {
            slots: slots.into(),
            active,
            pinned: None,
        }
    }

    /// Marks a slot as pinned, it will never be overwritten.
    pub fn with_pinned(mut self, index: usize) -> SlotTable {
        self.pinned = Some(index);
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn is_protected(&self, index: usize) -> bool {
        index == self.active || self.pinned == Some(index)
    }
}

/// Geometry of the flash chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLayout {
    pub(crate) flash_size: u32,
    pub(crate) sector_size: u32,
    pub(crate) address_mask: u32,
    pub(crate) reserved_sectors: u32,
    pub(crate) filesystem: Option<Range<u32>>,
}

impl FlashLayout {
    /// A layout for a chip of `flash_size` bytes with 4 KiB sectors, a 1 MiB
    /// address window and 7 reserved sectors at the end.
    pub fn new(flash_size: u32) -> FlashLayout {
        FlashLayout {
            flash_size,
            sector_size: SECTOR_SIZE,
            address_mask: ADDRESS_WINDOW_MASK,
            reserved_sectors: RESERVED_SECTORS,
            filesystem: None,
        }
    }

    pub fn sector_size(mut self, sector_size: u32) -> FlashLayout {
        self.sector_size = sector_size;
        self
    }

    pub fn address_mask(mut self, mask: u32) -> FlashLayout {
        self.address_mask = mask;
        self
    }

    pub fn reserved_sectors(mut self, count: u32) -> FlashLayout {
        self.reserved_sectors = count;
        self
    }

    /// Keeps images out of a filesystem partition.
    pub fn filesystem(mut self, range: Range<u32>) -> FlashLayout {
        self.filesystem = Some(range);
        self
    }

    pub fn flash_size(&self) -> u32 {
        self.flash_size
    }

    /// The first address past the space available for images.
    pub fn usable_end(&self) -> u64 {
        u64::from(self.flash_size)
            .saturating_sub(u64::from(self.reserved_sectors) * u64::from(self.sector_size))
    }
}

/// Picks the slot `image` is written to, or `None` if no slot qualifies.
///
/// Slots are visited once each, starting at the active slot and wrapping
/// around. A slot qualifies if it starts on a sector boundary, its start
/// matches the image address within the address window, it is neither the
/// active nor the pinned slot, and the image stays clear of the other slots,
/// the reserved sectors and the filesystem both when laid out at its target
/// address and when written at the slot start.
pub fn select_slot(image: &ImageHeader, table: &SlotTable, layout: &FlashLayout) -> Option<usize> {
    let count = table.slots.len();
    let first = if table.active < count { table.active } else { 0 };

    (0..count)
        .map(|offset| (first + offset) % count)
        .find(|&index| slot_accepts(index, image, table, layout))
}

fn slot_accepts(index: usize, image: &ImageHeader, table: &SlotTable, layout: &FlashLayout) -> bool {
    let start = table.slots[index];

    if layout.sector_size == 0 || start % layout.sector_size != 0 {
        return false;
    }

    if image.address & layout.address_mask != start & layout.address_mask {
        return false;
    }

    if table.is_protected(index) {
        return false;
    }

    fits(index, image, table, layout)
}

fn fits(index: usize, image: &ImageHeader, table: &SlotTable, layout: &FlashLayout) -> bool {
    fits_at_target(index, image, table, layout) && fits_at_slot(index, image, table, layout)
}

/// The image laid out at its target address ends strictly before the
/// reserved sectors and does not run into any slot starting above it.
fn fits_at_target(index: usize, image: &ImageHeader, table: &SlotTable, layout: &FlashLayout) -> bool {
    let address = u64::from(image.address);
    let max_size = layout.usable_end().saturating_sub(address);
    if u64::from(image.size) >= max_size {
        return false;
    }

    let image_range = address..address + u64::from(image.size);
    let collides = table
        .slots
        .iter()
        .enumerate()
        .filter(|&(other, &start)| other != index && u64::from(start) > address)
        .any(|(_, &start)| image_range.end > u64::from(start));

    !collides && clear_of_filesystem(&image_range, layout)
}

/// The image as actually written, at the slot start, stays inside the space
/// between the slot and its neighbours.
fn fits_at_slot(index: usize, image: &ImageHeader, table: &SlotTable, layout: &FlashLayout) -> bool {
    let usable_end = layout.usable_end();
    let start = u64::from(table.slots[index]);
    let image_range = start..start + u64::from(image.size);

    if image_range.end >= usable_end {
        return false;
    }

    let collides = table
        .slots
        .iter()
        .enumerate()
        .filter(|&(other, _)| other != index)
        .any(|(_, &other_start)| overlaps(&image_range, &slot_region(other_start, table, usable_end)));

    !collides && clear_of_filesystem(&image_range, layout)
}

fn clear_of_filesystem(image_range: &Range<u64>, layout: &FlashLayout) -> bool {
    match &layout.filesystem {
        Some(fs) => !overlaps(image_range, &(u64::from(fs.start)..u64::from(fs.end))),
        None => true,
    }
}

fn slot_region(start: u32, table: &SlotTable, usable_end: u64) -> Range<u64> {
    let end = table
        .slots
        .iter()
        .map(|&other| u64::from(other))
        .filter(|&other| other > u64::from(start))
        .min()
        .unwrap_or(usable_end);
    u64::from(start)..end
}

fn overlaps(a: &Range<u64>, b: &Range<u64>) -> bool {
    a.start < b.end && b.start < a.end
}
