use super::slot::{FlashLayout, SlotTable};
use super::{BootConfig, Flash, SECTOR_SIZE};

/// A flash chip simulated in memory, erased to `0xff`.
#[derive(Debug, Clone)]
pub struct MemoryFlash {
    data: Vec<u8>,
    sector_size: u32,
    fail_writes: bool,
    erased: Vec<u32>,
}

/// Errors of [`MemoryFlash`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryFlashError {
    #[error("address range {start:#010x}..{end:#010x} is outside of flash")]
    OutOfBounds { start: u64, end: u64 },

    #[error("flash write refused")]
    WriteRefused,
}

/// An open write session of [`MemoryFlash`].
#[derive(Debug)]
pub struct MemoryWriter {
    address: u64,
}

impl MemoryFlash {
    pub fn new(size: u32) -> MemoryFlash {
        MemoryFlash {
            data: vec![0xff; size as usize],
            sector_size: SECTOR_SIZE,
            fail_writes: false,
            erased: Vec::new(),
        }
    }

    /// A flash chip with the size and sector size of `layout`.
    pub fn from_layout(layout: &FlashLayout) -> MemoryFlash {
        MemoryFlash::new(layout.flash_size).with_sector_size(layout.sector_size)
    }

    /// Sets the erase unit. It must match the [`FlashLayout`] handed to the
    /// installer, which computes sector indices with its own sector size.
    pub fn with_sector_size(mut self, sector_size: u32) -> MemoryFlash {
        self.sector_size = sector_size;
        self
    }

    /// Makes every following write fail.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Reads `len` bytes at `address`.
    pub fn read(&self, address: u32, len: usize) -> &[u8] {
        let start = (address as usize).min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        &self.data[start..end]
    }

    /// Indexes of the sectors erased so far, in order.
    pub fn erased_sectors(&self) -> &[u32] {
        &self.erased
    }

    fn range(&self, start: u64, len: usize) -> Result<std::ops::Range<usize>, MemoryFlashError> {
        let end = start + len as u64;
        if end > self.data.len() as u64 {
            return Err(MemoryFlashError::OutOfBounds { start, end });
        }
        Ok(start as usize..end as usize)
    }
}

impl Flash for MemoryFlash {
    type Writer = MemoryWriter;
    type Error = MemoryFlashError;

    fn begin_write(&mut self, address: u32) -> Result<MemoryWriter, MemoryFlashError> {
        self.range(u64::from(address), 0)?;
        Ok(MemoryWriter {
            address: u64::from(address),
        })
    }

    fn write_chunk(&mut self, writer: &mut MemoryWriter, data: &[u8]) -> Result<(), MemoryFlashError> {
        if self.fail_writes {
            return Err(MemoryFlashError::WriteRefused);
        }
        let range = self.range(writer.address, data.len())?;
        self.data[range].copy_from_slice(data);
        writer.address += data.len() as u64;
        Ok(())
    }

    fn finish_write(&mut self, _writer: MemoryWriter) -> Result<(), MemoryFlashError> {
        Ok(())
    }

    fn erase_sector(&mut self, sector: u32) -> Result<(), MemoryFlashError> {
        let start = u64::from(sector) * u64::from(self.sector_size);
        let range = self.range(start, self.sector_size as usize)?;
        self.data[range].fill(0xff);
        self.erased.push(sector);
        Ok(())
    }
}

/// A boot configuration kept in memory.
#[derive(Debug, Clone)]
pub struct MemoryBootConfig {
    table: SlotTable,
    committed: Option<usize>,
    refuse_commit: bool,
}

impl MemoryBootConfig {
    pub fn new(table: SlotTable) -> MemoryBootConfig {
        MemoryBootConfig {
            table,
            committed: None,
            refuse_commit: false,
        }
    }

    /// Makes every following commit fail.
    pub fn refuse_commit(&mut self, refuse: bool) {
        self.refuse_commit = refuse;
    }

    /// The slot committed during the install, if any.
    pub fn committed(&self) -> Option<usize> {
        self.committed
    }

    pub fn active(&self) -> usize {
        self.table.active
    }
}

impl BootConfig for MemoryBootConfig {
    fn snapshot(&self) -> SlotTable {
        self.table.clone()
    }

    fn commit_active_slot(&mut self, index: usize) -> Result<(), String> {
        if self.refuse_commit {
            return Err("boot configuration is read-only".to_owned());
        }
        if index >= self.table.slots.len() {
            return Err(format!("no slot {}", index));
        }
        self.table.active = index;
        self.committed = Some(index);
        Ok(())
    }
}
