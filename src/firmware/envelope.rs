/// Fills a fixed size field from consecutive pieces of input.
pub(crate) struct Fill<B> {
    buf: B,
    filled: usize,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Fill<B> {
    pub fn new(buf: B) -> Self {
        Fill { buf, filled: 0 }
    }

    /// Copies as many bytes as the field still needs from `data` and returns
    /// their count.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let dest = &mut self.buf.as_mut()[self.filled..];
        let n = dest.len().min(data.len());
        dest[..n].copy_from_slice(&data[..n]);
        self.filled += n;
        n
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.buf.as_ref().len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf.as_ref()[..self.filled]
    }

    pub fn reset(&mut self) {
        self.filled = 0;
    }
}

impl Fill<[u8; 8]> {
    /// The two little-endian words of a complete 8 byte field.
    pub fn words(&self) -> (u32, u32) {
        let mut first = [0; 4];
        let mut second = [0; 4];
        first.copy_from_slice(&self.buf[..4]);
        second.copy_from_slice(&self.buf[4..]);
        (u32::from_le_bytes(first), u32::from_le_bytes(second))
    }
}

/// The package header: magic number and image count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EnvelopeHeader {
    pub magic: u32,
    pub count: u32,
}

impl EnvelopeHeader {
    pub fn from_fill(fill: &Fill<[u8; 8]>) -> Self {
        let (magic, count) = fill.words();
        EnvelopeHeader { magic, count }
    }
}

/// Where an image belongs and how long it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub address: u32,
    pub size: u32,
}

impl ImageHeader {
    pub(crate) fn from_fill(fill: &Fill<[u8; 8]>) -> Self {
        let (address, size) = fill.words();
        ImageHeader { address, size }
    }
}
