use crate::constants::{CR, LF, MAX_CARRY_LEN};

/// Holds the unresolved tail of the previous chunk, i.e. the bytes that might
/// be the beginning of a delimiter.
pub(crate) struct CarryBuffer {
    buf: [u8; MAX_CARRY_LEN],
    len: usize,
}

impl CarryBuffer {
    pub fn new() -> Self {
        CarryBuffer {
            buf: [0; MAX_CARRY_LEN],
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Keeps everything from the logical position `from` of `carry ++ chunk`.
    pub fn retain_from(&mut self, from: usize, chunk: &[u8]) {
        let total = self.len + chunk.len();
        debug_assert!(from <= total);
        let keep = total - from;
        debug_assert!(keep <= MAX_CARRY_LEN);

        if from < self.len {
            let from_carry = self.len - from;
            self.buf.copy_within(from..self.len, 0);
            self.buf[from_carry..keep].copy_from_slice(chunk);
        } else {
            let start = from - self.len;
            self.buf[..keep].copy_from_slice(&chunk[start..]);
        }

        self.len = keep;
    }
}

/// A read-only view over the carry buffer followed by the current chunk,
/// addressed by a single logical index.
#[derive(Clone, Copy)]
pub(crate) struct Joined<'a> {
    head: &'a [u8],
    tail: &'a [u8],
}

impl<'a> Joined<'a> {
    pub fn new(head: &'a [u8], tail: &'a [u8]) -> Self {
        Joined { head, tail }
    }

    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn get(&self, idx: usize) -> u8 {
        if idx < self.head.len() {
            self.head[idx]
        } else {
            self.tail[idx - self.head.len()]
        }
    }

    /// Splits the logical range `start..end` into the part backed by the carry
    /// buffer and the part backed by the chunk; either may be empty.
    pub fn split(&self, start: usize, end: usize) -> (&'a [u8], &'a [u8]) {
        let h = self.head.len();
        let head = &self.head[start.min(h)..end.min(h)];
        let tail = &self.tail[start.max(h) - h..end.max(h) - h];
        (head, tail)
    }

    /// Position of the next `CR` or `LF` at or after `from`, or `len()` if
    /// there is none.
    pub fn find_line_break(&self, from: usize) -> usize {
        let h = self.head.len();
        if from < h {
            if let Some(idx) = memchr::memchr2(CR, LF, &self.head[from..]) {
                return from + idx;
            }
        }
        let start = from.max(h) - h;
        match memchr::memchr2(CR, LF, &self.tail[start..]) {
            Some(idx) => h + start + idx,
            None => self.len(),
        }
    }
}
