//! An elastic, double-ended byte buffer: O(1) amortized append and erase
//! from the front, backing the non-blocking connection's outgoing and
//! incoming byte streams.
//!
//! Ported in spirit (not byte-for-byte, since the original uses a
//! bit-scan-reverse trick this version replaces with a plain doubling/
//! halving loop) from `mongo_buffer_append` / `mongo_buffer_erase` in
//! `original_source/test/buffer.c` and `src/mongo.c`. Invariant maintained
//! at every call boundary: `offset + length <= size`, and `size` is always
//! a power of two no smaller than [`MIN_BUFFER_SIZE`].

use crate::constant::MIN_BUFFER_SIZE;

#[derive(Debug)]
pub struct AsyncBuffer {
    data: Vec<u8>,
    offset: usize,
    length: usize,
}

impl AsyncBuffer {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; MIN_BUFFER_SIZE],
            offset: 0,
            length: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The unconsumed bytes currently buffered.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.length]
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn compact(&mut self) {
        if self.offset == 0 {
            return;
        }
        self.data.copy_within(self.offset..self.offset + self.length, 0);
        self.offset = 0;
    }

    /// Appends `new_data` to the end of the buffered bytes, growing or
    /// compacting the backing storage as needed.
    pub fn append(&mut self, new_data: &[u8]) {
        let new_len = new_data.len();
        if new_len == 0 {
            return;
        }

        if self.offset + self.length + new_len >= self.size() {
            if self.length + new_len >= self.size() {
                let mut grown = self.size();
                while grown <= self.length + new_len {
                    grown *= 2;
                }
                let fits_without_compact = self.offset + self.length + new_len < grown;
                self.data.resize(grown, 0);
                if !fits_without_compact {
                    self.compact();
                }
            } else {
                self.compact();
            }
        }

        let start = self.offset + self.length;
        self.data[start..start + new_len].copy_from_slice(new_data);
        self.length += new_len;
    }

    /// Drops the first `erased` bytes of the buffered data, shrinking the
    /// backing storage once the buffer is mostly empty.
    pub fn erase(&mut self, erased: usize) {
        let erased = erased.min(self.length);
        self.offset += erased;
        self.length -= erased;

        if self.length == 0 {
            self.offset = 0;
        }

        if self.size() > MIN_BUFFER_SIZE && self.length < self.size() / 2 {
            let mut shrunk = self.size();
            while shrunk / 2 >= MIN_BUFFER_SIZE && self.length < shrunk / 2 {
                shrunk /= 2;
            }
            if shrunk != self.size() {
                self.compact();
                self.data.truncate(shrunk);
            }
        }
    }
}

impl Default for AsyncBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_minimum_size() {
        let buf = AsyncBuffer::new();
        assert_eq!(buf.size(), MIN_BUFFER_SIZE);
        assert!(buf.is_empty());
    }

    #[test]
    fn append_preserves_bytes() {
        let mut buf = AsyncBuffer::new();
        buf.append(b"hello");
        buf.append(b" world");
        assert_eq!(buf.as_slice(), b"hello world");
    }

    #[test]
    fn append_grows_past_minimum_size() {
        let mut buf = AsyncBuffer::new();
        let chunk = vec![7u8; MIN_BUFFER_SIZE];
        buf.append(&chunk);
        assert!(buf.size() > MIN_BUFFER_SIZE);
        assert_eq!(buf.len(), MIN_BUFFER_SIZE);
    }

    #[test]
    fn erase_drops_front_bytes() {
        let mut buf = AsyncBuffer::new();
        buf.append(b"hello world");
        buf.erase(6);
        assert_eq!(buf.as_slice(), b"world");
    }

    #[test]
    fn erase_never_underflows_on_over_erase() {
        let mut buf = AsyncBuffer::new();
        buf.append(b"hi");
        buf.erase(1000);
        assert!(buf.is_empty());
    }

    #[test]
    fn size_never_drops_below_minimum() {
        let mut buf = AsyncBuffer::new();
        buf.append(&vec![1u8; 4096]);
        buf.erase(4096);
        assert_eq!(buf.size(), MIN_BUFFER_SIZE);
    }
}
