//! Fixed-capacity byte ring buffer.
//!
//! Every transmit and receive queue of a node is a [`RingBuffer`]. Writes and
//! reads are all-or-nothing: a write never stores part of its input and a read
//! never returns fewer bytes than requested.
//!
//! `head` is the next write position, `tail` the next read position. When the
//! two are equal the explicit `full` flag tells a full buffer from an empty one.

use crate::error::Error;

/// A byte FIFO with `N` bytes of owned storage.
#[derive(Debug, Clone)]
pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    head: usize,
    tail: usize,
    full: bool,
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<N> {
    /// Creates an empty ring buffer.
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            head: 0,
            tail: 0,
            full: false,
        }
    }

    /// Total capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        if self.head == self.tail {
            if self.full { N } else { 0 }
        } else if self.head > self.tail {
            self.head - self.tail
        } else {
            N + self.head - self.tail
        }
    }

    /// Number of bytes that can still be written.
    pub fn free(&self) -> usize {
        N - self.len()
    }

    /// `true` when no byte is buffered.
    pub fn is_empty(&self) -> bool {
        self.head == self.tail && !self.full
    }

    /// `true` when no byte can be written.
    pub fn is_full(&self) -> bool {
        self.head == self.tail && self.full
    }

    /// Appends `data`, wrapping at the end of the storage.
    ///
    /// # Errors
    /// [`Error::BufFull`] if fewer than `data.len()` bytes are free; nothing is written.
    pub fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() > self.free() {
            return Err(Error::BufFull);
        }
        if data.is_empty() {
            return Ok(());
        }
        let first = data.len().min(N - self.head);
        self.buf[self.head..self.head + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        self.buf[..rest].copy_from_slice(&data[first..]);
        self.head = (self.head + data.len()) % N;
        self.full = self.head == self.tail;
        Ok(())
    }

    /// Copies the oldest `out.len()` bytes into `out` without consuming them.
    ///
    /// # Errors
    /// [`Error::BufEmpty`] if fewer than `out.len()` bytes are buffered.
    pub fn peek(&self, out: &mut [u8]) -> Result<(), Error> {
        if out.len() > self.len() {
            return Err(Error::BufEmpty);
        }
        if out.is_empty() {
            return Ok(());
        }
        let first = out.len().min(N - self.tail);
        out[..first].copy_from_slice(&self.buf[self.tail..self.tail + first]);
        let rest = out.len() - first;
        out[first..].copy_from_slice(&self.buf[..rest]);
        Ok(())
    }

    /// Removes the oldest `out.len()` bytes into `out`.
    ///
    /// # Errors
    /// [`Error::BufEmpty`] if fewer than `out.len()` bytes are buffered; nothing is consumed.
    pub fn read(&mut self, out: &mut [u8]) -> Result<(), Error> {
        self.peek(out)?;
        if !out.is_empty() {
            self.tail = (self.tail + out.len()) % N;
            self.full = false;
        }
        Ok(())
    }

    /// Drops every buffered byte.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.full = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_empty() {
        let rb: RingBuffer<8> = RingBuffer::new();
        assert!(rb.is_empty());
        assert!(!rb.is_full());
        assert_eq!(rb.len(), 0);
        assert_eq!(rb.free(), 8);
    }

    #[test]
    fn test_fifo_order_across_wraparound() {
        let mut rb: RingBuffer<8> = RingBuffer::new();
        let mut out = [0u8; 5];
        let mut expected = 0u8;
        let mut next = 0u8;
        for _ in 0..10 {
            let chunk = [next, next + 1, next + 2, next + 3, next + 4];
            next += 5;
            rb.write(&chunk).unwrap();
            rb.read(&mut out).unwrap();
            assert_eq!(out, [expected, expected + 1, expected + 2, expected + 3, expected + 4]);
            expected += 5;
            assert!(rb.is_empty());
        }
    }

    #[test]
    fn test_equal_write_read_keeps_occupancy() {
        let mut rb: RingBuffer<10> = RingBuffer::new();
        rb.write(&[1, 2, 3]).unwrap();
        let before = rb.len();
        rb.write(&[4, 5, 6, 7]).unwrap();
        let mut out = [0u8; 4];
        rb.read(&mut out).unwrap();
        assert_eq!(rb.len(), before);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_full_and_empty_are_exclusive() {
        let mut rb: RingBuffer<4> = RingBuffer::new();
        rb.write(&[1, 2, 3, 4]).unwrap();
        assert!(rb.is_full());
        assert!(!rb.is_empty());
        assert_eq!(rb.len(), 4);
        assert_eq!(rb.free(), 0);

        let mut out = [0u8; 4];
        rb.read(&mut out).unwrap();
        assert!(rb.is_empty());
        assert!(!rb.is_full());
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_full_after_wrap_has_head_equal_tail() {
        let mut rb: RingBuffer<4> = RingBuffer::new();
        rb.write(&[1, 2, 3]).unwrap();
        let mut out = [0u8; 2];
        rb.read(&mut out).unwrap();
        rb.write(&[4, 5, 6]).unwrap();
        assert!(rb.is_full());
        let mut all = [0u8; 4];
        rb.read(&mut all).unwrap();
        assert_eq!(all, [3, 4, 5, 6]);
    }

    #[test]
    fn test_oversized_write_leaves_buffer_untouched() {
        let mut rb: RingBuffer<20> = RingBuffer::new();
        rb.write(&[0xaa; 15]).unwrap();
        assert_eq!(rb.write(&[0x55; 20]), Err(Error::BufFull));
        assert_eq!(rb.write(&[0x55; 6]), Err(Error::BufFull));
        assert_eq!(rb.len(), 15);
        let mut out = [0u8; 15];
        rb.read(&mut out).unwrap();
        assert_eq!(out, [0xaa; 15]);
    }

    #[test]
    fn test_partial_read_is_refused() {
        let mut rb: RingBuffer<8> = RingBuffer::new();
        rb.write(&[1, 2, 3]).unwrap();
        let mut out = [0u8; 4];
        assert_eq!(rb.read(&mut out), Err(Error::BufEmpty));
        assert_eq!(rb.len(), 3);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut rb: RingBuffer<8> = RingBuffer::new();
        rb.write(&[9, 8, 7]).unwrap();
        let mut out = [0u8; 2];
        rb.peek(&mut out).unwrap();
        assert_eq!(out, [9, 8]);
        assert_eq!(rb.len(), 3);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut rb: RingBuffer<4> = RingBuffer::new();
        rb.write(&[1, 2, 3, 4]).unwrap();
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.free(), 4);
    }
}
