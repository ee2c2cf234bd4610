//! Ring Buffer Implementation

use crate::RingBufferError;

/// Size of the little-endian length prefix in front of every framed item
pub const FRAME_HEADER_LEN: usize = 2;

/// Largest payload a framed item can carry
pub const MAX_FRAMED_PAYLOAD: usize = u16::MAX as usize;

/// Fixed-capacity circular byte store
///
/// Framed items are stored as `[len:u16 LE][payload][padding]`, padded to a
/// multiple of the alignment quantum.
///
/// The backing store is allocated once and holds the ring twice: every write
/// lands at `pos` and at `pos + capacity`. Any run of up to `capacity` bytes
/// starting at the read cursor is therefore contiguous, which is what lets
/// [`RingBuffer::peek_framed`] return a plain slice even when the item wraps.
pub struct RingBuffer {
    /// Mirrored storage, `2 * capacity` bytes
    storage: Box<[u8]>,
    /// Usable capacity in bytes
    capacity: usize,
    /// Framed items are padded to a multiple of this
    alignment: usize,
    /// Write cursor
    head: usize,
    /// Read cursor
    tail: usize,
    /// Bytes between tail and head
    len: usize,
}

impl RingBuffer {
    /// Create a ring buffer of `capacity` bytes
    ///
    /// `alignment` must be a power of two and `capacity` a non-zero multiple
    /// of it.
    pub fn new(capacity: usize, alignment: usize) -> Result<Self, RingBufferError> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(RingBufferError::InvalidAlignment(alignment));
        }
        if capacity == 0 || capacity % alignment != 0 {
            return Err(RingBufferError::InvalidCapacity {
                capacity,
                alignment,
            });
        }

        Ok(Self {
            storage: vec![0u8; capacity * 2].into_boxed_slice(),
            capacity,
            alignment,
            head: 0,
            tail: 0,
            len: 0,
        })
    }

    /// Number of unread bytes
    pub fn size(&self) -> usize {
        self.len
    }

    /// Check if the buffer holds no unread bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that can still be written
    pub fn free_space(&self) -> usize {
        self.capacity - self.len
    }

    /// Get the alignment quantum
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Bytes a framed item with `payload_len` bytes of payload occupies
    pub fn framed_footprint(&self, payload_len: usize) -> usize {
        let raw = payload_len + FRAME_HEADER_LEN;
        (raw + self.alignment - 1) & !(self.alignment - 1)
    }

    /// Append raw bytes, all or nothing
    pub fn put(&mut self, bytes: &[u8]) -> Result<(), RingBufferError> {
        self.ensure_free(bytes.len())?;
        self.write_at(self.head, bytes);
        self.commit_write(bytes.len());
        Ok(())
    }

    /// Append one framed item whose payload is `first` followed by `second`
    pub fn put_framed(&mut self, first: &[u8], second: &[u8]) -> Result<(), RingBufferError> {
        let payload_len = first.len() + second.len();
        if payload_len > MAX_FRAMED_PAYLOAD {
            return Err(RingBufferError::ItemTooLarge(payload_len));
        }
        let footprint = self.framed_footprint(payload_len);
        self.ensure_free(footprint)?;

        let header = (payload_len as u16).to_le_bytes();
        let mut pos = self.head;
        self.write_at(pos, &header);
        pos = self.wrap(pos + FRAME_HEADER_LEN);
        self.write_at(pos, first);
        pos = self.wrap(pos + first.len());
        self.write_at(pos, second);

        self.commit_write(footprint);
        Ok(())
    }

    /// Copy out and consume `out.len()` raw bytes
    pub fn get(&mut self, out: &mut [u8]) -> Result<(), RingBufferError> {
        self.ensure_available(out.len())?;
        out.copy_from_slice(&self.storage[self.tail..self.tail + out.len()]);
        self.consume(out.len());
        Ok(())
    }

    /// Consume `count` raw bytes without copying them
    pub fn discard(&mut self, count: usize) -> Result<(), RingBufferError> {
        self.ensure_available(count)?;
        self.consume(count);
        Ok(())
    }

    /// Decode and consume the oldest framed item
    pub fn get_framed(&mut self) -> Result<Vec<u8>, RingBufferError> {
        let payload_len = self.framed_len()?;
        let start = self.tail + FRAME_HEADER_LEN;
        let payload = self.storage[start..start + payload_len].to_vec();
        self.consume(self.framed_footprint(payload_len));
        Ok(payload)
    }

    /// Borrow the payload of the oldest framed item without consuming it
    ///
    /// The slice stays valid until the next mutating call; pair with
    /// [`RingBuffer::discard_framed`] once the payload has been used.
    pub fn peek_framed(&self) -> Result<&[u8], RingBufferError> {
        let payload_len = self.framed_len()?;
        let start = self.tail + FRAME_HEADER_LEN;
        Ok(&self.storage[start..start + payload_len])
    }

    /// Consume the oldest framed item, returning the bytes it occupied
    pub fn discard_framed(&mut self) -> Result<usize, RingBufferError> {
        let footprint = self.framed_footprint(self.framed_len()?);
        self.consume(footprint);
        Ok(footprint)
    }

    /// Un-consume the last `count` bytes read
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the free space, which would rewind the read
    /// cursor over bytes that have since been overwritten.
    pub fn rollback(&mut self, count: usize) {
        assert!(
            count <= self.free_space(),
            "rollback of {} bytes past the reclaim point ({} free)",
            count,
            self.free_space()
        );
        self.tail = (self.tail + self.capacity - count) % self.capacity;
        self.len += count;
    }

    /// Drop everything unread
    pub fn flush(&mut self) {
        self.tail = self.head;
        self.len = 0;
    }

    /// Payload length of the framed item at the read cursor
    fn framed_len(&self) -> Result<usize, RingBufferError> {
        if self.len == 0 {
            return Err(RingBufferError::Empty);
        }
        if self.len < FRAME_HEADER_LEN {
            return Err(RingBufferError::Corrupted);
        }
        let payload_len =
            u16::from_le_bytes([self.storage[self.tail], self.storage[self.tail + 1]]) as usize;
        if self.framed_footprint(payload_len) > self.len {
            return Err(RingBufferError::Corrupted);
        }
        Ok(payload_len)
    }

    fn ensure_free(&self, requested: usize) -> Result<(), RingBufferError> {
        let free = self.free_space();
        if requested > free {
            return Err(RingBufferError::Overflow { requested, free });
        }
        Ok(())
    }

    fn ensure_available(&self, requested: usize) -> Result<(), RingBufferError> {
        if requested > self.len {
            return Err(RingBufferError::Underflow {
                requested,
                available: self.len,
            });
        }
        Ok(())
    }

    /// Write `data` at ring position `pos` into both copies
    fn write_at(&mut self, pos: usize, data: &[u8]) {
        let cap = self.capacity;
        let first = data.len().min(cap - pos);
        let (front, back) = data.split_at(first);

        self.storage[pos..pos + first].copy_from_slice(front);
        self.storage[cap + pos..cap + pos + first].copy_from_slice(front);
        self.storage[..back.len()].copy_from_slice(back);
        self.storage[cap..cap + back.len()].copy_from_slice(back);
    }

    fn commit_write(&mut self, count: usize) {
        self.head = self.wrap(self.head + count);
        self.len += count;
    }

    fn consume(&mut self, count: usize) {
        self.tail = self.wrap(self.tail + count);
        self.len -= count;
    }

    fn wrap(&self, pos: usize) -> usize {
        pos % self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[test]
    fn test_rejects_bad_geometry() {
        assert_eq!(
            RingBuffer::new(64, 3).err(),
            Some(RingBufferError::InvalidAlignment(3))
        );
        assert!(matches!(
            RingBuffer::new(30, 4),
            Err(RingBufferError::InvalidCapacity { .. })
        ));
        assert!(RingBuffer::new(0, 1).is_err());
    }

    #[test]
    fn test_raw_put_get() {
        let mut buffer = RingBuffer::new(8, 1).unwrap();
        buffer.put(&[1, 2, 3]).unwrap();
        assert_eq!(buffer.size(), 3);

        let mut out = [0u8; 2];
        buffer.get(&mut out).unwrap();
        assert_eq!(out, [1, 2]);
        assert_eq!(buffer.size(), 1);

        buffer.discard(1).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(
            buffer.discard(1),
            Err(RingBufferError::Underflow {
                requested: 1,
                available: 0
            })
        );
    }

    #[test]
    fn test_overflow_leaves_state_untouched() {
        let mut buffer = RingBuffer::new(8, 4).unwrap();
        buffer.put_framed(&[0xAA, 0xBB], &[]).unwrap();
        assert_eq!(buffer.size(), 4);

        let err = buffer.put_framed(&[1, 2, 3], &[4]).unwrap_err();
        assert_eq!(
            err,
            RingBufferError::Overflow {
                requested: 8,
                free: 4
            }
        );
        assert_eq!(buffer.size(), 4);
        assert_eq!(buffer.get_framed().unwrap(), vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_item_exactly_filling_buffer() {
        let mut buffer = RingBuffer::new(8, 4).unwrap();
        buffer.put_framed(&[1, 2, 3], &[4, 5, 6]).unwrap();
        assert_eq!(buffer.size(), 8);
        assert_eq!(buffer.free_space(), 0);
        assert_eq!(buffer.peek_framed().unwrap(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_header_only_item() {
        let mut buffer = RingBuffer::new(16, 4).unwrap();
        buffer.put_framed(&[], &[]).unwrap();
        assert_eq!(buffer.size(), 4);
        assert_eq!(buffer.get_framed().unwrap(), Vec::<u8>::new());
        assert_eq!(buffer.get_framed(), Err(RingBufferError::Empty));
    }

    #[test]
    fn test_peek_is_contiguous_across_wrap() {
        let mut buffer = RingBuffer::new(16, 4).unwrap();
        // Move the cursors to offset 12 so the next item straddles the end
        buffer.put_framed(&[0; 10], &[]).unwrap();
        buffer.discard_framed().unwrap();
        assert_eq!(buffer.size(), 0);

        buffer.put_framed(&[9, 8, 7], &[6, 5, 4, 3]).unwrap();
        assert_eq!(buffer.peek_framed().unwrap(), &[9, 8, 7, 6, 5, 4, 3]);
        assert_eq!(buffer.discard_framed().unwrap(), 12);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_rollback_reoffers_item() {
        let mut buffer = RingBuffer::new(32, 4).unwrap();
        buffer.put_framed(&[1, 2, 3, 4, 5], &[]).unwrap();
        buffer.put_framed(&[6], &[]).unwrap();

        let first = buffer.get_framed().unwrap();
        buffer.rollback(buffer.framed_footprint(first.len()));

        assert_eq!(buffer.get_framed().unwrap(), first);
        assert_eq!(buffer.get_framed().unwrap(), vec![6]);
    }

    #[test]
    #[should_panic(expected = "reclaim point")]
    fn test_rollback_past_reclaim_point_panics() {
        let mut buffer = RingBuffer::new(8, 1).unwrap();
        buffer.put(&[0; 8]).unwrap();
        buffer.rollback(1);
    }

    #[test]
    fn test_flush() {
        let mut buffer = RingBuffer::new(16, 4).unwrap();
        buffer.put_framed(&[1], &[2]).unwrap();
        buffer.put(&[3, 4]).unwrap();
        buffer.flush();
        assert!(buffer.is_empty());
        assert_eq!(buffer.free_space(), 16);
    }

    #[test]
    fn test_truncated_header_is_corrupted() {
        let mut buffer = RingBuffer::new(8, 1).unwrap();
        buffer.put(&[5]).unwrap();
        assert_eq!(buffer.peek_framed(), Err(RingBufferError::Corrupted));
        // Length prefix claims more than is queued
        buffer.flush();
        buffer.put(&[4, 0, 1]).unwrap();
        assert_eq!(buffer.get_framed(), Err(RingBufferError::Corrupted));
        assert_eq!(buffer.size(), 3);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(Vec<u8>),
        PutFramed(Vec<u8>, Vec<u8>),
        Get(usize),
        GetFramed,
        Discard(usize),
        Flush,
    }

    fn op() -> impl Strategy<Value = Op> {
        let bytes = || proptest::collection::vec(any::<u8>(), 0..24);
        prop_oneof![
            bytes().prop_map(Op::Put),
            (bytes(), bytes()).prop_map(|(a, b)| Op::PutFramed(a, b)),
            (0usize..24).prop_map(Op::Get),
            Just(Op::GetFramed),
            (0usize..24).prop_map(Op::Discard),
            Just(Op::Flush),
        ]
    }

    proptest! {
        #[test]
        fn framed_round_trip(
            a in proptest::collection::vec(any::<u8>(), 0..60),
            b in proptest::collection::vec(any::<u8>(), 0..60),
        ) {
            let mut buffer = RingBuffer::new(128, 4).unwrap();
            buffer.put_framed(&a, &b).unwrap();
            let mut expected = a.clone();
            expected.extend_from_slice(&b);
            prop_assert_eq!(buffer.get_framed().unwrap(), expected);
            prop_assert!(buffer.is_empty());
        }

        #[test]
        fn size_stays_within_capacity(ops in proptest::collection::vec(op(), 1..64)) {
            let mut buffer = RingBuffer::new(64, 4).unwrap();
            for op in ops {
                let before = buffer.size();
                match op {
                    Op::Put(bytes) => {
                        if buffer.put(&bytes).is_err() {
                            prop_assert_eq!(buffer.size(), before);
                        }
                    }
                    Op::PutFramed(a, b) => {
                        if buffer.put_framed(&a, &b).is_err() {
                            prop_assert_eq!(buffer.size(), before);
                        }
                    }
                    Op::Get(n) => {
                        let mut out = vec![0u8; n];
                        if buffer.get(&mut out).is_err() {
                            prop_assert_eq!(buffer.size(), before);
                        }
                    }
                    Op::GetFramed => {
                        let _ = buffer.get_framed();
                    }
                    Op::Discard(n) => {
                        if buffer.discard(n).is_err() {
                            prop_assert_eq!(buffer.size(), before);
                        }
                    }
                    Op::Flush => buffer.flush(),
                }
                prop_assert!(buffer.size() <= buffer.capacity());
            }
        }

        #[test]
        fn raw_bytes_match_byte_queue(
            offset in 0usize..32,
            ops in proptest::collection::vec(
                prop_oneof![
                    proptest::collection::vec(any::<u8>(), 0..20).prop_map(Op::Put),
                    (0usize..20).prop_map(Op::Get),
                    (0usize..20).prop_map(Op::Discard),
                ],
                1..96,
            ),
        ) {
            let mut buffer = RingBuffer::new(32, 4).unwrap();
            // Start the cursors somewhere other than zero
            buffer.put(&vec![0u8; offset]).unwrap();
            buffer.discard(offset).unwrap();

            let mut model: VecDeque<u8> = VecDeque::new();
            for op in ops {
                match op {
                    Op::Put(bytes) => {
                        let fits = model.len() + bytes.len() <= buffer.capacity();
                        prop_assert_eq!(buffer.put(&bytes).is_ok(), fits);
                        if fits {
                            model.extend(bytes);
                        }
                    }
                    Op::Get(n) => {
                        let mut out = vec![0u8; n];
                        let available = n <= model.len();
                        prop_assert_eq!(buffer.get(&mut out).is_ok(), available);
                        if available {
                            let expected: Vec<u8> = model.drain(..n).collect();
                            prop_assert_eq!(out, expected);
                        }
                    }
                    Op::Discard(n) => {
                        let available = n <= model.len();
                        prop_assert_eq!(buffer.discard(n).is_ok(), available);
                        if available {
                            model.drain(..n);
                        }
                    }
                    _ => unreachable!(),
                }
                prop_assert_eq!(buffer.size(), model.len());
            }

            let mut rest = vec![0u8; model.len()];
            buffer.get(&mut rest).unwrap();
            prop_assert_eq!(rest, model.into_iter().collect::<Vec<u8>>());
        }

        #[test]
        fn wraparound_matches_unbounded_queue(
            offset in 0usize..16,
            items in proptest::collection::vec(
                (proptest::collection::vec(any::<u8>(), 0..20), any::<bool>()),
                1..48,
            ),
        ) {
            let mut buffer = RingBuffer::new(48, 4).unwrap();
            // Start the cursors somewhere other than zero
            buffer.put(&vec![0u8; offset * 3]).unwrap();
            buffer.discard(offset * 3).unwrap();

            let mut model: VecDeque<Vec<u8>> = VecDeque::new();
            for (payload, pop) in items {
                let (a, b) = payload.split_at(payload.len() / 2);
                if buffer.put_framed(a, b).is_ok() {
                    model.push_back(payload.clone());
                }
                if pop {
                    prop_assert_eq!(buffer.peek_framed().ok().map(<[u8]>::to_vec), model.front().cloned());
                    prop_assert_eq!(buffer.get_framed().ok(), model.pop_front());
                }
            }
            while let Some(expected) = model.pop_front() {
                prop_assert_eq!(buffer.get_framed().unwrap(), expected);
            }
            prop_assert!(buffer.is_empty());
        }
    }
}
