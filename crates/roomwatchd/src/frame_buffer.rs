//! Rolling evidence buffer - bounded FIFO of recent camera frames.
//!
//! The polling path appends; the alert path snapshots. The snapshot is
//! an immutable point-in-time copy, so evidence packaged later (after
//! mail I/O) always reflects the buffer as it was when the alert
//! fired. Frame bytes are shared via `Arc`, so copies are cheap.

use roomwatch_common::FrameEntry;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Thread-safe bounded frame buffer, oldest-first.
pub struct FrameBuffer {
    inner: Mutex<VecDeque<FrameEntry>>,
    capacity: usize,
}

impl FrameBuffer {
    /// Capacity below 1 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest entry when full.
    pub fn append(&self, frame: FrameEntry) {
        let mut buf = self.inner.lock().unwrap();
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(frame);
    }

    /// Point-in-time copy of the buffer, oldest first.
    pub fn snapshot(&self) -> Vec<FrameEntry> {
        let buf = self.inner.lock().unwrap();
        buf.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomwatch_common::SensorType;
    use std::sync::Arc;

    fn frame(tag: u8) -> FrameEntry {
        FrameEntry::new(vec![tag], vec![])
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let buf = FrameBuffer::new(3);
        for i in 0..10 {
            buf.append(frame(i));
            assert!(buf.len() <= 3);
        }
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_evicts_exactly_the_oldest() {
        let buf = FrameBuffer::new(3);
        for i in 0..4 {
            buf.append(frame(i));
        }
        let frames = buf.snapshot();
        let tags: Vec<u8> = frames.iter().map(|f| f.image[0]).collect();
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let buf = FrameBuffer::new(5);
        buf.append(frame(1));
        buf.append(frame(2));

        let snap = buf.snapshot();
        buf.append(frame(3));
        buf.clear();

        // the snapshot is unaffected by later appends or clears
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].image[0], 1);
        assert_eq!(snap[1].image[0], 2);
    }

    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let buf = FrameBuffer::new(4);
        for i in 0..4 {
            buf.append(frame(i));
        }
        let tags: Vec<u8> = buf.snapshot().iter().map(|f| f.image[0]).collect();
        assert_eq!(tags, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_concurrent_append_and_snapshot() {
        let buf = Arc::new(FrameBuffer::new(8));
        let writer = {
            let buf = Arc::clone(&buf);
            std::thread::spawn(move || {
                for i in 0..500u32 {
                    buf.append(FrameEntry::new(
                        i.to_le_bytes().to_vec(),
                        vec![SensorType::Smoke],
                    ));
                }
            })
        };

        for _ in 0..200 {
            let snap = buf.snapshot();
            assert!(snap.len() <= 8);
            // entries within one snapshot are in append order
            let ids: Vec<u32> = snap
                .iter()
                .map(|f| u32::from_le_bytes(f.image[..4].try_into().unwrap()))
                .collect();
            let mut sorted = ids.clone();
            sorted.sort_unstable();
            assert_eq!(ids, sorted);
        }

        writer.join().unwrap();
    }
}
