//! Round-robin pool of reusable output [`StreamBuffer`]s.
//!
//! The pool has one slot unless the smartcard-sharing feature is enabled,
//! in which case it grows to eight so smartcard redirection output and
//! ordinary RDP output never contend for the same buffer mid-flight.
//!
//! The dedicated input buffer used by [`crate::Transport::recv`] lives
//! directly on `Transport`, not here: unlike the output pool it is never
//! shared with the smartcard subsystem, so it needs no slot rotation.

use rdp_core::StreamBuffer;

const DEFAULT_SLOTS: usize = 1;
const SMARTCARD_SLOTS: usize = 8;
const DEFAULT_CAPACITY: usize = 4096;

/// An output buffer checked out of the pool. Held by the caller while it
/// writes a payload into it; handed back to [`BufferPool::release`] by
/// [`crate::Transport::send`] once the write completes.
pub struct OutputStream {
    pub(crate) slot: usize,
    pub buffer: StreamBuffer,
}

impl std::ops::Deref for OutputStream {
    type Target = StreamBuffer;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for OutputStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

pub struct BufferPool {
    slots: Vec<Option<StreamBuffer>>,
    next: usize,
}

impl BufferPool {
    #[must_use]
    pub fn new(smartcard_sharing: bool) -> Self {
        let slot_count = if smartcard_sharing { SMARTCARD_SLOTS } else { DEFAULT_SLOTS };
        Self {
            slots: (0..slot_count).map(|_| Some(StreamBuffer::init(DEFAULT_CAPACITY))).collect(),
            next: 0,
        }
    }

    /// Checks the next pool slot out, reset and grown to `capacity_hint`.
    pub fn checkout(&mut self, capacity_hint: usize) -> OutputStream {
        let slot = self.next;
        self.next = (self.next + 1) % self.slots.len();

        let mut buffer = self.slots[slot].take().unwrap_or_else(|| StreamBuffer::init(capacity_hint));
        buffer.reset();
        if buffer.raw_mut().len() < capacity_hint {
            buffer.raw_mut().resize(capacity_hint, 0);
        }

        OutputStream { slot, buffer }
    }

    /// Returns a checked-out buffer to its slot once the caller is done with it.
    pub fn release(&mut self, stream: OutputStream) {
        self.slots[stream.slot] = Some(stream.buffer);
    }

    /// Zeros and resets every buffer; used before a reconnect.
    pub fn reset_all(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.raw_mut().iter_mut().for_each(|b| *b = 0);
            slot.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_out_buffer_returns_to_its_slot() {
        let mut pool = BufferPool::new(false);
        let out = pool.checkout(10);
        assert_eq!(pool.slots.len(), 1);
        pool.release(out);
        assert!(pool.slots[0].is_some());
    }

    #[test]
    fn smartcard_mode_has_eight_slots() {
        let pool = BufferPool::new(true);
        assert_eq!(pool.slots.len(), 8);
    }
}
