//! A single growable buffer carrying the `data`/`p`/`end` cursor triple
//! used to build up nested protocol layers before a send, and to walk
//! a received PDU before dispatch.
//!
//! Each outer layer (ISO, MCS, security, RDP, a DVC channel) reserves a
//! fixed-size header region with [`StreamBuffer::push_layer`] before its
//! payload is written, then comes back to fill that region in once the
//! payload length is known via [`StreamBuffer::pop_layer`]. This mirrors
//! the push/pop-layer dance of a classic `STREAM` struct, but the
//! reserved region is returned as a bounds-checked [`WriteCursor`] rather
//! than a raw pointer rewind, so a header write can never spill into the
//! payload that follows it.

use crate::cursor::{ReadCursor, WriteCursor};

/// Named layers a [`StreamBuffer`] can reserve header space for.
///
/// Only `Iso` headers are actually emitted by this core; `Mcs`,
/// `Security`, `Rdp` and `Channel` are reserved for protocol layers that
/// live above this crate, but are still named here so the marker type
/// composes the same way across the whole stack instead of being
/// extended ad hoc per caller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Layer {
    Iso,
    Mcs,
    Security,
    Rdp,
    Channel,
}

const LAYER_COUNT: usize = 5;

impl Layer {
    const fn index(self) -> usize {
        match self {
            Layer::Iso => 0,
            Layer::Mcs => 1,
            Layer::Security => 2,
            Layer::Rdp => 3,
            Layer::Channel => 4,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Mark {
    offset: usize,
    len: usize,
}

pub struct StreamBuffer {
    inner: Vec<u8>,
    p: usize,
    end: usize,
    marks: [Option<Mark>; LAYER_COUNT],
}

impl StreamBuffer {
    /// Allocates a buffer with `capacity` zeroed bytes available to write into.
    #[must_use]
    pub fn init(capacity: usize) -> Self {
        Self {
            inner: vec![0u8; capacity],
            p: 0,
            end: 0,
            marks: [None; LAYER_COUNT],
        }
    }

    /// Resets all cursors and marks so the buffer can be reused for a new PDU
    /// without reallocating.
    pub fn reset(&mut self) {
        self.p = 0;
        self.end = 0;
        self.marks = [None; LAYER_COUNT];
    }

    #[must_use]
    pub const fn pos(&self) -> usize {
        self.p
    }

    #[must_use]
    pub const fn end(&self) -> usize {
        self.end
    }

    fn ensure_capacity(&mut self, additional: usize) {
        let needed = self.p + additional;
        if needed > self.inner.len() {
            self.inner.resize(needed, 0);
        }
    }

    /// Reserves `header_len` bytes for `layer`'s header and advances past them.
    /// The reserved region is filled in later with [`Self::pop_layer`], once the
    /// payload that follows it has been written and its length is known.
    pub fn push_layer(&mut self, layer: Layer, header_len: usize) {
        self.ensure_capacity(header_len);
        let offset = self.p;
        self.p += header_len;
        self.marks[layer.index()] = Some(Mark { offset, len: header_len });
    }

    /// Returns a cursor over exactly the header region reserved by
    /// [`Self::push_layer`] for `layer`. Panics if that layer was never pushed.
    pub fn pop_layer(&mut self, layer: Layer) -> WriteCursor<'_> {
        let mark = self.marks[layer.index()].unwrap_or_else(|| panic!("layer {layer:?} was not pushed"));
        WriteCursor::new(&mut self.inner[mark.offset..mark.offset + mark.len])
    }

    /// Records the current write position as the end of valid data, e.g. once
    /// every layer's payload has been appended and the buffer is ready to send.
    pub fn mark_end(&mut self) {
        self.end = self.p;
    }

    /// Appends bytes written by `f` at the current position, growing the
    /// buffer if needed, and advances past whatever `f` wrote.
    pub fn write_with<F>(&mut self, max_len: usize, f: F)
    where
        F: FnOnce(&mut WriteCursor<'_>),
    {
        self.ensure_capacity(max_len);
        let mut cursor = WriteCursor::new(&mut self.inner[self.p..self.p + max_len]);
        f(&mut cursor);
        self.p += cursor.pos();
    }

    pub fn write_slice(&mut self, bytes: &[u8]) {
        self.write_with(bytes.len(), |c| c.write_slice(bytes));
    }

    /// The filled portion of the buffer, from the start up to [`Self::mark_end`].
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.inner[..self.end]
    }

    /// Raw storage, used by the transport layer to receive bytes directly into
    /// the buffer before `end` is known.
    pub fn raw_mut(&mut self) -> &mut Vec<u8> {
        &mut self.inner
    }

    pub fn set_end(&mut self, end: usize) {
        self.end = end;
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.p)
    }

    /// A read cursor over the unconsumed portion of the filled region,
    /// `[p, end)`.
    #[must_use]
    pub fn reader(&self) -> ReadCursor<'_> {
        ReadCursor::new(&self.inner[self.p..self.end])
    }

    pub fn advance_read(&mut self, n: usize) {
        self.p += n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_layer_fills_header_after_payload() {
        let mut buf = StreamBuffer::init(64);
        buf.push_layer(Layer::Iso, 4);
        buf.write_slice(b"payload");
        buf.mark_end();

        let payload_len = (buf.end() - 4) as u16;
        let mut header = buf.pop_layer(Layer::Iso);
        header.write_u8(0x03);
        header.write_u8(0x00);
        header.write_u16_be(payload_len + 4);

        assert_eq!(&buf.data()[..4], &[0x03, 0x00, 0x00, 0x0b]);
        assert_eq!(&buf.data()[4..], b"payload");
    }

    #[test]
    fn growth_preserves_earlier_marks() {
        let mut buf = StreamBuffer::init(2);
        buf.push_layer(Layer::Iso, 4);
        buf.write_slice(&[0xAA; 100]);
        buf.mark_end();

        let mut header = buf.pop_layer(Layer::Iso);
        header.write_u32(0x1122_3344);
        assert_eq!(&buf.data()[..4], &0x1122_3344u32.to_le_bytes());
        assert_eq!(buf.data().len(), 104);
    }

    #[test]
    fn reader_walks_received_region() {
        let mut buf = StreamBuffer::init(8);
        buf.raw_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        buf.set_end(4);
        {
            let mut r = buf.reader();
            assert_eq!(r.read_u8(), 1);
            assert_eq!(r.read_u8(), 2);
        }
        buf.advance_read(2);
        assert_eq!(buf.remaining(), 2);
        buf.advance_read(2);
        assert_eq!(buf.remaining(), 0);
    }
}
