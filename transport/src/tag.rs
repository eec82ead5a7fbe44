/// Opaque completion tag.
///
/// A tag is supplied by the consumer with every op batch and echoed back
/// verbatim on the matching completion event. The server core uses tags to
/// address per-call state objects: the low half is a state-arena slot index
/// and the high half a generation counter, so a recycled slot never
/// misattributes a late event to its new occupant.
///
/// A tag stays valid until the event that carries it has been drained from
/// the completion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(u64);

impl Tag {
    /// Create a tag from a slot index and generation counter.
    #[inline]
    pub fn new(slot: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | slot as u64)
    }

    /// The state-arena slot index.
    #[inline]
    pub fn slot(&self) -> usize {
        (self.0 & 0xFFFF_FFFF) as usize
    }

    /// The generation counter guarding slot reuse.
    #[inline]
    pub fn generation(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The raw encoded value.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}
