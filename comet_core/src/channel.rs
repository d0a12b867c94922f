//! Channel slots.

use std::collections::VecDeque;

use base58::ToBase58;

/// Idle value marking a slot as free.
pub(crate) const FREE: i32 = -1;

/// Storage cell for one channel in the fixed pool.
///
/// Slots are constructed once, keep their `id` forever, and are recycled
/// across channels via [`Channel::reset`]. `seq_next` survives a reset so a
/// stale client resuming into a recycled slot is clamped to the ring window
/// instead of replaying a fresh channel's ring as if it were its own.
#[derive(Debug)]
pub struct Channel {
    pub(crate) id: usize,
    /// Channel name; empty for slots admitted by bare cid.
    pub(crate) name: String,
    /// Opaque auth token; issued on first sign, cleared on reset.
    pub(crate) token: String,
    /// Idle ticks remaining. `-1` means the slot is on the free list.
    pub(crate) idle: i32,
    /// Sequence number the next published message will receive.
    pub(crate) seq_next: u32,
    /// Recent messages, oldest first.
    pub(crate) msgs: VecDeque<String>,

    // free/used list links (slot ids)
    pub(crate) prev: Option<usize>,
    pub(crate) next: Option<usize>,

    // parked subscriber list (subscriber arena indices)
    pub(crate) subs_head: Option<usize>,
    pub(crate) subs_tail: Option<usize>,
    pub(crate) subs_len: usize,
}

impl Channel {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            name: String::new(),
            token: String::new(),
            idle: FREE,
            seq_next: 0,
            msgs: VecDeque::new(),
            prev: None,
            next: None,
            subs_head: None,
            subs_tail: None,
            subs_len: 0,
        }
    }

    /// Slot index in the pool.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Channel name; empty for slots admitted by bare cid.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while the slot sits on the free list.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.idle == FREE
    }

    /// Number of parked subscribers.
    #[must_use]
    pub const fn subscriber_count(&self) -> usize {
        self.subs_len
    }

    /// Sequence the next published message will receive.
    #[must_use]
    pub const fn seq_next(&self) -> u32 {
        self.seq_next
    }

    /// Sequence of the oldest message still in the ring.
    #[must_use]
    pub fn msg_seq_min(&self) -> u32 {
        self.seq_next.wrapping_sub(self.msgs.len() as u32)
    }

    /// Push a message onto the ring, evicting the oldest once past
    /// `max_messages`, and advance `seq_next`.
    pub(crate) fn append_message(&mut self, content: String, max_messages: usize) {
        self.msgs.push_back(content);
        if self.msgs.len() > max_messages {
            self.msgs.pop_front();
        }
        self.seq_next = self.seq_next.wrapping_add(1);
    }

    /// Install a fresh opaque token: 16 bytes of OS entropy, base58-encoded.
    ///
    /// # Panics
    ///
    /// Panics if the system's random number generator fails.
    pub(crate) fn create_token(&mut self) {
        let mut raw = [0u8; 16];
        getrandom::getrandom(&mut raw).expect("failed to generate random bytes");
        self.token = raw.as_slice().to_base58();
    }

    /// Return the slot to its unsigned state. `seq_next` is preserved.
    pub(crate) fn reset(&mut self) {
        self.name.clear();
        self.token.clear();
        self.idle = FREE;
        self.msgs.clear();
    }
}
