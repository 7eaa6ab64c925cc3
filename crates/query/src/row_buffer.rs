//! In-memory row buffers used by operators that look ahead or re-scan.
//!
//! Both buffers store rows through `RowHolder` slots: storing a row holds
//! it, clearing a slot releases it. A stored row stays readable for as long
//! as the buffer holds it, regardless of what its producer does next.
//! Producers that hand out rows whose contents they intend to reuse must
//! pin them first with `RowHolder::hold_pinned`.

use core::fmt;
use keel_core::Row;

/// A slot that either holds a row or is empty.
#[derive(Default, Clone)]
pub struct RowHolder {
    row: Option<Row>,
}

impl RowHolder {
    /// Creates an empty holder.
    pub fn new() -> Self {
        Self { row: None }
    }

    /// Holds `row`, releasing any previously held row.
    #[inline]
    pub fn hold(&mut self, row: Row) {
        self.row = Some(row);
    }

    /// Holds a private copy of `row` that shares nothing with its producer.
    pub fn hold_pinned(&mut self, row: &Row) {
        self.row = Some(row.deep_copy());
    }

    /// Releases the held row.
    #[inline]
    pub fn release(&mut self) {
        self.row = None;
    }

    /// Releases the held row and returns it.
    #[inline]
    pub fn take(&mut self) -> Option<Row> {
        self.row.take()
    }

    /// Returns the held row.
    #[inline]
    pub fn get(&self) -> Option<&Row> {
        self.row.as_ref()
    }

    /// Returns true if a row is held.
    #[inline]
    pub fn is_holding(&self) -> bool {
        self.row.is_some()
    }
}

impl fmt::Debug for RowHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.row {
            Some(row) => write!(f, "RowHolder({})", row),
            None => f.write_str("RowHolder(empty)"),
        }
    }
}

/// Fixed-capacity FIFO ring of rows.
///
/// Adding to a full queue is a caller bug and panics.
#[derive(Debug)]
pub struct BoundedRowQueue {
    slots: Vec<RowHolder>,
    head: usize,
    len: usize,
}

impl BoundedRowQueue {
    /// Creates a queue holding at most `capacity` rows.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "bounded row queue capacity must be positive");
        Self {
            slots: vec![RowHolder::new(); capacity],
            head: 0,
            len: 0,
        }
    }

    /// Returns the maximum number of rows.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of queued rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no rows are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if another `add` would overflow.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Appends `row` at the tail.
    ///
    /// # Panics
    ///
    /// Panics if the queue is full.
    pub fn add(&mut self, row: Row) {
        assert!(!self.is_full(), "add to full bounded row queue");
        let tail = (self.head + self.len) % self.slots.len();
        self.slots[tail].hold(row);
        self.len += 1;
    }

    /// Removes and returns the row at the head, or `None` if empty.
    pub fn take(&mut self) -> Option<Row> {
        if self.is_empty() {
            return None;
        }
        let row = self.slots[self.head].take();
        debug_assert!(row.is_some(), "queued slot was empty");
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        row
    }

    /// Returns the row at the head without removing it.
    pub fn peek(&self) -> Option<&Row> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.head].get()
    }

    /// Releases every queued row.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(RowHolder::release);
        self.head = 0;
        self.len = 0;
    }
}

/// Growable row list with a single forward scan position.
///
/// Used to materialize a result once and replay it many times. Slots are
/// kept across `clear` so a buffer refilled per scan stops allocating once
/// it has grown to its working size.
#[derive(Debug, Default)]
pub struct RowScanBuffer {
    slots: Vec<RowHolder>,
    len: usize,
    position: usize,
}

const INITIAL_SCAN_CAPACITY: usize = 8;

impl RowScanBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no rows are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of slots allocated.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends `row`, doubling the slot count when full.
    pub fn append(&mut self, row: Row) {
        if self.len == self.slots.len() {
            let grown = (self.slots.len() * 2).max(INITIAL_SCAN_CAPACITY);
            self.slots.resize_with(grown, RowHolder::new);
        }
        self.slots[self.len].hold(row);
        self.len += 1;
    }

    /// Moves the scan position back to the first row.
    #[inline]
    pub fn reset_scan(&mut self) {
        self.position = 0;
    }

    /// Returns the row at the scan position and advances, or `None` past
    /// the last row.
    pub fn next(&mut self) -> Option<Row> {
        if self.position >= self.len {
            return None;
        }
        let row = self.slots[self.position].get().cloned();
        self.position += 1;
        row
    }

    /// Releases every row and resets the scan position.
    pub fn clear(&mut self) {
        self.slots[..self.len].iter_mut().for_each(RowHolder::release);
        self.len = 0;
        self.position = 0;
    }
}
