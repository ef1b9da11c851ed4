//! 🎟️ The Admission Controller — a bouncer with a fixed number of wristbands.
//!
//! 🎬 *[the club holds four chunks. a fifth chunk approaches. the bouncer does not
//! make it wait in line. the bouncer just says "no" and points at the dispatch loop.]*
//!
//! A fixed slot table of `max_concurrent_chunks` entries. Each occupied slot holds the
//! cancellation token of the chunk running in it. Acquire finds a free index and claims
//! it, release clears it, both inside one short critical section. `cancel_all` is a
//! bounded scan that flips every token and walks away without waiting.
//!
//! 🧠 Knowledge graph:
//! - `try_acquire` never blocks. Saturated = `None`, and the caller decides (caller-runs).
//! - `SlotPermit` releases on `Drop`, so success, error, panic, and abort all free the slot.
//! - The root token is the parent of every chunk token. Cancelling it reaches inline
//!   chunks too, which never held a slot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// 🎟️ The slot table plus a couple of gauges for the curious.
#[derive(Debug)]
pub(crate) struct AdmissionController {
    slots: Mutex<Vec<Option<CancellationToken>>>,
    occupied: AtomicUsize,
    high_water_mark: AtomicUsize,
    root: CancellationToken,
}

impl AdmissionController {
    /// 🚀 A fresh table with `capacity` empty slots. Capacity was validated upstream.
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(vec![None; capacity]),
            occupied: AtomicUsize::new(0),
            high_water_mark: AtomicUsize::new(0),
            root: CancellationToken::new(),
        })
    }

    /// 🔒 A panicking worker can't poison the table for everyone else; the data is
    /// a plain Vec of options and stays consistent between statements.
    fn table(&self) -> MutexGuard<'_, Vec<Option<CancellationToken>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 🧬 A token for one chunk. Child of the root so `cancel_all` reaches it even
    /// when the chunk runs inline without a slot.
    pub(crate) fn chunk_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// 🎟️ Claim a free slot for a chunk, or `None` right now if the table is full.
    pub(crate) fn try_acquire(self: &Arc<Self>, token: &CancellationToken) -> Option<SlotPermit> {
        let mut table = self.table();
        let index = table.iter().position(Option::is_none)?;
        table[index] = Some(token.clone());
        let now_occupied = self.occupied.fetch_add(1, Ordering::AcqRel) + 1;
        self.high_water_mark.fetch_max(now_occupied, Ordering::AcqRel);
        drop(table);

        trace!("🎟️ slot {index} acquired ({now_occupied} occupied)");
        Some(SlotPermit {
            controller: Arc::clone(self),
            index,
        })
    }

    /// 🗑️ Free a slot. Releasing an empty slot is a no-op, so double release is harmless.
    pub(crate) fn release(&self, index: usize) {
        let mut table = self.table();
        if let Some(slot) = table.get_mut(index) {
            if slot.take().is_some() {
                self.occupied.fetch_sub(1, Ordering::AcqRel);
                trace!("🗑️ slot {index} released");
            }
        }
    }

    /// 🛑 Ask every running chunk to stop, then cancel the root so inline and future
    /// chunks see it too. Requests only; never waits for anyone to comply.
    pub(crate) fn cancel_all(&self) -> usize {
        let cancelled = {
            let table = self.table();
            table
                .iter()
                .flatten()
                .inspect(|token| token.cancel())
                .count()
        };
        self.root.cancel();
        debug!("🛑 cancellation requested for {cancelled} in-flight chunk(s)");
        cancelled
    }

    pub(crate) fn occupied(&self) -> usize {
        self.occupied.load(Ordering::Acquire)
    }

    /// 📈 The most slots ever held at once. Tests lean on this heavily.
    pub(crate) fn high_water_mark(&self) -> usize {
        self.high_water_mark.load(Ordering::Acquire)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.table().len()
    }
}

/// 🎫 Proof of admission. Drop it and the slot goes back on the shelf.
#[derive(Debug)]
pub(crate) struct SlotPermit {
    controller: Arc<AdmissionController>,
    index: usize,
}

impl SlotPermit {
    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.controller.release(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn the_one_where_the_club_is_full_and_nobody_waits() {
        let admission = AdmissionController::new(2);
        let t = admission.chunk_token();

        let first = admission.try_acquire(&t).expect("💀 empty table should admit");
        let second = admission.try_acquire(&t).expect("💀 one slot should remain");
        assert_ne!(first.index(), second.index());
        assert!(admission.try_acquire(&t).is_none(), "🚫 third wheel denied");
        assert_eq!(admission.occupied(), 2);

        drop(first);
        assert_eq!(admission.occupied(), 1);
        let third = admission.try_acquire(&t).expect("💀 freed slot should be reusable");
        assert_eq!(third.index(), 0, "🎯 lowest free index is reused");
    }

    #[test]
    fn the_one_where_double_release_changes_nothing() {
        let admission = AdmissionController::new(1);
        let t = admission.chunk_token();
        let permit = admission.try_acquire(&t).expect("💀 should admit");
        admission.release(permit.index());
        admission.release(permit.index());
        drop(permit);
        assert_eq!(admission.occupied(), 0);
        admission.release(42);
        assert_eq!(admission.capacity(), 1);
    }

    #[test]
    fn the_one_where_cancel_all_reaches_slots_and_stragglers() {
        let admission = AdmissionController::new(3);
        let held = admission.chunk_token();
        let inline = admission.chunk_token();
        let _permit = admission.try_acquire(&held).expect("💀 should admit");

        assert_eq!(admission.cancel_all(), 1);
        assert!(held.is_cancelled());
        assert!(inline.is_cancelled(), "🛑 inline chunk hears the root cancel too");
        assert_eq!(admission.occupied(), 1, "🔒 cancel requests, release is the worker's job");
    }

    #[test]
    fn the_one_where_a_thread_stampede_never_exceeds_capacity() {
        let capacity = 3;
        let admission = AdmissionController::new(capacity);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let admission = Arc::clone(&admission);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let token = admission.chunk_token();
                        if let Some(permit) = admission.try_acquire(&token) {
                            assert!(admission.occupied() <= capacity);
                            thread::yield_now();
                            drop(permit);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("💀 stampede thread panicked");
        }
        assert!(admission.high_water_mark() <= capacity);
        assert_eq!(admission.occupied(), 0, "🗑️ no leaked slots");
    }
}
