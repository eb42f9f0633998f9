//! Single-slot handoff between the sample producer and the processing
//! worker.
//!
//! The slot is a one-block mailbox with two producer entry points. The
//! hardware path claims it with a non-blocking attempt; a claim that fails —
//! because the worker is mid-block or the previous block has not been picked
//! up yet — means the receiver is falling behind real time and driver-side
//! data may be dropped, so it is reported as an overflow before falling back
//! to a blocking send. The file path blocks silently: replay is paced by the
//! worker and waiting is ordinary backpressure, not data loss. Overflow
//! never corrupts state. Shutdown travels as a separate flag so neither side
//! ever parks forever, and a block already sitting in the slot is drained
//! before shutdown is honored.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, TryLockError};

use tracing::warn;

use super::{BLOCK_SAMPLES, FILTER_LEN};

/// One block of complex baseband samples, padded on the right by FILTER_LEN
/// samples so the interpolation loop never branches at the block edge. The
/// padding is initialized to 1.0 and never cleared: zeroed tail energy would
/// allow a divide-by-zero in the normalized preamble correlator.
pub struct SampleBlock {
    pub re: Box<[f32]>,
    pub im: Box<[f32]>,
    /// Monotonic block index, 0 for the first block produced.
    pub index: u64,
}

impl SampleBlock {
    pub fn new() -> Self {
        Self {
            re: vec![1.0; BLOCK_SAMPLES + FILTER_LEN].into_boxed_slice(),
            im: vec![1.0; BLOCK_SAMPLES + FILTER_LEN].into_boxed_slice(),
            index: 0,
        }
    }

    /// Convert one block of interleaved offset-binary IQ bytes in place.
    /// Straight-line loop over contiguous buffers; the padding tail is left
    /// untouched.
    fn fill(&mut self, raw: &[u8]) {
        for (i, iq) in raw.chunks_exact(2).enumerate() {
            self.re[i] = iq[0] as f32 - 128.0;
            self.im[i] = iq[1] as f32 - 128.0;
        }
    }
}

impl Default for SampleBlock {
    fn default() -> Self {
        Self::new()
    }
}

struct SlotState {
    block: SampleBlock,
    fresh: bool,
    next_index: u64,
}

/// The producer/worker coupling: one owned block, its condition variables
/// and the process-wide exit and fault flags.
pub struct BlockSlot {
    state: Mutex<SlotState>,
    /// Signaled by the producer when a fresh block is in the slot.
    ready: Condvar,
    /// Signaled by the worker when it picks a block up.
    space: Condvar,
    exiting: AtomicBool,
    faulted: AtomicBool,
}

impl BlockSlot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                block: SampleBlock::new(),
                fresh: false,
                next_index: 0,
            }),
            ready: Condvar::new(),
            space: Condvar::new(),
            exiting: AtomicBool::new(false),
            faulted: AtomicBool::new(false),
        }
    }

    /// Hardware producer side: convert `raw` into the slot and signal the
    /// worker. A failed non-blocking claim means real-time data may be lost
    /// upstream; it is reported as an overflow and the producer falls back
    /// to waiting. Returns true if the claim was contended.
    pub fn produce(&self, raw: &[u8]) -> bool {
        let (overflowed, state) = match self.state.try_lock() {
            Ok(guard) => (guard.fresh, guard),
            Err(TryLockError::WouldBlock) => (true, self.state.lock().unwrap()),
            Err(TryLockError::Poisoned(poisoned)) => (false, poisoned.into_inner()),
        };
        if overflowed {
            warn!("overflow: sample processing is not keeping up with the source");
        }
        self.deliver(state, raw);
        overflowed
    }

    /// File producer side: blocking send with no overflow accounting.
    /// Replay is paced by the worker, so waiting for the slot is ordinary
    /// backpressure and nothing is lost.
    pub fn produce_paced(&self, raw: &[u8]) {
        let state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.deliver(state, raw);
    }

    fn deliver(&self, mut state: MutexGuard<'_, SlotState>, raw: &[u8]) {
        debug_assert_eq!(raw.len(), BLOCK_SAMPLES * 2);
        loop {
            // Once shutdown is requested, stop delivering rather than
            // clobber a block the worker has yet to drain.
            if self.is_exiting() {
                return;
            }
            if !state.fresh {
                break;
            }
            state = self.space.wait(state).unwrap();
        }

        state.block.fill(raw);
        state.block.index = state.next_index;
        state.next_index += 1;
        state.fresh = true;
        drop(state);
        self.ready.notify_one();
    }

    /// Worker side: park until a fresh block is available, or return None on
    /// shutdown. A block already in the slot is drained before shutdown is
    /// honored, so the tail of a dump file is never dropped. The returned
    /// guard keeps the slot claimed until dropped.
    pub fn wait_fresh(&self) -> Option<BlockGuard<'_>> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.fresh {
                state.fresh = false;
                self.space.notify_one();
                return Some(BlockGuard { state });
            }
            if self.exiting.load(Ordering::Acquire) {
                return None;
            }
            state = self.ready.wait(state).unwrap();
        }
    }

    /// Request shutdown and wake both sides. Idempotent.
    pub fn shutdown(&self) {
        self.exiting.store(true, Ordering::Release);
        self.ready.notify_one();
        self.space.notify_one();
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// Record a broken contract with the sample source and shut down. The
    /// main thread turns this into a nonzero exit after joining.
    pub fn fail(&self) {
        self.faulted.store(true, Ordering::Release);
        self.shutdown();
    }

    pub fn has_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }
}

impl Default for BlockSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive view of a fresh sample block, held for the whole processing
/// pass.
pub struct BlockGuard<'a> {
    state: MutexGuard<'a, SlotState>,
}

impl Deref for BlockGuard<'_> {
    type Target = SampleBlock;

    fn deref(&self) -> &SampleBlock {
        &self.state.block
    }
}
