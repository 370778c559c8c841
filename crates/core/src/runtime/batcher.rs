//! Frame batching.
//!
//! [`FrameBatcher`] is the synchronous core shared by the stream muxer and
//! by each remuxer branch: frames go in one at a time, batches come out
//! when the batch fills or the surrounding task flushes a partial batch at
//! its deadline. The batcher never sleeps itself; it only reports the
//! deadline the owning task should wake at.
//!
//! In sync-inputs mode each batch admits at most one frame per stream and
//! emits frames ordered by stream id. Frames arriving for a stream whose
//! slot is taken are parked and admitted into a later batch, so per-stream
//! arrival order is always preserved.

use crate::data::{FrameBatch, StreamFrame};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

/// Upper bound on frames parked while sync-inputs batching waits for
/// slower streams. The oldest parked frame is dropped past this point.
const MAX_CARRYOVER: usize = 256;

#[derive(Debug)]
pub struct FrameBatcher {
    batch_size: usize,
    flush_timeout: Option<Duration>,
    sync_inputs: bool,
    pending: Vec<StreamFrame>,
    /// Sync-inputs only: frames waiting for a later batch because their
    /// stream already occupies a slot in `pending`.
    carryover: VecDeque<StreamFrame>,
    oldest_at: Option<Instant>,
    next_id: u64,
    dropped: u64,
}

impl FrameBatcher {
    /// `batch_size` must already be resolved to a positive frame count;
    /// `flush_timeout` of `None` means partial batches are never flushed
    /// on time alone.
    pub fn new(batch_size: usize, flush_timeout: Option<Duration>, sync_inputs: bool) -> Self {
        Self {
            batch_size: batch_size.max(1),
            flush_timeout,
            sync_inputs,
            pending: Vec::new(),
            carryover: VecDeque::new(),
            oldest_at: None,
            next_id: 0,
            dropped: 0,
        }
    }

    /// Feed one frame. Returns a batch when the frame completes one.
    pub fn push(&mut self, frame: StreamFrame) -> Option<FrameBatch> {
        self.admit(frame);
        if self.pending.len() >= self.batch_size {
            return Some(self.take_batch());
        }
        None
    }

    /// Deadline for flushing the current partial batch, if one is pending
    /// and timed flushes are enabled.
    pub fn deadline(&self) -> Option<Instant> {
        match (self.flush_timeout, self.oldest_at) {
            (Some(timeout), Some(oldest)) if !self.pending.is_empty() => Some(oldest + timeout),
            _ => None,
        }
    }

    /// Flush whatever is pending. Returns `None` when nothing is buffered.
    pub fn flush(&mut self) -> Option<FrameBatch> {
        if self.pending.is_empty() {
            return None;
        }
        Some(self.take_batch())
    }

    /// Frames discarded because the carryover bound was hit.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn admit(&mut self, frame: StreamFrame) {
        if self.sync_inputs
            && (self.pending.len() >= self.batch_size || self.slot_taken(frame.stream_id))
        {
            self.park(frame);
            return;
        }
        if self.pending.is_empty() {
            self.oldest_at = Some(Instant::now());
        }
        self.pending.push(frame);
    }

    fn slot_taken(&self, stream_id: u32) -> bool {
        self.pending.iter().any(|f| f.stream_id == stream_id)
    }

    fn park(&mut self, frame: StreamFrame) {
        self.carryover.push_back(frame);
        if self.carryover.len() > MAX_CARRYOVER {
            if let Some(dropped) = self.carryover.pop_front() {
                self.dropped += 1;
                warn!(
                    stream_id = dropped.stream_id,
                    sequence = dropped.sequence,
                    total_dropped = self.dropped,
                    "carryover full, dropping oldest parked frame"
                );
            }
        }
    }

    fn take_batch(&mut self) -> FrameBatch {
        let mut frames = std::mem::take(&mut self.pending);
        if self.sync_inputs {
            frames.sort_by_key(|f| f.stream_id);
        }
        self.oldest_at = None;
        self.refill_from_carryover();

        let id = self.next_id;
        self.next_id += 1;
        FrameBatch { id, frames }
    }

    /// Admit parked frames into the next batch, oldest first, at most one
    /// per stream.
    fn refill_from_carryover(&mut self) {
        let mut index = 0;
        while index < self.carryover.len() {
            if self.pending.len() >= self.batch_size {
                break;
            }
            let stream_id = self.carryover[index].stream_id;
            if self.slot_taken(stream_id) {
                index += 1;
                continue;
            }
            if let Some(frame) = self.carryover.remove(index) {
                if self.pending.is_empty() {
                    self.oldest_at = Some(Instant::now());
                }
                self.pending.push(frame);
            }
        }
    }
}
