//! Remuxer fan-out.
//!
//! A remuxer receives every batch the pipeline chain produces and re-muxes
//! it per branch: frames are filtered down to the branch's stream set and
//! fed through a private [`FrameBatcher`], so each branch sees fresh
//! batches sized for its own subset. Branch chains run inline; they are
//! cheap transforms and counters, so one task per remuxer is enough.

use crate::data::FrameBatch;
use crate::pipeline::timeout_from_us;
use crate::runtime::session::{
    sleep_until_deadline, tile_batch, BatchEndpoint, BranchStage, RemuxerStage, SinkEndpoint,
    TilerStage,
};
use crate::runtime::FrameBatcher;
use std::collections::BTreeSet;
use std::time::{Duration, Instant as StdInstant};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, trace};

pub(crate) async fn remuxer_task(
    pipeline: String,
    stage: RemuxerStage,
    source_count: usize,
    mut rx: mpsc::Receiver<FrameBatch>,
    mut shutdown: watch::Receiver<bool>,
    started_at: Instant,
) {
    let RemuxerStage {
        name,
        batch_size,
        batch_timeout_us,
        branches,
    } = stage;

    let flush_timeout = timeout_from_us(batch_timeout_us);
    let mut runners: Vec<BranchRunner> = branches
        .into_iter()
        .map(|branch| {
            BranchRunner::new(branch, batch_size, flush_timeout, source_count, started_at)
        })
        .collect();

    debug!(
        pipeline = %pipeline,
        remuxer = %name,
        branches = runners.len(),
        batch_size,
        "remuxer task started"
    );

    loop {
        let deadline = runners.iter().filter_map(|r| r.batcher.deadline()).min();
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep_until_deadline(deadline) => {
                let now = StdInstant::now();
                for runner in &mut runners {
                    runner.flush_due(now).await;
                }
            }
            batch = rx.recv() => match batch {
                Some(batch) => {
                    for runner in &mut runners {
                        runner.feed(&batch).await;
                    }
                }
                None => {
                    // Drain partials only on natural end of input, not on stop.
                    if !*shutdown.borrow() {
                        for runner in &mut runners {
                            runner.finish().await;
                        }
                    }
                    break;
                }
            },
        }
    }
    debug!(remuxer = %name, "remuxer task exited");
}

/// One branch behind a remuxer: its stream selection, its own batcher, and
/// its inline chain.
struct BranchRunner {
    name: String,
    stream_ids: Option<BTreeSet<u32>>,
    batcher: FrameBatcher,
    transforms: Vec<TilerStage>,
    sinks: Vec<SinkEndpoint>,
}

impl BranchRunner {
    fn new(
        stage: BranchStage,
        batch_size: u32,
        flush_timeout: Option<Duration>,
        source_count: usize,
        started_at: Instant,
    ) -> Self {
        // Batch size 0 resolves to the branch's stream count: the size of
        // the selection, or every upstream stream when unrestricted.
        let effective = if batch_size > 0 {
            batch_size as usize
        } else {
            match &stage.stream_ids {
                Some(ids) => ids.len().max(1),
                None => source_count.max(1),
            }
        };
        Self {
            name: stage.name,
            stream_ids: stage.stream_ids,
            batcher: FrameBatcher::new(effective, flush_timeout, false),
            transforms: stage.transforms,
            sinks: stage
                .sinks
                .into_iter()
                .map(|sink| SinkEndpoint::new(sink, started_at))
                .collect(),
        }
    }

    async fn feed(&mut self, batch: &FrameBatch) {
        for frame in batch.select(self.stream_ids.as_ref()) {
            if let Some(out) = self.batcher.push(frame) {
                self.emit(out).await;
            }
        }
    }

    async fn flush_due(&mut self, now: StdInstant) {
        let due = matches!(self.batcher.deadline(), Some(deadline) if deadline <= now);
        if due {
            if let Some(out) = self.batcher.flush() {
                self.emit(out).await;
            }
        }
    }

    /// Drain the partial batch at end of input.
    async fn finish(&mut self) {
        if let Some(out) = self.batcher.flush() {
            self.emit(out).await;
        }
    }

    async fn emit(&mut self, mut batch: FrameBatch) {
        for stage in &self.transforms {
            batch = tile_batch(stage, batch);
        }
        trace!(branch = %self.name, batch_id = batch.id, frames = batch.len(), "branch emitted batch");
        for sink in &mut self.sinks {
            sink.deliver(&batch).await;
        }
    }
}
