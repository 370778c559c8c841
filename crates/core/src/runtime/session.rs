//! Playback sessions.
//!
//! [`PlaybackSession::spawn`] turns a compiled [`PlaybackPlan`] into a set
//! of tokio tasks: one frame producer per source, one muxer task forming
//! batches, one chain task driving tilers and terminal endpoints, and one
//! fan-out task per remuxer. Stopping flips a watch channel and joins
//! every task, so no task outlives its session.

use crate::component::{SinkSpec, TilerSpec, UriSourceSpec};
use crate::data::{FrameBatch, StreamFrame};
use crate::error::{Error, Result};
use crate::pipeline::StreamMuxConfig;
use crate::runtime::{fanout, FrameBatcher};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Queue depth per source feeding the muxer.
const FRAMES_PER_SOURCE_DEPTH: usize = 8;
/// Queue depth for batch channels (muxer output, remuxer inputs).
const BATCH_CHANNEL_DEPTH: usize = 16;

/// One source resolved for playback.
#[derive(Debug, Clone)]
pub(crate) struct SourcePlan {
    pub name: String,
    /// Position of the source in its pipeline, assigned at compile time.
    pub stream_id: u32,
    pub num_surfaces: u32,
    pub spec: UriSourceSpec,
}

/// One tiler resolved for playback.
#[derive(Debug, Clone)]
pub(crate) struct TilerStage {
    pub name: String,
    pub spec: TilerSpec,
}

/// One sink resolved for playback, sharing its component's counter.
#[derive(Debug, Clone)]
pub(crate) struct SinkStage {
    pub name: String,
    pub spec: SinkSpec,
    pub frames_received: Arc<AtomicU64>,
}

/// One remuxer child resolved for playback.
#[derive(Debug, Clone)]
pub(crate) struct BranchStage {
    pub name: String,
    pub stream_ids: Option<BTreeSet<u32>>,
    pub transforms: Vec<TilerStage>,
    pub sinks: Vec<SinkStage>,
}

/// One remuxer resolved for playback.
#[derive(Debug, Clone)]
pub(crate) struct RemuxerStage {
    pub name: String,
    pub batch_size: u32,
    pub batch_timeout_us: i32,
    pub branches: Vec<BranchStage>,
}

/// Everything the engine needs to run one pipeline, snapshotted from the
/// registry at play time. Registry edits made while the pipeline plays do
/// not reach a running session.
#[derive(Debug, Clone)]
pub(crate) struct PlaybackPlan {
    pub pipeline: String,
    pub streammux: StreamMuxConfig,
    pub sources: Vec<SourcePlan>,
    pub output_tiler: Option<TilerStage>,
    pub transforms: Vec<TilerStage>,
    pub sinks: Vec<SinkStage>,
    pub remuxers: Vec<RemuxerStage>,
}

impl PlaybackPlan {
    /// A plan is runnable with at least one source and at least one sink
    /// somewhere downstream of the muxer.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::PipelineNotRunnable {
                pipeline: self.pipeline.clone(),
                reason: "no sources".into(),
            });
        }
        let branch_sinks: usize = self
            .remuxers
            .iter()
            .flat_map(|r| &r.branches)
            .map(|b| b.sinks.len())
            .sum();
        if self.sinks.is_empty() && branch_sinks == 0 {
            return Err(Error::PipelineNotRunnable {
                pipeline: self.pipeline.clone(),
                reason: "no sinks".into(),
            });
        }
        Ok(())
    }
}

/// A running pipeline: its shutdown signal and task handles.
#[derive(Debug)]
pub struct PlaybackSession {
    id: Uuid,
    pipeline: String,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    started_at: Instant,
}

impl PlaybackSession {
    pub(crate) fn spawn(plan: PlaybackPlan) -> Result<Self> {
        plan.validate()?;

        let PlaybackPlan {
            pipeline,
            streammux,
            sources,
            output_tiler,
            transforms,
            sinks,
            remuxers,
        } = plan;

        let id = Uuid::new_v4();
        let started_at = Instant::now();
        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::new();

        let source_count = sources.len();
        let (frame_tx, frame_rx) =
            mpsc::channel::<StreamFrame>(source_count * FRAMES_PER_SOURCE_DEPTH);
        for source in sources {
            tasks.push(tokio::spawn(source_task(
                source,
                frame_tx.clone(),
                shutdown.subscribe(),
                started_at,
            )));
        }
        // Muxer observes end-of-input when the last source task exits.
        drop(frame_tx);

        let (batch_tx, batch_rx) = mpsc::channel::<FrameBatch>(BATCH_CHANNEL_DEPTH);
        let muxer = MuxerConfig {
            pipeline: pipeline.clone(),
            batch_size: streammux.effective_batch_size(source_count),
            flush_timeout: streammux.flush_timeout(),
            sync_inputs: streammux.sync_inputs,
            width: streammux.width,
            height: streammux.height,
        };
        tasks.push(tokio::spawn(muxer_task(
            muxer,
            frame_rx,
            batch_tx,
            shutdown.subscribe(),
        )));

        let mut endpoints: Vec<Box<dyn BatchEndpoint>> = Vec::new();
        for remuxer in remuxers {
            let (fan_tx, fan_rx) = mpsc::channel::<FrameBatch>(BATCH_CHANNEL_DEPTH);
            endpoints.push(Box::new(RemuxerEndpoint {
                name: remuxer.name.clone(),
                tx: fan_tx,
                closed: false,
            }));
            tasks.push(tokio::spawn(fanout::remuxer_task(
                pipeline.clone(),
                remuxer,
                source_count,
                fan_rx,
                shutdown.subscribe(),
                started_at,
            )));
        }
        for sink in sinks {
            endpoints.push(Box::new(SinkEndpoint::new(sink, started_at)));
        }

        let chain = ChainConfig {
            pipeline: pipeline.clone(),
            output_tiler,
            transforms,
            endpoints,
        };
        tasks.push(tokio::spawn(chain_task(
            chain,
            batch_rx,
            shutdown.subscribe(),
        )));

        info!(
            pipeline = %pipeline,
            session = %id,
            sources = source_count,
            "playback session started"
        );

        Ok(Self {
            id,
            pipeline,
            shutdown,
            tasks,
            started_at,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Session clock origin; source pts values are relative to this.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Signal shutdown and join every task.
    pub(crate) async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        for result in join_all(self.tasks.drain(..)).await {
            if let Err(err) = result {
                if err.is_panic() {
                    warn!(pipeline = %self.pipeline, session = %self.id, %err, "playback task panicked");
                }
            }
        }
        info!(pipeline = %self.pipeline, session = %self.id, "playback session stopped");
    }
}

/// Terminal consumer of muxed batches in the pipeline chain.
#[async_trait]
pub(crate) trait BatchEndpoint: Send {
    fn name(&self) -> &str;
    async fn deliver(&mut self, batch: &FrameBatch);
}

/// Counts frames into a sink component, pacing against pts when the sink
/// is synchronous.
pub(crate) struct SinkEndpoint {
    stage: SinkStage,
    started_at: Instant,
}

impl SinkEndpoint {
    pub(crate) fn new(stage: SinkStage, started_at: Instant) -> Self {
        Self { stage, started_at }
    }
}

#[async_trait]
impl BatchEndpoint for SinkEndpoint {
    fn name(&self) -> &str {
        &self.stage.name
    }

    async fn deliver(&mut self, batch: &FrameBatch) {
        if self.stage.spec.sync() {
            if let Some(pts) = batch.latest_pts() {
                tokio::time::sleep_until(self.started_at + pts).await;
            }
        }
        let frames = batch.len() as u64;
        self.stage
            .frames_received
            .fetch_add(frames, Ordering::Relaxed);
        trace!(sink = %self.stage.name, batch_id = batch.id, frames, "sink consumed batch");
    }
}

/// Forwards batches into a remuxer's fan-out task.
struct RemuxerEndpoint {
    name: String,
    tx: mpsc::Sender<FrameBatch>,
    closed: bool,
}

#[async_trait]
impl BatchEndpoint for RemuxerEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&mut self, batch: &FrameBatch) {
        if self.closed {
            return;
        }
        if self.tx.send(batch.clone()).await.is_err() {
            warn!(remuxer = %self.name, "fan-out input closed");
            self.closed = true;
        }
    }
}

/// Apply one tiler stage: the whole batch collapses into one frame.
pub(crate) fn tile_batch(stage: &TilerStage, batch: FrameBatch) -> FrameBatch {
    let frame = stage.spec.compose(&batch);
    trace!(tiler = %stage.name, batch_id = batch.id, tiled = batch.len(), "composited batch");
    FrameBatch {
        id: batch.id,
        frames: vec![frame],
    }
}

/// Sleep until `deadline`, or forever when there is none. Used inside
/// `select!` so another arm always breaks the wait.
pub(crate) async fn sleep_until_deadline(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending::<()>().await,
    }
}

async fn source_task(
    plan: SourcePlan,
    tx: mpsc::Sender<StreamFrame>,
    mut shutdown: watch::Receiver<bool>,
    started_at: Instant,
) {
    let period = plan.spec.frame_interval();
    let mut ticker = interval_at(started_at + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sequence: u64 = 0;
    let mut emitted: u64 = 0;

    debug!(
        source = %plan.name,
        stream_id = plan.stream_id,
        uri = %plan.spec.uri,
        live = plan.spec.is_live,
        "source task started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if plan.spec.emits_at(sequence) {
                    let pts = if plan.spec.is_live {
                        started_at.elapsed()
                    } else {
                        period * (sequence as u32 + 1)
                    };
                    let frame = StreamFrame::synthetic(
                        plan.stream_id,
                        sequence,
                        pts,
                        plan.spec.width,
                        plan.spec.height,
                        plan.num_surfaces,
                    );
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                    emitted += 1;
                }
                sequence += 1;
            }
        }
    }
    debug!(source = %plan.name, ticks = sequence, frames = emitted, "source task exited");
}

struct MuxerConfig {
    pipeline: String,
    batch_size: usize,
    flush_timeout: Option<Duration>,
    sync_inputs: bool,
    width: u32,
    height: u32,
}

async fn muxer_task(
    config: MuxerConfig,
    mut rx: mpsc::Receiver<StreamFrame>,
    tx: mpsc::Sender<FrameBatch>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut batcher =
        FrameBatcher::new(config.batch_size, config.flush_timeout, config.sync_inputs);
    debug!(
        pipeline = %config.pipeline,
        batch_size = config.batch_size,
        sync_inputs = config.sync_inputs,
        "muxer task started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep_until_deadline(batcher.deadline()) => {
                if let Some(batch) = batcher.flush() {
                    if emit_batch(&config, &tx, batch).await.is_err() {
                        break;
                    }
                }
            }
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if let Some(batch) = batcher.push(frame) {
                        if emit_batch(&config, &tx, batch).await.is_err() {
                            break;
                        }
                    }
                }
                None => {
                    // Sources are gone. Drain the partial batch only on a
                    // natural end of input, not on stop.
                    if !*shutdown.borrow() {
                        if let Some(batch) = batcher.flush() {
                            let _ = emit_batch(&config, &tx, batch).await;
                        }
                    }
                    break;
                }
            },
        }
    }
    debug!(pipeline = %config.pipeline, "muxer task exited");
}

/// Scale frames to the muxer's output surface and forward the batch.
async fn emit_batch(
    config: &MuxerConfig,
    tx: &mpsc::Sender<FrameBatch>,
    mut batch: FrameBatch,
) -> std::result::Result<(), mpsc::error::SendError<FrameBatch>> {
    for frame in &mut batch.frames {
        frame.width = config.width;
        frame.height = config.height;
    }
    trace!(
        pipeline = %config.pipeline,
        batch_id = batch.id,
        frames = batch.len(),
        "muxer emitted batch"
    );
    tx.send(batch).await
}

struct ChainConfig {
    pipeline: String,
    output_tiler: Option<TilerStage>,
    transforms: Vec<TilerStage>,
    endpoints: Vec<Box<dyn BatchEndpoint>>,
}

async fn chain_task(
    mut chain: ChainConfig,
    mut rx: mpsc::Receiver<FrameBatch>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(
        pipeline = %chain.pipeline,
        transforms = chain.transforms.len() + usize::from(chain.output_tiler.is_some()),
        endpoints = chain.endpoints.len(),
        "chain task started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            batch = rx.recv() => match batch {
                Some(mut batch) => {
                    if let Some(stage) = &chain.output_tiler {
                        batch = tile_batch(stage, batch);
                    }
                    for stage in &chain.transforms {
                        batch = tile_batch(stage, batch);
                    }
                    for endpoint in &mut chain.endpoints {
                        endpoint.deliver(&batch).await;
                    }
                }
                None => break,
            },
        }
    }
    debug!(pipeline = %chain.pipeline, "chain task exited");
}
