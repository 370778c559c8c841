//! Playback engine.
//!
//! Playing a pipeline compiles its graph into a plan and spawns tokio
//! tasks wired with bounded channels:
//!
//! ```text
//! source tasks ──mpsc──▶ muxer task ──mpsc──▶ chain task ──▶ sinks
//!                        (FrameBatcher)         │
//!                                               └─mpsc──▶ remuxer fan-out ──▶ branch sinks
//! ```
//!
//! Every task subscribes to one watch channel for shutdown; stopping a
//! session joins all of them before returning.

mod batcher;
mod fanout;
pub(crate) mod session;

pub use batcher::FrameBatcher;
pub use session::PlaybackSession;

pub(crate) use session::{
    BranchStage, PlaybackPlan, RemuxerStage, SinkStage, SourcePlan, TilerStage,
};
