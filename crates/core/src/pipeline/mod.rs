//! Pipelines assemble registered components into a runnable graph.
//!
//! A pipeline holds an ordered list of member component names plus its
//! stream-muxer settings. It does not hold the components themselves;
//! membership is resolved against the flat registry when the pipeline is
//! compiled for playback. While a pipeline plays it also holds the live
//! [`PlaybackSession`](crate::runtime::PlaybackSession), guarded by an
//! async mutex so play and stop serialize.

mod streammux;

pub use streammux::{
    StreamMuxConfig, DEFAULT_STREAMMUX_BATCH_SIZE, DEFAULT_STREAMMUX_BATCH_TIMEOUT_US,
    DEFAULT_STREAMMUX_HEIGHT, DEFAULT_STREAMMUX_WIDTH, MAX_SURFACES_PER_FRAME,
};
pub(crate) use streammux::timeout_from_us;

use crate::error::{Error, Result};
use crate::runtime::PlaybackSession;
use parking_lot::RwLock;
use std::fmt;
use tokio::sync::Mutex;

/// Lifecycle state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Stopped,
    Playing,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Stopped => f.write_str("stopped"),
            PipelineState::Playing => f.write_str("playing"),
        }
    }
}

#[derive(Debug, Default)]
struct PipelineInner {
    /// Member component names in add order.
    components: Vec<String>,
    streammux: StreamMuxConfig,
    state: PipelineState,
}

/// A named pipeline: an ordered component chain plus muxer settings.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    inner: RwLock<PipelineInner>,
    session: Mutex<Option<PlaybackSession>>,
}

impl Pipeline {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            inner: RwLock::new(PipelineInner::default()),
            session: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PipelineState {
        self.inner.read().state
    }

    /// Member component names in add order.
    pub fn components(&self) -> Vec<String> {
        self.inner.read().components.clone()
    }

    pub fn contains(&self, component: &str) -> bool {
        self.inner.read().components.iter().any(|c| c == component)
    }

    /// Snapshot of the stream-muxer settings.
    pub fn streammux(&self) -> StreamMuxConfig {
        self.inner.read().streammux.clone()
    }

    pub(crate) fn add_component(&self, component: &str) {
        self.inner.write().components.push(component.to_owned());
    }

    pub(crate) fn remove_component(&self, component: &str) -> bool {
        let mut inner = self.inner.write();
        let before = inner.components.len();
        inner.components.retain(|c| c != component);
        inner.components.len() != before
    }

    pub(crate) fn update_streammux<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut StreamMuxConfig) -> Result<()>,
    {
        update(&mut self.inner.write().streammux)
    }

    /// Guard for graph mutation: fails while the pipeline plays.
    pub(crate) fn require_stopped(&self) -> Result<()> {
        match self.state() {
            PipelineState::Stopped => Ok(()),
            PipelineState::Playing => Err(Error::PipelineNotStopped {
                pipeline: self.name.clone(),
            }),
        }
    }

    pub(crate) fn set_state(&self, state: PipelineState) {
        self.inner.write().state = state;
    }

    /// Slot holding the live playback session while the pipeline plays.
    pub(crate) fn session(&self) -> &Mutex<Option<PlaybackSession>> {
        &self.session
    }
}
