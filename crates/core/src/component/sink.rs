//! Terminal components that consume batches.

use crate::component::ComponentKind;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Kind-specific sink configuration.
#[derive(Debug, Clone)]
pub enum SinkSpec {
    /// Counts and discards frames.
    Fake { sync: bool },
    /// Models an on-screen window at the given viewport.
    Window {
        offset_x: u32,
        offset_y: u32,
        width: u32,
        height: u32,
        sync: bool,
    },
}

impl SinkSpec {
    pub fn kind(&self) -> ComponentKind {
        match self {
            SinkSpec::Fake { .. } => ComponentKind::FakeSink,
            SinkSpec::Window { .. } => ComponentKind::WindowSink,
        }
    }

    /// Whether delivery is paced against each frame's pts.
    pub fn sync(&self) -> bool {
        match self {
            SinkSpec::Fake { sync } => *sync,
            SinkSpec::Window { sync, .. } => *sync,
        }
    }

    pub fn set_sync(&mut self, enabled: bool) {
        match self {
            SinkSpec::Fake { sync } => *sync = enabled,
            SinkSpec::Window { sync, .. } => *sync = enabled,
        }
    }
}

/// Shared sink state: the mutable spec plus the frame counter the playback
/// engine bumps while the owning pipeline runs. The counter is cumulative
/// across play/stop cycles.
#[derive(Debug)]
pub struct SinkHandle {
    pub spec: RwLock<SinkSpec>,
    frames_received: Arc<AtomicU64>,
}

impl SinkHandle {
    pub fn new(spec: SinkSpec) -> Self {
        Self {
            spec: RwLock::new(spec),
            frames_received: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Counter handle for the playback engine.
    pub(crate) fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_received)
    }
}
