//! Stream-muxer configuration carried by every pipeline.

use std::time::Duration;

/// Batch size of 0 resolves to the pipeline's source count at play time.
pub const DEFAULT_STREAMMUX_BATCH_SIZE: u32 = 0;
/// Timeout of -1 waits indefinitely for a full batch.
pub const DEFAULT_STREAMMUX_BATCH_TIMEOUT_US: i32 = -1;
pub const DEFAULT_STREAMMUX_WIDTH: u32 = 1920;
pub const DEFAULT_STREAMMUX_HEIGHT: u32 = 1080;
/// Surfaces per frame accepted by the muxer, 1 through this bound.
pub const MAX_SURFACES_PER_FRAME: u32 = 4;

/// Stream-muxer settings for one pipeline. Mutated through the services
/// facade and snapshotted by the playback engine at play time.
#[derive(Debug, Clone)]
pub struct StreamMuxConfig {
    pub batch_size: u32,
    /// Microseconds to wait before flushing a partial batch. Negative
    /// disables timed flushes entirely.
    pub batch_timeout_us: i32,
    /// Output surface dimensions; frames are scaled to these on mux.
    pub width: u32,
    pub height: u32,
    pub num_surfaces_per_frame: u32,
    /// Admit at most one frame per stream into each batch, ordered by
    /// stream id.
    pub sync_inputs: bool,
    pub gpu_id: u32,
    /// Name of the tiler claimed as the muxer's output tiler.
    pub output_tiler: Option<String>,
}

impl Default for StreamMuxConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_STREAMMUX_BATCH_SIZE,
            batch_timeout_us: DEFAULT_STREAMMUX_BATCH_TIMEOUT_US,
            width: DEFAULT_STREAMMUX_WIDTH,
            height: DEFAULT_STREAMMUX_HEIGHT,
            num_surfaces_per_frame: 1,
            sync_inputs: false,
            gpu_id: 0,
            output_tiler: None,
        }
    }
}

impl StreamMuxConfig {
    /// Resolve the configured batch size against the number of sources.
    pub fn effective_batch_size(&self, source_count: usize) -> usize {
        if self.batch_size > 0 {
            self.batch_size as usize
        } else {
            source_count.max(1)
        }
    }

    /// Resolve the timeout into an optional flush duration.
    pub fn flush_timeout(&self) -> Option<Duration> {
        timeout_from_us(self.batch_timeout_us)
    }
}

/// Convert a microsecond timeout into a flush duration. Negative values
/// disable timed flushes; zero flushes partial batches as soon as the
/// muxer is polled.
pub(crate) fn timeout_from_us(us: i32) -> Option<Duration> {
    if us < 0 {
        None
    } else {
        Some(Duration::from_micros(us as u64))
    }
}
