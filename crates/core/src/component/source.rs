//! Synthetic URI sources.
//!
//! A production deployment would put a demuxer and decoder behind this
//! spec. The playback engine instead synthesizes frames at the configured
//! rate: live sources timestamp frames off the session clock, file sources
//! off their own tick counter. Either way the muxer downstream sees the
//! same shape of traffic a decoder would produce.

use std::time::Duration;

/// Default output rate for synthetic sources, as (numerator, denominator).
pub const DEFAULT_SOURCE_FRAME_RATE: (u32, u32) = (30, 1);

const DEFAULT_SOURCE_WIDTH: u32 = 1280;
const DEFAULT_SOURCE_HEIGHT: u32 = 720;

/// Configuration for a URI source component.
#[derive(Debug, Clone)]
pub struct UriSourceSpec {
    pub uri: String,
    /// Live sources cannot be paused or re-wound; their frames are
    /// timestamped off the session clock.
    pub is_live: bool,
    /// Keep one frame in every `drop_frame_interval` ticks. 0 and 1 both
    /// keep every frame.
    pub drop_frame_interval: u32,
    /// Output rate as frames per second (numerator / denominator).
    pub frame_rate: (u32, u32),
    pub width: u32,
    pub height: u32,
}

impl UriSourceSpec {
    pub fn new(uri: &str, is_live: bool, drop_frame_interval: u32) -> Self {
        Self {
            uri: uri.to_owned(),
            is_live,
            drop_frame_interval,
            frame_rate: DEFAULT_SOURCE_FRAME_RATE,
            width: DEFAULT_SOURCE_WIDTH,
            height: DEFAULT_SOURCE_HEIGHT,
        }
    }

    /// Tick period derived from the configured frame rate.
    pub fn frame_interval(&self) -> Duration {
        let (num, den) = self.frame_rate;
        if num == 0 {
            // Guard against a zeroed rate; one frame per second.
            return Duration::from_secs(1);
        }
        Duration::from_secs_f64(den.max(1) as f64 / num as f64)
    }

    /// Whether the tick at `sequence` produces a frame.
    pub fn emits_at(&self, sequence: u64) -> bool {
        match self.drop_frame_interval {
            0 | 1 => true,
            n => sequence % n as u64 == 0,
        }
    }
}
