//! Frame and batch data model.
//!
//! A [`StreamFrame`] is one video frame tagged with the id of the stream it
//! came from. A [`FrameBatch`] is the unit the stream muxer emits: frames
//! from one or more streams travelling the rest of the pipeline together.
//!
//! Sources here are synthetic. Frames carry a small deterministic payload
//! header instead of pixel data, which keeps the data plane honest about
//! timing, batching, and fan-out without pulling in codecs.

use bytes::Bytes;
use std::collections::BTreeSet;
use std::time::Duration;

/// One video frame flowing through a pipeline.
#[derive(Debug, Clone)]
pub struct StreamFrame {
    /// Id of the originating stream. Assigned from the source's position
    /// in its pipeline at play time, starting at 0.
    pub stream_id: u32,
    /// Per-source tick counter. When frame dropping is active the emitted
    /// sequence numbers are sparse but still strictly increasing.
    pub sequence: u64,
    /// Presentation timestamp relative to pipeline start.
    pub pts: Duration,
    pub width: u32,
    pub height: u32,
    /// Surfaces carried by this frame. Multi-camera rigs batch several
    /// surfaces into one frame.
    pub num_surfaces: u32,
    /// Opaque payload.
    pub data: Bytes,
}

impl StreamFrame {
    /// Build a synthetic frame whose payload encodes its own identity.
    pub fn synthetic(
        stream_id: u32,
        sequence: u64,
        pts: Duration,
        width: u32,
        height: u32,
        num_surfaces: u32,
    ) -> Self {
        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(&stream_id.to_le_bytes());
        data.extend_from_slice(&sequence.to_le_bytes());
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        Self {
            stream_id,
            sequence,
            pts,
            width,
            height,
            num_surfaces,
            data: Bytes::from(data),
        }
    }
}

/// A muxed batch of frames.
#[derive(Debug, Clone)]
pub struct FrameBatch {
    /// Monotonic id, scoped to the muxer that formed the batch.
    pub id: u64,
    pub frames: Vec<StreamFrame>,
}

impl FrameBatch {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Largest pts carried by any frame in the batch.
    pub fn latest_pts(&self) -> Option<Duration> {
        self.frames.iter().map(|f| f.pts).max()
    }

    /// Distinct stream ids present in the batch, ascending.
    pub fn stream_ids(&self) -> BTreeSet<u32> {
        self.frames.iter().map(|f| f.stream_id).collect()
    }

    /// Frames whose stream id passes `filter`, in batch order. A `None`
    /// filter selects every frame.
    pub fn select(&self, filter: Option<&BTreeSet<u32>>) -> Vec<StreamFrame> {
        match filter {
            None => self.frames.clone(),
            Some(ids) => self
                .frames
                .iter()
                .filter(|f| ids.contains(&f.stream_id))
                .cloned()
                .collect(),
        }
    }
}
