//! Tilers composite every stream in a batch into one grid frame.

use crate::data::{FrameBatch, StreamFrame};
use bytes::Bytes;

/// Configuration for a tiler component.
#[derive(Debug, Clone)]
pub struct TilerSpec {
    pub width: u32,
    pub height: u32,
    /// Forced grid shape as (rows, columns). `None` sizes a near-square
    /// grid from the number of streams in each batch.
    pub grid: Option<(u32, u32)>,
}

impl TilerSpec {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            grid: None,
        }
    }

    /// Grid shape used for `n` tiles.
    pub fn grid_for(&self, n: usize) -> (u32, u32) {
        if let Some((rows, columns)) = self.grid {
            return (rows.max(1), columns.max(1));
        }
        let n = n.max(1) as u32;
        let columns = (n as f64).sqrt().ceil() as u32;
        let rows = n.div_ceil(columns.max(1));
        (rows.max(1), columns.max(1))
    }

    /// Composite a batch into a single output frame. The output keeps the
    /// batch id as its sequence number and the latest pts in the batch, so
    /// downstream pacing is unaffected by tiling.
    pub fn compose(&self, batch: &FrameBatch) -> StreamFrame {
        let ids = batch.stream_ids();
        let (rows, columns) = self.grid_for(ids.len());

        let mut data = Vec::with_capacity(8 + ids.len() * 4);
        data.extend_from_slice(&rows.to_le_bytes());
        data.extend_from_slice(&columns.to_le_bytes());
        for id in &ids {
            data.extend_from_slice(&id.to_le_bytes());
        }

        StreamFrame {
            stream_id: 0,
            sequence: batch.id,
            pts: batch.latest_pts().unwrap_or_default(),
            width: self.width,
            height: self.height,
            num_surfaces: 1,
            data: Bytes::from(data),
        }
    }
}
