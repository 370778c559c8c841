//! StreamWeave Core - named media components and a batched playback engine
//!
//! This crate provides a flat, name-keyed services API over managed media
//! pipelines: clients create components (sources, sinks, tilers, branches,
//! remuxers) and pipelines by name, wire them together, and drive playback,
//! with every fallible call returning a typed [`Error`].
//!
//! # Architecture
//!
//! - [`services`] is the public surface: two registries (components and
//!   pipelines) plus every operation defined over them.
//! - [`component`] and [`pipeline`] hold the configuration model. Components
//!   are owned exclusively once added somewhere; a claim records who holds
//!   them and blocks double-use and deletion.
//! - [`runtime`] is the playback engine: playing a pipeline snapshots its
//!   graph into a plan and spawns tokio tasks (per-source producers, a
//!   batching muxer, per-remuxer fan-out). Stopping joins them all.
//! - [`manifest`] loads the same object graph from YAML or JSON documents.
//!
//! # Example
//!
//! ```no_run
//! use streamweave_core::Services;
//!
//! #[tokio::main]
//! async fn main() -> streamweave_core::Result<()> {
//!     streamweave_core::init()?;
//!     let services = Services::global();
//!
//!     services.source_uri_new("cam-0", "rtsp://demo/stream0", true, 0)?;
//!     services.source_uri_new("cam-1", "rtsp://demo/stream1", true, 0)?;
//!     services.tiler_new("mosaic", 1920, 1080)?;
//!     services.sink_fake_new("probe")?;
//!
//!     services.pipeline_new("main")?;
//!     services.pipeline_component_add_many("main", &["cam-0", "cam-1", "mosaic", "probe"])?;
//!
//!     services.pipeline_play("main").await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!     services.pipeline_stop("main").await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod component;
pub mod data;
pub mod manifest;
pub mod pipeline;
pub mod runtime;
pub mod services;

mod error;
pub use error::{Error, Result};
pub use services::Services;

/// Initialize logging for embedders that do not install their own
/// subscriber. Safe to call more than once.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .ok();
    Ok(())
}
