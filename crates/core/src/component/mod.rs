//! Named pipeline building blocks.
//!
//! Every component lives in one flat, process-wide namespace managed by
//! [`Services`](crate::services::Services). A component is created free,
//! may be claimed by exactly one owner (a pipeline, a stream muxer, a tee,
//! or a branch), and returns to the free pool when released or when its
//! owner is torn down. All mutable state sits behind per-component locks
//! so the registry itself only hands out `Arc`s.

mod branch;
mod remuxer;
mod sink;
mod source;
mod tiler;

pub use branch::BranchSpec;
pub use remuxer::{
    BranchLink, RemuxerSpec, DEFAULT_REMUXER_BATCH_SIZE, DEFAULT_REMUXER_BATCH_TIMEOUT_US,
};
pub use sink::{SinkHandle, SinkSpec};
pub use source::{UriSourceSpec, DEFAULT_SOURCE_FRAME_RATE};
pub use tiler::TilerSpec;

use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::fmt;

/// What currently holds a claim on a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    /// Added to a pipeline's component chain.
    Pipeline(String),
    /// Installed as a pipeline's stream-muxer output tiler.
    Streammux(String),
    /// Added as a child of a tee.
    Tee(String),
    /// Added to a branch's component chain.
    Branch(String),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Pipeline(name) => write!(f, "pipeline {name:?}"),
            Owner::Streammux(name) => write!(f, "stream muxer of pipeline {name:?}"),
            Owner::Tee(name) => write!(f, "tee {name:?}"),
            Owner::Branch(name) => write!(f, "branch {name:?}"),
        }
    }
}

/// Component kind discriminant, used for type checks and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    UriSource,
    FakeSink,
    WindowSink,
    Tiler,
    Branch,
    Remuxer,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::UriSource => "uri-source",
            ComponentKind::FakeSink => "fake-sink",
            ComponentKind::WindowSink => "window-sink",
            ComponentKind::Tiler => "tiler",
            ComponentKind::Branch => "branch",
            ComponentKind::Remuxer => "remuxer",
        }
    }

    /// Whether this kind terminates a chain and consumes batches.
    pub fn is_sink(&self) -> bool {
        matches!(self, ComponentKind::FakeSink | ComponentKind::WindowSink)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific configuration and state.
#[derive(Debug)]
pub enum ComponentSpec {
    UriSource(RwLock<UriSourceSpec>),
    Sink(SinkHandle),
    Tiler(RwLock<TilerSpec>),
    Branch(RwLock<BranchSpec>),
    Remuxer(RwLock<RemuxerSpec>),
}

/// A named component registered with the services facade.
#[derive(Debug)]
pub struct Component {
    name: String,
    gpu_id: RwLock<u32>,
    owner: RwLock<Option<Owner>>,
    spec: ComponentSpec,
}

impl Component {
    pub(crate) fn new(name: &str, spec: ComponentSpec) -> Self {
        Self {
            name: name.to_owned(),
            gpu_id: RwLock::new(0),
            owner: RwLock::new(None),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ComponentKind {
        match &self.spec {
            ComponentSpec::UriSource(_) => ComponentKind::UriSource,
            ComponentSpec::Sink(handle) => handle.spec.read().kind(),
            ComponentSpec::Tiler(_) => ComponentKind::Tiler,
            ComponentSpec::Branch(_) => ComponentKind::Branch,
            ComponentSpec::Remuxer(_) => ComponentKind::Remuxer,
        }
    }

    pub fn gpu_id(&self) -> u32 {
        *self.gpu_id.read()
    }

    pub fn set_gpu_id(&self, gpu_id: u32) {
        *self.gpu_id.write() = gpu_id;
    }

    /// Current owner, if any.
    pub fn owner(&self) -> Option<Owner> {
        self.owner.read().clone()
    }

    pub(crate) fn spec(&self) -> &ComponentSpec {
        &self.spec
    }

    /// Record `owner`'s claim. Fails when another owner already holds one.
    pub(crate) fn claim(&self, owner: Owner) -> Result<()> {
        let mut slot = self.owner.write();
        if let Some(existing) = slot.as_ref() {
            return Err(Error::ComponentInUse {
                name: self.name.clone(),
                owner: existing.clone(),
            });
        }
        *slot = Some(owner);
        Ok(())
    }

    /// Drop the claim, but only if it is still held by `owner`.
    pub(crate) fn release_if(&self, owner: &Owner) {
        let mut slot = self.owner.write();
        if slot.as_ref() == Some(owner) {
            *slot = None;
        }
    }

    pub(crate) fn as_source(&self) -> Result<&RwLock<UriSourceSpec>> {
        match &self.spec {
            ComponentSpec::UriSource(spec) => Ok(spec),
            _ => Err(self.wrong_type("uri-source")),
        }
    }

    pub(crate) fn as_sink(&self) -> Result<&SinkHandle> {
        match &self.spec {
            ComponentSpec::Sink(handle) => Ok(handle),
            _ => Err(self.wrong_type("sink")),
        }
    }

    pub(crate) fn as_tiler(&self) -> Result<&RwLock<TilerSpec>> {
        match &self.spec {
            ComponentSpec::Tiler(spec) => Ok(spec),
            _ => Err(self.wrong_type("tiler")),
        }
    }

    pub(crate) fn as_branch(&self) -> Result<&RwLock<BranchSpec>> {
        match &self.spec {
            ComponentSpec::Branch(spec) => Ok(spec),
            _ => Err(self.wrong_type("branch")),
        }
    }

    pub(crate) fn as_remuxer(&self) -> Result<&RwLock<RemuxerSpec>> {
        match &self.spec {
            ComponentSpec::Remuxer(spec) => Ok(spec),
            _ => Err(self.wrong_type("remuxer")),
        }
    }

    fn wrong_type(&self, expected: &'static str) -> Error {
        Error::ComponentNotTheCorrectType {
            name: self.name.clone(),
            expected,
        }
    }
}
