//! Error types for streamweave-core

use crate::component::Owner;
use crate::pipeline::PipelineState;
use thiserror::Error;

/// Result type alias for streamweave-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for streamweave-core
#[derive(Debug, Error)]
pub enum Error {
    /// A name argument was empty or otherwise unusable
    #[error("Invalid name: {name:?}")]
    InvalidName { name: String },

    /// A property value failed validation
    #[error("Invalid property value: {reason}")]
    InvalidProperty { reason: String },

    /// A component with this name is already registered
    #[error("Component name not unique: {name:?}")]
    ComponentNameNotUnique { name: String },

    /// No component with this name is registered
    #[error("Component not found: {name:?}")]
    ComponentNameNotFound { name: String },

    /// The component is claimed by a pipeline, tee, or branch
    #[error("Component {name:?} is in use by {owner}")]
    ComponentInUse { name: String, owner: Owner },

    /// The named component exists but has the wrong kind for this operation
    #[error("Component {name:?} is not a {expected}")]
    ComponentNotTheCorrectType {
        name: String,
        expected: &'static str,
    },

    /// The component is not a child of the named container
    #[error("Component {child:?} is not a child of {parent:?}")]
    ComponentNotChild { parent: String, child: String },

    /// A pipeline with this name is already registered
    #[error("Pipeline name not unique: {name:?}")]
    PipelineNameNotUnique { name: String },

    /// No pipeline with this name is registered
    #[error("Pipeline not found: {name:?}")]
    PipelineNameNotFound { name: String },

    /// Graph mutation attempted while the pipeline is playing
    #[error("Pipeline {pipeline:?} must be stopped first")]
    PipelineNotStopped { pipeline: String },

    /// The pipeline graph cannot be compiled into a runnable plan
    #[error("Pipeline {pipeline:?} cannot play: {reason}")]
    PipelineNotRunnable { pipeline: String, reason: String },

    /// Play/stop called in the wrong lifecycle state
    #[error("Pipeline {pipeline:?}: invalid transition from {from} to {to}")]
    InvalidStateTransition {
        pipeline: String,
        from: PipelineState,
        to: PipelineState,
    },

    /// The pipeline's stream muxer already has an output tiler
    #[error("Pipeline {pipeline:?} already has output tiler {tiler:?}")]
    OutputTilerAlreadySet { pipeline: String, tiler: String },

    /// The pipeline's stream muxer has no output tiler to remove
    #[error("Pipeline {pipeline:?} has no output tiler")]
    OutputTilerNotSet { pipeline: String },

    /// Manifest parsing or validation error
    #[error("Invalid manifest: {0}")]
    Manifest(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a manifest error
    pub fn manifest<S: Into<String>>(msg: S) -> Self {
        Error::Manifest(msg.into())
    }

    /// Create an invalid-property error
    pub fn property<S: Into<String>>(reason: S) -> Self {
        Error::InvalidProperty {
            reason: reason.into(),
        }
    }
}
