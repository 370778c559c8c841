//! Declarative manifests.
//!
//! A manifest describes components, their wiring, and pipelines in one
//! YAML or JSON document. [`apply`] replays it onto a [`Services`]
//! instance through the same operations an embedder would call, so a
//! manifest can never reach a state the API cannot.

use crate::component::DEFAULT_REMUXER_BATCH_TIMEOUT_US;
use crate::error::{Error, Result};
use crate::pipeline::MAX_SURFACES_PER_FRAME;
use crate::services::Services;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

/// Manifest document (v1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version
    #[serde(default = "default_version")]
    pub version: String,

    /// Optional document name, used only for logging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Components to register, in declaration order
    #[serde(default)]
    pub components: Vec<ComponentDecl>,

    /// Pipelines to assemble from the declared components
    #[serde(default)]
    pub pipelines: Vec<PipelineDecl>,
}

impl Manifest {
    /// Names of declared pipelines, in declaration order.
    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name.as_str()).collect()
    }

    /// Names of declared sinks, in declaration order.
    pub fn sink_names(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|c| c.is_sink())
            .map(|c| c.name())
            .collect()
    }
}

/// One component declaration, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentDecl {
    UriSource {
        name: String,
        uri: String,
        #[serde(default)]
        live: bool,
        #[serde(default)]
        drop_frame_interval: u32,
        /// Output rate override as (numerator, denominator)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_rate: Option<(u32, u32)>,
    },
    FakeSink {
        name: String,
        #[serde(default = "default_sync")]
        sync: bool,
    },
    WindowSink {
        name: String,
        #[serde(default)]
        offset_x: u32,
        #[serde(default)]
        offset_y: u32,
        width: u32,
        height: u32,
        #[serde(default = "default_sync")]
        sync: bool,
    },
    Tiler {
        name: String,
        width: u32,
        height: u32,
        /// Forced grid shape as (rows, columns); omitted means auto
        #[serde(default, skip_serializing_if = "Option::is_none")]
        grid: Option<(u32, u32)>,
    },
    Branch {
        name: String,
        /// Member chain, tilers and sinks only
        #[serde(default)]
        components: Vec<String>,
    },
    Remuxer {
        name: String,
        #[serde(default)]
        batch_size: u32,
        #[serde(default = "default_remuxer_timeout")]
        batch_timeout_us: i32,
        #[serde(default)]
        branches: Vec<BranchLinkDecl>,
    },
}

impl ComponentDecl {
    pub fn name(&self) -> &str {
        match self {
            ComponentDecl::UriSource { name, .. }
            | ComponentDecl::FakeSink { name, .. }
            | ComponentDecl::WindowSink { name, .. }
            | ComponentDecl::Tiler { name, .. }
            | ComponentDecl::Branch { name, .. }
            | ComponentDecl::Remuxer { name, .. } => name,
        }
    }

    pub fn is_sink(&self) -> bool {
        matches!(
            self,
            ComponentDecl::FakeSink { .. } | ComponentDecl::WindowSink { .. }
        )
    }

    fn kind_str(&self) -> &'static str {
        match self {
            ComponentDecl::UriSource { .. } => "uri_source",
            ComponentDecl::FakeSink { .. } => "fake_sink",
            ComponentDecl::WindowSink { .. } => "window_sink",
            ComponentDecl::Tiler { .. } => "tiler",
            ComponentDecl::Branch { .. } => "branch",
            ComponentDecl::Remuxer { .. } => "remuxer",
        }
    }
}

/// One child attached to a remuxer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchLinkDecl {
    /// Branch or sink component name
    pub name: String,

    /// Restrict the child to these stream ids; omitted connects all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_ids: Option<Vec<u32>>,
}

/// One pipeline declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDecl {
    pub name: String,

    /// Member components in add order; sources take stream ids from
    /// their position here
    #[serde(default)]
    pub components: Vec<String>,

    /// Stream-muxer overrides; omitted fields keep their defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streammux: Option<StreamMuxDecl>,
}

/// Stream-muxer settings for one pipeline. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamMuxDecl {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_timeout_us: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_surfaces_per_frame: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_inputs: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_id: Option<u32>,

    /// Tiler component to install on the muxer output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiler: Option<String>,
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_sync() -> bool {
    true
}

fn default_remuxer_timeout() -> i32 {
    DEFAULT_REMUXER_BATCH_TIMEOUT_US
}

/// Parse a YAML manifest string.
pub fn parse_yaml(content: &str) -> Result<Manifest> {
    Ok(serde_yaml::from_str(content)?)
}

/// Parse a JSON manifest string.
pub fn parse_json(content: &str) -> Result<Manifest> {
    Ok(serde_json::from_str(content)?)
}

/// Serialize a manifest back to YAML.
pub fn to_yaml(manifest: &Manifest) -> Result<String> {
    Ok(serde_yaml::to_string(manifest)?)
}

/// Load a manifest from disk, dispatching on the file extension.
pub fn load(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => parse_yaml(&content),
        Some("json") => parse_json(&content),
        other => Err(Error::manifest(format!(
            "Unsupported manifest extension: {}",
            other.unwrap_or("none")
        ))),
    }
}

/// Validate a manifest for internal consistency.
///
/// Checks names, references between declarations, and value ranges.
/// Conflicts with already-registered objects only surface in [`apply`].
pub fn validate(manifest: &Manifest) -> Result<()> {
    if manifest.version != "v1" {
        return Err(Error::manifest(format!(
            "Unsupported manifest version: {}",
            manifest.version
        )));
    }

    let mut seen = HashSet::new();
    for decl in &manifest.components {
        if decl.name().trim().is_empty() {
            return Err(Error::manifest("Component with empty name"));
        }
        if !seen.insert(decl.name()) {
            return Err(Error::manifest(format!(
                "Duplicate component name: {}",
                decl.name()
            )));
        }
        validate_component(decl)?;
    }

    let by_name: HashMap<&str, &ComponentDecl> = manifest
        .components
        .iter()
        .map(|c| (c.name(), c))
        .collect();
    for decl in &manifest.components {
        validate_references(decl, &by_name)?;
    }

    let mut seen_pipelines = HashSet::new();
    for pipeline in &manifest.pipelines {
        if pipeline.name.trim().is_empty() {
            return Err(Error::manifest("Pipeline with empty name"));
        }
        if !seen_pipelines.insert(pipeline.name.as_str()) {
            return Err(Error::manifest(format!(
                "Duplicate pipeline name: {}",
                pipeline.name
            )));
        }
        validate_pipeline(pipeline, &by_name)?;
    }

    Ok(())
}

fn validate_component(decl: &ComponentDecl) -> Result<()> {
    match decl {
        ComponentDecl::UriSource {
            name,
            uri,
            frame_rate,
            ..
        } => {
            if uri.trim().is_empty() {
                return Err(Error::manifest(format!("Source {name:?} has empty uri")));
            }
            if let Some((numerator, denominator)) = frame_rate {
                if *numerator == 0 || *denominator == 0 {
                    return Err(Error::manifest(format!(
                        "Source {name:?} has zero frame rate term"
                    )));
                }
            }
        }
        ComponentDecl::WindowSink {
            name,
            width,
            height,
            ..
        }
        | ComponentDecl::Tiler {
            name,
            width,
            height,
            ..
        } => {
            if *width == 0 || *height == 0 {
                return Err(Error::manifest(format!(
                    "Component {name:?} has zero dimensions"
                )));
            }
        }
        _ => {}
    }

    if let ComponentDecl::Tiler {
        name,
        grid: Some((rows, columns)),
        ..
    } = decl
    {
        if *rows == 0 || *columns == 0 {
            return Err(Error::manifest(format!(
                "Tiler {name:?} has zero grid term"
            )));
        }
    }

    Ok(())
}

fn validate_references(
    decl: &ComponentDecl,
    by_name: &HashMap<&str, &ComponentDecl>,
) -> Result<()> {
    match decl {
        ComponentDecl::Branch { name, components } => {
            for member in components {
                let Some(target) = by_name.get(member.as_str()) else {
                    return Err(Error::manifest(format!(
                        "Branch {name:?} references unknown component: {member}"
                    )));
                };
                if !matches!(target, ComponentDecl::Tiler { .. }) && !target.is_sink() {
                    return Err(Error::manifest(format!(
                        "Branch {name:?} member {member:?} is a {}, expected tiler or sink",
                        target.kind_str()
                    )));
                }
            }
        }
        ComponentDecl::Remuxer { name, branches, .. } => {
            for link in branches {
                let Some(target) = by_name.get(link.name.as_str()) else {
                    return Err(Error::manifest(format!(
                        "Remuxer {name:?} references unknown component: {}",
                        link.name
                    )));
                };
                if !matches!(target, ComponentDecl::Branch { .. }) && !target.is_sink() {
                    return Err(Error::manifest(format!(
                        "Remuxer {name:?} child {:?} is a {}, expected branch or sink",
                        link.name,
                        target.kind_str()
                    )));
                }
                if let Some(ids) = &link.stream_ids {
                    if ids.is_empty() {
                        return Err(Error::manifest(format!(
                            "Remuxer {name:?} child {:?} has an empty stream id list",
                            link.name
                        )));
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn validate_pipeline(
    pipeline: &PipelineDecl,
    by_name: &HashMap<&str, &ComponentDecl>,
) -> Result<()> {
    for member in &pipeline.components {
        let Some(target) = by_name.get(member.as_str()) else {
            return Err(Error::manifest(format!(
                "Pipeline {:?} references unknown component: {member}",
                pipeline.name
            )));
        };
        if matches!(target, ComponentDecl::Branch { .. }) {
            return Err(Error::manifest(format!(
                "Pipeline {:?} member {member:?} is a branch; branches attach to remuxers",
                pipeline.name
            )));
        }
    }

    if let Some(mux) = &pipeline.streammux {
        if let Some(num_surfaces) = mux.num_surfaces_per_frame {
            if !(1..=MAX_SURFACES_PER_FRAME).contains(&num_surfaces) {
                return Err(Error::manifest(format!(
                    "Pipeline {:?} num_surfaces_per_frame must be 1..={MAX_SURFACES_PER_FRAME}",
                    pipeline.name
                )));
            }
        }
        match (mux.width, mux.height) {
            (None, None) => {}
            (Some(width), Some(height)) => {
                if width == 0 || height == 0 {
                    return Err(Error::manifest(format!(
                        "Pipeline {:?} streammux has zero dimensions",
                        pipeline.name
                    )));
                }
            }
            _ => {
                return Err(Error::manifest(format!(
                    "Pipeline {:?} streammux must set width and height together",
                    pipeline.name
                )));
            }
        }
        if let Some(tiler) = &mux.tiler {
            match by_name.get(tiler.as_str()) {
                Some(ComponentDecl::Tiler { .. }) => {}
                Some(target) => {
                    return Err(Error::manifest(format!(
                        "Pipeline {:?} streammux tiler {tiler:?} is a {}, expected tiler",
                        pipeline.name,
                        target.kind_str()
                    )));
                }
                None => {
                    return Err(Error::manifest(format!(
                        "Pipeline {:?} references unknown tiler: {tiler}",
                        pipeline.name
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Replay a manifest onto a services instance.
///
/// Components are registered first, then wired, then pipelines are
/// assembled and their muxers configured. Nothing is played. On error
/// the objects created before the failure stay registered.
pub fn apply(manifest: &Manifest, services: &Services) -> Result<()> {
    validate(manifest)?;

    for decl in &manifest.components {
        match decl {
            ComponentDecl::UriSource {
                name,
                uri,
                live,
                drop_frame_interval,
                frame_rate,
            } => {
                services.source_uri_new(name, uri, *live, *drop_frame_interval)?;
                if let Some((numerator, denominator)) = frame_rate {
                    services.source_frame_rate_set(name, *numerator, *denominator)?;
                }
            }
            ComponentDecl::FakeSink { name, sync } => {
                services.sink_fake_new(name)?;
                if !sync {
                    services.sink_sync_enabled_set(name, false)?;
                }
            }
            ComponentDecl::WindowSink {
                name,
                offset_x,
                offset_y,
                width,
                height,
                sync,
            } => {
                services.sink_window_new(name, *offset_x, *offset_y, *width, *height)?;
                if !sync {
                    services.sink_sync_enabled_set(name, false)?;
                }
            }
            ComponentDecl::Tiler {
                name,
                width,
                height,
                grid,
            } => {
                services.tiler_new(name, *width, *height)?;
                if grid.is_some() {
                    services.tiler_grid_set(name, *grid)?;
                }
            }
            ComponentDecl::Branch { name, .. } => services.branch_new(name)?,
            ComponentDecl::Remuxer {
                name,
                batch_size,
                batch_timeout_us,
                ..
            } => {
                services.remuxer_new(name)?;
                services.remuxer_batch_properties_set(name, *batch_size, *batch_timeout_us)?;
            }
        }
    }

    for decl in &manifest.components {
        match decl {
            ComponentDecl::Branch { name, components } => {
                for member in components {
                    services.branch_component_add(name, member)?;
                }
            }
            ComponentDecl::Remuxer { name, branches, .. } => {
                for link in branches {
                    match &link.stream_ids {
                        Some(ids) => services.remuxer_branch_add_to(name, &link.name, ids)?,
                        None => services.tee_branch_add(name, &link.name)?,
                    }
                }
            }
            _ => {}
        }
    }

    for pipeline in &manifest.pipelines {
        services.pipeline_new(&pipeline.name)?;
        for member in &pipeline.components {
            services.pipeline_component_add(&pipeline.name, member)?;
        }
        if let Some(mux) = &pipeline.streammux {
            if mux.batch_size.is_some() || mux.batch_timeout_us.is_some() {
                let (batch_size, batch_timeout_us) =
                    services.pipeline_streammux_batch_properties_get(&pipeline.name)?;
                services.pipeline_streammux_batch_properties_set(
                    &pipeline.name,
                    mux.batch_size.unwrap_or(batch_size),
                    mux.batch_timeout_us.unwrap_or(batch_timeout_us),
                )?;
            }
            if let (Some(width), Some(height)) = (mux.width, mux.height) {
                services.pipeline_streammux_dimensions_set(&pipeline.name, width, height)?;
            }
            if let Some(num_surfaces) = mux.num_surfaces_per_frame {
                services
                    .pipeline_streammux_num_surfaces_per_frame_set(&pipeline.name, num_surfaces)?;
            }
            if let Some(enabled) = mux.sync_inputs {
                services.pipeline_streammux_sync_inputs_enabled_set(&pipeline.name, enabled)?;
            }
            if let Some(gpu_id) = mux.gpu_id {
                services.pipeline_streammux_gpuid_set(&pipeline.name, gpu_id)?;
            }
            if let Some(tiler) = &mux.tiler {
                services.pipeline_streammux_tiler_add(&pipeline.name, tiler)?;
            }
        }
    }

    info!(
        manifest = manifest.name.as_deref().unwrap_or("unnamed"),
        components = manifest.components.len(),
        pipelines = manifest.pipelines.len(),
        "manifest applied"
    );
    Ok(())
}
