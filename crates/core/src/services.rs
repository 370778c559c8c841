//! Flat, name-keyed services facade.
//!
//! Every operation takes its target's name, resolves it in a process-wide
//! registry, and returns a typed [`Error`] on failure. Components and
//! pipelines live in separate namespaces. A default instance is available
//! through [`Services::global`]; tests and embedders that want isolation
//! create their own with [`Services::new`].
//!
//! Structural mutations (membership, tee children, the muxer's output
//! tiler, muxer surface dimensions) require the affected pipeline to be
//! stopped. Scalar properties may be set at any time and take effect the
//! next time the pipeline plays; a running session keeps the snapshot it
//! was compiled from.
//!
//! # Example
//!
//! ```no_run
//! use streamweave_core::Services;
//!
//! # async fn run() -> streamweave_core::Result<()> {
//! let services = Services::new();
//! services.source_uri_new("cam-0", "rtsp://host/stream0", true, 0)?;
//! services.source_uri_new("cam-1", "rtsp://host/stream1", true, 0)?;
//! services.tiler_new("quad", 1920, 1080)?;
//! services.sink_fake_new("counter")?;
//! services.pipeline_new("main")?;
//! services.pipeline_component_add_many("main", &["cam-0", "cam-1", "quad", "counter"])?;
//! services.pipeline_play("main").await?;
//! # Ok(())
//! # }
//! ```

use crate::component::{
    BranchSpec, Component, ComponentKind, ComponentSpec, Owner, RemuxerSpec, SinkHandle, SinkSpec,
    TilerSpec, UriSourceSpec,
};
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, PipelineState, MAX_SURFACES_PER_FRAME};
use crate::runtime::{
    BranchStage, PlaybackPlan, PlaybackSession, RemuxerStage, SinkStage, SourcePlan, TilerStage,
};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

static GLOBAL: OnceLock<Services> = OnceLock::new();

/// Name-keyed registries for components and pipelines, plus every
/// operation defined over them.
pub struct Services {
    components: RwLock<HashMap<String, Arc<Component>>>,
    pipelines: RwLock<HashMap<String, Arc<Pipeline>>>,
}

impl Default for Services {
    fn default() -> Self {
        Self::new()
    }
}

impl Services {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
            pipelines: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide instance, created on first use.
    pub fn global() -> &'static Services {
        GLOBAL.get_or_init(Services::new)
    }

    // ----- component constructors -----

    /// Create a URI source. `drop_frame_interval` of 0 keeps every frame;
    /// N keeps one frame in every N.
    pub fn source_uri_new(
        &self,
        name: &str,
        uri: &str,
        is_live: bool,
        drop_frame_interval: u32,
    ) -> Result<()> {
        validate_name(name)?;
        if uri.trim().is_empty() {
            return Err(Error::property("source uri is empty"));
        }
        self.insert_component(Component::new(
            name,
            ComponentSpec::UriSource(RwLock::new(UriSourceSpec::new(
                uri,
                is_live,
                drop_frame_interval,
            ))),
        ))
    }

    /// Create a fake sink: counts and discards every frame it receives.
    pub fn sink_fake_new(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.insert_component(Component::new(
            name,
            ComponentSpec::Sink(SinkHandle::new(SinkSpec::Fake { sync: true })),
        ))
    }

    /// Create a window sink with the given viewport.
    pub fn sink_window_new(
        &self,
        name: &str,
        offset_x: u32,
        offset_y: u32,
        width: u32,
        height: u32,
    ) -> Result<()> {
        validate_name(name)?;
        if width == 0 || height == 0 {
            return Err(Error::property("window sink dimensions must be non-zero"));
        }
        self.insert_component(Component::new(
            name,
            ComponentSpec::Sink(SinkHandle::new(SinkSpec::Window {
                offset_x,
                offset_y,
                width,
                height,
                sync: true,
            })),
        ))
    }

    /// Create a tiler with the given output dimensions.
    pub fn tiler_new(&self, name: &str, width: u32, height: u32) -> Result<()> {
        validate_name(name)?;
        if width == 0 || height == 0 {
            return Err(Error::property("tiler dimensions must be non-zero"));
        }
        self.insert_component(Component::new(
            name,
            ComponentSpec::Tiler(RwLock::new(TilerSpec::new(width, height))),
        ))
    }

    /// Create an empty branch.
    pub fn branch_new(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.insert_component(Component::new(
            name,
            ComponentSpec::Branch(RwLock::new(BranchSpec::default())),
        ))
    }

    /// Create a remuxer with default batch properties.
    pub fn remuxer_new(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.insert_component(Component::new(
            name,
            ComponentSpec::Remuxer(RwLock::new(RemuxerSpec::default())),
        ))
    }

    // ----- component registry -----

    /// Number of registered components.
    pub fn component_list_size(&self) -> usize {
        self.components.read().len()
    }

    /// Registered component names, sorted.
    pub fn component_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.components.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Delete a free component. Fails while any owner holds a claim on it.
    /// Deleting a remuxer or branch releases its own children first.
    pub fn component_delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut map = self.components.write();
        let component = map
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ComponentNameNotFound { name: name.into() })?;
        if let Some(owner) = component.owner() {
            return Err(Error::ComponentInUse {
                name: name.into(),
                owner,
            });
        }

        match component.spec() {
            ComponentSpec::Remuxer(spec) => {
                let owner = Owner::Tee(name.to_owned());
                for link in &spec.read().branches {
                    if let Some(child) = map.get(&link.name) {
                        child.release_if(&owner);
                    }
                }
            }
            ComponentSpec::Branch(spec) => {
                let owner = Owner::Branch(name.to_owned());
                for member in &spec.read().components {
                    if let Some(child) = map.get(member) {
                        child.release_if(&owner);
                    }
                }
            }
            _ => {}
        }

        map.remove(name);
        debug!(component = %name, "component deleted");
        Ok(())
    }

    /// Delete every component. Fails without deleting anything if any
    /// component is held, directly or through a tee, by a pipeline.
    /// Claims that only link components to each other are dissolved.
    pub fn component_delete_all(&self) -> Result<()> {
        let mut map = self.components.write();
        for (name, component) in map.iter() {
            if let Some(pipeline) = owning_pipeline(&map, component.owner()) {
                return Err(Error::ComponentInUse {
                    name: name.clone(),
                    owner: Owner::Pipeline(pipeline),
                });
            }
        }
        let count = map.len();
        map.clear();
        info!(count, "all components deleted");
        Ok(())
    }

    pub fn component_gpuid_get(&self, name: &str) -> Result<u32> {
        Ok(self.component(name)?.gpu_id())
    }

    /// Assign the GPU a component should run on. Rejected while the
    /// owning pipeline plays.
    pub fn component_gpuid_set(&self, name: &str, gpu_id: u32) -> Result<()> {
        let component = self.component(name)?;
        self.require_owner_stopped(&component)?;
        component.set_gpu_id(gpu_id);
        debug!(component = %name, gpu_id, "component gpu id updated");
        Ok(())
    }

    // ----- source properties -----

    pub fn source_uri_get(&self, name: &str) -> Result<String> {
        Ok(self.component(name)?.as_source()?.read().uri.clone())
    }

    pub fn source_is_live_get(&self, name: &str) -> Result<bool> {
        Ok(self.component(name)?.as_source()?.read().is_live)
    }

    pub fn source_frame_rate_get(&self, name: &str) -> Result<(u32, u32)> {
        Ok(self.component(name)?.as_source()?.read().frame_rate)
    }

    /// Set a source's synthetic output rate, applied at next play.
    pub fn source_frame_rate_set(
        &self,
        name: &str,
        numerator: u32,
        denominator: u32,
    ) -> Result<()> {
        if numerator == 0 || denominator == 0 {
            return Err(Error::property("frame rate terms must be non-zero"));
        }
        let component = self.component(name)?;
        component.as_source()?.write().frame_rate = (numerator, denominator);
        debug!(source = %name, numerator, denominator, "source frame rate updated");
        Ok(())
    }

    // ----- sink properties -----

    /// Frames delivered to this sink, cumulative across play cycles.
    pub fn sink_frame_count_get(&self, name: &str) -> Result<u64> {
        Ok(self.component(name)?.as_sink()?.frames_received())
    }

    pub fn sink_sync_enabled_get(&self, name: &str) -> Result<bool> {
        Ok(self.component(name)?.as_sink()?.spec.read().sync())
    }

    /// Enable or disable pts-paced delivery, applied at next play.
    pub fn sink_sync_enabled_set(&self, name: &str, enabled: bool) -> Result<()> {
        let component = self.component(name)?;
        component.as_sink()?.spec.write().set_sync(enabled);
        debug!(sink = %name, enabled, "sink sync updated");
        Ok(())
    }

    pub fn sink_window_offsets_get(&self, name: &str) -> Result<(u32, u32)> {
        let component = self.component(name)?;
        let handle = component.as_sink()?;
        let spec = handle.spec.read();
        match &*spec {
            SinkSpec::Window {
                offset_x, offset_y, ..
            } => Ok((*offset_x, *offset_y)),
            SinkSpec::Fake { .. } => Err(Error::ComponentNotTheCorrectType {
                name: name.into(),
                expected: "window-sink",
            }),
        }
    }

    pub fn sink_window_offsets_set(&self, name: &str, x: u32, y: u32) -> Result<()> {
        let component = self.component(name)?;
        let handle = component.as_sink()?;
        let mut spec = handle.spec.write();
        match &mut *spec {
            SinkSpec::Window {
                offset_x, offset_y, ..
            } => {
                *offset_x = x;
                *offset_y = y;
                Ok(())
            }
            SinkSpec::Fake { .. } => Err(Error::ComponentNotTheCorrectType {
                name: name.into(),
                expected: "window-sink",
            }),
        }
    }

    pub fn sink_window_dimensions_get(&self, name: &str) -> Result<(u32, u32)> {
        let component = self.component(name)?;
        let handle = component.as_sink()?;
        let spec = handle.spec.read();
        match &*spec {
            SinkSpec::Window { width, height, .. } => Ok((*width, *height)),
            SinkSpec::Fake { .. } => Err(Error::ComponentNotTheCorrectType {
                name: name.into(),
                expected: "window-sink",
            }),
        }
    }

    pub fn sink_window_dimensions_set(
        &self,
        name: &str,
        new_width: u32,
        new_height: u32,
    ) -> Result<()> {
        if new_width == 0 || new_height == 0 {
            return Err(Error::property("window sink dimensions must be non-zero"));
        }
        let component = self.component(name)?;
        let handle = component.as_sink()?;
        let mut spec = handle.spec.write();
        match &mut *spec {
            SinkSpec::Window { width, height, .. } => {
                *width = new_width;
                *height = new_height;
                Ok(())
            }
            SinkSpec::Fake { .. } => Err(Error::ComponentNotTheCorrectType {
                name: name.into(),
                expected: "window-sink",
            }),
        }
    }

    // ----- tiler properties -----

    pub fn tiler_dimensions_get(&self, name: &str) -> Result<(u32, u32)> {
        let component = self.component(name)?;
        let spec = component.as_tiler()?.read();
        Ok((spec.width, spec.height))
    }

    pub fn tiler_dimensions_set(&self, name: &str, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::property("tiler dimensions must be non-zero"));
        }
        let component = self.component(name)?;
        let mut spec = component.as_tiler()?.write();
        spec.width = width;
        spec.height = height;
        Ok(())
    }

    /// Forced grid shape as (rows, columns); `None` means auto.
    pub fn tiler_grid_get(&self, name: &str) -> Result<Option<(u32, u32)>> {
        Ok(self.component(name)?.as_tiler()?.read().grid)
    }

    pub fn tiler_grid_set(&self, name: &str, grid: Option<(u32, u32)>) -> Result<()> {
        if let Some((rows, columns)) = grid {
            if rows == 0 || columns == 0 {
                return Err(Error::property("tiler grid terms must be non-zero"));
            }
        }
        self.component(name)?.as_tiler()?.write().grid = grid;
        Ok(())
    }

    // ----- branch membership -----

    /// Add a tiler or sink to a branch's chain. The component is claimed
    /// by the branch until removed.
    pub fn branch_component_add(&self, branch: &str, component: &str) -> Result<()> {
        let branch_component = self.component(branch)?;
        let spec = branch_component.as_branch()?;
        let child = self.component(component)?;
        if !matches!(child.kind(), ComponentKind::Tiler) && !child.kind().is_sink() {
            return Err(Error::ComponentNotTheCorrectType {
                name: component.into(),
                expected: "tiler or sink",
            });
        }
        self.require_owner_stopped(&branch_component)?;
        child.claim(Owner::Branch(branch.to_owned()))?;
        spec.write().add(component);
        debug!(branch = %branch, component = %component, "component added to branch");
        Ok(())
    }

    pub fn branch_component_remove(&self, branch: &str, component: &str) -> Result<()> {
        let branch_component = self.component(branch)?;
        let spec = branch_component.as_branch()?;
        self.require_owner_stopped(&branch_component)?;
        if !spec.write().remove(component) {
            return Err(Error::ComponentNotChild {
                parent: branch.into(),
                child: component.into(),
            });
        }
        if let Ok(child) = self.component(component) {
            child.release_if(&Owner::Branch(branch.to_owned()));
        }
        debug!(branch = %branch, component = %component, "component removed from branch");
        Ok(())
    }

    // ----- tee (remuxer) children -----

    /// Attach a branch or sink to a tee, connected to every stream.
    pub fn tee_branch_add(&self, tee: &str, child: &str) -> Result<()> {
        self.tee_child_add(tee, child, None)
    }

    /// Attach a branch or sink to a remuxer, restricted to a set of
    /// upstream stream ids.
    pub fn remuxer_branch_add_to(
        &self,
        remuxer: &str,
        child: &str,
        stream_ids: &[u32],
    ) -> Result<()> {
        if stream_ids.is_empty() {
            return Err(Error::property("stream id selection is empty"));
        }
        let ids: BTreeSet<u32> = stream_ids.iter().copied().collect();
        self.tee_child_add(remuxer, child, Some(ids))
    }

    fn tee_child_add(
        &self,
        tee: &str,
        child_name: &str,
        stream_ids: Option<BTreeSet<u32>>,
    ) -> Result<()> {
        let tee_component = self.component(tee)?;
        let spec = tee_component.as_remuxer()?;
        let child = self.component(child_name)?;
        if !matches!(child.kind(), ComponentKind::Branch) && !child.kind().is_sink() {
            return Err(Error::ComponentNotTheCorrectType {
                name: child_name.into(),
                expected: "branch or sink",
            });
        }
        self.require_owner_stopped(&tee_component)?;
        child.claim(Owner::Tee(tee.to_owned()))?;
        spec.write().add_branch(child_name, stream_ids);
        debug!(tee = %tee, child = %child_name, "branch added to tee");
        Ok(())
    }

    pub fn tee_branch_remove(&self, tee: &str, child: &str) -> Result<()> {
        let tee_component = self.component(tee)?;
        let spec = tee_component.as_remuxer()?;
        self.require_owner_stopped(&tee_component)?;
        if !spec.write().remove_branch(child) {
            return Err(Error::ComponentNotChild {
                parent: tee.into(),
                child: child.into(),
            });
        }
        if let Ok(component) = self.component(child) {
            component.release_if(&Owner::Tee(tee.to_owned()));
        }
        debug!(tee = %tee, child = %child, "branch removed from tee");
        Ok(())
    }

    /// Number of children attached to a tee.
    pub fn tee_branch_count_get(&self, tee: &str) -> Result<usize> {
        Ok(self.component(tee)?.as_remuxer()?.read().branch_count())
    }

    /// Remuxer output batching as (batch_size, batch_timeout_us).
    pub fn remuxer_batch_properties_get(&self, remuxer: &str) -> Result<(u32, i32)> {
        let component = self.component(remuxer)?;
        let spec = component.as_remuxer()?.read();
        Ok((spec.batch_size, spec.batch_timeout_us))
    }

    /// Set remuxer output batching, applied at next play. Batch size 0
    /// resolves per branch to its stream count; a negative timeout
    /// disables timed flushes.
    pub fn remuxer_batch_properties_set(
        &self,
        remuxer: &str,
        batch_size: u32,
        batch_timeout_us: i32,
    ) -> Result<()> {
        let component = self.component(remuxer)?;
        let mut spec = component.as_remuxer()?.write();
        spec.batch_size = batch_size;
        spec.batch_timeout_us = batch_timeout_us;
        debug!(remuxer = %remuxer, batch_size, batch_timeout_us, "remuxer batch properties updated");
        Ok(())
    }

    // ----- pipelines -----

    pub fn pipeline_new(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut map = self.pipelines.write();
        if map.contains_key(name) {
            return Err(Error::PipelineNameNotUnique { name: name.into() });
        }
        map.insert(name.to_owned(), Arc::new(Pipeline::new(name)));
        debug!(pipeline = %name, "pipeline created");
        Ok(())
    }

    /// Create a pipeline and add components in one call. On failure the
    /// new pipeline is rolled back and every claim released.
    pub fn pipeline_new_component_add_many(&self, name: &str, components: &[&str]) -> Result<()> {
        self.pipeline_new(name)?;
        if let Err(err) = self.pipeline_component_add_many(name, components) {
            if let Ok(pipeline) = self.pipeline(name) {
                let owner = Owner::Pipeline(name.to_owned());
                let map = self.components.read();
                for member in pipeline.components() {
                    if let Some(component) = map.get(&member) {
                        component.release_if(&owner);
                    }
                }
                drop(map);
                self.pipelines.write().remove(name);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Add a component to a stopped pipeline's chain. The component is
    /// claimed by the pipeline until removed.
    pub fn pipeline_component_add(&self, pipeline: &str, component: &str) -> Result<()> {
        let target = self.pipeline(pipeline)?;
        target.require_stopped()?;
        let child = self.component(component)?;
        if matches!(child.kind(), ComponentKind::Branch) {
            return Err(Error::ComponentNotTheCorrectType {
                name: component.into(),
                expected: "source, sink, tiler, or remuxer",
            });
        }
        child.claim(Owner::Pipeline(pipeline.to_owned()))?;
        target.add_component(component);
        debug!(pipeline = %pipeline, component = %component, "component added to pipeline");
        Ok(())
    }

    /// Add several components in order, stopping at the first failure.
    /// Components added before the failure stay in the pipeline.
    pub fn pipeline_component_add_many(&self, pipeline: &str, components: &[&str]) -> Result<()> {
        for component in components {
            self.pipeline_component_add(pipeline, component)?;
        }
        Ok(())
    }

    pub fn pipeline_component_remove(&self, pipeline: &str, component: &str) -> Result<()> {
        let target = self.pipeline(pipeline)?;
        target.require_stopped()?;
        if !target.remove_component(component) {
            return Err(Error::ComponentNotChild {
                parent: pipeline.into(),
                child: component.into(),
            });
        }
        if let Ok(child) = self.component(component) {
            child.release_if(&Owner::Pipeline(pipeline.to_owned()));
        }
        debug!(pipeline = %pipeline, component = %component, "component removed from pipeline");
        Ok(())
    }

    /// Number of registered pipelines.
    pub fn pipeline_list_size(&self) -> usize {
        self.pipelines.read().len()
    }

    /// Registered pipeline names, sorted.
    pub fn pipeline_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pipelines.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn pipeline_state_get(&self, name: &str) -> Result<PipelineState> {
        Ok(self.pipeline(name)?.state())
    }

    /// Delete a pipeline, stopping it first if it plays. Member claims and
    /// the output tiler claim are released; the components survive.
    pub async fn pipeline_delete(&self, name: &str) -> Result<()> {
        let pipeline = self.pipeline(name)?;
        {
            let mut session = pipeline.session().lock().await;
            if let Some(active) = session.take() {
                active.stop().await;
                pipeline.set_state(PipelineState::Stopped);
            }
        }

        let owner = Owner::Pipeline(name.to_owned());
        let tiler_owner = Owner::Streammux(name.to_owned());
        {
            let map = self.components.read();
            for member in pipeline.components() {
                if let Some(component) = map.get(&member) {
                    component.release_if(&owner);
                }
            }
            if let Some(tiler) = pipeline.streammux().output_tiler {
                if let Some(component) = map.get(&tiler) {
                    component.release_if(&tiler_owner);
                }
            }
        }

        self.pipelines.write().remove(name);
        info!(pipeline = %name, "pipeline deleted");
        Ok(())
    }

    /// Delete every pipeline, stopping any that play.
    pub async fn pipeline_delete_all(&self) -> Result<()> {
        let names: Vec<String> = self.pipelines.read().keys().cloned().collect();
        for name in names {
            self.pipeline_delete(&name).await?;
        }
        Ok(())
    }

    // ----- stream-muxer properties -----

    /// Muxer batching as (batch_size, batch_timeout_us).
    pub fn pipeline_streammux_batch_properties_get(&self, pipeline: &str) -> Result<(u32, i32)> {
        let config = self.pipeline(pipeline)?.streammux();
        Ok((config.batch_size, config.batch_timeout_us))
    }

    /// Set muxer batching, applied at next play. Batch size 0 resolves to
    /// the pipeline's source count; a negative timeout waits indefinitely
    /// for full batches.
    pub fn pipeline_streammux_batch_properties_set(
        &self,
        pipeline: &str,
        batch_size: u32,
        batch_timeout_us: i32,
    ) -> Result<()> {
        self.pipeline(pipeline)?.update_streammux(|config| {
            config.batch_size = batch_size;
            config.batch_timeout_us = batch_timeout_us;
            Ok(())
        })?;
        debug!(pipeline = %pipeline, batch_size, batch_timeout_us, "streammux batch properties updated");
        Ok(())
    }

    pub fn pipeline_streammux_dimensions_get(&self, pipeline: &str) -> Result<(u32, u32)> {
        let config = self.pipeline(pipeline)?.streammux();
        Ok((config.width, config.height))
    }

    /// Set the muxer's output surface dimensions. Stopped pipelines only.
    pub fn pipeline_streammux_dimensions_set(
        &self,
        pipeline: &str,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::property("streammux dimensions must be non-zero"));
        }
        let target = self.pipeline(pipeline)?;
        target.require_stopped()?;
        target.update_streammux(|config| {
            config.width = width;
            config.height = height;
            Ok(())
        })
    }

    pub fn pipeline_streammux_num_surfaces_per_frame_get(&self, pipeline: &str) -> Result<u32> {
        Ok(self.pipeline(pipeline)?.streammux().num_surfaces_per_frame)
    }

    /// Set surfaces per frame, 1 through 4. Stopped pipelines only.
    pub fn pipeline_streammux_num_surfaces_per_frame_set(
        &self,
        pipeline: &str,
        num_surfaces: u32,
    ) -> Result<()> {
        if !(1..=MAX_SURFACES_PER_FRAME).contains(&num_surfaces) {
            return Err(Error::property(format!(
                "num surfaces per frame must be 1..={MAX_SURFACES_PER_FRAME}"
            )));
        }
        let target = self.pipeline(pipeline)?;
        target.require_stopped()?;
        target.update_streammux(|config| {
            config.num_surfaces_per_frame = num_surfaces;
            Ok(())
        })
    }

    pub fn pipeline_streammux_sync_inputs_enabled_get(&self, pipeline: &str) -> Result<bool> {
        Ok(self.pipeline(pipeline)?.streammux().sync_inputs)
    }

    /// Enable one-frame-per-stream batching, applied at next play.
    pub fn pipeline_streammux_sync_inputs_enabled_set(
        &self,
        pipeline: &str,
        enabled: bool,
    ) -> Result<()> {
        self.pipeline(pipeline)?.update_streammux(|config| {
            config.sync_inputs = enabled;
            Ok(())
        })?;
        debug!(pipeline = %pipeline, enabled, "streammux sync inputs updated");
        Ok(())
    }

    pub fn pipeline_streammux_gpuid_get(&self, pipeline: &str) -> Result<u32> {
        Ok(self.pipeline(pipeline)?.streammux().gpu_id)
    }

    pub fn pipeline_streammux_gpuid_set(&self, pipeline: &str, gpu_id: u32) -> Result<()> {
        self.pipeline(pipeline)?.update_streammux(|config| {
            config.gpu_id = gpu_id;
            Ok(())
        })?;
        debug!(pipeline = %pipeline, gpu_id, "streammux gpu id updated");
        Ok(())
    }

    /// Install a tiler on the muxer's output. The muxer holds one output
    /// tiler at most; the tiler is claimed until removed.
    pub fn pipeline_streammux_tiler_add(&self, pipeline: &str, tiler: &str) -> Result<()> {
        let target = self.pipeline(pipeline)?;
        let component = self.component(tiler)?;
        component.as_tiler()?;
        target.require_stopped()?;
        if let Some(existing) = target.streammux().output_tiler {
            return Err(Error::OutputTilerAlreadySet {
                pipeline: pipeline.into(),
                tiler: existing,
            });
        }
        component.claim(Owner::Streammux(pipeline.to_owned()))?;
        target.update_streammux(|config| {
            config.output_tiler = Some(tiler.to_owned());
            Ok(())
        })?;
        debug!(pipeline = %pipeline, tiler = %tiler, "streammux output tiler added");
        Ok(())
    }

    /// Remove the muxer's output tiler and release its claim.
    pub fn pipeline_streammux_tiler_remove(&self, pipeline: &str) -> Result<()> {
        let target = self.pipeline(pipeline)?;
        target.require_stopped()?;
        let Some(tiler) = target.streammux().output_tiler else {
            return Err(Error::OutputTilerNotSet {
                pipeline: pipeline.into(),
            });
        };
        target.update_streammux(|config| {
            config.output_tiler = None;
            Ok(())
        })?;
        if let Ok(component) = self.component(&tiler) {
            component.release_if(&Owner::Streammux(pipeline.to_owned()));
        }
        debug!(pipeline = %pipeline, tiler = %tiler, "streammux output tiler removed");
        Ok(())
    }

    /// Name of the muxer's output tiler, if one is installed.
    pub fn pipeline_streammux_tiler_get(&self, pipeline: &str) -> Result<Option<String>> {
        Ok(self.pipeline(pipeline)?.streammux().output_tiler)
    }

    // ----- lifecycle -----

    /// Compile the pipeline graph and start playback.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidStateTransition`] when already playing, and
    /// [`Error::PipelineNotRunnable`] when the graph has no source or no
    /// sink anywhere downstream of the muxer.
    pub async fn pipeline_play(&self, name: &str) -> Result<()> {
        let pipeline = self.pipeline(name)?;
        let mut session = pipeline.session().lock().await;
        if session.is_some() {
            return Err(Error::InvalidStateTransition {
                pipeline: name.into(),
                from: PipelineState::Playing,
                to: PipelineState::Playing,
            });
        }

        let plan = self.build_plan(&pipeline)?;
        let active = PlaybackSession::spawn(plan)?;
        *session = Some(active);
        pipeline.set_state(PipelineState::Playing);
        info!(pipeline = %name, "pipeline playing");
        Ok(())
    }

    /// Stop a playing pipeline and join its tasks.
    pub async fn pipeline_stop(&self, name: &str) -> Result<()> {
        let pipeline = self.pipeline(name)?;
        let mut session = pipeline.session().lock().await;
        let Some(active) = session.take() else {
            return Err(Error::InvalidStateTransition {
                pipeline: name.into(),
                from: PipelineState::Stopped,
                to: PipelineState::Stopped,
            });
        };
        active.stop().await;
        pipeline.set_state(PipelineState::Stopped);
        info!(pipeline = %name, "pipeline stopped");
        Ok(())
    }

    // ----- internals -----

    fn component(&self, name: &str) -> Result<Arc<Component>> {
        self.components
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ComponentNameNotFound { name: name.into() })
    }

    fn pipeline(&self, name: &str) -> Result<Arc<Pipeline>> {
        self.pipelines
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::PipelineNameNotFound { name: name.into() })
    }

    fn insert_component(&self, component: Component) -> Result<()> {
        let mut map = self.components.write();
        let name = component.name().to_owned();
        if map.contains_key(&name) {
            return Err(Error::ComponentNameNotUnique { name });
        }
        debug!(component = %name, kind = %component.kind(), "component created");
        map.insert(name, Arc::new(component));
        Ok(())
    }

    /// Pipeline that transitively holds this component, if any.
    fn owning_pipeline_of(&self, component: &Component) -> Option<String> {
        owning_pipeline(&self.components.read(), component.owner())
    }

    /// Guard for edits that touch the running graph through a component:
    /// fails while the transitively-owning pipeline plays.
    fn require_owner_stopped(&self, component: &Component) -> Result<()> {
        if let Some(name) = self.owning_pipeline_of(component) {
            if let Ok(pipeline) = self.pipeline(&name) {
                pipeline.require_stopped()?;
            }
        }
        Ok(())
    }

    /// Resolve a pipeline's membership into a playback plan. Specs are
    /// snapshotted; the session never touches the registry again.
    fn build_plan(&self, pipeline: &Pipeline) -> Result<PlaybackPlan> {
        let streammux = pipeline.streammux();
        let map = self.components.read();

        let mut sources = Vec::new();
        let mut transforms = Vec::new();
        let mut sinks = Vec::new();
        let mut remuxers = Vec::new();

        for name in pipeline.components() {
            let component = map
                .get(&name)
                .ok_or_else(|| Error::ComponentNameNotFound { name: name.clone() })?;
            match component.spec() {
                ComponentSpec::UriSource(spec) => {
                    let stream_id = sources.len() as u32;
                    sources.push(SourcePlan {
                        name: name.clone(),
                        stream_id,
                        num_surfaces: streammux.num_surfaces_per_frame,
                        spec: spec.read().clone(),
                    });
                }
                ComponentSpec::Tiler(spec) => transforms.push(TilerStage {
                    name: name.clone(),
                    spec: spec.read().clone(),
                }),
                ComponentSpec::Sink(handle) => sinks.push(sink_stage(&name, handle)),
                ComponentSpec::Remuxer(spec) => {
                    remuxers.push(remuxer_stage(&map, &name, &spec.read())?)
                }
                ComponentSpec::Branch(_) => {
                    return Err(Error::ComponentNotTheCorrectType {
                        name: name.clone(),
                        expected: "source, sink, tiler, or remuxer",
                    })
                }
            }
        }

        let output_tiler = match &streammux.output_tiler {
            Some(name) => {
                let component = map
                    .get(name)
                    .ok_or_else(|| Error::ComponentNameNotFound { name: name.clone() })?;
                Some(TilerStage {
                    name: name.clone(),
                    spec: component.as_tiler()?.read().clone(),
                })
            }
            None => None,
        };

        Ok(PlaybackPlan {
            pipeline: pipeline.name().to_owned(),
            streammux,
            sources,
            output_tiler,
            transforms,
            sinks,
            remuxers,
        })
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidName { name: name.into() });
    }
    Ok(())
}

fn sink_stage(name: &str, handle: &SinkHandle) -> SinkStage {
    SinkStage {
        name: name.to_owned(),
        spec: handle.spec.read().clone(),
        frames_received: handle.counter(),
    }
}

/// Follow a claim chain (component -> tee -> pipeline) to the pipeline
/// that transitively owns it, if the chain reaches one.
fn owning_pipeline(
    map: &HashMap<String, Arc<Component>>,
    mut owner: Option<Owner>,
) -> Option<String> {
    // Chains are short; the bound only guards against cyclic claims.
    for _ in 0..8 {
        match owner? {
            Owner::Pipeline(name) | Owner::Streammux(name) => return Some(name),
            Owner::Tee(name) | Owner::Branch(name) => {
                owner = map.get(&name).and_then(|c| c.owner());
            }
        }
    }
    None
}

/// Resolve one remuxer and its children for playback.
fn remuxer_stage(
    map: &HashMap<String, Arc<Component>>,
    name: &str,
    spec: &RemuxerSpec,
) -> Result<RemuxerStage> {
    let mut branches = Vec::new();
    for link in &spec.branches {
        let child = map
            .get(&link.name)
            .ok_or_else(|| Error::ComponentNameNotFound {
                name: link.name.clone(),
            })?;
        match child.spec() {
            ComponentSpec::Branch(branch_spec) => {
                let mut transforms = Vec::new();
                let mut sinks = Vec::new();
                for member in &branch_spec.read().components {
                    let member_component =
                        map.get(member)
                            .ok_or_else(|| Error::ComponentNameNotFound {
                                name: member.clone(),
                            })?;
                    match member_component.spec() {
                        ComponentSpec::Tiler(tiler_spec) => transforms.push(TilerStage {
                            name: member.clone(),
                            spec: tiler_spec.read().clone(),
                        }),
                        ComponentSpec::Sink(handle) => sinks.push(sink_stage(member, handle)),
                        _ => {
                            return Err(Error::ComponentNotTheCorrectType {
                                name: member.clone(),
                                expected: "tiler or sink",
                            })
                        }
                    }
                }
                branches.push(BranchStage {
                    name: link.name.clone(),
                    stream_ids: link.stream_ids.clone(),
                    transforms,
                    sinks,
                });
            }
            // A sink attached directly to the tee is a single-sink branch.
            ComponentSpec::Sink(handle) => branches.push(BranchStage {
                name: link.name.clone(),
                stream_ids: link.stream_ids.clone(),
                transforms: Vec::new(),
                sinks: vec![sink_stage(&link.name, handle)],
            }),
            _ => {
                return Err(Error::ComponentNotTheCorrectType {
                    name: link.name.clone(),
                    expected: "branch or sink",
                })
            }
        }
    }
    Ok(RemuxerStage {
        name: name.to_owned(),
        batch_size: spec.batch_size,
        batch_timeout_us: spec.batch_timeout_us,
        branches,
    })
}
