//! End-to-end playback tests: frames flow from synthetic sources through
//! the stream muxer to sinks and remuxer branches, lifecycle transitions
//! are enforced, and the graph is locked while playing.

use std::time::Duration;
use streamweave_core::pipeline::PipelineState;
use streamweave_core::{Error, Services};
use tokio::time::sleep;

/// Live source ticking at 100 fps.
fn add_fast_source(services: &Services, name: &str) {
    services
        .source_uri_new(name, &format!("rtsp://host/{name}"), true, 0)
        .unwrap();
    services.source_frame_rate_set(name, 100, 1).unwrap();
}

/// Fake sink without pts pacing, so counts track delivery directly.
fn add_counting_sink(services: &Services, name: &str) {
    services.sink_fake_new(name).unwrap();
    services.sink_sync_enabled_set(name, false).unwrap();
}

#[tokio::test]
async fn frames_flow_from_sources_to_sinks() {
    let services = Services::new();
    add_fast_source(&services, "cam-0");
    add_fast_source(&services, "cam-1");
    // Default sync stays on here; live pts are immediately due, so pacing
    // must not stall delivery.
    services.sink_fake_new("probe").unwrap();
    services.pipeline_new("main").unwrap();
    services
        .pipeline_component_add_many("main", &["cam-0", "cam-1", "probe"])
        .unwrap();

    services.pipeline_play("main").await.unwrap();
    sleep(Duration::from_millis(500)).await;
    services.pipeline_stop("main").await.unwrap();

    let after_first = services.sink_frame_count_get("probe").unwrap();
    assert!(after_first > 0, "sink never saw a frame");

    // Stopped means stopped: the counter stays put.
    sleep(Duration::from_millis(100)).await;
    assert_eq!(services.sink_frame_count_get("probe").unwrap(), after_first);

    // Counters accumulate across play cycles.
    services.pipeline_play("main").await.unwrap();
    sleep(Duration::from_millis(300)).await;
    services.pipeline_stop("main").await.unwrap();
    assert!(services.sink_frame_count_get("probe").unwrap() > after_first);
}

#[tokio::test]
async fn play_and_stop_follow_state_rules() {
    let services = Services::new();
    add_fast_source(&services, "cam-0");
    add_counting_sink(&services, "probe");
    services
        .pipeline_new_component_add_many("main", &["cam-0", "probe"])
        .unwrap();

    assert_eq!(
        services.pipeline_state_get("main").unwrap(),
        PipelineState::Stopped
    );

    services.pipeline_play("main").await.unwrap();
    assert_eq!(
        services.pipeline_state_get("main").unwrap(),
        PipelineState::Playing
    );
    assert!(matches!(
        services.pipeline_play("main").await,
        Err(Error::InvalidStateTransition { .. })
    ));

    services.pipeline_stop("main").await.unwrap();
    assert_eq!(
        services.pipeline_state_get("main").unwrap(),
        PipelineState::Stopped
    );
    assert!(matches!(
        services.pipeline_stop("main").await,
        Err(Error::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn graph_is_locked_while_playing() {
    let services = Services::new();
    add_fast_source(&services, "cam-0");
    add_counting_sink(&services, "probe");
    add_counting_sink(&services, "branch-sink");
    services.remuxer_new("tee-0").unwrap();
    services.branch_new("analytics").unwrap();
    services
        .branch_component_add("analytics", "branch-sink")
        .unwrap();
    services.tee_branch_add("tee-0", "analytics").unwrap();
    services
        .pipeline_new_component_add_many("main", &["cam-0", "probe", "tee-0"])
        .unwrap();

    // Free components for the mutation attempts below.
    services.tiler_new("spare-tiler", 1280, 720).unwrap();
    services.sink_fake_new("spare-sink").unwrap();

    services.pipeline_play("main").await.unwrap();

    assert!(matches!(
        services.pipeline_component_add("main", "spare-sink"),
        Err(Error::PipelineNotStopped { .. })
    ));
    assert!(matches!(
        services.pipeline_component_remove("main", "probe"),
        Err(Error::PipelineNotStopped { .. })
    ));
    assert!(matches!(
        services.pipeline_streammux_dimensions_set("main", 1280, 720),
        Err(Error::PipelineNotStopped { .. })
    ));
    assert!(matches!(
        services.pipeline_streammux_num_surfaces_per_frame_set("main", 2),
        Err(Error::PipelineNotStopped { .. })
    ));
    assert!(matches!(
        services.pipeline_streammux_tiler_add("main", "spare-tiler"),
        Err(Error::PipelineNotStopped { .. })
    ));
    assert!(matches!(
        services.component_gpuid_set("cam-0", 1),
        Err(Error::PipelineNotStopped { .. })
    ));
    // The guard sees through claim chains: the branch hangs off a tee
    // that the playing pipeline owns.
    assert!(matches!(
        services.branch_component_add("analytics", "spare-tiler"),
        Err(Error::PipelineNotStopped { .. })
    ));
    assert!(matches!(
        services.tee_branch_add("tee-0", "spare-sink"),
        Err(Error::PipelineNotStopped { .. })
    ));

    // Scalar properties stay writable; they apply on the next play.
    services
        .pipeline_streammux_batch_properties_set("main", 4, 40000)
        .unwrap();
    services.source_frame_rate_set("cam-0", 50, 1).unwrap();
    services.sink_sync_enabled_set("probe", true).unwrap();

    services.pipeline_stop("main").await.unwrap();
    services
        .pipeline_streammux_dimensions_set("main", 1280, 720)
        .unwrap();
    services.component_gpuid_set("cam-0", 1).unwrap();
}

#[tokio::test]
async fn unrunnable_graphs_are_rejected() {
    let services = Services::new();

    services.pipeline_new("empty").unwrap();
    assert!(matches!(
        services.pipeline_play("empty").await,
        Err(Error::PipelineNotRunnable { .. })
    ));
    assert_eq!(
        services.pipeline_state_get("empty").unwrap(),
        PipelineState::Stopped
    );

    add_fast_source(&services, "cam-0");
    services.pipeline_new("no-sink").unwrap();
    services.pipeline_component_add("no-sink", "cam-0").unwrap();
    assert!(matches!(
        services.pipeline_play("no-sink").await,
        Err(Error::PipelineNotRunnable { .. })
    ));

    // A sink buried in a remuxer branch satisfies the sink requirement.
    services.pipeline_component_remove("no-sink", "cam-0").unwrap();
    add_counting_sink(&services, "branch-sink");
    services.branch_new("analytics").unwrap();
    services
        .branch_component_add("analytics", "branch-sink")
        .unwrap();
    services.remuxer_new("tee-0").unwrap();
    services.tee_branch_add("tee-0", "analytics").unwrap();
    services
        .pipeline_new_component_add_many("deep", &["cam-0", "tee-0"])
        .unwrap();
    services.pipeline_play("deep").await.unwrap();
    sleep(Duration::from_millis(200)).await;
    services.pipeline_stop("deep").await.unwrap();
    assert!(services.sink_frame_count_get("branch-sink").unwrap() > 0);
}

#[tokio::test]
async fn negative_timeout_never_flushes_partial_batches() {
    let services = Services::new();
    add_fast_source(&services, "cam-0");
    add_counting_sink(&services, "probe");
    services
        .pipeline_new_component_add_many("wait", &["cam-0", "probe"])
        .unwrap();
    // A batch of 100 never fills at 100 fps in this window, and -1 means
    // partial batches wait forever.
    services
        .pipeline_streammux_batch_properties_set("wait", 100, -1)
        .unwrap();

    services.pipeline_play("wait").await.unwrap();
    sleep(Duration::from_millis(400)).await;
    services.pipeline_stop("wait").await.unwrap();
    assert_eq!(services.sink_frame_count_get("probe").unwrap(), 0);

    // The same graph with a timed flush delivers the partials.
    services
        .pipeline_streammux_batch_properties_set("wait", 100, 50_000)
        .unwrap();
    services.pipeline_play("wait").await.unwrap();
    sleep(Duration::from_millis(400)).await;
    services.pipeline_stop("wait").await.unwrap();
    assert!(services.sink_frame_count_get("probe").unwrap() > 0);
}

#[tokio::test]
async fn drop_frame_interval_thins_delivery() {
    let services = Services::new();

    services
        .source_uri_new("full-src", "rtsp://host/full", true, 0)
        .unwrap();
    services.source_frame_rate_set("full-src", 100, 1).unwrap();
    services
        .source_uri_new("thin-src", "rtsp://host/thin", true, 4)
        .unwrap();
    services.source_frame_rate_set("thin-src", 100, 1).unwrap();

    add_counting_sink(&services, "full-sink");
    add_counting_sink(&services, "thin-sink");
    services
        .pipeline_new_component_add_many("full", &["full-src", "full-sink"])
        .unwrap();
    services
        .pipeline_new_component_add_many("thin", &["thin-src", "thin-sink"])
        .unwrap();

    services.pipeline_play("full").await.unwrap();
    services.pipeline_play("thin").await.unwrap();
    sleep(Duration::from_millis(600)).await;
    services.pipeline_stop("full").await.unwrap();
    services.pipeline_stop("thin").await.unwrap();

    let full = services.sink_frame_count_get("full-sink").unwrap();
    let thin = services.sink_frame_count_get("thin-sink").unwrap();
    assert!(thin > 0, "thinned source never emitted");
    assert!(
        thin < full,
        "keeping one frame in four delivered {thin} of {full}"
    );
}

#[tokio::test]
async fn remuxer_branches_route_stream_subsets() {
    let services = Services::new();
    add_fast_source(&services, "cam-0");
    add_fast_source(&services, "cam-1");
    add_counting_sink(&services, "solo-sink");
    add_counting_sink(&services, "both-sink");

    services.branch_new("solo").unwrap();
    services.branch_component_add("solo", "solo-sink").unwrap();
    services.remuxer_new("tee-0").unwrap();
    // One branch pinned to stream 0, one sink fed by every stream.
    services
        .remuxer_branch_add_to("tee-0", "solo", &[0])
        .unwrap();
    services.tee_branch_add("tee-0", "both-sink").unwrap();

    services
        .pipeline_new_component_add_many("main", &["cam-0", "cam-1", "tee-0"])
        .unwrap();

    services.pipeline_play("main").await.unwrap();
    sleep(Duration::from_millis(500)).await;
    services.pipeline_stop("main").await.unwrap();

    let solo = services.sink_frame_count_get("solo-sink").unwrap();
    let both = services.sink_frame_count_get("both-sink").unwrap();
    assert!(solo > 0, "restricted branch never saw stream 0");
    assert!(
        both > solo,
        "unrestricted child got {both}, restricted got {solo}"
    );
}

#[tokio::test]
async fn sync_inputs_batching_delivers_frames() {
    let services = Services::new();
    add_fast_source(&services, "cam-0");
    add_fast_source(&services, "cam-1");
    add_fast_source(&services, "cam-2");
    add_counting_sink(&services, "probe");
    services
        .pipeline_new_component_add_many("main", &["cam-0", "cam-1", "cam-2", "probe"])
        .unwrap();
    services
        .pipeline_streammux_sync_inputs_enabled_set("main", true)
        .unwrap();
    services
        .pipeline_streammux_batch_properties_set("main", 0, 33_000)
        .unwrap();

    services.pipeline_play("main").await.unwrap();
    sleep(Duration::from_millis(400)).await;
    services.pipeline_stop("main").await.unwrap();

    assert!(services.sink_frame_count_get("probe").unwrap() > 0);
}

#[tokio::test]
async fn delete_while_playing_stops_and_releases_claims() {
    let services = Services::new();
    add_fast_source(&services, "cam-0");
    add_counting_sink(&services, "probe");
    services.tiler_new("mosaic", 1920, 1080).unwrap();
    services
        .pipeline_new_component_add_many("main", &["cam-0", "probe"])
        .unwrap();
    services
        .pipeline_streammux_tiler_add("main", "mosaic")
        .unwrap();

    services.pipeline_play("main").await.unwrap();
    sleep(Duration::from_millis(100)).await;
    services.pipeline_delete("main").await.unwrap();
    assert_eq!(services.pipeline_list_size(), 0);

    // Members and the output tiler are free again.
    services.component_delete("cam-0").unwrap();
    services.component_delete("probe").unwrap();
    services.component_delete("mosaic").unwrap();
    assert_eq!(services.component_list_size(), 0);
}

#[tokio::test]
async fn delete_all_covers_playing_and_stopped_pipelines() {
    let services = Services::new();
    add_fast_source(&services, "cam-0");
    add_fast_source(&services, "cam-1");
    add_counting_sink(&services, "probe-0");
    add_counting_sink(&services, "probe-1");
    services
        .pipeline_new_component_add_many("running", &["cam-0", "probe-0"])
        .unwrap();
    services
        .pipeline_new_component_add_many("idle", &["cam-1", "probe-1"])
        .unwrap();

    services.pipeline_play("running").await.unwrap();
    sleep(Duration::from_millis(100)).await;

    services.pipeline_delete_all().await.unwrap();
    assert_eq!(services.pipeline_list_size(), 0);
    services.component_delete_all().unwrap();
    assert_eq!(services.component_list_size(), 0);
}
