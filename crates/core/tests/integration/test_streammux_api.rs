//! Integration tests for stream-muxer configuration: batching defaults,
//! value ranges, and the output-tiler slot.

use streamweave_core::{Error, Services};

fn services_with_pipeline() -> Services {
    let services = Services::new();
    services.pipeline_new("main").unwrap();
    services
}

#[test]
fn muxer_defaults_defer_to_play_time() {
    let services = services_with_pipeline();

    // Batch size 0 resolves to the source count; timeout -1 never flushes
    // partial batches.
    assert_eq!(
        services
            .pipeline_streammux_batch_properties_get("main")
            .unwrap(),
        (0, -1)
    );
    assert_eq!(
        services.pipeline_streammux_dimensions_get("main").unwrap(),
        (1920, 1080)
    );
    assert_eq!(
        services
            .pipeline_streammux_num_surfaces_per_frame_get("main")
            .unwrap(),
        1
    );
    assert!(!services
        .pipeline_streammux_sync_inputs_enabled_get("main")
        .unwrap());
    assert_eq!(services.pipeline_streammux_gpuid_get("main").unwrap(), 0);
    assert_eq!(
        services.pipeline_streammux_tiler_get("main").unwrap(),
        None
    );
}

#[test]
fn batch_properties_round_trip() {
    let services = services_with_pipeline();
    services
        .pipeline_streammux_batch_properties_set("main", 4, 40000)
        .unwrap();
    assert_eq!(
        services
            .pipeline_streammux_batch_properties_get("main")
            .unwrap(),
        (4, 40000)
    );
}

#[test]
fn dimensions_must_be_non_zero() {
    let services = services_with_pipeline();
    services
        .pipeline_streammux_dimensions_set("main", 3840, 2160)
        .unwrap();
    assert_eq!(
        services.pipeline_streammux_dimensions_get("main").unwrap(),
        (3840, 2160)
    );

    assert!(matches!(
        services.pipeline_streammux_dimensions_set("main", 0, 2160),
        Err(Error::InvalidProperty { .. })
    ));
}

#[test]
fn num_surfaces_is_bounded() {
    let services = services_with_pipeline();
    for value in 1..=4 {
        services
            .pipeline_streammux_num_surfaces_per_frame_set("main", value)
            .unwrap();
    }
    assert_eq!(
        services
            .pipeline_streammux_num_surfaces_per_frame_get("main")
            .unwrap(),
        4
    );

    for value in [0, 5, 100] {
        assert!(matches!(
            services.pipeline_streammux_num_surfaces_per_frame_set("main", value),
            Err(Error::InvalidProperty { .. })
        ));
    }
}

#[test]
fn sync_inputs_and_gpu_id_round_trip() {
    let services = services_with_pipeline();
    services
        .pipeline_streammux_sync_inputs_enabled_set("main", true)
        .unwrap();
    assert!(services
        .pipeline_streammux_sync_inputs_enabled_get("main")
        .unwrap());

    services.pipeline_streammux_gpuid_set("main", 2).unwrap();
    assert_eq!(services.pipeline_streammux_gpuid_get("main").unwrap(), 2);
}

#[test]
fn output_tiler_slot_holds_one_tiler() {
    let services = services_with_pipeline();
    services.tiler_new("mosaic", 1920, 1080).unwrap();
    services.tiler_new("spare", 1280, 720).unwrap();

    services
        .pipeline_streammux_tiler_add("main", "mosaic")
        .unwrap();
    assert_eq!(
        services.pipeline_streammux_tiler_get("main").unwrap(),
        Some("mosaic".to_string())
    );

    // The slot is taken, even for a different tiler.
    let err = services
        .pipeline_streammux_tiler_add("main", "spare")
        .unwrap_err();
    assert!(matches!(err, Error::OutputTilerAlreadySet { tiler, .. } if tiler == "mosaic"));

    // The installed tiler is claimed.
    assert!(matches!(
        services.component_delete("mosaic"),
        Err(Error::ComponentInUse { .. })
    ));

    services.pipeline_streammux_tiler_remove("main").unwrap();
    assert_eq!(services.pipeline_streammux_tiler_get("main").unwrap(), None);
    services.component_delete("mosaic").unwrap();

    assert!(matches!(
        services.pipeline_streammux_tiler_remove("main"),
        Err(Error::OutputTilerNotSet { .. })
    ));
}

#[test]
fn output_tiler_must_be_a_free_tiler() {
    let services = services_with_pipeline();
    services.sink_fake_new("probe").unwrap();
    assert!(matches!(
        services.pipeline_streammux_tiler_add("main", "probe"),
        Err(Error::ComponentNotTheCorrectType { expected: "tiler", .. })
    ));

    // A tiler claimed elsewhere cannot be installed.
    services.tiler_new("mosaic", 1920, 1080).unwrap();
    services.pipeline_new("other").unwrap();
    services.pipeline_component_add("other", "mosaic").unwrap();
    assert!(matches!(
        services.pipeline_streammux_tiler_add("main", "mosaic"),
        Err(Error::ComponentInUse { .. })
    ));
}

#[test]
fn muxer_operations_need_an_existing_pipeline() {
    let services = Services::new();
    assert!(matches!(
        services.pipeline_streammux_batch_properties_get("ghost"),
        Err(Error::PipelineNameNotFound { .. })
    ));
    assert!(matches!(
        services.pipeline_streammux_tiler_remove("ghost"),
        Err(Error::PipelineNameNotFound { .. })
    ));
}
