//! Integration tests for remuxers and tees: child wiring, stream-id
//! selections, and output batch properties.

use streamweave_core::{Error, Services};

fn services_with_tee() -> Services {
    let services = Services::new();
    services.remuxer_new("tee-0").unwrap();
    services.branch_new("analytics").unwrap();
    services.sink_fake_new("probe").unwrap();
    services
}

#[test]
fn remuxer_defaults_defer_batching() {
    let services = services_with_tee();
    assert_eq!(
        services.remuxer_batch_properties_get("tee-0").unwrap(),
        (0, -1)
    );
}

#[test]
fn branches_and_sinks_attach_as_children() {
    let services = services_with_tee();
    assert_eq!(services.tee_branch_count_get("tee-0").unwrap(), 0);

    services.tee_branch_add("tee-0", "analytics").unwrap();
    services.tee_branch_add("tee-0", "probe").unwrap();
    assert_eq!(services.tee_branch_count_get("tee-0").unwrap(), 2);

    // Children are claimed by the tee.
    let err = services.component_delete("analytics").unwrap_err();
    match err {
        Error::ComponentInUse { owner, .. } => {
            assert!(owner.to_string().contains("tee-0"));
        }
        other => panic!("expected ComponentInUse, got {other:?}"),
    }

    services.tee_branch_remove("tee-0", "analytics").unwrap();
    assert_eq!(services.tee_branch_count_get("tee-0").unwrap(), 1);
    services.component_delete("analytics").unwrap();
}

#[test]
fn stream_id_selection_must_be_non_empty() {
    let services = services_with_tee();
    services
        .remuxer_branch_add_to("tee-0", "analytics", &[1, 2, 3, 4])
        .unwrap();
    assert_eq!(services.tee_branch_count_get("tee-0").unwrap(), 1);

    assert!(matches!(
        services.remuxer_branch_add_to("tee-0", "probe", &[]),
        Err(Error::InvalidProperty { .. })
    ));
    assert_eq!(services.tee_branch_count_get("tee-0").unwrap(), 1);
}

#[test]
fn only_branches_and_sinks_can_be_children() {
    let services = services_with_tee();
    services
        .source_uri_new("cam-0", "rtsp://host/stream0", true, 0)
        .unwrap();
    services.tiler_new("mosaic", 1920, 1080).unwrap();

    assert!(matches!(
        services.tee_branch_add("tee-0", "cam-0"),
        Err(Error::ComponentNotTheCorrectType { expected: "branch or sink", .. })
    ));
    assert!(matches!(
        services.tee_branch_add("tee-0", "mosaic"),
        Err(Error::ComponentNotTheCorrectType { .. })
    ));
}

#[test]
fn a_child_belongs_to_one_tee() {
    let services = services_with_tee();
    services.remuxer_new("tee-1").unwrap();

    services.tee_branch_add("tee-0", "analytics").unwrap();
    assert!(matches!(
        services.tee_branch_add("tee-1", "analytics"),
        Err(Error::ComponentInUse { .. })
    ));
}

#[test]
fn removing_an_unattached_child_fails() {
    let services = services_with_tee();
    assert!(matches!(
        services.tee_branch_remove("tee-0", "analytics"),
        Err(Error::ComponentNotChild { .. })
    ));
}

#[test]
fn batch_properties_round_trip() {
    let services = services_with_tee();
    services
        .remuxer_batch_properties_set("tee-0", 4, 40000)
        .unwrap();
    assert_eq!(
        services.remuxer_batch_properties_get("tee-0").unwrap(),
        (4, 40000)
    );

    // Negative timeouts are the wait-forever setting, not an error.
    services
        .remuxer_batch_properties_set("tee-0", 0, -1)
        .unwrap();
    assert_eq!(
        services.remuxer_batch_properties_get("tee-0").unwrap(),
        (0, -1)
    );
}

#[test]
fn remuxers_cannot_nest_in_branches() {
    let services = services_with_tee();
    assert!(matches!(
        services.branch_component_add("analytics", "tee-0"),
        Err(Error::ComponentNotTheCorrectType { expected: "tiler or sink", .. })
    ));
}

#[test]
fn tee_operations_enforce_component_kinds() {
    let services = services_with_tee();
    assert!(matches!(
        services.tee_branch_count_get("probe"),
        Err(Error::ComponentNotTheCorrectType { expected: "remuxer", .. })
    ));
    assert!(matches!(
        services.remuxer_batch_properties_get("analytics"),
        Err(Error::ComponentNotTheCorrectType { .. })
    ));
}
