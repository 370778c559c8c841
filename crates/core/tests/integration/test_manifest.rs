//! Integration tests for manifest files on disk: loading, applying to a
//! services instance, and driving an applied pipeline.

use std::io::Write;
use std::time::Duration;
use streamweave_core::{manifest, Error, Services};
use tokio::time::sleep;

const DEMO_YAML: &str = r#"
name: disk-demo
components:
  - type: uri_source
    name: cam-0
    uri: rtsp://host/stream0
    live: true
    frame_rate: [100, 1]
  - type: uri_source
    name: cam-1
    uri: rtsp://host/stream1
    live: true
    frame_rate: [100, 1]
  - type: fake_sink
    name: counter
    sync: false
pipelines:
  - name: main
    components: [cam-0, cam-1, counter]
    streammux:
      batch_timeout_us: 20000
"#;

fn write_manifest(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp manifest");
    file.write_all(content.as_bytes()).expect("write manifest");
    file
}

#[tokio::test]
async fn yaml_manifest_loads_applies_and_plays() {
    let file = write_manifest(".yaml", DEMO_YAML);
    let manifest = manifest::load(file.path()).unwrap();
    assert_eq!(manifest.name.as_deref(), Some("disk-demo"));

    let services = Services::new();
    manifest::apply(&manifest, &services).unwrap();
    assert_eq!(services.component_list_size(), 3);
    assert_eq!(services.pipeline_names(), vec!["main"]);

    // Applying leaves everything stopped; the caller drives playback.
    services.pipeline_play("main").await.unwrap();
    sleep(Duration::from_millis(300)).await;
    services.pipeline_stop("main").await.unwrap();
    assert!(services.sink_frame_count_get("counter").unwrap() > 0);
}

#[test]
fn json_manifest_loads_from_disk() {
    let file = write_manifest(
        ".json",
        r#"{
            "components": [
                {"type": "fake_sink", "name": "probe"},
                {"type": "tiler", "name": "mosaic", "width": 1920, "height": 1080}
            ]
        }"#,
    );
    let manifest = manifest::load(file.path()).unwrap();
    assert_eq!(manifest.components.len(), 2);
    assert_eq!(manifest.sink_names(), vec!["probe"]);

    let services = Services::new();
    manifest::apply(&manifest, &services).unwrap();
    assert_eq!(services.tiler_dimensions_get("mosaic").unwrap(), (1920, 1080));
}

#[test]
fn unsupported_extension_is_rejected() {
    let file = write_manifest(".toml", "components = []");
    let err = manifest::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::Manifest(_)));
    assert!(err.to_string().contains("extension"));
}

#[test]
fn malformed_yaml_is_a_yaml_error() {
    let file = write_manifest(".yaml", "components: [unclosed");
    assert!(matches!(
        manifest::load(file.path()),
        Err(Error::Yaml(_))
    ));
}

#[test]
fn applying_twice_hits_name_conflicts() {
    let file = write_manifest(".yaml", DEMO_YAML);
    let manifest = manifest::load(file.path()).unwrap();

    let services = Services::new();
    manifest::apply(&manifest, &services).unwrap();
    assert!(matches!(
        manifest::apply(&manifest, &services),
        Err(Error::ComponentNameNotUnique { .. })
    ));
}

#[test]
fn manifests_round_trip_through_yaml() {
    let parsed = manifest::parse_yaml(DEMO_YAML).unwrap();
    let rendered = manifest::to_yaml(&parsed).unwrap();
    let reparsed = manifest::parse_yaml(&rendered).unwrap();

    assert_eq!(reparsed.components.len(), parsed.components.len());
    assert_eq!(reparsed.pipeline_names(), parsed.pipeline_names());
    manifest::validate(&reparsed).unwrap();
}
