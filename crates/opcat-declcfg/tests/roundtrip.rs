//! Render round-trip: a store rendered to the file form and loaded into a
//! fresh store lists the same bundles.

use serde_json::json;

use opcat_core::Bundle;
use opcat_core::annotations::Annotations;
use opcat_core::manifest::Manifest;
use opcat_declcfg::{Format, populate, render};
use opcat_store::{AddOptions, Store, UpdateMode};

fn bundle(name: &str, version: &str, replaces: Option<&str>) -> Bundle {
    let csv = json!({
        "apiVersion": "operators.coreos.com/v1alpha1",
        "kind": "ClusterServiceVersion",
        "metadata": { "name": name },
        "spec": {
            "version": version,
            "replaces": replaces,
            "customresourcedefinitions": {
                "owned": [
                    { "name": "foos.example.com", "version": "v1", "kind": "Foo" }
                ]
            }
        }
    });
    let crd = json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": "foos.example.com" },
        "spec": {
            "group": "example.com",
            "names": { "kind": "Foo", "plural": "foos" },
            "versions": [ { "name": "v1", "served": true, "storage": true } ]
        }
    });
    let annotations = Annotations {
        package: "foo".into(),
        channels: vec!["stable".into()],
        default_channel: Some("stable".into()),
    };
    Bundle::assemble(
        annotations,
        vec![
            Manifest::from_value(csv).unwrap(),
            Manifest::from_value(crd).unwrap(),
        ],
        Vec::new(),
        Vec::new(),
    )
    .unwrap()
    .with_image(format!("quay.io/foo/{name}"))
}

fn seeded_store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store
        .add_bundle(&bundle("foo.v1.0.0", "1.0.0", None), &AddOptions::default())
        .unwrap();
    store
        .add_bundle(
            &bundle("foo.v1.1.0", "1.1.0", Some("foo.v1.0.0")),
            &AddOptions::default(),
        )
        .unwrap();
    store
        .add_bundle(
            &bundle("foo.v1.2.0", "1.2.0", None),
            &AddOptions {
                mode: UpdateMode::Semver,
                ..Default::default()
            },
        )
        .unwrap();
    store
}

/// The graph-relevant face of a payload, for order-insensitive comparison.
fn positions(store: &Store) -> Vec<(String, Option<String>, String, Option<String>, Vec<String>)> {
    let mut all: Vec<_> = store
        .list_bundles()
        .map(|payload| {
            let payload = payload.unwrap();
            (
                payload.package.clone(),
                payload.channel.clone(),
                payload.name.clone(),
                payload.replaces.clone(),
                payload
                    .provided_apis
                    .iter()
                    .map(|api| api.to_string())
                    .collect(),
            )
        })
        .collect();
    all.sort();
    all
}

#[test]
fn scenario_s6_render_then_populate_lists_the_same_bundles() {
    let original = seeded_store();
    let config = render(&original).unwrap();

    let report = opcat_declcfg::validate(&config);
    assert!(!report.has_errors(), "{:?}", report.findings);

    let fresh = Store::open_in_memory().unwrap();
    populate(&config, &fresh).unwrap();

    assert_eq!(positions(&original), positions(&fresh));

    let package = fresh.get_package("foo").unwrap();
    assert_eq!(package.default_channel.as_deref(), Some("stable"));

    // the synthesized semver edge survives the trip
    let head = fresh.get_bundle_for_channel("foo", "stable").unwrap();
    assert_eq!(head.name, "foo.v1.2.0");
    assert_eq!(head.replaces.as_deref(), Some("foo.v1.1.0"));
}

#[test]
fn rendered_catalog_survives_disk_and_reload() {
    let original = seeded_store();
    let config = render(&original).unwrap();

    let dir = tempfile::tempdir().unwrap();
    opcat_declcfg::write_dir(&config, dir.path(), Format::Json).unwrap();
    let reloaded = opcat_declcfg::load_path(dir.path()).unwrap();
    assert_eq!(config, reloaded);

    // and the YAML spelling parses back to the same records
    let yaml_dir = tempfile::tempdir().unwrap();
    opcat_declcfg::write_dir(&config, yaml_dir.path(), Format::Yaml).unwrap();
    let from_yaml = opcat_declcfg::load_path(yaml_dir.path()).unwrap();
    assert_eq!(config, from_yaml);
}

#[test]
fn tombstones_render_as_deprecations() {
    let store = seeded_store();
    store
        .deprecate_bundle("foo.v1.0.0", &opcat_store::DeprecateOptions::default())
        .unwrap();

    let config = render(&store).unwrap();
    let deprecations = config
        .deprecations
        .iter()
        .find(|d| d.package == "foo")
        .expect("deprecations record for foo");
    assert_eq!(deprecations.entries.len(), 1);
    assert_eq!(deprecations.entries[0].reference.name, "foo.v1.0.0");

    // the truncated catalog still validates: the tombstone legitimizes
    // whatever still points at the removed bundle
    let report = opcat_declcfg::validate(&config);
    assert!(!report.has_errors(), "{:?}", report.findings);
}
