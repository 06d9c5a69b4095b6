use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use buildstamp::tags::{self, TagLayout, TagSpec, TagValues};

const TLS_SOURCE: &str = "package transport\n\nvar caPEM = []byte(`[buildstamp_ca]`)\n";
const DEF_SOURCE: &str = concat!(
    "package agent\n\n",
    "var Endpoint = \"192.0.2.1\"\n",
    "var Indicator = \"[buildstamp_indicator]\"\n",
    "var BuildID = \"[buildstamp_build_id]\"\n",
);

fn scaffold(root: &Path) {
    fs::create_dir_all(root.join("internal/transport")).unwrap();
    fs::create_dir_all(root.join("internal/agent")).unwrap();
    fs::write(root.join("internal/transport/tls.go"), TLS_SOURCE).unwrap();
    fs::write(root.join("internal/agent/def.go"), DEF_SOURCE).unwrap();
}

fn snapshot(root: &Path) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for rel in ["internal/transport/tls.go", "internal/agent/def.go"] {
        out.insert(rel.to_string(), fs::read_to_string(root.join(rel)).unwrap());
    }
    out
}

fn values() -> TagValues {
    TagValues {
        ca_certificate: "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n".into(),
        endpoint: "203.0.113.5".into(),
        indicator: Some("beacon-7".into()),
        build_id: "f3a1c2d4".into(),
    }
}

#[test]
fn inject_then_restore_is_byte_identity() {
    let dir = tempfile::tempdir().expect("tempdir");
    scaffold(dir.path());
    let before = snapshot(dir.path());

    let guard = tags::inject(dir.path(), &TagLayout::standard(), &values()).expect("inject");

    let def = fs::read_to_string(dir.path().join("internal/agent/def.go")).unwrap();
    assert!(def.contains("203.0.113.5"));
    assert!(def.contains("beacon-7"));
    assert!(def.contains("f3a1c2d4"));
    assert!(!def.contains("[buildstamp_indicator]"));
    let tls = fs::read_to_string(dir.path().join("internal/transport/tls.go")).unwrap();
    assert!(tls.contains("BEGIN CERTIFICATE"));

    guard.restore().expect("restore");
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn server_build_leaves_indicator_placeholder() {
    let dir = tempfile::tempdir().expect("tempdir");
    scaffold(dir.path());

    let mut vals = values();
    vals.indicator = None;
    let guard = tags::inject(dir.path(), &TagLayout::standard(), &vals).expect("inject");

    let def = fs::read_to_string(dir.path().join("internal/agent/def.go")).unwrap();
    assert!(def.contains("[buildstamp_indicator]"));
    guard.restore().expect("restore");
}

#[test]
fn value_equal_to_placeholder_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    scaffold(dir.path());
    let before = snapshot(dir.path());

    // Operator supplies exactly the compiled-in fallback address.
    let mut vals = values();
    vals.endpoint = "192.0.2.1".into();
    let guard = tags::inject(dir.path(), &TagLayout::standard(), &vals).expect("inject");
    guard.restore().expect("restore");

    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn empty_value_injects_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    scaffold(dir.path());
    let before = snapshot(dir.path());

    let mut vals = values();
    vals.indicator = Some(String::new());
    vals.endpoint = String::new();
    let guard = tags::inject(dir.path(), &TagLayout::standard(), &vals).expect("inject");

    let def = fs::read_to_string(dir.path().join("internal/agent/def.go")).unwrap();
    assert!(def.contains("192.0.2.1"));
    assert!(def.contains("[buildstamp_indicator]"));

    guard.restore().expect("restore");
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn value_containing_another_placeholder_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("conf.go");
    fs::write(&file, "ca = \"[ca]\"\naddr = \"192.0.2.1\"\n").unwrap();
    let before = fs::read_to_string(&file).unwrap();

    // The CA value embeds the endpoint placeholder, and both slots target the
    // same file; LIFO restoration must still reproduce the original bytes.
    let layout = TagLayout {
        ca: TagSpec::new("[ca]", &["conf.go"]),
        endpoint: TagSpec::new("192.0.2.1", &["conf.go"]),
        indicator: TagSpec::new("[ind]", &["conf.go"]),
        build_id: TagSpec::new("[bid]", &["conf.go"]),
    };
    let vals = TagValues {
        ca_certificate: "issued-to 192.0.2.1 by test".into(),
        endpoint: "10.9.8.7".into(),
        indicator: None,
        build_id: "bid-1".into(),
    };

    let guard = tags::inject(dir.path(), &layout, &vals).expect("inject");
    let during = fs::read_to_string(&file).unwrap();
    assert!(during.contains("issued-to 10.9.8.7 by test"));
    assert_eq!(during.matches("10.9.8.7").count(), 2);

    guard.restore().expect("restore");
    assert_eq!(fs::read_to_string(&file).unwrap(), before);
}

#[test]
fn dropped_guard_restores_placeholders() {
    let dir = tempfile::tempdir().expect("tempdir");
    scaffold(dir.path());
    let before = snapshot(dir.path());

    let guard = tags::inject(dir.path(), &TagLayout::standard(), &values()).expect("inject");
    assert!(!guard.is_empty());
    drop(guard);

    assert_eq!(snapshot(dir.path()), before);
}
