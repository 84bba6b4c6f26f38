#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration tests for building the desired state from a checkout on disk.

mod common;

use common::write_file;
use quadsync::desired::{self, Transforms};
use quadsync::error::BuildError;

const SPEC: &str = "\
# Web frontend
[Unit]
Description=Web

[Container]
Image=docker.io/library/nginx:1.27
Volume=/srv/web:/usr/share/nginx/html:ro

[Install]
WantedBy=default.target
";

const EDGE: &str = "\
[Container]
+Volume=/etc/localtime:/etc/localtime:ro
Image=ignored
Network=host
AutoUpdate=registry

[Service]
Restart=always
";

fn trees() -> (tempfile::TempDir, tempfile::TempDir) {
    (
        tempfile::tempdir().expect("tree"),
        tempfile::tempdir().expect("transforms"),
    )
}

#[test]
fn augment_merges_realistic_unit() {
    let (tree, tdir) = trees();
    write_file(tree.path(), "edge/web.container", SPEC);
    write_file(tdir.path(), "edge.container", EDGE);
    let transforms = Transforms::load(tdir.path()).unwrap();

    let merged = desired::augment(&tree.path().join("edge/web.container"), &transforms).unwrap();

    assert_eq!(
        merged,
        "\
# Web frontend
[Unit]
Description=Web

[Container]
Image=docker.io/library/nginx:1.27
Volume=/etc/localtime:/etc/localtime:ro
Volume=/srv/web:/usr/share/nginx/html:ro
Network=host
AutoUpdate=registry

[Install]
WantedBy=default.target

[Service]
Restart=always
"
    );
}

#[test]
fn augment_output_matches_built_unit() {
    let (tree, tdir) = trees();
    write_file(tree.path(), "edge/web.container", SPEC);
    write_file(tdir.path(), "edge.container", EDGE);
    let transforms = Transforms::load(tdir.path()).unwrap();

    let state = desired::build(tree.path(), &transforms).unwrap();
    let merged = desired::augment(&tree.path().join("edge/web.container"), &transforms).unwrap();

    assert_eq!(state.units["web"].content, merged);
    assert_eq!(state.units["web"].hash, desired::content_hash(&merged));
}

#[test]
fn augment_without_matching_transform_fails() {
    let (tree, tdir) = trees();
    write_file(tree.path(), "misc/web.container", SPEC);
    let transforms = Transforms::load(tdir.path()).unwrap();

    let err = desired::augment(&tree.path().join("misc/web.container"), &transforms).unwrap_err();

    assert!(matches!(err, BuildError::NoTransform { .. }), "{err}");
}

#[test]
fn root_units_are_deployed_verbatim() {
    let (tree, tdir) = trees();
    write_file(tree.path(), "web.container", SPEC);
    write_file(tdir.path(), "edge.container", EDGE);

    let state = desired::build(tree.path(), &Transforms::load(tdir.path()).unwrap()).unwrap();

    assert_eq!(state.units["web"].content, SPEC);
}

#[test]
fn non_unit_files_and_hidden_dirs_are_ignored() {
    let (tree, tdir) = trees();
    write_file(tree.path(), "README.md", "# units\n");
    write_file(tree.path(), "web.container", SPEC);
    write_file(tree.path(), ".git/config.container", "[core]\n");
    write_file(tdir.path(), "git.container", EDGE);

    let state = desired::build(tree.path(), &Transforms::load(tdir.path()).unwrap()).unwrap();

    assert_eq!(state.units.keys().collect::<Vec<_>>(), ["web"]);
    assert!(state.held.is_empty());
}

#[test]
fn duplicate_names_across_directories_are_rejected() {
    let (tree, tdir) = trees();
    write_file(tree.path(), "web.container", SPEC);
    write_file(tree.path(), "edge/web.container", SPEC);
    write_file(tdir.path(), "edge.container", EDGE);

    let err = desired::build(tree.path(), &Transforms::load(tdir.path()).unwrap()).unwrap_err();

    let BuildError::DuplicateName { name, .. } = &err else {
        panic!("expected duplicate name, got {err}");
    };
    assert_eq!(name, "web");
}

#[test]
fn duplicate_in_skipped_directory_is_not_an_error() {
    let (tree, tdir) = trees();
    write_file(tree.path(), "web.container", SPEC);
    write_file(tree.path(), "misc/web.container", SPEC);

    let state = desired::build(tree.path(), &Transforms::load(tdir.path()).unwrap()).unwrap();

    assert_eq!(state.units.len(), 1);
    assert_eq!(state.skipped_dirs.len(), 1);
}

#[test]
fn distinct_names_across_directories_build() {
    let (tree, tdir) = trees();
    write_file(tree.path(), "web.container", SPEC);
    write_file(tree.path(), "edge/proxy.container", SPEC);
    write_file(tree.path(), "core/db.container", SPEC);
    write_file(tdir.path(), "edge.container", EDGE);
    write_file(tdir.path(), "core.container", "[Service]\nRestart=on-failure\n");

    let state = desired::build(tree.path(), &Transforms::load(tdir.path()).unwrap()).unwrap();

    assert_eq!(
        state.units.keys().collect::<Vec<_>>(),
        ["db", "proxy", "web"]
    );
    insta::assert_snapshot!(state.units["db"].content, @r"
    # Web frontend
    [Unit]
    Description=Web

    [Container]
    Image=docker.io/library/nginx:1.27
    Volume=/srv/web:/usr/share/nginx/html:ro

    [Install]
    WantedBy=default.target

    [Service]
    Restart=on-failure
    ");
}
