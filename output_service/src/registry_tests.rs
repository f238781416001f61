// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::sync::Arc;

use cas::{CasNamespace, InstanceName};
use maplit::hashmap;
use mock::StubCAS;
use protos::pb::build::bazel::remote::execution::v2::digest_function;
use vfs::{CasFileFactory, InodeAllocator, NullEntryNotifier, PrepopulatedDirectory};

use crate::registry::{Announced, BuildState, OutputBaseId, OutputPathState, Registry};
use crate::virtual_root::VirtualRootScope;

fn base(s: &str) -> OutputBaseId {
    OutputBaseId::parse(s).unwrap()
}

fn new_state() -> Arc<OutputPathState> {
    let root = PrepopulatedDirectory::new_empty(
        Arc::new(InodeAllocator::new()),
        Arc::new(NullEntryNotifier),
    );
    Arc::new(OutputPathState {
        inode: root.inode(),
        root,
        file_factory: CasFileFactory::new(Arc::new(StubCAS::empty())),
    })
}

fn new_build(id: &str) -> BuildState {
    BuildState {
        id: id.to_owned(),
        namespace: CasNamespace::new(InstanceName::new("main"), digest_function::Value::Sha256),
        scope: Arc::new(VirtualRootScope::new("/out/wsA", &hashmap! {}).unwrap()),
    }
}

#[test]
fn output_base_id_validation() {
    assert!(OutputBaseId::parse("wsA").is_ok());
    for invalid in ["", ".", "..", "a/b", "a\0b"] {
        let err = OutputBaseId::parse(invalid).expect_err("Want err");
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}

#[test]
fn announce_starts_and_indexes_by_both_keys() {
    let registry = Registry::new();
    let state = new_state();
    match registry.announce_build(base("wsA"), state.clone(), new_build("b1")) {
        Announced::Started { evicted, .. } => assert!(evicted.is_none()),
        Announced::Reused { .. } => panic!("Expected a fresh binding"),
    }

    assert!(registry.lookup_by_base(&base("wsA")).is_some());
    let (bound_base, bound_state, build) = registry.lookup_by_build("b1").unwrap();
    assert_eq!(bound_base, base("wsA"));
    assert!(Arc::ptr_eq(&bound_state, &state));
    assert_eq!(build.id, "b1");
}

#[test]
fn announce_reuses_known_build_id_and_drops_candidate() {
    let registry = Registry::new();
    let first = new_state();
    registry.announce_build(base("wsA"), first.clone(), new_build("b1"));

    let candidate = new_state();
    match registry.announce_build(base("wsA"), candidate, new_build("b1")) {
        Announced::Reused { base: b, state, .. } => {
            assert_eq!(b, base("wsA"));
            assert!(Arc::ptr_eq(&state, &first));
        }
        Announced::Started { .. } => panic!("Expected the known build to be reused"),
    }
}

#[test]
fn announce_evicts_orphaned_build_on_the_same_base() {
    let registry = Registry::new();
    let state = new_state();
    registry.announce_build(base("wsA"), state.clone(), new_build("b1"));

    match registry.announce_build(base("wsA"), new_state(), new_build("b2")) {
        Announced::Started { state: bound, evicted } => {
            assert_eq!(evicted, Some("b1".to_owned()));
            // The base keeps its state; only the build binding turns over.
            assert!(Arc::ptr_eq(&bound, &state));
        }
        Announced::Reused { .. } => panic!("Expected a fresh binding"),
    }
    assert!(registry.lookup_by_build("b1").is_none());
    assert!(registry.lookup_by_build("b2").is_some());
}

#[test]
fn unbind_build_is_idempotent() {
    let registry = Registry::new();
    registry.announce_build(base("wsA"), new_state(), new_build("b1"));

    registry.unbind_build("b1");
    assert!(registry.lookup_by_build("b1").is_none());
    assert!(registry.lookup_by_base(&base("wsA")).is_some());

    // Unknown and repeated unbinds are no-ops.
    registry.unbind_build("b1");
    registry.unbind_build("never-registered");
}

#[test]
fn remove_base_if_compares_state_identity() {
    let registry = Registry::new();
    let state = new_state();
    registry.announce_build(base("wsA"), state.clone(), new_build("b1"));

    // A different state handle does not remove the entry.
    assert!(!registry.remove_base_if(&base("wsA"), &new_state()));
    assert!(registry.lookup_by_base(&base("wsA")).is_some());

    assert!(registry.remove_base_if(&base("wsA"), &state));
    assert!(registry.lookup_by_base(&base("wsA")).is_none());
    assert!(registry.lookup_by_build("b1").is_none());
}

#[test]
fn snapshot_lists_bases_with_inodes() {
    let registry = Registry::new();
    let state_a = new_state();
    let state_b = new_state();
    registry.announce_build(base("wsB"), state_b.clone(), new_build("b2"));
    registry.announce_build(base("wsA"), state_a.clone(), new_build("b1"));

    assert_eq!(
        registry.snapshot(),
        vec![
            (base("wsA"), state_a.inode),
            (base("wsB"), state_b.inode),
        ]
    );
    assert_eq!(registry.len(), 2);
}
