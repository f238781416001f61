// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::sync::Arc;

use cas::{CasDigest, CasNamespace, InstanceName};
use mock::{RequestType, StubCAS};
use protos::pb::build::bazel::remote::execution::v2::digest_function;
use testutil::data::{TestData, TestTree};

use crate::{CasFileFactory, DirectoryFetcher, InitialNode, Leaf, NodeKind, TreeFetcher};

fn namespace() -> CasNamespace {
    CasNamespace::new(InstanceName::new("main"), digest_function::Value::Sha256)
}

fn tree_fetcher(cas: Arc<StubCAS>, tree: &TestTree) -> TreeFetcher {
    TreeFetcher::new(
        cas.clone(),
        CasFileFactory::new(cas),
        CasDigest::new(namespace(), tree.digest()),
    )
}

#[tokio::test]
async fn fetches_root_children() {
    let tree = TestTree::with_maybe_executable_files();
    let cas = Arc::new(StubCAS::builder().tree(&namespace(), &tree).build());
    let fetcher = tree_fetcher(cas, &tree);

    let children = fetcher.fetch().await.unwrap();
    let names: Vec<&str> = children.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["feed.ext", "food.ext"]);
    match &children[0].1 {
        InitialNode::Leaf(leaf @ Leaf::File(f)) => {
            assert!(f.is_executable());
            assert_eq!(f.digest().digest, TestData::heron().digest());
            let attr = leaf.attr(42);
            assert_eq!(attr.kind, NodeKind::File);
            assert_eq!(attr.perm, 0o555);
            assert_eq!(attr.size, TestData::heron().len() as u64);
        }
        _ => panic!("Expected a file leaf"),
    }
}

#[tokio::test]
async fn file_content_is_fetched_on_read() {
    let tree = TestTree::containing_owl();
    let data = TestData::owl();
    let cas = Arc::new(
        StubCAS::builder()
            .tree(&namespace(), &tree)
            .file(&namespace(), &data)
            .build(),
    );
    let fetcher = tree_fetcher(cas.clone(), &tree);

    let children = fetcher.fetch().await.unwrap();
    let file = match &children[0].1 {
        InitialNode::Leaf(Leaf::File(f)) => f.clone(),
        _ => panic!("Expected a file leaf"),
    };
    // Nothing is fetched until the content is first read.
    assert_eq!(cas.request_count(RequestType::CasLoadBytes), 1);
    assert_eq!(file.read_bytes().await.unwrap(), data.bytes());
    assert_eq!(cas.request_count(RequestType::CasLoadBytes), 2);

    cas.remove(&namespace(), data.fingerprint());
    let err = file.read_bytes().await.expect_err("Want err for evicted content");
    assert_eq!(err.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn subdirectory_levels_share_one_manifest_fetch() {
    let tree = TestTree::recursive();
    let cas = Arc::new(StubCAS::builder().tree(&namespace(), &tree).build());
    let fetcher = tree_fetcher(cas.clone(), &tree);

    let children = fetcher.fetch().await.unwrap();
    let birds = children
        .iter()
        .find_map(|(name, node)| match node {
            InitialNode::Directory(fetcher) if name == "birds" => Some(fetcher.clone()),
            _ => None,
        })
        .expect("Expected a birds subdirectory");

    let nested = birds.fetch().await.unwrap();
    let names: Vec<&str> = nested.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["owl.ext"]);
    assert_eq!(cas.request_count(RequestType::CasLoadBytes), 1);
}

#[tokio::test]
async fn containing_digests_cover_manifest_and_files() {
    let tree = TestTree::recursive();
    let cas = Arc::new(StubCAS::builder().tree(&namespace(), &tree).build());
    let fetcher = tree_fetcher(cas, &tree);

    let mut digests: Vec<hashing::Digest> = fetcher
        .containing_digests()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.digest)
        .collect();
    digests.sort_unstable();
    let mut want = vec![
        tree.digest(),
        TestData::wren().digest(),
        TestData::owl().digest(),
    ];
    want.sort_unstable();
    assert_eq!(digests, want);
}

#[tokio::test]
async fn missing_manifest_is_not_found() {
    let tree = TestTree::containing_owl();
    let cas = Arc::new(StubCAS::empty());
    let fetcher = tree_fetcher(cas, &tree);

    let err = fetcher
        .containing_digests()
        .await
        .expect_err("Want err for a missing manifest");
    assert_eq!(err.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn cas_failure_is_wrapped_with_the_tree_digest() {
    let tree = TestTree::containing_owl();
    let cas = Arc::new(StubCAS::always_errors());
    let fetcher = tree_fetcher(cas, &tree);

    let err = fetcher.fetch().await.expect_err("Want err from a failing CAS");
    assert_eq!(err.code(), tonic::Code::Internal);
    assert!(
        err.message().contains(&tree.digest().hash.to_hex()),
        "Bad error message: {}",
        err.message()
    );
}
