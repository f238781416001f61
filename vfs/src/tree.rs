// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::sync::Arc;

use async_oncecell::OnceCell;
use async_trait::async_trait;
use cas::{CasDigest, CasNamespace, ContentAddressableStorage};
use hashing::Digest;
use prost::Message;
use protos::pb::build::bazel::remote::execution::v2 as remexec;
use protos::require_digest;
use tonic::{Code, Status};

use crate::{CasFileFactory, DirectoryFetcher, InitialNode, Leaf};

/// A `Tree` manifest decoded once and indexed so every subdirectory level can be
/// resolved without further fetches.
struct IndexedTree {
    root: remexec::Directory,
    // Child manifests keyed by the digest of their canonical encoding, which is what
    // `DirectoryNode.digest` carries.
    children: HashMap<Digest, remexec::Directory>,
}

impl IndexedTree {
    fn directory(&self, subdirectory: Option<Digest>) -> Result<&remexec::Directory, Status> {
        match subdirectory {
            None => Ok(&self.root),
            Some(digest) => self.children.get(&digest).ok_or_else(|| {
                Status::invalid_argument(format!(
                    "Tree does not contain a directory with digest {digest}"
                ))
            }),
        }
    }
}

/// Fetches the children of one directory level of a CAS `Tree`. The manifest blob is
/// fetched at most once per tree; fetchers for subdirectory levels share the decoded
/// manifest with the fetcher that created them.
pub struct TreeFetcher {
    cas: Arc<dyn ContentAddressableStorage>,
    file_factory: CasFileFactory,
    tree_digest: CasDigest,
    tree: Arc<OnceCell<Arc<IndexedTree>>>,
    // Which directory within the tree this fetcher serves; None is the root.
    subdirectory: Option<Digest>,
}

impl TreeFetcher {
    pub fn new(
        cas: Arc<dyn ContentAddressableStorage>,
        file_factory: CasFileFactory,
        tree_digest: CasDigest,
    ) -> TreeFetcher {
        TreeFetcher {
            cas,
            file_factory,
            tree_digest,
            tree: Arc::new(OnceCell::new()),
            subdirectory: None,
        }
    }

    async fn indexed(&self) -> Result<Arc<IndexedTree>, Status> {
        self.tree
            .get_or_try_init(async {
                let bytes = self
                    .cas
                    .load_bytes(&self.tree_digest.namespace, self.tree_digest.digest)
                    .await
                    .map_err(|status| match status.code() {
                        Code::NotFound => status,
                        code => Status::new(
                            code,
                            format!(
                                "Failed to load tree {}: {}",
                                self.tree_digest.digest,
                                status.message()
                            ),
                        ),
                    })?;
                let tree = remexec::Tree::decode(bytes).map_err(|err| {
                    Status::internal(format!(
                        "Failed to decode tree {}: {err}",
                        self.tree_digest.digest
                    ))
                })?;
                let root = tree.root.ok_or_else(|| {
                    Status::internal(format!(
                        "Tree {} has no root directory",
                        self.tree_digest.digest
                    ))
                })?;
                let children = tree
                    .children
                    .into_iter()
                    .map(|child| (Digest::of_bytes(&child.encode_to_vec()), child))
                    .collect();
                Ok(Arc::new(IndexedTree { root, children }))
            })
            .await
            .cloned()
    }

    fn for_subdirectory(&self, digest: Digest) -> TreeFetcher {
        TreeFetcher {
            cas: self.cas.clone(),
            file_factory: self.file_factory.clone(),
            tree_digest: self.tree_digest.clone(),
            tree: self.tree.clone(),
            subdirectory: Some(digest),
        }
    }

    fn qualify(&self, digest: Digest) -> CasDigest {
        CasDigest::new(self.tree_digest.namespace.clone(), digest)
    }
}

#[async_trait]
impl DirectoryFetcher for TreeFetcher {
    fn namespace(&self) -> &CasNamespace {
        &self.tree_digest.namespace
    }

    async fn containing_digests(&self) -> Result<Vec<CasDigest>, Status> {
        let tree = self.indexed().await?;
        let mut digests = vec![self.tree_digest.clone()];
        let mut pending = vec![tree.directory(self.subdirectory)?];
        while let Some(directory) = pending.pop() {
            for file in &directory.files {
                let digest = require_digest(file.digest.as_ref())
                    .map_err(Status::invalid_argument)?;
                digests.push(self.qualify(digest));
            }
            for subdirectory in &directory.directories {
                let digest = require_digest(subdirectory.digest.as_ref())
                    .map_err(Status::invalid_argument)?;
                pending.push(tree.directory(Some(digest))?);
            }
        }
        Ok(digests)
    }

    async fn fetch(&self) -> Result<Vec<(String, InitialNode)>, Status> {
        let tree = self.indexed().await?;
        let directory = tree.directory(self.subdirectory)?;
        let mut children = Vec::new();
        for file in &directory.files {
            let digest =
                require_digest(file.digest.as_ref()).map_err(Status::invalid_argument)?;
            children.push((
                file.name.clone(),
                InitialNode::Leaf(
                    self.file_factory
                        .lazy_file(self.qualify(digest), file.is_executable),
                ),
            ));
        }
        for subdirectory in &directory.directories {
            let digest = require_digest(subdirectory.digest.as_ref())
                .map_err(Status::invalid_argument)?;
            children.push((
                subdirectory.name.clone(),
                InitialNode::Directory(Arc::new(self.for_subdirectory(digest))),
            ));
        }
        for symlink in &directory.symlinks {
            children.push((
                symlink.name.clone(),
                InitialNode::Leaf(Leaf::Symlink {
                    target: symlink.target.clone(),
                }),
            ));
        }
        Ok(children)
    }
}
