// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use bytes::Bytes;
use cas::{CasDigest, CasNamespace, ContentAddressableStorage};
use tonic::Status;

use protos::pb::build::bazel::remote::output_service::v1::{FileStatus, file_status};

use crate::{Attr, Inode, NodeKind};

/// A terminal node of an output path: a lazily fetched file or a symbolic link.
#[derive(Clone)]
pub enum Leaf {
    File(CasFile),
    Symlink { target: String },
}

impl Leaf {
    /// The CAS digest this leaf depends on, if any. Symlinks are plain strings and
    /// depend on nothing.
    pub fn referenced_digest(&self) -> Option<&CasDigest> {
        match self {
            Leaf::File(f) => Some(&f.digest),
            Leaf::Symlink { .. } => None,
        }
    }

    /// The status reported to a build client for this leaf. The content digest is
    /// attached only when `include_digest_for` names the namespace the file was created
    /// under; a digest under any other namespace would not be usable by the caller.
    pub fn output_service_status(&self, include_digest_for: Option<&CasNamespace>) -> FileStatus {
        let file_type = match self {
            Leaf::File(f) => {
                let digest = match include_digest_for {
                    Some(namespace) if *namespace == f.digest.namespace => {
                        Some((&f.digest.digest).into())
                    }
                    _ => None,
                };
                file_status::FileType::File(file_status::File { digest })
            }
            Leaf::Symlink { target } => file_status::FileType::Symlink(file_status::Symlink {
                target: target.clone(),
            }),
        };
        FileStatus {
            file_type: Some(file_type),
        }
    }

    pub fn attr(&self, inode: Inode) -> Attr {
        match self {
            Leaf::File(f) => Attr {
                inode,
                kind: NodeKind::File,
                perm: if f.is_executable { 0o555 } else { 0o444 },
                nlink: 1,
                size: f.digest.digest.size_bytes as u64,
            },
            Leaf::Symlink { target } => Attr {
                inode,
                kind: NodeKind::Symlink,
                perm: 0o777,
                nlink: 1,
                size: target.len() as u64,
            },
        }
    }
}

/// A file whose content lives in the CAS and is only fetched when first read.
#[derive(Clone)]
pub struct CasFile {
    cas: Arc<dyn ContentAddressableStorage>,
    digest: CasDigest,
    is_executable: bool,
}

impl CasFile {
    pub fn digest(&self) -> &CasDigest {
        &self.digest
    }

    pub fn is_executable(&self) -> bool {
        self.is_executable
    }

    /// Materialize the file's content. Kept out of any lock: this is the blocking fetch
    /// the kernel bridge performs on first read.
    pub async fn read_bytes(&self) -> Result<Bytes, Status> {
        self.cas
            .load_bytes(&self.digest.namespace, self.digest.digest)
            .await
    }
}

/// Creates lazy file leaves against one CAS handle. One factory is held per output path
/// and shared between the RPC and filesystem surfaces.
#[derive(Clone)]
pub struct CasFileFactory {
    cas: Arc<dyn ContentAddressableStorage>,
}

impl CasFileFactory {
    pub fn new(cas: Arc<dyn ContentAddressableStorage>) -> CasFileFactory {
        CasFileFactory { cas }
    }

    pub fn lazy_file(&self, digest: CasDigest, is_executable: bool) -> Leaf {
        Leaf::File(CasFile {
            cas: self.cas.clone(),
            digest,
            is_executable,
        })
    }
}
