// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The contract of the Content-Addressable Store the output service reconciles against
//! and lazily fetches from. Concrete providers (REAPI, in-process stubs) live elsewhere;
//! everything here must be safe to share between the RPC and filesystem surfaces.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use hashing::Digest;
use protos::pb::build::bazel::remote::execution::v2::digest_function;
use tonic::Status;

/// Name of a logical CAS instance, as declared by the build client at StartBuild.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceName(String);

impl InstanceName {
    pub fn new<S: Into<String>>(name: S) -> InstanceName {
        InstanceName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A CAS namespace: instance name plus hash function. Blobs addressed under one
/// namespace cannot be assumed to exist under any other.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CasNamespace {
    pub instance_name: InstanceName,
    pub digest_function: digest_function::Value,
}

impl CasNamespace {
    pub fn new(instance_name: InstanceName, digest_function: digest_function::Value) -> Self {
        CasNamespace {
            instance_name,
            digest_function,
        }
    }
}

impl fmt::Display for CasNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.instance_name, self.digest_function)
    }
}

/// A digest qualified by the namespace it was uploaded under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CasDigest {
    pub namespace: CasNamespace,
    pub digest: Digest,
}

impl CasDigest {
    pub fn new(namespace: CasNamespace, digest: Digest) -> Self {
        CasDigest { namespace, digest }
    }
}

#[async_trait]
pub trait ContentAddressableStorage: Send + Sync + 'static {
    /// Return the subset of `digests` that is not (currently) present in the store
    /// under `namespace`.
    async fn find_missing_blobs(
        &self,
        namespace: &CasNamespace,
        digests: Vec<Digest>,
    ) -> Result<HashSet<Digest>, Status>;

    /// Load the content of a single blob. Absent blobs yield `NotFound`.
    async fn load_bytes(&self, namespace: &CasNamespace, digest: Digest)
        -> Result<Bytes, Status>;

    /// Preferred number of digests per `find_missing_blobs` call. Callers issuing large
    /// existence sweeps should flush at this granularity.
    fn find_missing_batch_size(&self) -> usize {
        1000
    }
}
