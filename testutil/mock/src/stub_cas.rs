// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use cas::{CasNamespace, ContentAddressableStorage};
use hashing::{Digest, Fingerprint};
use parking_lot::Mutex;
use testutil::data::{TestData, TestTree};
use tonic::Status;

///
/// An in-process implementation of the ContentAddressableStorage contract, namespaced
/// by (instance name, digest function) so cross-instance behaviour is testable.
///
pub struct StubCAS {
    pub request_counts: RequestCounter,
    pub blobs: Mutex<HashMap<(CasNamespace, Fingerprint), Bytes>>,
    always_errors: bool,
    batch_size: usize,
}

pub type RequestCounter = Mutex<HashMap<RequestType, usize>>;

#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub enum RequestType {
    CasFindMissingBlobs,
    CasLoadBytes,
    // add others of interest as required
}

impl RequestType {
    pub fn record(self, request_counts: &RequestCounter) {
        *request_counts.lock().entry(self).or_insert(0) += 1;
    }
}

pub struct StubCASBuilder {
    always_errors: bool,
    batch_size: Option<usize>,
    content: HashMap<(CasNamespace, Fingerprint), Bytes>,
}

impl StubCASBuilder {
    pub fn new() -> Self {
        StubCASBuilder {
            always_errors: false,
            batch_size: None,
            content: HashMap::new(),
        }
    }

    pub fn file(mut self, namespace: &CasNamespace, file: &TestData) -> Self {
        self.content
            .insert((namespace.clone(), file.fingerprint()), file.bytes());
        self
    }

    pub fn tree(mut self, namespace: &CasNamespace, tree: &TestTree) -> Self {
        self.content
            .insert((namespace.clone(), tree.fingerprint()), tree.bytes());
        self
    }

    pub fn unverified_content(
        mut self,
        namespace: &CasNamespace,
        fingerprint: Fingerprint,
        content: Bytes,
    ) -> Self {
        self.content
            .insert((namespace.clone(), fingerprint), content);
        self
    }

    pub fn always_errors(mut self) -> Self {
        self.always_errors = true;
        self
    }

    pub fn find_missing_batch_size(mut self, batch_size: usize) -> Self {
        if self.batch_size.is_some() {
            panic!("Can't set find_missing_batch_size twice");
        }
        self.batch_size = Some(batch_size);
        self
    }

    pub fn build(self) -> StubCAS {
        StubCAS {
            request_counts: Mutex::new(HashMap::new()),
            blobs: Mutex::new(self.content),
            always_errors: self.always_errors,
            batch_size: self.batch_size.unwrap_or(1000),
        }
    }
}

impl StubCAS {
    pub fn builder() -> StubCASBuilder {
        StubCASBuilder::new()
    }

    pub fn empty() -> StubCAS {
        StubCAS::builder().build()
    }

    pub fn always_errors() -> StubCAS {
        StubCAS::builder().always_errors().build()
    }

    pub fn request_count(&self, request_type: RequestType) -> usize {
        *self.request_counts.lock().get(&request_type).unwrap_or(&0)
    }

    pub fn remove(&self, namespace: &CasNamespace, fingerprint: Fingerprint) -> bool {
        self.blobs
            .lock()
            .remove(&(namespace.clone(), fingerprint))
            .is_some()
    }

    fn check_errors(&self) -> Result<(), Status> {
        if self.always_errors {
            Err(Status::internal("StubCAS is configured to always fail"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContentAddressableStorage for StubCAS {
    async fn find_missing_blobs(
        &self,
        namespace: &CasNamespace,
        digests: Vec<Digest>,
    ) -> Result<HashSet<Digest>, Status> {
        RequestType::CasFindMissingBlobs.record(&self.request_counts);
        self.check_errors()?;
        let blobs = self.blobs.lock();
        Ok(digests
            .into_iter()
            .filter(|digest| !blobs.contains_key(&(namespace.clone(), digest.hash)))
            .collect())
    }

    async fn load_bytes(
        &self,
        namespace: &CasNamespace,
        digest: Digest,
    ) -> Result<Bytes, Status> {
        RequestType::CasLoadBytes.record(&self.request_counts);
        self.check_errors()?;
        let blobs = self.blobs.lock();
        blobs
            .get(&(namespace.clone(), digest.hash))
            .cloned()
            .ok_or_else(|| Status::not_found(format!("Missing digest {digest} in {namespace}")))
    }

    fn find_missing_batch_size(&self) -> usize {
        self.batch_size
    }
}
