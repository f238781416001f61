// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;

use cas::{CasNamespace, ContentAddressableStorage};
use hashing::Digest;
use log::debug;
use tonic::{Code, Status};
use vfs::{ChildRemover, DirectoryFetcher, FilterContent, PrepopulatedDirectory};

/// The pre-build sweep: remove every entry of the output path whose CAS backing is
/// gone or lives under the wrong namespace, so that anything still present when the
/// build starts is usable without racing CAS eviction.
///
/// Existence checks are batched at the CAS-recommended size. Removal callbacks are
/// invoked with notifications enabled; the kernel may still have entries from the
/// previous build cached.
pub(crate) async fn filter_missing_children(
    root: &PrepopulatedDirectory,
    namespace: &CasNamespace,
    cas: &dyn ContentAddressableStorage,
) -> Result<(), Status> {
    let batch_size = cas.find_missing_batch_size();
    let mut pending: HashMap<Digest, Vec<ChildRemover>> = HashMap::new();
    let mut removed_mismatched = 0_usize;

    for target in root.filter_children() {
        // Cross-namespace reuse is disallowed: a build client cannot be expected to
        // rehash or reupload blobs it created under another instance or hash function.
        match target.content.namespace() {
            None => continue,
            Some(ns) if ns != namespace => {
                target.remover.remove(true);
                removed_mismatched += 1;
                continue;
            }
            Some(_) => {}
        }

        match target.content {
            FilterContent::Leaf(leaf) => {
                if let Some(digest) = leaf.referenced_digest() {
                    pending
                        .entry(digest.digest)
                        .or_default()
                        .push(target.remover.clone());
                }
            }
            FilterContent::LazyDirectory(fetcher) => {
                match fetcher.containing_digests().await {
                    Ok(digests) => {
                        for digest in digests {
                            pending
                                .entry(digest.digest)
                                .or_default()
                                .push(target.remover.clone());
                        }
                    }
                    // The manifest itself is gone: the subtree can never be
                    // materialized, so it goes the way its content would.
                    Err(status) if status.code() == Code::NotFound => {
                        target.remover.remove(true);
                    }
                    Err(status) => {
                        return Err(Status::new(
                            status.code(),
                            format!(
                                "Failed to determine digests contained in {:?}: {}",
                                target.remover.name(),
                                status.message()
                            ),
                        ));
                    }
                }
            }
        }

        if pending.len() >= batch_size {
            flush(&mut pending, namespace, cas).await?;
        }
    }
    flush(&mut pending, namespace, cas).await?;

    if removed_mismatched > 0 {
        debug!("Removed {removed_mismatched} entries created under other CAS namespaces");
    }
    Ok(())
}

async fn flush(
    pending: &mut HashMap<Digest, Vec<ChildRemover>>,
    namespace: &CasNamespace,
    cas: &dyn ContentAddressableStorage,
) -> Result<(), Status> {
    if pending.is_empty() {
        return Ok(());
    }
    let digests: Vec<Digest> = pending.keys().copied().collect();
    let missing = cas
        .find_missing_blobs(namespace, digests)
        .await
        .map_err(|status| {
            Status::new(
                status.code(),
                format!("Failed to find missing blobs: {}", status.message()),
            )
        })?;
    let mut removed = 0_usize;
    for digest in missing {
        if let Some(removers) = pending.remove(&digest) {
            for remover in removers {
                if remover.remove(true) {
                    removed += 1;
                }
            }
        }
    }
    if removed > 0 {
        debug!("Removed {removed} entries whose blobs are no longer in the CAS");
    }
    pending.clear();
    Ok(())
}
