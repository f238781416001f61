// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The Remote Output Service Directory: exposes the build outputs of remote-execution
//! build clients as lazily materialized local files. Build clients drive the service
//! over the `RemoteOutputService` RPC surface (start builds, bulk-create and bulk-stat
//! output entries, finalize, wipe); compilers and test runners concurrently read the
//! same entries through the filesystem surface.
//!
//! Layering: the output-path registry (`registry`) tracks live output paths under one
//! mutex; the path resolvers (`path`, `create_walker`, `stat_walker`, `virtual_root`)
//! drive the node layer in `vfs`; the build lifecycle and bulk operations live in
//! `service`, the pre-build CAS sweep in `reconcile`, and the read-only filesystem
//! root adapter in `fuse`.

mod create_walker;
mod fuse;
pub mod path;
mod reconcile;
mod registry;
mod service;
mod stat_walker;
mod virtual_root;

pub use registry::{BuildId, BuildState, OutputBaseId, OutputPathState, Registry};
pub use service::{InMemoryOutputPathFactory, OutputPathFactory, OutputService};
pub use virtual_root::VirtualRootScope;


#[cfg(test)]
mod registry_tests;
