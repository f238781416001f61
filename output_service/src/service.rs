// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use async_trait::async_trait;
use cas::{CasDigest, CasNamespace, ContentAddressableStorage, InstanceName};
use log::warn;
use protos::pb::build::bazel::remote::execution::v2::digest_function;
use protos::pb::build::bazel::remote::output_service::v1::{
    BatchCreateRequest, BatchCreateResponse, BatchStatRequest, BatchStatResponse, CleanRequest,
    CleanResponse, FileStatus, FinalizeBuildRequest, FinalizeBuildResponse, StartBuildRequest,
    StartBuildResponse, StatResponse, file_status,
    remote_output_service_server::RemoteOutputService,
};
use protos::require_digest;
use tonic::{Request, Response, Status};
use vfs::{
    CasFileFactory, EntryNotifier, InitialNode, Inode, InodeAllocator, PrepopulatedDirectory,
    TreeFetcher,
};

use crate::create_walker::{ParentCreatingWalker, PrefixCreatingWalker};
use crate::path::{self, ResolveError};
use crate::registry::{Announced, BuildState, OutputBaseId, OutputPathState, Registry};
use crate::reconcile;
use crate::stat_walker::{FoundNode, StatOutcome, StatWalker};
use crate::virtual_root::VirtualRootScope;

/// Produces and disposes per-base output path roots. The in-memory implementation is
/// the one without persistence; a persistent factory would restore prior contents in
/// `start_initial_build` and drop them in `clean`.
#[async_trait]
pub trait OutputPathFactory: Send + Sync + 'static {
    /// The root directory for a build starting on `base` with no in-process state.
    fn start_initial_build(
        &self,
        base: &OutputBaseId,
        allocator: Arc<InodeAllocator>,
        notifier: Arc<dyn EntryNotifier>,
    ) -> PrepopulatedDirectory;

    /// Remove any state persisted for `base` outside this process.
    async fn clean(&self, base: &OutputBaseId) -> Result<(), Status>;
}

pub struct InMemoryOutputPathFactory;

#[async_trait]
impl OutputPathFactory for InMemoryOutputPathFactory {
    fn start_initial_build(
        &self,
        _base: &OutputBaseId,
        allocator: Arc<InodeAllocator>,
        notifier: Arc<dyn EntryNotifier>,
    ) -> PrepopulatedDirectory {
        PrepopulatedDirectory::new_empty(allocator, notifier)
    }

    async fn clean(&self, _base: &OutputBaseId) -> Result<(), Status> {
        Ok(())
    }
}

/// The Remote Output Service Directory: manages the lifecycle of output paths on its
/// RPC surface and exposes them as a read-only directory of live output bases on its
/// filesystem surface (see the filesystem impl block in `fuse.rs`).
pub struct OutputService {
    pub(crate) registry: Registry,
    pub(crate) inode: Inode,
    cas: Arc<dyn ContentAddressableStorage>,
    output_path_factory: Arc<dyn OutputPathFactory>,
    notifier: Arc<dyn EntryNotifier>,
    allocator: Arc<InodeAllocator>,
}

impl OutputService {
    pub fn new(
        cas: Arc<dyn ContentAddressableStorage>,
        output_path_factory: Arc<dyn OutputPathFactory>,
        notifier: Arc<dyn EntryNotifier>,
    ) -> OutputService {
        let allocator = Arc::new(InodeAllocator::new());
        let inode = allocator.allocate();
        OutputService {
            registry: Registry::new(),
            inode,
            cas,
            output_path_factory,
            notifier,
            allocator,
        }
    }

    fn resolve_build(
        &self,
        build_id: &str,
    ) -> Result<(Arc<OutputPathState>, BuildState), Status> {
        match self.registry.lookup_by_build(build_id) {
            Some((_base, state, build)) => Ok((state, build)),
            None => Err(Status::failed_precondition(format!(
                "Build ID {build_id:?} is not associated with any running build"
            ))),
        }
    }

    async fn create_entry(
        prefix: &PrepopulatedDirectory,
        entry_path: &str,
        node: InitialNode,
    ) -> Result<(), Status> {
        let mut walker = ParentCreatingWalker::new(prefix.clone());
        path::resolve(entry_path, &mut walker)
            .await
            .map_err(ResolveError::into_status)?;
        let (parent, terminal_name) = walker.into_parts();
        let name = terminal_name.ok_or_else(|| {
            Status::invalid_argument(format!("Path {entry_path:?} resolves to a directory"))
        })?;
        parent.create_children(vec![(name, node)], true).await
    }
}

fn wrap_with_path(entry_path: &str, status: Status) -> Status {
    Status::new(
        status.code(),
        format!("Failed to create {entry_path:?}: {}", status.message()),
    )
}

#[async_trait]
impl RemoteOutputService for OutputService {
    async fn clean(
        &self,
        request: Request<CleanRequest>,
    ) -> Result<Response<CleanResponse>, Status> {
        let req = request.into_inner();
        let base = OutputBaseId::parse(&req.output_base_id)?;
        match self.registry.lookup_by_base(&base) {
            Some(state) => {
                // Children go first, unlocked and with notifications enabled; the entry
                // itself is dropped only if it still holds this state (a concurrent
                // StartBuild may have replaced it).
                state.root.remove_all_children(true)?;
                if self.registry.remove_base_if(&base, &state) {
                    self.notifier.invalidate_entry(self.inode, base.as_str());
                }
            }
            None => self.output_path_factory.clean(&base).await?,
        }
        Ok(Response::new(CleanResponse {}))
    }

    async fn start_build(
        &self,
        request: Request<StartBuildRequest>,
    ) -> Result<Response<StartBuildResponse>, Status> {
        let req = request.into_inner();
        let base = OutputBaseId::parse(&req.output_base_id)?;
        if req.build_id.is_empty() {
            return Err(Status::invalid_argument("Build ID must not be empty"));
        }
        let digest_function = digest_function::Value::try_from(req.digest_function)
            .ok()
            .filter(|f| *f != digest_function::Value::Unknown)
            .ok_or_else(|| Status::invalid_argument("Unknown digest function"))?;

        if !req.output_path_prefix.starts_with('/') {
            return Err(Status::invalid_argument(format!(
                "Output path prefix {:?} is not an absolute path",
                req.output_path_prefix
            )));
        }
        let output_path = format!(
            "{}/{}",
            req.output_path_prefix.trim_end_matches('/'),
            base.as_str()
        );
        let scope = Arc::new(VirtualRootScope::new(
            &output_path,
            &req.output_path_aliases,
        )?);
        let namespace = CasNamespace::new(InstanceName::new(req.instance_name), digest_function);

        // Candidate state, built outside the registry lock; dropped unused when the
        // base or the build id turns out to be known already.
        let root = self.output_path_factory.start_initial_build(
            &base,
            self.allocator.clone(),
            self.notifier.clone(),
        );
        let candidate = Arc::new(OutputPathState {
            inode: root.inode(),
            root,
            file_factory: CasFileFactory::new(self.cas.clone()),
        });
        let build = BuildState {
            id: req.build_id.clone(),
            namespace: namespace.clone(),
            scope,
        };

        let state = match self.registry.announce_build(base.clone(), candidate, build) {
            Announced::Reused {
                base: bound_base,
                state,
                build: existing,
            } => {
                if bound_base != base || existing.namespace != namespace {
                    return Err(Status::failed_precondition(format!(
                        "Build ID {:?} was announced with different parameters",
                        req.build_id
                    )));
                }
                state
            }
            Announced::Started { state, evicted } => {
                if let Some(evicted) = evicted {
                    warn!("Evicting orphaned build {evicted:?} on output base {base}");
                }
                state
            }
        };

        reconcile::filter_missing_children(&state.root, &namespace, self.cas.as_ref()).await?;

        Ok(Response::new(StartBuildResponse {
            output_path_suffix: base.as_str().to_owned(),
        }))
    }

    async fn batch_create(
        &self,
        request: Request<BatchCreateRequest>,
    ) -> Result<Response<BatchCreateResponse>, Status> {
        let req = request.into_inner();
        let (state, build) = self.resolve_build(&req.build_id)?;

        let mut walker = PrefixCreatingWalker::new(state.root.clone());
        path::resolve(&req.path_prefix, &mut walker)
            .await
            .map_err(|err| {
                let status = err.into_status();
                Status::new(
                    status.code(),
                    format!(
                        "Failed to create path prefix {:?}: {}",
                        req.path_prefix,
                        status.message()
                    ),
                )
            })?;
        let prefix = walker.into_terminal();

        if req.clean_path_prefix {
            // No invalidation: nothing under the prefix needs to be visible as having
            // existed.
            prefix.remove_all_children(false)?;
        }

        for file in &req.files {
            let digest = require_digest(file.digest.as_ref()).map_err(|err| {
                Status::invalid_argument(format!("Invalid digest for file {:?}: {err}", file.path))
            })?;
            let leaf = state.file_factory.lazy_file(
                CasDigest::new(build.namespace.clone(), digest),
                file.is_executable,
            );
            Self::create_entry(&prefix, &file.path, InitialNode::Leaf(leaf))
                .await
                .map_err(|status| wrap_with_path(&file.path, status))?;
        }

        for directory in &req.directories {
            let tree_digest = require_digest(directory.tree_digest.as_ref()).map_err(|err| {
                Status::invalid_argument(format!(
                    "Invalid tree digest for directory {:?}: {err}",
                    directory.path
                ))
            })?;
            let fetcher = Arc::new(TreeFetcher::new(
                self.cas.clone(),
                state.file_factory.clone(),
                CasDigest::new(build.namespace.clone(), tree_digest),
            ));
            Self::create_entry(&prefix, &directory.path, InitialNode::Directory(fetcher))
                .await
                .map_err(|status| wrap_with_path(&directory.path, status))?;
        }

        for symlink in &req.symlinks {
            let leaf = vfs::Leaf::Symlink {
                target: symlink.target.clone(),
            };
            Self::create_entry(&prefix, &symlink.path, InitialNode::Leaf(leaf))
                .await
                .map_err(|status| wrap_with_path(&symlink.path, status))?;
        }

        Ok(Response::new(BatchCreateResponse {}))
    }

    async fn batch_stat(
        &self,
        request: Request<BatchStatRequest>,
    ) -> Result<Response<BatchStatResponse>, Status> {
        let req = request.into_inner();
        let (state, build) = self.resolve_build(&req.build_id)?;

        let mut responses = Vec::with_capacity(req.paths.len());
        for stat_path in &req.paths {
            let mut walker =
                StatWalker::new(state.root.clone(), build.scope.clone(), req.follow_symlinks);
            match path::resolve(stat_path, &mut walker).await {
                Ok(()) => {
                    let status = match walker.finish() {
                        StatOutcome::Found(FoundNode::Directory(_)) => FileStatus {
                            file_type: Some(file_status::FileType::Directory(
                                file_status::Directory {},
                            )),
                        },
                        StatOutcome::Found(FoundNode::Leaf(leaf)) => {
                            let include_digest_for =
                                req.include_file_digest.then_some(&build.namespace);
                            leaf.output_service_status(include_digest_for)
                        }
                        StatOutcome::External { next_path } => FileStatus {
                            file_type: Some(file_status::FileType::External(
                                file_status::External { next_path },
                            )),
                        },
                    };
                    responses.push(StatResponse {
                        file_status: Some(status),
                    });
                }
                Err(ResolveError::NotFound) => responses.push(StatResponse { file_status: None }),
                Err(err) => {
                    let resolved = walker.resolved_path();
                    let status = err.into_status();
                    return Err(Status::new(
                        status.code(),
                        format!(
                            "Failed to stat {stat_path:?} (resolved up to {resolved:?}): {}",
                            status.message()
                        ),
                    ));
                }
            }
        }

        Ok(Response::new(BatchStatResponse { responses }))
    }

    async fn finalize_build(
        &self,
        request: Request<FinalizeBuildRequest>,
    ) -> Result<Response<FinalizeBuildResponse>, Status> {
        let req = request.into_inner();
        if let Some((_base, state, build)) = self.registry.lookup_by_build(&req.build_id) {
            // The root may release build-scoped caches; only then is the build
            // detached from both maps.
            state.root.finalize_build();
            self.registry.unbind_build(&build.id);
        }
        Ok(Response::new(FinalizeBuildResponse {}))
    }
}
