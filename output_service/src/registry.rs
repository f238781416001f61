// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cas::CasNamespace;
use parking_lot::Mutex;
use tonic::Status;
use vfs::{CasFileFactory, Inode, PrepopulatedDirectory};

use crate::virtual_root::VirtualRootScope;

/// A validated output base id: a single filename-valid path component naming a client
/// workspace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputBaseId(String);

impl OutputBaseId {
    pub fn parse(s: &str) -> Result<OutputBaseId, Status> {
        if s.is_empty() || s == "." || s == ".." || s.contains('/') || s.contains('\0') {
            return Err(Status::invalid_argument(format!(
                "Output base ID {s:?} is not a valid filename"
            )));
        }
        Ok(OutputBaseId(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputBaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque, client-chosen build identifier.
pub type BuildId = String;

/// State shared by every surface touching one output path. Immutable for the life of
/// the entry: removing the root means deleting the state.
pub struct OutputPathState {
    pub root: PrepopulatedDirectory,
    pub inode: Inode,
    pub file_factory: CasFileFactory,
}

/// State of one active build on an output path.
#[derive(Clone)]
pub struct BuildState {
    pub id: BuildId,
    pub namespace: CasNamespace,
    pub scope: Arc<VirtualRootScope>,
}

struct OutputPathEntry {
    state: Arc<OutputPathState>,
    // Guarded by the registry mutex, like the maps; at most one build per output path.
    build: Option<BuildState>,
}

struct Inner {
    output_base_ids: HashMap<OutputBaseId, OutputPathEntry>,
    // Holds base-id handles rather than state pointers, so the state <-> build relation
    // stays acyclic and one lock covers both directions.
    build_ids: HashMap<BuildId, OutputBaseId>,
}

/// The outcome of announcing a build, reported so the caller can verify re-announces
/// and log evictions outside the lock.
pub enum Announced {
    /// The build id was already known: the bound base and state are returned unchanged.
    Reused {
        base: OutputBaseId,
        state: Arc<OutputPathState>,
        build: BuildState,
    },
    /// A fresh binding was created, possibly evicting an orphaned predecessor.
    Started {
        state: Arc<OutputPathState>,
        evicted: Option<BuildId>,
    },
}

/// The two indexes over live output paths, behind one short-lived mutex. No method
/// blocks on I/O or calls external code while holding the lock; callers snapshot
/// `Arc<OutputPathState>` handles and act on them unlocked.
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            inner: Mutex::new(Inner {
                output_base_ids: HashMap::new(),
                build_ids: HashMap::new(),
            }),
        }
    }

    pub fn lookup_by_base(&self, base: &OutputBaseId) -> Option<Arc<OutputPathState>> {
        let inner = self.inner.lock();
        inner
            .output_base_ids
            .get(base)
            .map(|entry| entry.state.clone())
    }

    pub fn lookup_by_build(
        &self,
        build_id: &str,
    ) -> Option<(OutputBaseId, Arc<OutputPathState>, BuildState)> {
        let inner = self.inner.lock();
        let base = inner.build_ids.get(build_id)?;
        let entry = inner
            .output_base_ids
            .get(base)
            .expect("build_ids only holds bases that are present");
        let build = entry
            .build
            .clone()
            .expect("a registered build id always has a BuildState");
        Some((base.clone(), entry.state.clone(), build))
    }

    /// Bind `build` to `base` atomically. If the build id is already known the existing
    /// binding is reused and `candidate` is dropped; if the base carries a live build
    /// from a crashed or abandoned client, that build is evicted and the new client
    /// wins.
    pub fn announce_build(
        &self,
        base: OutputBaseId,
        candidate: Arc<OutputPathState>,
        build: BuildState,
    ) -> Announced {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(bound_base) = inner.build_ids.get(&build.id).cloned() {
            let entry = inner
                .output_base_ids
                .get(&bound_base)
                .expect("build_ids only holds bases that are present");
            let existing = entry
                .build
                .clone()
                .expect("a registered build id always has a BuildState");
            return Announced::Reused {
                base: bound_base,
                state: entry.state.clone(),
                build: existing,
            };
        }

        let build_id = build.id.clone();
        let entry = inner
            .output_base_ids
            .entry(base.clone())
            .or_insert(OutputPathEntry {
                state: candidate,
                build: None,
            });
        let evicted = entry.build.take().map(|prior| prior.id);
        entry.build = Some(build);
        let state = entry.state.clone();
        if let Some(evicted) = &evicted {
            inner.build_ids.remove(evicted);
        }
        inner.build_ids.insert(build_id, base);
        Announced::Started { state, evicted }
    }

    /// Detach a build from both maps. Unknown build ids are a no-op, for idempotence.
    pub fn unbind_build(&self, build_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(base) = inner.build_ids.remove(build_id) {
            if let Some(entry) = inner.output_base_ids.get_mut(&base) {
                if entry.build.as_ref().map(|b| b.id.as_str()) == Some(build_id) {
                    entry.build = None;
                }
            }
        }
    }

    /// Compare-and-delete for Clean: drop the entry (and its build binding) only if it
    /// still holds `state`. Returns whether the entry was removed.
    pub fn remove_base_if(&self, base: &OutputBaseId, state: &Arc<OutputPathState>) -> bool {
        let mut inner = self.inner.lock();
        match inner.output_base_ids.get(base) {
            Some(entry) if Arc::ptr_eq(&entry.state, state) => {
                let entry = inner
                    .output_base_ids
                    .remove(base)
                    .expect("entry was just present");
                if let Some(build) = entry.build {
                    inner.build_ids.remove(&build.id);
                }
                true
            }
            _ => false,
        }
    }

    /// (name, inode) snapshot of the live output bases, taken under the lock only.
    pub fn snapshot(&self) -> Vec<(OutputBaseId, Inode)> {
        let inner = self.inner.lock();
        let mut bases: Vec<(OutputBaseId, Inode)> = inner
            .output_base_ids
            .iter()
            .map(|(base, entry)| (base.clone(), entry.state.inode))
            .collect();
        bases.sort();
        bases
    }

    pub fn len(&self) -> usize {
        self.inner.lock().output_base_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
