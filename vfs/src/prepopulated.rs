// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cas::{CasDigest, CasNamespace};
use parking_lot::Mutex;
use tonic::Status;

use crate::{
    Attr, EMPTY_DIRECTORY_LINK_COUNT, EntryNotifier, Inode, InodeAllocator, Leaf, NodeKind,
};

/// Produces the children of a lazily materialized directory.
///
/// Fetchers are shared between the RPC and filesystem surfaces and must be thread-safe.
/// They outlive any single RPC, so implementations must not capture request-scoped
/// cancellation.
#[async_trait]
pub trait DirectoryFetcher: Send + Sync + 'static {
    /// The CAS namespace the fetched contents live in.
    fn namespace(&self) -> &CasNamespace;

    /// Every CAS digest this subtree transitively depends on: the manifest itself plus
    /// all file content beneath it. May fetch; a `NotFound` error means the manifest is
    /// no longer available and the subtree cannot be materialized at all.
    async fn containing_digests(&self) -> Result<Vec<CasDigest>, Status>;

    /// Fetch the directory's children.
    async fn fetch(&self) -> Result<Vec<(String, InitialNode)>, Status>;
}

/// A child attached to a directory before it is materialized.
pub enum InitialNode {
    Leaf(Leaf),
    Directory(Arc<dyn DirectoryFetcher>),
}

impl std::fmt::Debug for InitialNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitialNode::Leaf(_) => f.debug_tuple("Leaf").field(&"..").finish(),
            InitialNode::Directory(_) => f.debug_tuple("Directory").field(&"..").finish(),
        }
    }
}

/// A materialized child.
#[derive(Clone)]
pub enum Node {
    Directory(PrepopulatedDirectory),
    Leaf(Leaf),
}

enum Contents {
    /// Children not yet produced; the fetcher runs on first access.
    Lazy(Arc<dyn DirectoryFetcher>),
    Materialized(BTreeMap<String, Node>),
}

struct DirState {
    inode: Inode,
    allocator: Arc<InodeAllocator>,
    notifier: Arc<dyn EntryNotifier>,
    contents: Mutex<Contents>,
}

/// An in-memory directory whose children may be inserted eagerly (bulk creation) or
/// materialized on first access from a fetcher (tree expansion).
///
/// All operations are safe for concurrent invocation. The contents mutex is never held
/// across a fetch or a notification: materialization fetches unlocked and installs
/// first-wins, and invalidation callbacks run after the lock is released.
#[derive(Clone)]
pub struct PrepopulatedDirectory {
    inner: Arc<DirState>,
}

impl PrepopulatedDirectory {
    pub fn new_empty(
        allocator: Arc<InodeAllocator>,
        notifier: Arc<dyn EntryNotifier>,
    ) -> PrepopulatedDirectory {
        Self::with_contents(allocator, notifier, Contents::Materialized(BTreeMap::new()))
    }

    pub fn new_lazy(
        allocator: Arc<InodeAllocator>,
        notifier: Arc<dyn EntryNotifier>,
        fetcher: Arc<dyn DirectoryFetcher>,
    ) -> PrepopulatedDirectory {
        Self::with_contents(allocator, notifier, Contents::Lazy(fetcher))
    }

    fn with_contents(
        allocator: Arc<InodeAllocator>,
        notifier: Arc<dyn EntryNotifier>,
        contents: Contents,
    ) -> PrepopulatedDirectory {
        let inode = allocator.allocate();
        PrepopulatedDirectory {
            inner: Arc::new(DirState {
                inode,
                allocator,
                notifier,
                contents: Mutex::new(contents),
            }),
        }
    }

    pub fn inode(&self) -> Inode {
        self.inner.inode
    }

    /// Attribute snapshot. The link count only reflects subdirectories that have been
    /// materialized; a lazy directory reports the empty-directory count.
    pub fn attr(&self) -> Attr {
        let nlink = match &*self.inner.contents.lock() {
            Contents::Lazy(_) => EMPTY_DIRECTORY_LINK_COUNT,
            Contents::Materialized(children) => {
                EMPTY_DIRECTORY_LINK_COUNT
                    + children
                        .values()
                        .filter(|node| matches!(node, Node::Directory(_)))
                        .count() as u32
            }
        };
        Attr {
            inode: self.inner.inode,
            kind: NodeKind::Directory,
            perm: 0o755,
            nlink,
            size: 0,
        }
    }

    /// True when two handles refer to the same directory.
    pub fn ptr_eq(&self, other: &PrepopulatedDirectory) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn instantiate(&self, initial: InitialNode) -> Node {
        match initial {
            InitialNode::Leaf(leaf) => Node::Leaf(leaf),
            InitialNode::Directory(fetcher) => Node::Directory(PrepopulatedDirectory::new_lazy(
                self.inner.allocator.clone(),
                self.inner.notifier.clone(),
                fetcher,
            )),
        }
    }

    /// Run the fetcher if this directory is still lazy. The fetch happens without the
    /// contents lock; if another caller materialized concurrently, the first install
    /// wins and this fetch result is discarded.
    async fn ensure_materialized(&self) -> Result<(), Status> {
        let fetcher = match &*self.inner.contents.lock() {
            Contents::Materialized(_) => return Ok(()),
            Contents::Lazy(fetcher) => fetcher.clone(),
        };

        let fetched = fetcher.fetch().await?;
        let mut children = BTreeMap::new();
        for (name, initial) in fetched {
            children.insert(name, self.instantiate(initial));
        }

        let mut contents = self.inner.contents.lock();
        if let Contents::Lazy(_) = &*contents {
            *contents = Contents::Materialized(children);
        }
        Ok(())
    }

    pub async fn lookup_child(&self, name: &str) -> Result<Option<Node>, Status> {
        self.ensure_materialized().await?;
        match &*self.inner.contents.lock() {
            Contents::Materialized(children) => Ok(children.get(name).cloned()),
            Contents::Lazy(_) => unreachable!("directory was just materialized"),
        }
    }

    /// Snapshot of all children in name order.
    pub async fn read_dir(&self) -> Result<Vec<(String, Node)>, Status> {
        self.ensure_materialized().await?;
        match &*self.inner.contents.lock() {
            Contents::Materialized(children) => Ok(children
                .iter()
                .map(|(name, node)| (name.clone(), node.clone()))
                .collect()),
            Contents::Lazy(_) => unreachable!("directory was just materialized"),
        }
    }

    /// Insert the given children. With `overwrite`, existing leaves are replaced;
    /// existing directories are never replaced and fail with `InvalidArgument`.
    pub async fn create_children(
        &self,
        children: Vec<(String, InitialNode)>,
        overwrite: bool,
    ) -> Result<(), Status> {
        self.ensure_materialized().await?;
        let mut contents = self.inner.contents.lock();
        let map = match &mut *contents {
            Contents::Materialized(map) => map,
            Contents::Lazy(_) => unreachable!("directory was just materialized"),
        };
        for (name, _) in &children {
            match map.get(name) {
                Some(Node::Directory(_)) => {
                    return Err(Status::invalid_argument(format!(
                        "Path {name:?} resolves to a directory"
                    )));
                }
                Some(Node::Leaf(_)) if !overwrite => {
                    return Err(Status::already_exists(format!(
                        "Path {name:?} already exists"
                    )));
                }
                _ => {}
            }
        }
        for (name, initial) in children {
            let node = self.instantiate(initial);
            map.insert(name, node);
        }
        Ok(())
    }

    /// Return the named subdirectory, creating it if absent. An existing leaf in the
    /// way is replaced (and its entry invalidated): bulk creation force-materializes
    /// interior directories.
    pub async fn create_and_enter_directory(
        &self,
        name: &str,
    ) -> Result<PrepopulatedDirectory, Status> {
        self.ensure_materialized().await?;
        let (directory, replaced) = {
            let mut contents = self.inner.contents.lock();
            let map = match &mut *contents {
                Contents::Materialized(map) => map,
                Contents::Lazy(_) => unreachable!("directory was just materialized"),
            };
            if let Some(Node::Directory(d)) = map.get(name) {
                return Ok(d.clone());
            }
            let replaced = map.contains_key(name);
            let d = PrepopulatedDirectory::new_empty(
                self.inner.allocator.clone(),
                self.inner.notifier.clone(),
            );
            map.insert(name.to_owned(), Node::Directory(d.clone()));
            (d, replaced)
        };
        if replaced {
            self.inner.notifier.invalidate_entry(self.inner.inode, name);
        }
        Ok(directory)
    }

    /// Remove every child. A lazy directory simply drops its fetcher and becomes empty.
    /// With `notify`, an invalidation is emitted per removed entry after the lock is
    /// released.
    pub fn remove_all_children(&self, notify: bool) -> Result<(), Status> {
        let removed = {
            let mut contents = self.inner.contents.lock();
            match std::mem::replace(&mut *contents, Contents::Materialized(BTreeMap::new())) {
                Contents::Lazy(_) => BTreeMap::new(),
                Contents::Materialized(children) => children,
            }
        };
        if notify {
            for name in removed.keys() {
                self.inner.notifier.invalidate_entry(self.inner.inode, name);
            }
        }
        Ok(())
    }

    /// Snapshot every removable descendant for reconciliation: leaves, and lazy
    /// directories summarized by their fetcher. Materialized subdirectories are
    /// traversed into rather than reported. The returned handles own their parent
    /// directory, so removal callbacks stay valid after this call returns and no lock
    /// is held while the caller consults the CAS.
    pub fn filter_children(&self) -> Vec<FilterTarget> {
        let mut targets = Vec::new();
        self.collect_filter_targets(&mut targets);
        targets
    }

    fn collect_filter_targets(&self, targets: &mut Vec<FilterTarget>) {
        let children: Vec<(String, Node)> = match &*self.inner.contents.lock() {
            // A lazy directory is reported by its parent; a lazy root has nothing to
            // enumerate without materializing, which reconciliation must not force.
            Contents::Lazy(_) => return,
            Contents::Materialized(children) => children
                .iter()
                .map(|(name, node)| (name.clone(), node.clone()))
                .collect(),
        };
        for (name, node) in children {
            match node {
                Node::Leaf(leaf) => targets.push(FilterTarget {
                    remover: ChildRemover {
                        parent: self.clone(),
                        name,
                    },
                    content: FilterContent::Leaf(leaf),
                }),
                Node::Directory(directory) => {
                    let lazy = match &*directory.inner.contents.lock() {
                        Contents::Lazy(fetcher) => Some(fetcher.clone()),
                        Contents::Materialized(_) => None,
                    };
                    match lazy {
                        Some(fetcher) => targets.push(FilterTarget {
                            remover: ChildRemover {
                                parent: self.clone(),
                                name,
                            },
                            content: FilterContent::LazyDirectory(fetcher),
                        }),
                        None => directory.collect_filter_targets(targets),
                    }
                }
            }
        }
    }

    /// Hook invoked when a build completes. The in-memory layer keeps no build-scoped
    /// caches, so this only recurses so that subtree implementations may release theirs.
    pub fn finalize_build(&self) {
        let subdirectories: Vec<PrepopulatedDirectory> = match &*self.inner.contents.lock() {
            Contents::Lazy(_) => return,
            Contents::Materialized(children) => children
                .values()
                .filter_map(|node| match node {
                    Node::Directory(d) => Some(d.clone()),
                    Node::Leaf(_) => None,
                })
                .collect(),
        };
        for directory in subdirectories {
            directory.finalize_build();
        }
    }
}

/// An owned handle that unlinks one child from its parent directory.
#[derive(Clone)]
pub struct ChildRemover {
    parent: PrepopulatedDirectory,
    name: String,
}

impl ChildRemover {
    /// Remove the child. Returns false when it was already gone (removal callbacks may
    /// fire more than once for one child). With `notify`, emits an invalidation for the
    /// entry after the lock is released.
    pub fn remove(&self, notify: bool) -> bool {
        let removed = {
            let mut contents = self.parent.inner.contents.lock();
            match &mut *contents {
                Contents::Lazy(_) => false,
                Contents::Materialized(children) => children.remove(&self.name).is_some(),
            }
        };
        if removed && notify {
            self.parent
                .inner
                .notifier
                .invalidate_entry(self.parent.inner.inode, &self.name);
        }
        removed
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One reconciliation target produced by [`PrepopulatedDirectory::filter_children`].
pub struct FilterTarget {
    pub remover: ChildRemover,
    pub content: FilterContent,
}

pub enum FilterContent {
    Leaf(Leaf),
    LazyDirectory(Arc<dyn DirectoryFetcher>),
}

impl FilterContent {
    /// The namespace the target's digests live in, if it references any.
    pub fn namespace(&self) -> Option<&CasNamespace> {
        match self {
            FilterContent::Leaf(leaf) => leaf.referenced_digest().map(|d| &d.namespace),
            FilterContent::LazyDirectory(fetcher) => Some(fetcher.namespace()),
        }
    }
}
