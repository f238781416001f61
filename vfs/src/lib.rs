// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The in-memory node layer of the output service: inode identity, attribute snapshots,
//! entry-invalidation callbacks, leaves backed lazily by the CAS, and the prepopulated
//! directory primitive that holds them.
//!
//! Nodes form a tree: each directory owns its children, and the only strong reference to
//! a per-base root is held by the output-path registry. Symlink targets are strings, not
//! node handles, so the graph is acyclic by construction.

use std::sync::atomic::{AtomicU64, Ordering};

mod cas_file;
pub use cas_file::{CasFile, CasFileFactory, Leaf};

mod prepopulated;
pub use prepopulated::{
    ChildRemover, DirectoryFetcher, FilterContent, FilterTarget, InitialNode, Node,
    PrepopulatedDirectory,
};

mod tree;
pub use tree::TreeFetcher;


#[cfg(test)]
mod tree_tests;

/// A stable identifier for a node, assigned once and never reused within a process
/// lifetime.
pub type Inode = u64;

/// Link count of a directory with no subdirectories (the `.` and `..` entries).
pub const EMPTY_DIRECTORY_LINK_COUNT: u32 = 2;

/// Monotonic generator of inode numbers, shared by every directory in one service.
pub struct InodeAllocator {
    next: AtomicU64,
}

impl InodeAllocator {
    pub fn new() -> InodeAllocator {
        InodeAllocator {
            next: AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> Inode {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    Symlink,
}

/// Attribute snapshot handed to the kernel bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attr {
    pub inode: Inode,
    pub kind: NodeKind,
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
}

/// Callback into the kernel bridge when a directory entry stops being valid.
///
/// Implementations must not call back into the node layer or the output-path registry:
/// notifications are delivered while no internal lock is held, and reentry would
/// deadlock.
pub trait EntryNotifier: Send + Sync + 'static {
    fn invalidate_entry(&self, parent: Inode, name: &str);
}

/// Notifier for configurations without a kernel bridge attached.
pub struct NullEntryNotifier;

impl EntryNotifier for NullEntryNotifier {
    fn invalidate_entry(&self, _parent: Inode, _name: &str) {}
}
