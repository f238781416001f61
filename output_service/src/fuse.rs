// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

// The filesystem surface of the service node: a read-only directory whose children are
// the live output bases. The kernel bridge turns these calls into replies; errors are
// reported as errnos, the way it expects them.

use libc::{EACCES, ENOENT, R_OK, X_OK, c_int};
use vfs::{Attr, EMPTY_DIRECTORY_LINK_COUNT, Inode, NodeKind, PrepopulatedDirectory};

use crate::registry::OutputBaseId;
use crate::service::OutputService;

impl OutputService {
    /// Only reading and traversal are permitted; the RPC surface is the only writer.
    pub fn access(&self, mask: u32) -> Result<(), c_int> {
        if mask & !((R_OK | X_OK) as u32) != 0 {
            return Err(EACCES);
        }
        Ok(())
    }

    pub fn getattr(&self) -> Attr {
        Attr {
            inode: self.inode,
            kind: NodeKind::Directory,
            perm: 0o555,
            // One link per live output base, read under the registry lock.
            nlink: EMPTY_DIRECTORY_LINK_COUNT + self.registry.len() as u32,
            size: 0,
        }
    }

    /// Route a lookup into the named output path. The child's attributes are captured
    /// outside the registry lock.
    pub fn lookup(&self, name: &str) -> Result<(PrepopulatedDirectory, Attr), c_int> {
        let base = OutputBaseId::parse(name).map_err(|_| ENOENT)?;
        let state = self.registry.lookup_by_base(&base).ok_or(ENOENT)?;
        let attr = state.root.attr();
        Ok((state.root.clone(), attr))
    }

    /// One entry per live output base, with its per-base root inode.
    pub fn readdir(&self) -> Vec<(String, Inode)> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|(base, inode)| (base.as_str().to_owned(), inode))
            .collect()
    }
}
