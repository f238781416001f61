// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use tonic::Status;

/// NB: Linux limits path lookups to 40 symlink traversals: <https://lwn.net/Articles/650786/>
///
/// We use a slightly higher limit because the walks here are not exactly the same
/// operation: virtual-root rewrites re-enter the tree without a real link traversal.
pub const MAX_LINK_DEPTH: u8 = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathComponent {
    Up,
    Name(String),
}

/// Split a path string into (is-absolute, components). Empty components and `.` are
/// dropped; `..` becomes [`PathComponent::Up`].
pub fn parse_path(path: &str) -> (bool, VecDeque<PathComponent>) {
    let absolute = path.starts_with('/');
    let components = path
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .map(|c| {
            if c == ".." {
                PathComponent::Up
            } else {
                PathComponent::Name(c.to_owned())
            }
        })
        .collect();
    (absolute, components)
}

/// What a walker wants the driver to do after seeing a component.
pub enum WalkAction {
    Continue,
    /// The component was a symlink; resolve `target` in the walker's current scope and
    /// continue with the remaining components afterwards.
    FollowSymlink(String),
}

#[derive(Debug)]
pub enum ResolveError {
    /// A component does not exist (ENOENT).
    NotFound,
    /// A leaf was found where a directory was required (ENOTDIR).
    NotADirectory,
    /// The symlink-follow limit was exhausted (ELOOP).
    TooManyLinks,
    Status(Status),
}

impl ResolveError {
    pub fn into_status(self) -> Status {
        match self {
            ResolveError::NotFound => Status::not_found("Path does not exist"),
            ResolveError::NotADirectory => Status::invalid_argument("Not a directory"),
            ResolveError::TooManyLinks => {
                Status::invalid_argument("Too many levels of symbolic links")
            }
            ResolveError::Status(status) => status,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotFound => write!(f, "Path does not exist"),
            ResolveError::NotADirectory => write!(f, "Not a directory"),
            ResolveError::TooManyLinks => write!(f, "Too many levels of symbolic links"),
            ResolveError::Status(status) => write!(f, "{}", status.message()),
        }
    }
}

impl From<Status> for ResolveError {
    fn from(status: Status) -> Self {
        ResolveError::Status(status)
    }
}

/// The capability set a path walk calls back into. Implementations keep their own state
/// (a directory stack, a captured basename, a virtual root) and may yield a symlink
/// target for the driver to splice in.
#[async_trait]
pub trait ComponentWalker: Send {
    /// A new scope begins: the start of resolution, or a followed symlink target.
    fn on_scope(&mut self, absolute: bool) -> Result<(), ResolveError>;

    /// A non-terminal component that must name a directory to descend into.
    async fn on_directory(&mut self, name: &str) -> Result<WalkAction, ResolveError>;

    /// The final component of the current component list.
    async fn on_terminal(&mut self, name: &str) -> Result<WalkAction, ResolveError>;

    /// A `..` component.
    fn on_up(&mut self) -> Result<(), ResolveError>;
}

/// Drive `walker` across `path`, splicing symlink targets into the pending component
/// list as the walker yields them.
pub async fn resolve(path: &str, walker: &mut dyn ComponentWalker) -> Result<(), ResolveError> {
    let (absolute, mut components) = parse_path(path);
    walker.on_scope(absolute)?;
    let mut followed_links: u8 = 0;
    while let Some(component) = components.pop_front() {
        let action = match component {
            PathComponent::Up => {
                walker.on_up()?;
                continue;
            }
            PathComponent::Name(name) => {
                if components.is_empty() {
                    walker.on_terminal(&name).await?
                } else {
                    walker.on_directory(&name).await?
                }
            }
        };
        if let WalkAction::FollowSymlink(target) = action {
            followed_links += 1;
            if followed_links > MAX_LINK_DEPTH {
                return Err(ResolveError::TooManyLinks);
            }
            let (absolute, mut spliced) = parse_path(&target);
            walker.on_scope(absolute)?;
            spliced.extend(components.drain(..));
            components = spliced;
        }
    }
    Ok(())
}
