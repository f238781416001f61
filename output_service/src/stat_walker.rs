// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use vfs::{Leaf, Node, PrepopulatedDirectory};

use crate::path::{ComponentWalker, ResolveError, WalkAction};
use crate::virtual_root::VirtualRootScope;

/// What a completed stat walk found.
pub enum StatOutcome {
    /// The path resolved within the output path.
    Found(FoundNode),
    /// The path resolved to a location outside the output path that the virtual root
    /// could not re-anchor; the client continues at `next_path` locally.
    External { next_path: String },
}

pub enum FoundNode {
    Directory(PrepopulatedDirectory),
    Leaf(Leaf),
}

enum Position {
    /// Within the output path. The stack never empties: popping the root escapes to
    /// `Outside` instead.
    Inside {
        stack: Vec<PrepopulatedDirectory>,
        found: Found,
    },
    /// An absolute target's leading components are being matched against the virtual
    /// root prefixes. `consumed` is always a strict prefix of at least one candidate.
    Matching { consumed: Vec<String> },
    /// The walk left the output path: remaining components are collected literally and
    /// returned to the client unresolved.
    Outside { path: PathBuf },
}

enum Found {
    Directory,
    Leaf(Leaf),
}

/// The walker behind BatchStat: follows symlinks (always mid-path, optionally at the
/// terminal), rewrites absolute targets through the build's virtual root, and captures
/// the residual path when resolution leaves the output path.
pub struct StatWalker {
    root: PrepopulatedDirectory,
    scope: Arc<VirtualRootScope>,
    follow_terminal_symlinks: bool,
    position: Position,
    // Names of the directories descended into, for error context.
    trail: Vec<String>,
}

impl StatWalker {
    pub fn new(
        root: PrepopulatedDirectory,
        scope: Arc<VirtualRootScope>,
        follow_terminal_symlinks: bool,
    ) -> StatWalker {
        let position = Position::Inside {
            stack: vec![root.clone()],
            found: Found::Directory,
        };
        StatWalker {
            root,
            scope,
            follow_terminal_symlinks,
            position,
            trail: Vec::new(),
        }
    }

    /// The prefix resolved so far, relative to the output path root.
    pub fn resolved_path(&self) -> String {
        if self.trail.is_empty() {
            ".".to_owned()
        } else {
            self.trail.join("/")
        }
    }

    pub fn finish(self) -> StatOutcome {
        match self.position {
            Position::Inside { stack, found } => match found {
                Found::Directory => {
                    let directory = stack.last().cloned().unwrap_or_else(|| self.root.clone());
                    StatOutcome::Found(FoundNode::Directory(directory))
                }
                Found::Leaf(leaf) => StatOutcome::Found(FoundNode::Leaf(leaf)),
            },
            // The walk ended on a proper ancestor of the output path, which is outside
            // the subtree this service exposes.
            Position::Matching { consumed } => StatOutcome::External {
                next_path: absolute_path(consumed),
            },
            Position::Outside { path } => StatOutcome::External {
                next_path: path.to_string_lossy().into_owned(),
            },
        }
    }

    /// Advance prefix matching by one component, transitioning inside on a full match
    /// and outside on a mismatch.
    fn advance_matching(&mut self, name: &str) {
        let consumed = match &mut self.position {
            Position::Matching { consumed } => consumed,
            _ => unreachable!("advance_matching is only called while matching"),
        };
        consumed.push(name.to_owned());
        let fully_matched = self
            .scope
            .prefixes()
            .iter()
            .any(|p| p.as_slice() == consumed.as_slice());
        let still_prefix = self
            .scope
            .prefixes()
            .iter()
            .any(|p| p.len() > consumed.len() && p.starts_with(consumed.as_slice()));
        if fully_matched {
            self.trail.clear();
            self.position = Position::Inside {
                stack: vec![self.root.clone()],
                found: Found::Directory,
            };
        } else if !still_prefix {
            let components = std::mem::take(consumed);
            self.position = Position::Outside {
                path: PathBuf::from(absolute_path(components)),
            };
        }
    }
}

fn absolute_path(components: Vec<String>) -> String {
    let mut path = PathBuf::from("/");
    for component in components {
        path.push(component);
    }
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl ComponentWalker for StatWalker {
    fn on_scope(&mut self, absolute: bool) -> Result<(), ResolveError> {
        if absolute {
            self.trail.clear();
            self.position = Position::Matching {
                consumed: Vec::new(),
            };
        }
        Ok(())
    }

    async fn on_directory(&mut self, name: &str) -> Result<WalkAction, ResolveError> {
        let descended = match &mut self.position {
            Position::Inside { stack, .. } => {
                let current = stack.last().expect("the inside stack is never empty");
                match current.lookup_child(name).await? {
                    None => return Err(ResolveError::NotFound),
                    Some(Node::Directory(directory)) => {
                        stack.push(directory);
                        true
                    }
                    Some(Node::Leaf(Leaf::Symlink { target })) => {
                        return Ok(WalkAction::FollowSymlink(target));
                    }
                    Some(Node::Leaf(Leaf::File(_))) => return Err(ResolveError::NotADirectory),
                }
            }
            Position::Matching { .. } => {
                self.advance_matching(name);
                false
            }
            Position::Outside { path } => {
                path.push(name);
                false
            }
        };
        if descended {
            self.trail.push(name.to_owned());
        }
        Ok(WalkAction::Continue)
    }

    async fn on_terminal(&mut self, name: &str) -> Result<WalkAction, ResolveError> {
        let follow = self.follow_terminal_symlinks;
        let descended = match &mut self.position {
            Position::Inside { stack, found } => {
                let current = stack.last().expect("the inside stack is never empty");
                match current.lookup_child(name).await? {
                    None => return Err(ResolveError::NotFound),
                    Some(Node::Directory(directory)) => {
                        stack.push(directory);
                        *found = Found::Directory;
                        true
                    }
                    Some(Node::Leaf(Leaf::Symlink { target })) if follow => {
                        return Ok(WalkAction::FollowSymlink(target));
                    }
                    Some(Node::Leaf(leaf)) => {
                        *found = Found::Leaf(leaf);
                        false
                    }
                }
            }
            Position::Matching { .. } => {
                self.advance_matching(name);
                false
            }
            Position::Outside { path } => {
                path.push(name);
                false
            }
        };
        if descended {
            self.trail.push(name.to_owned());
        }
        Ok(WalkAction::Continue)
    }

    fn on_up(&mut self) -> Result<(), ResolveError> {
        let escaped = match &mut self.position {
            Position::Inside { stack, found } => {
                *found = Found::Directory;
                if stack.len() > 1 {
                    stack.pop();
                    false
                } else {
                    true
                }
            }
            Position::Matching { consumed } => {
                consumed.pop();
                return Ok(());
            }
            Position::Outside { path } => {
                path.pop();
                return Ok(());
            }
        };
        if escaped {
            // Popping the root leaves the output path; subsequent components are
            // captured for the External response.
            self.trail.clear();
            self.position = Position::Outside {
                path: self.scope.parent_path().clone(),
            };
        } else {
            self.trail.pop();
        }
        Ok(())
    }
}
