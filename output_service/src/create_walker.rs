// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use async_trait::async_trait;
use tonic::Status;
use vfs::PrepopulatedDirectory;

use crate::path::{ComponentWalker, ResolveError, WalkAction};

/// Directory stack shared by the creating walkers. Interior components are entered if
/// they are directories and created otherwise; an existing leaf in the way is replaced.
/// Walking above the root is refused.
struct CreatingStack {
    root: PrepopulatedDirectory,
    descended: Vec<PrepopulatedDirectory>,
}

impl CreatingStack {
    fn new(root: PrepopulatedDirectory) -> CreatingStack {
        CreatingStack {
            root,
            descended: Vec::new(),
        }
    }

    fn current(&self) -> &PrepopulatedDirectory {
        self.descended.last().unwrap_or(&self.root)
    }

    async fn enter(&mut self, name: &str) -> Result<(), ResolveError> {
        let directory = self.current().create_and_enter_directory(name).await?;
        self.descended.push(directory);
        Ok(())
    }

    fn reset(&mut self) {
        self.descended.clear();
    }

    fn up(&mut self) -> Result<(), ResolveError> {
        if self.descended.pop().is_none() {
            return Err(ResolveError::Status(Status::invalid_argument(
                "Path resolves to a location above the output path root",
            )));
        }
        Ok(())
    }
}

/// Walks a (normally relative) path, force-materializing every component as a
/// directory, and ends *in* the terminal directory: the `pathPrefix` walk of bulk
/// creation.
pub struct PrefixCreatingWalker {
    stack: CreatingStack,
}

impl PrefixCreatingWalker {
    pub fn new(root: PrepopulatedDirectory) -> PrefixCreatingWalker {
        PrefixCreatingWalker {
            stack: CreatingStack::new(root),
        }
    }

    pub fn into_terminal(self) -> PrepopulatedDirectory {
        self.stack.current().clone()
    }
}

#[async_trait]
impl ComponentWalker for PrefixCreatingWalker {
    fn on_scope(&mut self, absolute: bool) -> Result<(), ResolveError> {
        if absolute {
            self.stack.reset();
        }
        Ok(())
    }

    async fn on_directory(&mut self, name: &str) -> Result<WalkAction, ResolveError> {
        self.stack.enter(name).await?;
        Ok(WalkAction::Continue)
    }

    async fn on_terminal(&mut self, name: &str) -> Result<WalkAction, ResolveError> {
        self.stack.enter(name).await?;
        Ok(WalkAction::Continue)
    }

    fn on_up(&mut self) -> Result<(), ResolveError> {
        self.stack.up()
    }
}

/// Walks like [`PrefixCreatingWalker`] but stops *before* the terminal component,
/// capturing its name so the caller can insert a node there. A walk that ends without a
/// terminal name (empty path, or a path ending in `..`) names a directory, not a
/// creatable entry.
pub struct ParentCreatingWalker {
    stack: CreatingStack,
    terminal_name: Option<String>,
}

impl ParentCreatingWalker {
    pub fn new(root: PrepopulatedDirectory) -> ParentCreatingWalker {
        ParentCreatingWalker {
            stack: CreatingStack::new(root),
            terminal_name: None,
        }
    }

    pub fn into_parts(self) -> (PrepopulatedDirectory, Option<String>) {
        let parent = self.stack.current().clone();
        (parent, self.terminal_name)
    }
}

#[async_trait]
impl ComponentWalker for ParentCreatingWalker {
    fn on_scope(&mut self, absolute: bool) -> Result<(), ResolveError> {
        if absolute {
            self.stack.reset();
        }
        self.terminal_name = None;
        Ok(())
    }

    async fn on_directory(&mut self, name: &str) -> Result<WalkAction, ResolveError> {
        self.stack.enter(name).await?;
        Ok(WalkAction::Continue)
    }

    async fn on_terminal(&mut self, name: &str) -> Result<WalkAction, ResolveError> {
        self.terminal_name = Some(name.to_owned());
        Ok(WalkAction::Continue)
    }

    fn on_up(&mut self) -> Result<(), ResolveError> {
        self.terminal_name = None;
        self.stack.up()
    }
}
