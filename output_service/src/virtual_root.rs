// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::path::PathBuf;

use tonic::Status;

/// The virtual-root rewrite rule for one build: the set of absolute paths that are
/// equivalent to the output path root. A stat walk that follows an absolute symlink
/// target matches its leading components against these prefixes; a full match re-enters
/// the output path, anything else resolves externally.
#[derive(Debug)]
pub struct VirtualRootScope {
    prefixes: Vec<Vec<String>>,
    parent_path: PathBuf,
}

impl VirtualRootScope {
    /// Build the scope from the full output path plus the client's declared aliases.
    /// Every alias must be an absolute path mapping to the output path itself; a build
    /// client has no way to produce targets under any other mapping.
    pub fn new(
        output_path: &str,
        aliases: &HashMap<String, String>,
    ) -> Result<VirtualRootScope, Status> {
        let output_components = normalize_absolute(output_path)?;
        if output_components.is_empty() {
            return Err(Status::invalid_argument(format!(
                "Output path {output_path:?} has no components"
            )));
        }

        let mut parent_path = PathBuf::from("/");
        for component in &output_components[..output_components.len() - 1] {
            parent_path.push(component);
        }

        let mut prefixes = vec![output_components.clone()];
        for (alias, target) in aliases {
            let alias_components = normalize_absolute(alias).map_err(|_| {
                Status::invalid_argument(format!("Alias {alias:?} is not an absolute path"))
            })?;
            let target_components = normalize_absolute(target).map_err(|_| {
                Status::invalid_argument(format!(
                    "Alias target {target:?} is not an absolute path"
                ))
            })?;
            if target_components != output_components {
                return Err(Status::invalid_argument(format!(
                    "Alias {alias:?} maps to {target:?}, which is not the output path"
                )));
            }
            prefixes.push(alias_components);
        }

        Ok(VirtualRootScope {
            prefixes,
            parent_path,
        })
    }

    /// Component sequences equivalent to the output path root.
    pub fn prefixes(&self) -> &[Vec<String>] {
        &self.prefixes
    }

    /// Absolute path of the output path's parent directory, used when a walk escapes
    /// the root via `..`.
    pub fn parent_path(&self) -> &PathBuf {
        &self.parent_path
    }
}

/// Lexically normalize an absolute path into its components, resolving `.` and `..`.
fn normalize_absolute(path: &str) -> Result<Vec<String>, Status> {
    if !path.starts_with('/') {
        return Err(Status::invalid_argument(format!(
            "Path {path:?} is not an absolute path"
        )));
    }
    let mut components: Vec<String> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if components.pop().is_none() {
                    return Err(Status::invalid_argument(format!(
                        "Path {path:?} escapes the filesystem root"
                    )));
                }
            }
            name => components.push(name.to_owned()),
        }
    }
    Ok(components)
}

#[cfg(test)]
mod tests {
    use maplit::hashmap;

    use super::VirtualRootScope;

    #[test]
    fn output_path_and_aliases_become_prefixes() {
        let scope = VirtualRootScope::new(
            "/out/wsA",
            &hashmap! {
                "/home/user/workspace/bazel-out".to_owned() => "/out/wsA".to_owned(),
            },
        )
        .unwrap();
        let mut prefixes = scope.prefixes().to_vec();
        prefixes.sort();
        assert_eq!(
            prefixes,
            vec![
                vec!["home".to_owned(), "user".to_owned(), "workspace".to_owned(), "bazel-out".to_owned()],
                vec!["out".to_owned(), "wsA".to_owned()],
            ]
        );
        assert_eq!(scope.parent_path().to_str(), Some("/out"));
    }

    #[test]
    fn output_path_is_normalized() {
        let scope = VirtualRootScope::new("/out//./wsA/../wsB", &hashmap! {}).unwrap();
        assert_eq!(scope.prefixes(), &[vec!["out".to_owned(), "wsB".to_owned()]]);
    }

    #[test]
    fn relative_alias_is_rejected() {
        let err = VirtualRootScope::new(
            "/out/wsA",
            &hashmap! { "relative/alias".to_owned() => "/out/wsA".to_owned() },
        )
        .expect_err("Want err for a relative alias");
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn alias_to_another_path_is_rejected() {
        let err = VirtualRootScope::new(
            "/out/wsA",
            &hashmap! { "/elsewhere".to_owned() => "/out/other".to_owned() },
        )
        .expect_err("Want err for an alias that leaves the output path");
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}
