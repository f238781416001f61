// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use prost::Message;
use protos::pb::build::bazel::remote::execution::v2 as remexec;

#[derive(Clone)]
pub struct TestData {
    string: String,
}

impl TestData {
    pub fn empty() -> TestData {
        TestData::new("")
    }

    pub fn owl() -> TestData {
        TestData::new("Tawny Owl")
    }

    pub fn heron() -> TestData {
        TestData::new("Grey Heron")
    }

    pub fn wren() -> TestData {
        TestData::new("Eurasian Wren")
    }

    pub fn new(s: &str) -> TestData {
        TestData {
            string: s.to_owned(),
        }
    }

    pub fn bytes(&self) -> bytes::Bytes {
        bytes::Bytes::copy_from_slice(self.string.as_str().as_bytes())
    }

    pub fn fingerprint(&self) -> hashing::Fingerprint {
        self.digest().hash
    }

    pub fn digest(&self) -> hashing::Digest {
        hashing::Digest::of_bytes(&self.bytes())
    }

    pub fn string(&self) -> String {
        self.string.clone()
    }

    pub fn len(&self) -> usize {
        self.string.len()
    }
}

#[derive(Clone)]
pub struct TestTree {
    pub tree: remexec::Tree,
}

impl TestTree {
    // Tree structure:
    //
    // owl.ext
    pub fn containing_owl() -> TestTree {
        TestTree::with_root(remexec::Directory {
            files: vec![file_node("owl.ext", &TestData::owl(), false)],
            ..remexec::Directory::default()
        })
    }

    // Tree structure:
    //
    // feed.ext  (executable)
    // food.ext
    pub fn with_maybe_executable_files() -> TestTree {
        TestTree::with_root(remexec::Directory {
            files: vec![
                file_node("feed.ext", &TestData::heron(), true),
                file_node("food.ext", &TestData::wren(), false),
            ],
            ..remexec::Directory::default()
        })
    }

    // Tree structure:
    //
    // birds/owl.ext
    // wren.ext
    pub fn recursive() -> TestTree {
        let birds = remexec::Directory {
            files: vec![file_node("owl.ext", &TestData::owl(), false)],
            ..remexec::Directory::default()
        };
        TestTree {
            tree: remexec::Tree {
                root: Some(remexec::Directory {
                    files: vec![file_node("wren.ext", &TestData::wren(), false)],
                    directories: vec![remexec::DirectoryNode {
                        name: "birds".to_owned(),
                        digest: Some(directory_digest(&birds).into()),
                    }],
                    ..remexec::Directory::default()
                }),
                children: vec![birds],
            },
        }
    }

    pub fn with_root(root: remexec::Directory) -> TestTree {
        TestTree {
            tree: remexec::Tree {
                root: Some(root),
                children: vec![],
            },
        }
    }

    pub fn bytes(&self) -> bytes::Bytes {
        bytes::Bytes::from(self.tree.encode_to_vec())
    }

    pub fn fingerprint(&self) -> hashing::Fingerprint {
        self.digest().hash
    }

    pub fn digest(&self) -> hashing::Digest {
        hashing::Digest::of_bytes(&self.bytes())
    }
}

pub fn file_node(name: &str, data: &TestData, is_executable: bool) -> remexec::FileNode {
    remexec::FileNode {
        name: name.to_owned(),
        digest: Some(data.digest().into()),
        is_executable,
    }
}

/// Digest of a directory message's canonical encoding, as referenced by
/// `DirectoryNode.digest`.
pub fn directory_digest(directory: &remexec::Directory) -> hashing::Digest {
    hashing::Digest::of_bytes(&directory.encode_to_vec())
}
