// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

// Subset of `build.bazel.remote.execution.v2` used by the output service: content
// digests and the directory/tree manifest messages.

/// A content digest: the lowercase hex hash of a blob plus its size in bytes.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Digest {
    #[prost(string, tag = "1")]
    pub hash: String,
    #[prost(int64, tag = "2")]
    pub size_bytes: i64,
}

pub fn empty_digest() -> Digest {
    Digest {
        hash: String::from("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"),
        size_bytes: 0,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileNode {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub digest: Option<Digest>,
    #[prost(bool, tag = "4")]
    pub is_executable: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DirectoryNode {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub digest: Option<Digest>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SymlinkNode {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub target: String,
}

/// A directory manifest: the named children of one directory level.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Directory {
    #[prost(message, repeated, tag = "1")]
    pub files: Vec<FileNode>,
    #[prost(message, repeated, tag = "2")]
    pub directories: Vec<DirectoryNode>,
    #[prost(message, repeated, tag = "3")]
    pub symlinks: Vec<SymlinkNode>,
}

/// A directory manifest together with all transitively referenced subdirectory
/// manifests, so a single fetch resolves an entire subtree.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Tree {
    #[prost(message, optional, tag = "1")]
    pub root: Option<Directory>,
    #[prost(message, repeated, tag = "2")]
    pub children: Vec<Directory>,
}

pub mod digest_function {
    /// The hash function a digest was produced with. Values follow the Remote Execution
    /// API; only functions with 32-byte output are usable with `hashing::Fingerprint`.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Value {
        Unknown = 0,
        Sha256 = 1,
        Sha1 = 2,
        Md5 = 3,
        Vso = 4,
        Sha384 = 5,
        Sha512 = 6,
        Murmur3 = 7,
        Sha256tree = 8,
        Blake3 = 9,
    }
}
