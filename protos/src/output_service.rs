// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

// `build.bazel.remote.output_service.v1`: the protocol a build client uses to drive a
// remote output directory. See the service trait at the bottom for the RPC surface.

use std::collections::HashMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CleanRequest {
    /// A filename-valid path component naming the client workspace to wipe.
    #[prost(string, tag = "1")]
    pub output_base_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CleanResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartBuildRequest {
    #[prost(string, tag = "1")]
    pub output_base_id: String,
    /// Client-chosen identifier for this build, unique across concurrent builds.
    #[prost(string, tag = "2")]
    pub build_id: String,
    #[prost(string, tag = "3")]
    pub instance_name: String,
    #[prost(enumeration = "super::super::execution::v2::digest_function::Value", tag = "4")]
    pub digest_function: i32,
    /// Absolute path under which the client has mounted the output service.
    #[prost(string, tag = "5")]
    pub output_path_prefix: String,
    /// Alternate absolute paths at which the output path is also reachable (e.g.
    /// convenience symlinks), each mapping to the output path itself.
    #[prost(map = "string, string", tag = "6")]
    pub output_path_aliases: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartBuildResponse {
    /// Path of the output path relative to `output_path_prefix`.
    #[prost(string, tag = "1")]
    pub output_path_suffix: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutputFile {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(message, optional, tag = "2")]
    pub digest: Option<super::super::execution::v2::Digest>,
    #[prost(bool, tag = "3")]
    pub is_executable: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutputSymlink {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(string, tag = "2")]
    pub target: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutputDirectory {
    #[prost(string, tag = "1")]
    pub path: String,
    /// Digest of a `Tree` manifest describing the directory's full contents.
    #[prost(message, optional, tag = "2")]
    pub tree_digest: Option<super::super::execution::v2::Digest>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BatchCreateRequest {
    #[prost(string, tag = "1")]
    pub build_id: String,
    /// Directory under the output path into which all entries are created. Interior
    /// components are created on demand.
    #[prost(string, tag = "2")]
    pub path_prefix: String,
    /// Remove any existing children of `path_prefix` before creating.
    #[prost(bool, tag = "3")]
    pub clean_path_prefix: bool,
    #[prost(message, repeated, tag = "4")]
    pub files: Vec<OutputFile>,
    #[prost(message, repeated, tag = "5")]
    pub symlinks: Vec<OutputSymlink>,
    #[prost(message, repeated, tag = "6")]
    pub directories: Vec<OutputDirectory>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BatchCreateResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BatchStatRequest {
    #[prost(string, tag = "1")]
    pub build_id: String,
    /// Whether a symlink in the terminal position is resolved. Symlinks in non-terminal
    /// positions are always resolved.
    #[prost(bool, tag = "2")]
    pub follow_symlinks: bool,
    /// Whether file statuses should carry the file's content digest.
    #[prost(bool, tag = "3")]
    pub include_file_digest: bool,
    #[prost(string, repeated, tag = "4")]
    pub paths: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BatchStatResponse {
    /// One response per requested path, in request order.
    #[prost(message, repeated, tag = "1")]
    pub responses: Vec<StatResponse>,
}

/// Status of a single path. An unset `file_status` means the path does not exist.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatResponse {
    #[prost(message, optional, tag = "1")]
    pub file_status: Option<FileStatus>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileStatus {
    #[prost(oneof = "file_status::FileType", tags = "1, 2, 3, 4")]
    pub file_type: Option<file_status::FileType>,
}

pub mod file_status {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct File {
        #[prost(message, optional, tag = "1")]
        pub digest: Option<super::super::super::execution::v2::Digest>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Symlink {
        #[prost(string, tag = "1")]
        pub target: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Directory {}

    /// The path resolved to a location outside the output path; the client should
    /// continue resolution of `next_path` locally.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct External {
        #[prost(string, tag = "1")]
        pub next_path: String,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum FileType {
        #[prost(message, tag = "1")]
        File(File),
        #[prost(message, tag = "2")]
        Symlink(Symlink),
        #[prost(message, tag = "3")]
        Directory(Directory),
        #[prost(message, tag = "4")]
        External(External),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FinalizeBuildRequest {
    #[prost(string, tag = "1")]
    pub build_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FinalizeBuildResponse {}

pub mod remote_output_service_server {
    /// Handler trait for the `RemoteOutputService` service, in the shape tonic generates.
    /// The transport wrapper is wired up by process startup, outside this workspace.
    #[tonic::async_trait]
    pub trait RemoteOutputService: Send + Sync + 'static {
        /// Removes all state associated with an output base.
        async fn clean(
            &self,
            request: tonic::Request<super::CleanRequest>,
        ) -> Result<tonic::Response<super::CleanResponse>, tonic::Status>;

        /// Announces a build, reconciling previously created entries against the CAS.
        async fn start_build(
            &self,
            request: tonic::Request<super::StartBuildRequest>,
        ) -> Result<tonic::Response<super::StartBuildResponse>, tonic::Status>;

        /// Bulk-creates files, directories and symlinks under a path prefix.
        async fn batch_create(
            &self,
            request: tonic::Request<super::BatchCreateRequest>,
        ) -> Result<tonic::Response<super::BatchCreateResponse>, tonic::Status>;

        /// Stats a batch of paths, optionally following terminal symlinks.
        async fn batch_stat(
            &self,
            request: tonic::Request<super::BatchStatRequest>,
        ) -> Result<tonic::Response<super::BatchStatResponse>, tonic::Status>;

        /// Marks a build as done. Unknown build ids succeed for idempotence.
        async fn finalize_build(
            &self,
            request: tonic::Request<super::FinalizeBuildRequest>,
        ) -> Result<tonic::Response<super::FinalizeBuildResponse>, tonic::Status>;
    }
}
