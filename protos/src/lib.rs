// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Hand-maintained mirrors of the protobuf messages this workspace speaks: the
//! `RemoteOutputService` protocol and the subset of the Bazel Remote Execution API it
//! references. Field tags and enum values follow the upstream `.proto` files, so these
//! messages are wire-compatible with generated code without requiring a protoc toolchain
//! at build time.

mod conversions;
pub use conversions::require_digest;

#[cfg(test)]
mod conversions_tests;

pub mod pb {
    // NOTE: The nested module structure matters: cross-package references inside the
    // messages (e.g. `super::super::execution::v2::Digest`) traverse out of a module the
    // same way prost-generated code would.
    pub mod build {
        pub mod bazel {
            pub mod remote {
                pub mod execution {
                    pub mod v2 {
                        include!("remote_execution.rs");
                    }
                }
                pub mod output_service {
                    pub mod v1 {
                        include!("output_service.rs");
                    }
                }
            }
        }
    }
}
