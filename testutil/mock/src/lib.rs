// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

mod stub_cas;
pub use crate::stub_cas::{RequestType, StubCAS, StubCASBuilder};
