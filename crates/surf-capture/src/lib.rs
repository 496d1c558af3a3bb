// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
pub mod error;
pub mod filter;
pub mod store;

pub use error::CaptureError;
pub use filter::{Filter, StatusMatch, UrlPattern};
pub use store::{BodyKind, CaptureStore, StoreStats};
