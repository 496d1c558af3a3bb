// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
pub mod codec;
pub mod config;
pub mod error;
pub mod model;

pub use codec::FramedCodec;
pub use config::Config;
pub use error::ProtocolError;
pub use model::*;
