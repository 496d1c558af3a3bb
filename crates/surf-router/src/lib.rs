// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
pub mod debugger;
pub mod error;
pub mod fallback;
pub mod network;
pub mod registry;
pub mod screenshot;
pub mod state;
pub mod tool;

pub use debugger::DebuggerPool;
pub use error::RouterError;
pub use fallback::FallbackPolicy;
pub use network::NetworkIntake;
pub use registry::{Router, RouterBuilder};
pub use screenshot::ScreenshotCache;
pub use state::{RequestState, TabCaptureState, TabContext};
pub use tool::{Capability, RouterTool, Tool};
