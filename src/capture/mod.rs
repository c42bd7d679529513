//! Screen capture for the target application.
//!
//! This module provides:
//! - Frame and region types (`Frame`, `Region`)
//! - Monitor capture behind the `ScreenSource` trait
//! - Window discovery from pixels (`WindowLocator`)

pub mod frame;
pub mod screenshot;
pub mod window;

pub use frame::{Frame, Region};
pub use screenshot::{MonitorScreen, ScreenSource};
pub use window::WindowLocator;
