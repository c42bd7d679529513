//! Link to the external input-emulation hardware.
//!
//! This module provides:
//! - Command encoding for the line-oriented serial protocol
//! - The blocking send/acknowledge handshake (`DeviceLink`)
//! - The `InputDevice` trait used by the capture loop

pub mod command;
pub mod link;
pub mod serial;

pub use link::InputDevice;
pub use serial::{open_serial, SerialLink};
