//! Scroll-capture automation for the listing window.
//!
//! This module provides:
//! - Stripe measurement and UI pixel probes
//! - Window geometry and item-row detection
//! - The coarse/fine capture state machine
//! - Hotkey signals and cooperative cancellation
//! - Background OCR and JSON-lines persistence

pub mod config;
pub mod detection;
pub mod geometry;
pub mod items;
pub mod ocr_worker;
pub mod queue;
pub mod result_store;
pub mod runner;
pub mod signals;
pub mod state;

pub use config::{get_config, init_config, AutomationConfig};
pub use result_store::JsonlStore;
pub use runner::run_session;
pub use signals::{signal_channel, spawn_listener, CancellationToken, Signal};
