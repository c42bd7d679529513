//! Text recognition of saved composites through an external recognizer.

pub mod engine;
pub mod parse;

pub use engine::{ExternalOcr, OcrEngine, Recognition};
