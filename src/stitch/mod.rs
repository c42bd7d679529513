//! Assembly of captured frames into one tall composite image.

pub mod compose;

pub use compose::{crop_chrome, plan_offsets, stitch, FinalPlacement};
