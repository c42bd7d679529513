//! Locating the target application window inside a full-screen capture.
//!
//! The window is drawn on a near-black background with a uniformly dark
//! border, so its rectangle can be recovered from colors alone.

use super::frame::Frame;

/// Channel value separating background from window pixels.
pub const DEFAULT_BACKGROUND_THRESHOLD: u8 = 10;

/// Bounding rectangle of the located window, in capture coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl WindowBounds {
    /// Translates a window-relative point into capture coordinates.
    pub fn to_absolute(&self, rel_x: i32, rel_y: i32) -> (i32, i32) {
        (self.x as i32 + rel_x, self.y as i32 + rel_y)
    }
}

/// Finds the window rectangle with a cross probe from the first bright pixel.
#[derive(Clone, Copy, Debug)]
pub struct WindowLocator {
    threshold: u8,
}

impl Default for WindowLocator {
    fn default() -> Self {
        Self::new(DEFAULT_BACKGROUND_THRESHOLD)
    }
}

impl WindowLocator {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    /// Returns the window bounds, or `None` when every pixel is background.
    ///
    /// Raster-scans for the first pixel with all channels at or above the
    /// threshold, then walks right, left, down and up from it until a pixel
    /// with all channels below the threshold is hit. This is not a flood
    /// fill: the seed row and column must cross the window interior without
    /// touching dark regions before the border.
    pub fn locate(&self, capture: &Frame) -> Option<WindowBounds> {
        let (width, height) = (capture.width(), capture.height());

        let (seed_x, seed_y) = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .find(|&(x, y)| self.is_window(capture, x, y))?;

        let right = (seed_x..width)
            .take_while(|&x| !self.is_border(capture, x, seed_y))
            .last()
            .unwrap_or(seed_x);
        let left = (0..=seed_x)
            .rev()
            .take_while(|&x| !self.is_border(capture, x, seed_y))
            .last()
            .unwrap_or(seed_x);
        let bottom = (seed_y..height)
            .take_while(|&y| !self.is_border(capture, seed_x, y))
            .last()
            .unwrap_or(seed_y);
        let top = (0..=seed_y)
            .rev()
            .take_while(|&y| !self.is_border(capture, seed_x, y))
            .last()
            .unwrap_or(seed_y);

        Some(WindowBounds {
            x: left,
            y: top,
            width: right - left + 1,
            height: bottom - top + 1,
        })
    }

    fn is_window(&self, capture: &Frame, x: u32, y: u32) -> bool {
        capture
            .rgb(x, y)
            .is_some_and(|rgb| rgb.iter().all(|&c| c >= self.threshold))
    }

    /// Out of bounds counts as border.
    fn is_border(&self, capture: &Frame, x: u32, y: u32) -> bool {
        capture
            .rgb(x, y)
            .is_none_or(|rgb| rgb.iter().all(|&c| c < self.threshold))
    }
}
