//! Dynamic listing geometry with a static fallback.
//!
//! The listing origin is derived from the located application window. When
//! the window cannot be found the configured fallback origin is used and a
//! warning logged; this is never fatal.

use image::{imageops, RgbaImage};

use crate::automation::config::{Point, WindowConfig};
use crate::capture::{Frame, ScreenSource, WindowLocator};

/// Listing origin relative to the top-left of `full`, or `None` when no
/// window is visible.
///
/// The top `top_offset` rows (taskbar, title strips) are skipped before the
/// search so they cannot seed the locator.
pub fn listing_origin(full: &RgbaImage, config: &WindowConfig) -> Option<Point> {
    let (width, height) = full.dimensions();
    if height <= config.top_offset {
        return None;
    }

    let body = imageops::crop_imm(full, 0, config.top_offset, width, height - config.top_offset)
        .to_image();
    let bounds = WindowLocator::new(config.background_threshold).locate(&Frame::new(0, body))?;

    crate::log(&format!(
        "Window found at ({}, {}) size {}x{}",
        bounds.x,
        bounds.y + config.top_offset,
        bounds.width,
        bounds.height
    ));

    let (x, y) = bounds.to_absolute(
        config.listing_offset.x,
        config.top_offset as i32 + config.listing_offset.y,
    );
    Some(Point::new(x, y))
}

/// Captures the screen and resolves the listing origin in screen coordinates.
pub fn resolve_listing_origin<S: ScreenSource>(screen: &mut S, config: &WindowConfig) -> Point {
    let located = match screen.capture_full() {
        Ok(full) => listing_origin(&full, config),
        Err(e) => {
            crate::log(&format!("Warning: full-screen capture failed: {:#}", e));
            None
        }
    };

    match located {
        Some(p) => {
            let (ox, oy) = screen.origin();
            let origin = Point::new(p.x + ox, p.y + oy);
            crate::log(&format!("Listing origin: ({}, {})", origin.x, origin.y));
            origin
        }
        None => {
            let fallback = config.fallback_origin;
            crate::log(&format!(
                "Warning: window not found, using configured origin ({}, {})",
                fallback.x, fallback.y
            ));
            fallback
        }
    }
}
