//! Screen capture of the primary monitor.
//!
//! Captures are synchronous: the caller blocks until pixels are available and
//! no capture overlaps a pending device round trip.

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use xcap::Monitor;

use super::frame::Region;

/// Source of raw screen pixels.
pub trait ScreenSource {
    /// Captures the whole screen.
    fn capture_full(&mut self) -> Result<RgbaImage>;

    /// Captures a region given in full-screen coordinates.
    fn capture_region(&mut self, region: &Region) -> Result<RgbaImage>;

    /// Screen coordinates of the top-left pixel of `capture_full`.
    fn origin(&self) -> (i32, i32) {
        (0, 0)
    }
}

/// Captures from the primary monitor through `xcap`.
pub struct MonitorScreen {
    monitor: Monitor,
}

impl MonitorScreen {
    /// Picks the primary monitor, or the first one if none reports primary.
    pub fn primary() -> Result<Self> {
        let monitors = Monitor::all().context("Failed to enumerate monitors")?;
        let monitor = monitors
            .iter()
            .find(|m| m.is_primary())
            .or_else(|| monitors.first())
            .cloned()
            .ok_or_else(|| anyhow!("No monitor available for capture"))?;

        crate::log(&format!(
            "Capturing monitor \"{}\" {}x{} at ({}, {})",
            monitor.name(),
            monitor.width(),
            monitor.height(),
            monitor.x(),
            monitor.y()
        ));

        Ok(Self { monitor })
    }
}

impl ScreenSource for MonitorScreen {
    fn capture_full(&mut self) -> Result<RgbaImage> {
        self.monitor
            .capture_image()
            .context("Failed to capture screen")
    }

    fn capture_region(&mut self, region: &Region) -> Result<RgbaImage> {
        let full = self.capture_full()?;
        let local = Region::new(
            region.x - self.monitor.x(),
            region.y - self.monitor.y(),
            region.width,
            region.height,
        );
        crop_to_region(&full, &local)
    }

    fn origin(&self) -> (i32, i32) {
        (self.monitor.x(), self.monitor.y())
    }
}

/// Crops `region` (in the image's own coordinates) out of `img`.
///
/// Parts of the region outside the image are clipped; a region with no
/// overlap at all is an error.
pub fn crop_to_region(img: &RgbaImage, region: &Region) -> Result<RgbaImage> {
    let (w, h) = img.dimensions();
    let x0 = region.x.max(0) as u32;
    let y0 = region.y.max(0) as u32;
    let x1 = (region.x as i64 + region.width as i64).clamp(0, w as i64) as u32;
    let y1 = (region.y as i64 + region.height as i64).clamp(0, h as i64) as u32;

    if x0 >= x1 || y0 >= y1 {
        return Err(anyhow!(
            "Capture region {:?} lies outside the {}x{} screen",
            region,
            w,
            h
        ));
    }

    Ok(image::imageops::crop_imm(img, x0, y0, x1 - x0, y1 - y0).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_crop_to_region() {
        let img = RgbaImage::from_fn(100, 80, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let cropped = crop_to_region(&img, &Region::new(10, 20, 30, 40)).unwrap();

        assert_eq!(cropped.dimensions(), (30, 40));
        assert_eq!(cropped.get_pixel(0, 0)[0], 10);
        assert_eq!(cropped.get_pixel(0, 0)[1], 20);
    }

    #[test]
    fn test_crop_to_region_clips() {
        let img = RgbaImage::new(100, 80);
        let cropped = crop_to_region(&img, &Region::new(-10, 70, 30, 40)).unwrap();

        assert_eq!(cropped.dimensions(), (20, 10));
    }

    #[test]
    fn test_crop_to_region_outside_fails() {
        let img = RgbaImage::new(100, 80);
        assert!(crop_to_region(&img, &Region::new(200, 0, 30, 40)).is_err());
    }
}
