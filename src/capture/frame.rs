//! Captured frames and screen regions.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// A rectangle in full-screen pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One screen capture.
///
/// The pixel buffer is fixed at capture time; there is no mutable access.
#[derive(Clone, Debug)]
pub struct Frame {
    index: u32,
    image: RgbaImage,
}

impl Frame {
    pub fn new(index: u32, image: RgbaImage) -> Self {
        Self { index, image }
    }

    /// Capture sequence index within its session.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// RGB channels at (x, y), or `None` outside the buffer.
    pub fn rgb(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let p = self.image.get_pixel(x, y);
        Some([p[0], p[1], p[2]])
    }

    /// Red channel at (x, y), or `None` outside the buffer.
    pub fn red(&self, x: u32, y: u32) -> Option<u8> {
        self.rgb(x, y).map(|[r, _, _]| r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_rgb_out_of_bounds_is_none() {
        let frame = Frame::new(0, RgbaImage::from_pixel(4, 3, Rgba([1, 2, 3, 255])));
        assert_eq!(frame.rgb(3, 2), Some([1, 2, 3]));
        assert_eq!(frame.rgb(4, 0), None);
        assert_eq!(frame.red(0, 3), None);
    }
}
