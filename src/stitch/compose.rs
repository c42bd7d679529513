//! Composite assembly from coarse and fine frames.
//!
//! Frames are drawn top to bottom on a fixed-height transparent canvas.
//! Each frame sits a nominal step below the previous one; optionally the
//! very last frame is placed at a measured offset instead, which corrects
//! the drift accumulated by the nominal steps.

use image::{imageops, RgbaImage};
use thiserror::Error;

use crate::automation::config::{ChromeMargins, StitchConfig};
use crate::capture::Frame;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StitchError {
    #[error("no frames to stitch")]
    NoFrames,
}

/// How the final frame is positioned relative to the one before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalPlacement {
    /// Same fixed step as every other frame of its phase.
    Nominal,
    /// Measured content shift in pixels, from the marker stripe.
    Measured(i32),
}

/// Vertical step from each frame to the next, in drawing order.
///
/// The result has one entry fewer than the total frame count. A measured
/// placement only replaces the last step when there is at least one fine
/// frame; coarse-only stacks are always nominal.
pub fn plan_offsets(
    coarse_count: usize,
    fine_count: usize,
    placement: FinalPlacement,
    config: &StitchConfig,
) -> Vec<i32> {
    let total = coarse_count + fine_count;
    if total == 0 {
        return Vec::new();
    }

    let mut offsets = Vec::with_capacity(total - 1);
    // First coarse frame is the anchor; every later frame contributes a step.
    for _ in 1..coarse_count {
        offsets.push(config.coarse_step as i32);
    }
    let fine_start = if coarse_count == 0 { 1 } else { 0 };
    for _ in fine_start..fine_count {
        offsets.push(config.fine_step as i32);
    }

    if let FinalPlacement::Measured(delta) = placement {
        if fine_count > 0 {
            if let Some(last) = offsets.last_mut() {
                *last = delta;
            }
        }
    }

    offsets
}

/// Draws frames at the cumulative sum of `offsets` and trims the canvas to
/// its content extent. The first frame sits at 0.
///
/// Anything below `canvas_height` is lost.
pub fn compose<'a>(
    frames: impl IntoIterator<Item = &'a Frame>,
    offsets: &[i32],
    canvas_height: u32,
) -> Result<RgbaImage, StitchError> {
    let mut frames = frames.into_iter();
    let first = frames.next().ok_or(StitchError::NoFrames)?;

    let mut canvas = RgbaImage::new(first.width(), canvas_height);
    imageops::overlay(&mut canvas, first.image(), 0, 0);

    let mut y: i64 = 0;
    for (frame, step) in frames.zip(offsets) {
        y += *step as i64;
        imageops::overlay(&mut canvas, frame.image(), 0, y);
    }

    Ok(trim_to_content(&canvas))
}

/// Cuts every row below the last one holding a non-transparent pixel.
pub fn trim_to_content(img: &RgbaImage) -> RgbaImage {
    let height = (0..img.height())
        .rev()
        .find(|&y| (0..img.width()).any(|x| img.get_pixel(x, y)[3] > 0))
        .map_or(0, |y| y + 1);

    imageops::crop_imm(img, 0, 0, img.width(), height).to_image()
}

/// Removes the fixed window chrome around the listing.
///
/// When page buttons are shown the top margin grows to skip their row.
pub fn crop_chrome(img: &RgbaImage, margins: &ChromeMargins, with_buttons: bool) -> RgbaImage {
    let top = if with_buttons {
        margins.top_with_buttons
    } else {
        margins.top
    };

    let left = margins.left.min(img.width());
    let top = top.min(img.height());
    let width = img.width().saturating_sub(margins.left + margins.right);
    let height = img.height() - top;

    imageops::crop_imm(img, left, top, width, height).to_image()
}

/// Composes, trims and crops chrome in one go.
pub fn stitch<'a>(
    frames: impl IntoIterator<Item = &'a Frame>,
    offsets: &[i32],
    config: &StitchConfig,
    with_buttons: bool,
) -> Result<RgbaImage, StitchError> {
    let composite = compose(frames, offsets, config.canvas_height)?;
    Ok(crop_chrome(&composite, &config.chrome, with_buttons))
}
