//! Pixel analysis of listing frames.
//!
//! The UI draws a red-biased divider whose vertical position shifts exactly
//! with scroll distance. Measuring it before and after a scroll step turns
//! an opaque scroll gesture into a pixel offset. The same module holds the
//! single-pixel probes that classify UI state (scroll track, page buttons).

use thiserror::Error;

use crate::automation::config::{PixelProbe, ProbeConfig, StripeConfig};
use crate::capture::Frame;

/// Contiguous rows in one column satisfying the stripe predicate (inclusive).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StripeRange {
    pub start_y: u32,
    pub end_y: u32,
}

impl StripeRange {
    pub fn len(&self) -> u32 {
        self.end_y - self.start_y + 1
    }
}

/// `offset_between` could not find a stripe in one or both frames.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("marker stripe not found (first frame: {}, second frame: {})", found(.first_found), found(.second_found))]
pub struct StripeMissing {
    pub first_found: bool,
    pub second_found: bool,
}

fn found(flag: &bool) -> &'static str {
    if *flag { "found" } else { "missing" }
}

/// Longest run of rows in column `x` whose red channel exceeds `min_red`.
///
/// Ties go to the earliest run.
// Vertical counterpart of `last_run`; the capture loop measures rows only.
#[allow(dead_code)]
pub fn longest_run(frame: &Frame, x: u32, min_red: u8) -> Option<StripeRange> {
    let mut best: Option<StripeRange> = None;
    let mut current_start: Option<u32> = None;

    for y in 0..frame.height() {
        let hit = frame.red(x, y).is_some_and(|r| r > min_red);
        if !hit {
            current_start = None;
            continue;
        }

        let start = *current_start.get_or_insert(y);
        let run = StripeRange { start_y: start, end_y: y };
        if best.is_none_or(|b| run.len() > b.len()) {
            best = Some(run);
        }
    }

    best
}

/// Lowest row holding at least `min_length` contiguous pixels with red
/// above `min_red`.
///
/// Rows are scanned bottom to top and the first qualifying row is returned
/// immediately.
pub fn last_run(frame: &Frame, min_red: u8, min_length: u32) -> Option<u32> {
    (0..frame.height())
        .rev()
        .find(|&y| row_has_run(frame, y, min_red, min_length))
}

fn row_has_run(frame: &Frame, y: u32, min_red: u8, min_length: u32) -> bool {
    let mut count = 0;
    for x in 0..frame.width() {
        if frame.red(x, y).is_some_and(|r| r > min_red) {
            count += 1;
            if count >= min_length {
                return true;
            }
        } else {
            count = 0;
        }
    }
    false
}

/// Distance the content moved between two captures: `last_run(a) - last_run(b)`.
pub fn offset_between(a: &Frame, b: &Frame, stripe: &StripeConfig) -> Result<i32, StripeMissing> {
    let ya = last_run(a, stripe.min_red, stripe.min_length);
    let yb = last_run(b, stripe.min_red, stripe.min_length);
    match (ya, yb) {
        (Some(ya), Some(yb)) => Ok(ya as i32 - yb as i32),
        _ => Err(StripeMissing {
            first_found: ya.is_some(),
            second_found: yb.is_some(),
        }),
    }
}

/// Whether the probe pixel's red channel exceeds the probe threshold.
///
/// A probe outside the frame reads as not exceeding.
pub fn probe_above(frame: &Frame, probe: &PixelProbe) -> bool {
    frame.red(probe.x, probe.y).is_some_and(|r| r > probe.threshold)
}

/// Whether the probe pixel's red channel is below the probe threshold.
pub fn probe_below(frame: &Frame, probe: &PixelProbe) -> bool {
    frame.red(probe.x, probe.y).is_some_and(|r| r < probe.threshold)
}

/// The listing has a scroll track, so more content exists below.
pub fn scroll_present(frame: &Frame, probes: &ProbeConfig) -> bool {
    probe_above(frame, &probes.scroll_present)
}

/// Indices of active page buttons in `probes.button_xs`.
pub fn active_buttons(frame: &Frame, probes: &ProbeConfig) -> Vec<usize> {
    probes
        .button_xs
        .iter()
        .enumerate()
        .filter(|&(_, &x)| frame.red(x, probes.button_row_y) == Some(probes.button_active_red))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    const BG: Rgba<u8> = Rgba([5, 40, 40, 255]);

    fn column_frame(reds: &[u8]) -> Frame {
        let img = RgbaImage::from_fn(3, reds.len() as u32, |x, y| {
            if x == 1 {
                Rgba([reds[y as usize], 0, 0, 255])
            } else {
                BG
            }
        });
        Frame::new(0, img)
    }

    /// Frame with horizontal red runs: (row, start_x, length).
    fn stripes_frame(w: u32, h: u32, runs: &[(u32, u32, u32)]) -> Frame {
        let mut img = RgbaImage::from_pixel(w, h, BG);
        for &(y, x0, len) in runs {
            for x in x0..x0 + len {
                img.put_pixel(x, y, Rgba([200, 30, 30, 255]));
            }
        }
        Frame::new(0, img)
    }

    #[test]
    fn test_longest_run_basic() {
        let frame = column_frame(&[5, 5, 30, 31, 32, 5]);
        assert_eq!(
            longest_run(&frame, 1, 26),
            Some(StripeRange { start_y: 2, end_y: 4 })
        );
    }

    #[test]
    fn test_longest_run_tie_prefers_first() {
        let mut reds = vec![0u8; 40];
        for y in (10..=14).chain(30..=34) {
            reds[y] = 100;
        }
        let frame = column_frame(&reds);
        assert_eq!(
            longest_run(&frame, 1, 26),
            Some(StripeRange { start_y: 10, end_y: 14 })
        );
    }

    #[test]
    fn test_longest_run_prefers_longer_later_run() {
        let mut reds = vec![0u8; 40];
        for y in (2..=3).chain(20..=25) {
            reds[y] = 100;
        }
        let frame = column_frame(&reds);
        assert_eq!(
            longest_run(&frame, 1, 26),
            Some(StripeRange { start_y: 20, end_y: 25 })
        );
    }

    #[test]
    fn test_longest_run_threshold_is_strict() {
        let frame = column_frame(&[26, 26, 26]);
        assert_eq!(longest_run(&frame, 1, 26), None);
        // Column outside the frame.
        assert_eq!(longest_run(&column_frame(&[99]), 7, 26), None);
    }

    #[test]
    fn test_last_run_returns_lowest_row() {
        let frame = stripes_frame(40, 60, &[(10, 0, 25), (45, 5, 20), (50, 0, 19)]);
        // Row 50 is one pixel short; row 45 is the lowest qualifying stripe.
        assert_eq!(last_run(&frame, 26, 20), Some(45));
    }

    #[test]
    fn test_last_run_needs_contiguous_pixels() {
        // Two runs of 10 separated by a gap do not make a 20-pixel stripe.
        let frame = stripes_frame(40, 20, &[(8, 0, 10), (8, 11, 10)]);
        assert_eq!(last_run(&frame, 26, 20), None);
    }

    #[test]
    fn test_offset_between() {
        let stripe = StripeConfig::default();
        let a = stripes_frame(40, 80, &[(50, 0, 30)]);
        let b = stripes_frame(40, 80, &[(30, 0, 30)]);
        assert_eq!(offset_between(&a, &b, &stripe), Ok(20));
        assert_eq!(offset_between(&b, &a, &stripe), Ok(-20));
    }

    #[test]
    fn test_offset_between_missing_stripe() {
        let stripe = StripeConfig::default();
        let a = stripes_frame(40, 80, &[(50, 0, 30)]);
        let empty = stripes_frame(40, 80, &[]);
        assert_eq!(
            offset_between(&a, &empty, &stripe),
            Err(StripeMissing {
                first_found: true,
                second_found: false
            })
        );
    }

    #[test]
    fn test_probes() {
        let mut img = RgbaImage::from_pixel(10, 10, BG);
        img.put_pixel(2, 3, Rgba([27, 0, 0, 255]));
        img.put_pixel(4, 3, Rgba([86, 0, 0, 255]));
        img.put_pixel(6, 3, Rgba([87, 0, 0, 255]));
        let frame = Frame::new(0, img);

        assert!(probe_above(&frame, &PixelProbe::new(2, 3, 26)));
        assert!(!probe_above(&frame, &PixelProbe::new(2, 3, 27)));
        assert!(probe_below(&frame, &PixelProbe::new(2, 3, 50)));
        assert!(!probe_below(&frame, &PixelProbe::new(20, 3, 50)));

        let probes = ProbeConfig {
            button_row_y: 3,
            button_xs: vec![2, 4, 6],
            ..ProbeConfig::default()
        };
        assert_eq!(active_buttons(&frame, &probes), vec![1]);
    }
}
