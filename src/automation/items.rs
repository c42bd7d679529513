//! Detection of clickable item rows on the listing page.
//!
//! Item names are drawn in saturated green or red text. Rows with enough
//! such pixels form horizontal bars; bars close together belong to the
//! same item (multi-line names) and are merged before taking the center.

use crate::automation::config::{ItemScanConfig, Point};
use crate::capture::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Bar {
    start_y: u32,
    end_y: u32,
}

impl Bar {
    fn center(&self) -> u32 {
        self.start_y + (self.end_y - self.start_y) / 2
    }
}

fn is_colored(rgb: [u8; 3], margin: u8) -> bool {
    let [r, g, b] = rgb.map(u16::from);
    let m = u16::from(margin);
    let green = g > r + m && g > b + m;
    let red = r > g + m && r > b + m;
    green || red
}

fn row_active(frame: &Frame, y: u32, config: &ItemScanConfig) -> bool {
    let count = (config.scan_x_start..frame.width())
        .filter_map(|x| frame.rgb(x, y))
        .filter(|&rgb| is_colored(rgb, config.color_margin))
        .count();
    count as u32 >= config.min_pixels
}

fn find_bars(frame: &Frame, config: &ItemScanConfig) -> Vec<Bar> {
    let mut bars = Vec::new();
    let mut start: Option<u32> = None;

    for y in config.scan_y_start..frame.height() {
        match (row_active(frame, y, config), start) {
            (true, None) => start = Some(y),
            (false, Some(s)) => {
                bars.push(Bar { start_y: s, end_y: y - 1 });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        bars.push(Bar {
            start_y: s,
            end_y: frame.height() - 1,
        });
    }
    bars
}

/// Click points for every item on the listing, top to bottom.
///
/// Coordinates are relative to the listing frame; `x` is always
/// `config.target_x`.
pub fn find_item_positions(frame: &Frame, config: &ItemScanConfig) -> Vec<Point> {
    let mut groups: Vec<Bar> = Vec::new();

    for bar in find_bars(frame, config) {
        match groups.last_mut() {
            Some(group) if bar.start_y - group.end_y < config.group_distance => {
                group.end_y = bar.end_y;
            }
            _ => groups.push(bar),
        }
    }

    groups
        .iter()
        .map(|g| Point::new(config.target_x, g.center() as i32))
        .collect()
}
