//! Capture run over every item of the listing.
//!
//! Coordinates the synchronous capture loop and the background OCR worker:
//! spawns the worker, walks the detected items with a cancellation check at
//! the start of each one, and drains the worker before returning.

use anyhow::{Context, Result};
use chrono::Local;
use image::RgbaImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use crate::automation::config::{AutomationConfig, Point};
use crate::automation::detection::active_buttons;
use crate::automation::geometry::resolve_listing_origin;
use crate::automation::items::find_item_positions;
use crate::automation::ocr_worker::run_worker;
use crate::automation::queue::{work_queue, WorkSender};
use crate::automation::result_store::ResultStore;
use crate::automation::signals::{CancellationToken, Signal};
use crate::automation::state::CaptureController;
use crate::capture::{Frame, Region, ScreenSource};
use crate::device::InputDevice;
use crate::ocr::OcrEngine;
use crate::stitch::crop_chrome;

/// What happened during one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Folder holding this run's composites
    pub session_dir: PathBuf,
    pub items_found: usize,
    /// Items saved from a full scroll capture
    pub captured: usize,
    /// Items saved from a single unscrolled frame after the capture aborted
    pub fallbacks: usize,
    /// Items skipped entirely
    pub failed: usize,
    /// Results the worker stored before shutting down
    pub stored: usize,
    /// Signal that stopped the run early, if any
    pub cancelled: Option<Signal>,
}

/// Runs one capture pass over the listing.
///
/// Composites are written to a timestamped folder under `output_dir` and
/// handed to the worker. Per-item failures are logged and the run moves on;
/// only failures before the item loop starts are returned as errors.
pub fn run_session<D, S, E, R>(
    device: &mut D,
    screen: &mut S,
    engine: E,
    store: R,
    config: &AutomationConfig,
    output_dir: &Path,
    token: &mut CancellationToken<'_>,
) -> Result<RunSummary>
where
    D: InputDevice,
    S: ScreenSource,
    E: OcrEngine + Send + 'static,
    R: ResultStore + Send + 'static,
{
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let session_dir = output_dir.join(&timestamp);
    fs::create_dir_all(&session_dir).context("Failed to create session directory")?;
    crate::log(&format!("Session folder: {}", session_dir.display()));

    let (sender, receiver) = work_queue();
    let worker = thread::spawn(move || run_worker(receiver, engine, store));

    let mut summary = RunSummary {
        session_dir: session_dir.clone(),
        ..RunSummary::default()
    };
    let result = process_listing(device, screen, config, &session_dir, &sender, token, &mut summary);

    // Dropping the sender lets the worker finish the queued items and exit.
    drop(sender);
    crate::log("Waiting for OCR worker to finish...");
    match worker.join() {
        Ok(stored) => summary.stored = stored,
        Err(e) => crate::log(&format!("OCR worker thread panicked: {:?}", e)),
    }

    result?;
    crate::log(&format!(
        "Run finished: {} items, {} captured, {} fallback, {} failed, {} stored",
        summary.items_found, summary.captured, summary.fallbacks, summary.failed, summary.stored
    ));
    Ok(summary)
}

fn process_listing<D: InputDevice, S: ScreenSource>(
    device: &mut D,
    screen: &mut S,
    config: &AutomationConfig,
    session_dir: &Path,
    sender: &WorkSender,
    token: &mut CancellationToken<'_>,
    summary: &mut RunSummary,
) -> Result<()> {
    let origin = resolve_listing_origin(screen, &config.window);
    let at = |p: Point| Point::new(origin.x + p.x, origin.y + p.y);
    let region = Region::new(origin.x, origin.y, config.capture.width, config.capture.height);

    let focus = at(config.click.focus);
    device
        .click(focus.x, focus.y)
        .context("Failed to focus the application")?;

    let listing = screen
        .capture_region(&region)
        .context("Failed to capture the listing")?;
    let items = find_item_positions(&Frame::new(0, listing), &config.items);
    summary.items_found = items.len();
    crate::log(&format!("Found {} items on the listing", items.len()));

    for (i, item) in items.iter().enumerate() {
        let index = i as u32 + 1;

        if let Err(cancelled) = token.checkpoint() {
            crate::log(&format!("Stopping before item {}: {}", index, cancelled));
            summary.cancelled = Some(cancelled.0);
            break;
        }

        let target = at(*item);
        crate::log(&format!(
            "Item {}/{}: opening at ({}, {})",
            index,
            items.len(),
            target.x,
            target.y
        ));
        if let Err(e) = device.click(target.x, target.y) {
            crate::log(&format!("Item {}: failed to open: {}", index, e));
            device.reset();
            summary.failed += 1;
            continue;
        }

        let composite = match CaptureController::new(device, screen, config, origin).run() {
            Ok(outcome) => {
                crate::log(&format!(
                    "Item {}: {} frames, stopped on {:?}, final placement {:?}{}",
                    index,
                    outcome.frame_count,
                    outcome.reason,
                    outcome.placement,
                    if outcome.buttons_active { ", page buttons cropped" } else { "" }
                ));
                summary.captured += 1;
                Some(outcome.composite)
            }
            Err(e) => {
                crate::log(&format!("Item {}: {:#}; falling back to a single frame", index, e));
                device.reset();
                match capture_single(screen, &region, config) {
                    Ok(img) => {
                        summary.fallbacks += 1;
                        Some(img)
                    }
                    Err(e) => {
                        crate::log(&format!("Item {}: fallback capture failed: {:#}", index, e));
                        summary.failed += 1;
                        None
                    }
                }
            }
        };

        if let Some(img) = composite {
            if let Err(e) = save_and_queue(&img, session_dir, index, sender) {
                crate::log(&format!("Item {}: {:#}", index, e));
            }
        }

        let back = at(config.click.back);
        if let Err(e) = device.click(back.x, back.y) {
            crate::log(&format!("Item {}: failed to return to listing: {}", index, e));
            device.reset();
        }
    }

    Ok(())
}

/// One unscrolled capture of the item page, chrome cropped.
fn capture_single<S: ScreenSource>(
    screen: &mut S,
    region: &Region,
    config: &AutomationConfig,
) -> Result<RgbaImage> {
    let frame = Frame::new(0, screen.capture_region(region)?);
    let with_buttons = !active_buttons(&frame, &config.probes).is_empty();
    Ok(crop_chrome(frame.image(), &config.stitch.chrome, with_buttons))
}

fn save_and_queue(
    img: &RgbaImage,
    session_dir: &Path,
    index: u32,
    sender: &WorkSender,
) -> Result<()> {
    let path = session_dir.join(format!("item_{:03}.png", index));
    img.save(&path)
        .with_context(|| format!("Failed to save {}", path.display()))?;
    crate::log(&format!("Composite saved: {}", path.display()));

    sender.submit(path, index)?;
    Ok(())
}
