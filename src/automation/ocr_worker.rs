//! Background worker that recognizes and persists saved composites.
//!
//! Runs in its own thread, receiving work items from the queue. Failures
//! are logged per item and never reach the capture loop; the composite stays
//! on disk for a manual retry.

use crate::automation::queue::WorkReceiver;
use crate::automation::result_store::ResultStore;
use crate::ocr::OcrEngine;

/// Runs the worker loop until the channel is closed (sender dropped).
///
/// Returns the number of items stored. Blocks, so run it on a dedicated thread.
pub fn run_worker<E: OcrEngine, S: ResultStore>(
    receiver: WorkReceiver,
    engine: E,
    mut store: S,
) -> usize {
    crate::log("OCR worker started");
    let mut stored = 0;

    while let Some(item) = receiver.recv() {
        crate::log(&format!(
            "OCR worker: processing item {} ({}, queued {} ms)",
            item.item_index,
            item.composite_path.display(),
            item.queued_for().num_milliseconds()
        ));

        let recognition = match engine.recognize(&item.composite_path) {
            Ok(r) => r,
            Err(e) => {
                crate::log(&format!(
                    "OCR worker: recognition failed for item {}: {:#}",
                    item.item_index, e
                ));
                continue;
            }
        };

        match store.save(&item.composite_path, &recognition) {
            Ok(id) => {
                stored += 1;
                crate::log(&format!(
                    "OCR worker: item {} stored with id {} ({} chars of text)",
                    item.item_index,
                    id,
                    recognition.parsed.raw_text.chars().count()
                ));
            }
            Err(e) => crate::log(&format!(
                "OCR worker: failed to store item {}: {:#}",
                item.item_index, e
            )),
        }
    }

    crate::log("OCR worker: channel closed, exiting");
    stored
}
