//! Hand-off of saved composites from the capture loop to the OCR worker.
//!
//! The channel is unbounded so a slow recognizer never stalls scrolling.
//! Dropping the `WorkSender` is the worker's shutdown signal; items already
//! submitted are still delivered.

use chrono::{DateTime, Duration, Local};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};

use thiserror::Error;

/// A composite waiting for recognition and persistence.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub composite_path: PathBuf,
    /// Position of the item on the listing (1-based)
    pub item_index: u32,
    pub captured_at: DateTime<Local>,
}

impl WorkItem {
    /// How long the item has been waiting since it was captured.
    pub fn queued_for(&self) -> Duration {
        Local::now() - self.captured_at
    }
}

/// The worker is gone; the composite stays on disk only.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("OCR worker is no longer running, item {0} was not queued")]
pub struct WorkerGone(pub u32);

/// Capture-loop side of the queue.
pub struct WorkSender {
    tx: Sender<WorkItem>,
}

impl WorkSender {
    /// Queues a saved composite, stamped with the current time.
    pub fn submit(&self, composite_path: PathBuf, item_index: u32) -> Result<(), WorkerGone> {
        let item = WorkItem {
            composite_path,
            item_index,
            captured_at: Local::now(),
        };
        self.tx.send(item).map_err(|_| WorkerGone(item_index))
    }
}

/// Worker side of the queue.
pub struct WorkReceiver {
    rx: Receiver<WorkItem>,
}

impl WorkReceiver {
    /// Blocks for the next item; `None` once the sender is dropped and the
    /// queue is empty.
    pub fn recv(&self) -> Option<WorkItem> {
        self.rx.recv().ok()
    }
}

pub fn work_queue() -> (WorkSender, WorkReceiver) {
    let (tx, rx) = channel();
    (WorkSender { tx }, WorkReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_items_survive_sender_drop() {
        let (sender, receiver) = work_queue();
        sender.submit(PathBuf::from("item_001.png"), 1).unwrap();
        sender.submit(PathBuf::from("item_002.png"), 2).unwrap();
        drop(sender);

        let indices: Vec<u32> = std::iter::from_fn(|| receiver.recv())
            .map(|item| item.item_index)
            .collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(receiver.recv().is_none());
    }

    #[test]
    fn test_submit_after_worker_exit() {
        let (sender, receiver) = work_queue();
        drop(receiver);
        assert_eq!(
            sender.submit(PathBuf::from("item_007.png"), 7),
            Err(WorkerGone(7))
        );
    }

    #[test]
    fn test_queued_for_is_measured_from_capture() {
        let (sender, receiver) = work_queue();
        sender.submit(PathBuf::from("a.png"), 1).unwrap();
        let mut item = receiver.recv().unwrap();
        item.captured_at = item.captured_at - Duration::seconds(3);
        assert!(item.queued_for() >= Duration::seconds(3));
    }
}
