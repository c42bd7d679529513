//! Scroll Capture
//!
//! Drives an external input-emulation device over a serial link to scroll
//! through a fixed-layout listing window, captures the screen, and stitches
//! the partial captures into one composite per item for text recognition.

mod automation;
mod capture;
mod device;
mod ocr;
mod paths;
mod stitch;

use anyhow::Result;
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;

use automation::signals::SignalQueue;
use automation::{AutomationConfig, CancellationToken, JsonlStore, Signal};
use capture::MonitorScreen;
use device::SerialLink;
use ocr::ExternalOcr;

const LOG_FILE: &str = "scroll_capture.log";

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let log_path = paths::get_logs_dir().join(LOG_FILE);
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(line.as_bytes());
    }
}

fn main() -> Result<()> {
    // Set up panic hook to log panics
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = if let Some(loc) = panic_info.location() {
            format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            String::new()
        };
        let log_msg = format!("[PANIC]{} {}\n", location, msg);
        eprintln!("{}", log_msg);
        let log_path = paths::get_logs_dir().join(LOG_FILE);
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = file.write_all(log_msg.as_bytes());
        }
    }));

    // Ensure output directories exist
    paths::ensure_directories()?;

    // Load configuration
    automation::init_config();
    let config = automation::get_config();

    let mut link = device::open_serial(&config.serial)?;
    let mut screen = MonitorScreen::primary()?;

    let (poster, queue) = automation::signal_channel();
    if !automation::spawn_listener(poster) {
        log("No hotkey listener, running a single capture pass");
        run_once(&mut link, &mut screen, config, None);
        return Ok(());
    }

    log("Scroll Capture started, waiting for hotkeys");
    loop {
        match queue.wait() {
            Some(Signal::Start) => {
                if run_once(&mut link, &mut screen, config, Some(&queue)) {
                    break;
                }
            }
            Some(Signal::Cancel) => log("Cancel pressed but no run in progress"),
            Some(Signal::Quit) => break,
            None => {
                log("Hotkey listener is gone");
                break;
            }
        }
    }

    log("Scroll Capture exiting");
    Ok(())
}

/// Runs one capture pass. Returns `true` if Quit was requested during it.
fn run_once(
    link: &mut SerialLink,
    screen: &mut MonitorScreen,
    config: &AutomationConfig,
    queue: Option<&SignalQueue>,
) -> bool {
    let mut token = match queue {
        Some(q) => CancellationToken::new(q),
        None => CancellationToken::never(),
    };

    let results_path = paths::get_exe_dir().join(&config.results_file);
    let store = match JsonlStore::open(&results_path) {
        Ok(store) => store,
        Err(e) => {
            log(&format!("Failed to open results file {}: {:#}", results_path.display(), e));
            return false;
        }
    };
    log(&format!("Results file: {}", store.path().display()));
    let engine = ExternalOcr::from_config(&config.ocr);

    log("Starting capture run (Ctrl+Shift+Q to cancel)");
    match automation::run_session(
        link,
        screen,
        engine,
        store,
        config,
        &paths::get_output_dir(),
        &mut token,
    ) {
        Ok(summary) => log(&format!(
            "Run complete: {}/{} items saved to {}, {} stored",
            summary.captured + summary.fallbacks,
            summary.items_found,
            summary.session_dir.display(),
            summary.stored
        )),
        Err(e) => log(&format!("Run failed: {:#}", e)),
    }

    token.quit_requested()
}
