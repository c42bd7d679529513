//! Configuration types for automation.
//!
//! Loads settings from config.json at startup. Every constant tuned against
//! the target UI skin lives here as a named default that config.json can
//! override; the values are treated as immutable for one run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::capture::window::DEFAULT_BACKGROUND_THRESHOLD;
use crate::device::link::DEFAULT_ACK_TIMEOUT;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AutomationConfig> = OnceLock::new();

pub const DEFAULT_STRIPE_MIN_RED: u8 = 26;
pub const DEFAULT_STRIPE_MIN_LENGTH: u32 = 20;
pub const DEFAULT_COARSE_STEP: u32 = 30;
pub const DEFAULT_FINE_STEP: u32 = 10;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 1000;
pub const DEFAULT_MAX_ITERATIONS: u32 = 40;

/// A point in pixels, relative to whatever origin the field documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Serial link to the actuator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// How long one command may wait for its acknowledgement.
    pub ack_timeout_ms: u64,
    /// Read timeout of the port itself; bounds how often the deadline is checked.
    pub read_poll_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "COM3".to_string(),
            baud_rate: 9600,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT.as_millis() as u64,
            read_poll_ms: 100,
        }
    }
}

/// Locating the application window on screen.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Channels below this on every component count as background.
    pub background_threshold: u8,
    /// Rows skipped at the top of the screen before searching.
    pub top_offset: u32,
    /// Listing origin relative to the located window's top-left corner.
    pub listing_offset: Point,
    /// Listing origin in screen coordinates when the window cannot be found.
    pub fallback_origin: Point,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            background_threshold: DEFAULT_BACKGROUND_THRESHOLD,
            top_offset: 23,
            listing_offset: Point::new(-150, 48),
            fallback_origin: Point::new(810, 311),
        }
    }
}

/// Size of the captured listing region and scroll loop bounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    /// Upper bound on scroll steps across both capture phases.
    pub max_iterations: u32,
    /// Amount passed to `scroll_down` for one coarse step.
    pub coarse_scroll_amount: u32,
    /// Extra scroll-up steps when restoring the list after capture.
    pub scroll_restore_extra: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 300,
            height: 361,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            coarse_scroll_amount: 1,
            scroll_restore_extra: 5,
        }
    }
}

/// A single pixel whose red channel is compared against a threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelProbe {
    pub x: u32,
    pub y: u32,
    pub threshold: u8,
}

impl PixelProbe {
    pub const fn new(x: u32, y: u32, threshold: u8) -> Self {
        Self { x, y, threshold }
    }
}

/// Pixel probes that classify UI state in a listing frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Scroll track drawn: red above threshold.
    pub scroll_present: PixelProbe,
    /// Coarse phase continues while red is below threshold.
    pub coarse_end: PixelProbe,
    /// Fine phase continues while red is below threshold.
    pub fine_end: PixelProbe,
    /// Row sampled for page-button state.
    pub button_row_y: u32,
    /// Exact red value of an active page button.
    pub button_active_red: u8,
    /// Column of each page button; empty disables button detection.
    pub button_xs: Vec<u32>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            scroll_present: PixelProbe::new(290, 15, 26),
            coarse_end: PixelProbe::new(297, 320, 50),
            fine_end: PixelProbe::new(297, 342, 50),
            button_row_y: 36,
            button_active_red: 86,
            button_xs: Vec::new(),
        }
    }
}

/// Marker stripe detection.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeConfig {
    /// Red channel must exceed this to belong to a stripe.
    pub min_red: u8,
    /// Contiguous pixels needed for a horizontal stripe.
    pub min_length: u32,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            min_red: DEFAULT_STRIPE_MIN_RED,
            min_length: DEFAULT_STRIPE_MIN_LENGTH,
        }
    }
}

/// Window chrome cropped from every composite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeMargins {
    pub left: u32,
    pub top: u32,
    /// Top margin when the page-button row is shown.
    pub top_with_buttons: u32,
    pub right: u32,
}

impl Default for ChromeMargins {
    fn default() -> Self {
        Self {
            left: 40,
            top: 22,
            top_with_buttons: 45,
            right: 17,
        }
    }
}

/// Composite assembly.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Nominal content shift of one coarse scroll step.
    pub coarse_step: u32,
    /// Nominal content shift of one fine step.
    pub fine_step: u32,
    /// Composite canvas height; taller content is truncated.
    pub canvas_height: u32,
    pub chrome: ChromeMargins,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            coarse_step: DEFAULT_COARSE_STEP,
            fine_step: DEFAULT_FINE_STEP,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            chrome: ChromeMargins::default(),
        }
    }
}

/// Click targets, relative to the listing origin.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    /// Clicked once before a run to focus the application.
    pub focus: Point,
    /// Returns from an item page to the listing.
    pub back: Point,
    /// Scroll track target clicked before the fine phase.
    pub scroll: Point,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            focus: Point::new(150, 60),
            back: Point::new(20, 10),
            scroll: Point::new(297, 342),
        }
    }
}

/// Detection of clickable item rows on the listing page.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemScanConfig {
    /// Column clicked for every detected item.
    pub target_x: i32,
    pub scan_x_start: u32,
    pub scan_y_start: u32,
    /// A channel must exceed both others by more than this to count as colored.
    pub color_margin: u8,
    /// Colored pixels needed for a row to be part of a text bar.
    pub min_pixels: u32,
    /// Bars closer than this are merged into one item.
    pub group_distance: u32,
}

impl Default for ItemScanConfig {
    fn default() -> Self {
        Self {
            target_x: 80,
            scan_x_start: 70,
            scan_y_start: 30,
            color_margin: 20,
            min_pixels: 20,
            group_distance: 15,
        }
    }
}

/// External text recognizer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub executable: String,
    /// Extra arguments placed before the image path.
    pub args: Vec<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            executable: "cpp_ocr".to_string(),
            args: Vec::new(),
        }
    }
}

/// Complete automation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub serial: SerialConfig,
    pub window: WindowConfig,
    pub capture: CaptureConfig,
    pub probes: ProbeConfig,
    pub stripe: StripeConfig,
    pub stitch: StitchConfig,
    pub click: ClickConfig,
    pub items: ItemScanConfig,
    pub ocr: OcrConfig,
    /// JSON-lines file receiving recognized results, relative to the executable.
    pub results_file: String,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            window: WindowConfig::default(),
            capture: CaptureConfig::default(),
            probes: ProbeConfig::default(),
            stripe: StripeConfig::default(),
            stitch: StitchConfig::default(),
            click: ClickConfig::default(),
            items: ItemScanConfig::default(),
            ocr: OcrConfig::default(),
            results_file: default_results_file(),
        }
    }
}

/// Loads configuration from config.json or returns defaults.
/// Looks for config.json in the same directory as the executable.
fn load_config() -> AutomationConfig {
    let config_path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("config.json")))
        .unwrap_or_else(|| Path::new("config.json").to_path_buf());

    crate::log(&format!("Looking for config at: {}", config_path.display()));

    if config_path.exists() {
        match fs::read_to_string(&config_path) {
            Ok(contents) => match parse_config(&contents) {
                Ok(config) => {
                    crate::log("Config loaded from config.json");
                    return config;
                }
                Err(e) => {
                    crate::log(&format!(
                        "Failed to parse config.json: {}. Using defaults.",
                        e
                    ));
                }
            },
            Err(e) => {
                crate::log(&format!(
                    "Failed to read config.json: {}. Using defaults.",
                    e
                ));
            }
        }
    } else {
        crate::log("config.json not found. Using default config.");
    }

    AutomationConfig::default()
}

fn parse_config(contents: &str) -> serde_json::Result<AutomationConfig> {
    let mut config: AutomationConfig = serde_json::from_str(contents)?;
    if config.results_file.is_empty() {
        config.results_file = default_results_file();
    }
    Ok(config)
}

fn default_results_file() -> String {
    "ocr_results.jsonl".to_string()
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() {
    let _ = CONFIG.set(load_config());
}

/// Returns a reference to the global configuration.
/// Panics if called before init_config().
pub fn get_config() -> &'static AutomationConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
}
