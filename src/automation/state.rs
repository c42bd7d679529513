//! Scroll-capture state machine.
//!
//! The controller sequences through: Idle → CapturingCoarse → CapturingFine
//! → Stitching → Done. Any device or capture failure ends in Aborted with
//! the session discarded; the caller decides how to fall back.

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;

use crate::automation::config::{AutomationConfig, Point};
use crate::automation::detection::{active_buttons, offset_between, probe_below, scroll_present};
use crate::capture::{Frame, Region, ScreenSource};
use crate::device::InputDevice;
use crate::stitch::{plan_offsets, stitch, FinalPlacement};

/// Capture state machine states.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    /// Nothing captured yet
    Idle,
    /// Large scroll steps over the bulk of the list
    CapturingCoarse,
    /// Small steps aligning the end of the list
    CapturingFine,
    /// Frames are being composed
    Stitching,
    /// Composite is ready
    Done,
    /// Capture failed; session discarded
    Aborted(String),
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "Idle"),
            CaptureState::CapturingCoarse => write!(f, "Capturing coarse"),
            CaptureState::CapturingFine => write!(f, "Capturing fine"),
            CaptureState::Stitching => write!(f, "Stitching"),
            CaptureState::Done => write!(f, "Done"),
            CaptureState::Aborted(msg) => write!(f, "Aborted: {}", msg),
        }
    }
}

/// Why capturing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// No scroll track; the first frame is the whole listing.
    NoScroll,
    /// The end-of-content probe fired.
    ContentEnd,
    /// `max_iterations` scroll checks were spent.
    IterationLimit,
}

/// Frames and offsets of one scroll-capture run.
///
/// Append-only while capturing. `seal` fixes the offsets so that
/// `frame_count() == offsets().len() + 1`.
#[derive(Debug)]
pub struct CaptureSession {
    coarse: Vec<Frame>,
    fine: Vec<Frame>,
    offsets: Vec<i32>,
    placement: FinalPlacement,
    reason: Option<TerminalReason>,
}

impl CaptureSession {
    pub fn new(first: Frame) -> Self {
        Self {
            coarse: vec![first],
            fine: Vec::new(),
            offsets: Vec::new(),
            placement: FinalPlacement::Nominal,
            reason: None,
        }
    }

    pub fn push_coarse(&mut self, frame: Frame) {
        self.coarse.push(frame);
    }

    pub fn push_fine(&mut self, frame: Frame) {
        self.fine.push(frame);
    }

    pub fn coarse(&self) -> &[Frame] {
        &self.coarse
    }

    pub fn fine(&self) -> &[Frame] {
        &self.fine
    }

    /// Every frame in drawing order.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.coarse.iter().chain(&self.fine)
    }

    pub fn frame_count(&self) -> usize {
        self.coarse.len() + self.fine.len()
    }

    /// Most recently captured frame.
    pub fn last_frame(&self) -> &Frame {
        // `new` guarantees at least one coarse frame.
        self.fine.last().unwrap_or(&self.coarse[self.coarse.len() - 1])
    }

    /// The two frames the final offset is measured between, if any.
    ///
    /// With two or more fine frames these are the last two; with exactly
    /// one it is the last coarse frame and that fine frame.
    pub fn final_pair(&self) -> Option<(&Frame, &Frame)> {
        match self.fine.len() {
            0 => None,
            1 => self.coarse.last().map(|c| (c, &self.fine[0])),
            n => Some((&self.fine[n - 2], &self.fine[n - 1])),
        }
    }

    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    pub fn placement(&self) -> FinalPlacement {
        self.placement
    }

    pub fn reason(&self) -> Option<TerminalReason> {
        self.reason
    }

    /// Ends capturing and fixes the per-frame offsets.
    pub fn seal(&mut self, reason: TerminalReason, placement: FinalPlacement, config: &AutomationConfig) {
        self.reason = Some(reason);
        self.placement = placement;
        self.offsets = plan_offsets(self.coarse.len(), self.fine.len(), placement, &config.stitch);
    }
}

/// Result of a finished capture.
#[derive(Debug)]
pub struct CaptureOutcome {
    /// Chrome-cropped composite.
    pub composite: RgbaImage,
    pub reason: TerminalReason,
    pub frame_count: usize,
    pub placement: FinalPlacement,
    /// A page button was active, so the taller top chrome was cropped.
    pub buttons_active: bool,
}

/// Drives one scroll capture of the listing region.
pub struct CaptureController<'a, D: InputDevice, S: ScreenSource> {
    device: &'a mut D,
    screen: &'a mut S,
    config: &'a AutomationConfig,
    /// Listing origin in screen coordinates; click targets are relative to it.
    origin: Point,
    region: Region,
    state: CaptureState,
    session: Option<CaptureSession>,
    iterations: u32,
    buttons_active: bool,
    outcome: Option<CaptureOutcome>,
}

impl<'a, D: InputDevice, S: ScreenSource> CaptureController<'a, D, S> {
    pub fn new(
        device: &'a mut D,
        screen: &'a mut S,
        config: &'a AutomationConfig,
        origin: Point,
    ) -> Self {
        let region = Region::new(origin.x, origin.y, config.capture.width, config.capture.height);
        Self {
            device,
            screen,
            config,
            origin,
            region,
            state: CaptureState::Idle,
            session: None,
            iterations: 0,
            buttons_active: false,
            outcome: None,
        }
    }

    /// Advances the state machine by one step.
    ///
    /// Returns `true` while there is more to do, `false` once Done or Aborted.
    pub fn step(&mut self) -> bool {
        let result = match self.state {
            CaptureState::Idle => self.start(),
            CaptureState::CapturingCoarse => self.coarse_step(),
            CaptureState::CapturingFine => self.fine_step(),
            CaptureState::Stitching => self.compose(),
            CaptureState::Done | CaptureState::Aborted(_) => return false,
        };

        if let Err(e) = result {
            crate::log(&format!("Capture aborted in state '{}': {:#}", self.state, e));
            self.session = None;
            self.state = CaptureState::Aborted(format!("{:#}", e));
            return false;
        }

        !matches!(self.state, CaptureState::Done)
    }

    /// Runs the state machine to completion.
    pub fn run(mut self) -> Result<CaptureOutcome> {
        while self.step() {}

        match self.state {
            CaptureState::Done => self
                .outcome
                .take()
                .ok_or_else(|| anyhow!("Capture finished without a composite")),
            CaptureState::Aborted(msg) => Err(anyhow!("Capture aborted: {}", msg)),
            other => Err(anyhow!("Capture stopped in state '{}'", other)),
        }
    }

    fn start(&mut self) -> Result<()> {
        let first = self.capture(0)?;
        self.buttons_active = !active_buttons(&first, &self.config.probes).is_empty();
        let has_scroll = scroll_present(&first, &self.config.probes);
        let mut session = CaptureSession::new(first);

        if has_scroll {
            crate::log("Scroll track present, capturing coarse frames");
            self.session = Some(session);
            self.state = CaptureState::CapturingCoarse;
        } else {
            crate::log("No scroll track, using a single frame");
            session.seal(TerminalReason::NoScroll, FinalPlacement::Nominal, self.config);
            self.session = Some(session);
            self.state = CaptureState::Stitching;
        }
        Ok(())
    }

    fn coarse_step(&mut self) -> Result<()> {
        if self.iterations >= self.config.capture.max_iterations || !self.next_check(true)? {
            let scroll = self.absolute(self.config.click.scroll);
            crate::log(&format!(
                "Coarse phase done after {} checks, jumping to scroll point ({}, {})",
                self.iterations, scroll.x, scroll.y
            ));
            self.device
                .click(scroll.x, scroll.y)
                .context("Failed to click scroll point")?;
            self.state = CaptureState::CapturingFine;
            return Ok(());
        }

        self.device
            .scroll_down(self.config.capture.coarse_scroll_amount)
            .context("Failed to scroll down")?;
        let frame = self.capture_next()?;
        self.session_mut()?.push_coarse(frame);
        Ok(())
    }

    fn fine_step(&mut self) -> Result<()> {
        if self.iterations >= self.config.capture.max_iterations {
            return self.finish_capture(TerminalReason::IterationLimit);
        }
        if !self.next_check(false)? {
            return self.finish_capture(TerminalReason::ContentEnd);
        }

        self.device.fast_click().context("Failed to click scroll track")?;
        let frame = self.capture_next()?;
        self.session_mut()?.push_fine(frame);
        Ok(())
    }

    /// Spends one iteration probing the latest frame.
    ///
    /// Returns whether the phase should take another step.
    fn next_check(&mut self, coarse: bool) -> Result<bool> {
        self.iterations += 1;
        let probes = &self.config.probes;
        let probe = if coarse { &probes.coarse_end } else { &probes.fine_end };
        let session = self.session.as_ref().ok_or_else(|| anyhow!("No capture session"))?;
        Ok(probe_below(session.last_frame(), probe))
    }

    fn finish_capture(&mut self, reason: TerminalReason) -> Result<()> {
        let restore = self.iterations + self.config.capture.scroll_restore_extra;
        if let Err(e) = self.device.scroll_up(restore) {
            crate::log(&format!("Warning: failed to restore scroll position: {}", e));
            self.device.reset();
        }

        let placement = self.measure_final();
        let config = self.config;
        let session = self.session_mut()?;
        session.seal(reason, placement, config);
        crate::log(&format!(
            "Capture finished ({:?}) at frame {}: {} coarse + {} fine frames, final placement {:?}",
            reason,
            session.last_frame().index(),
            session.coarse().len(),
            session.fine().len(),
            placement
        ));

        self.state = CaptureState::Stitching;
        Ok(())
    }

    fn measure_final(&self) -> FinalPlacement {
        let Some((prev, last)) = self.session.as_ref().and_then(|s| s.final_pair()) else {
            return FinalPlacement::Nominal;
        };

        match offset_between(prev, last, &self.config.stripe) {
            Ok(delta) if delta > 0 => FinalPlacement::Measured(delta),
            Ok(delta) => {
                crate::log(&format!(
                    "Warning: measured offset {} is not a forward shift, using nominal step",
                    delta
                ));
                FinalPlacement::Nominal
            }
            Err(e) => {
                crate::log(&format!("Warning: {}, using nominal step", e));
                FinalPlacement::Nominal
            }
        }
    }

    fn compose(&mut self) -> Result<()> {
        let session = self
            .session
            .take()
            .ok_or_else(|| anyhow!("No capture session to stitch"))?;
        let reason = session
            .reason()
            .ok_or_else(|| anyhow!("Capture session was not sealed"))?;

        let composite = stitch(
            session.frames(),
            session.offsets(),
            &self.config.stitch,
            self.buttons_active,
        )?;

        self.outcome = Some(CaptureOutcome {
            composite,
            reason,
            frame_count: session.frame_count(),
            placement: session.placement(),
            buttons_active: self.buttons_active,
        });
        self.state = CaptureState::Done;
        Ok(())
    }

    fn capture_next(&mut self) -> Result<Frame> {
        let index = self.session.as_ref().map_or(0, |s| s.frame_count() as u32);
        self.capture(index)
    }

    fn capture(&mut self, index: u32) -> Result<Frame> {
        let image = self
            .screen
            .capture_region(&self.region)
            .with_context(|| format!("Failed to capture frame {}", index))?;
        Ok(Frame::new(index, image))
    }

    fn session_mut(&mut self) -> Result<&mut CaptureSession> {
        self.session
            .as_mut()
            .ok_or_else(|| anyhow!("No capture session"))
    }

    fn absolute(&self, p: Point) -> Point {
        Point::new(self.origin.x + p.x, self.origin.y + p.y)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::device::link::DeviceError;
    use image::Rgba;
    use std::collections::VecDeque;

    const BG: Rgba<u8> = Rgba([5, 40, 40, 255]);

    /// Replays prepared images; fails once they run out.
    pub(crate) struct ScriptedScreen {
        pub frames: VecDeque<RgbaImage>,
        pub regions: Vec<Region>,
    }

    impl ScriptedScreen {
        pub fn new(frames: Vec<RgbaImage>) -> Self {
            Self {
                frames: frames.into(),
                regions: Vec::new(),
            }
        }
    }

    impl ScreenSource for ScriptedScreen {
        fn capture_full(&mut self) -> Result<RgbaImage> {
            self.frames.pop_front().ok_or_else(|| anyhow!("screen script exhausted"))
        }

        fn capture_region(&mut self, region: &Region) -> Result<RgbaImage> {
            self.regions.push(*region);
            self.capture_full()
        }
    }

    /// Records every action; optionally fails on a named action.
    #[derive(Default)]
    pub(crate) struct RecordingDevice {
        pub actions: Vec<String>,
        pub fail_on: Option<&'static str>,
        pub resets: u32,
    }

    impl RecordingDevice {
        fn record(&mut self, action: String) -> Result<(), DeviceError> {
            if self.fail_on.is_some_and(|f| action.starts_with(f)) {
                return Err(DeviceError::Protocol {
                    expected: "received".into(),
                    got: "busy".into(),
                });
            }
            self.actions.push(action);
            Ok(())
        }
    }

    impl InputDevice for RecordingDevice {
        fn fast_click(&mut self) -> Result<(), DeviceError> {
            self.record("fast_click".into())
        }
        fn click(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
            self.record(format!("click:{},{}", x, y))
        }
        fn scroll_down(&mut self, amount: u32) -> Result<(), DeviceError> {
            self.record(format!("scroll_down:{}", amount))
        }
        fn scroll_up(&mut self, amount: u32) -> Result<(), DeviceError> {
            self.record(format!("scroll_up:{}", amount))
        }
        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    /// A listing frame with the given probe readings.
    ///
    /// `more_coarse` / `more_fine` keep the corresponding phase going;
    /// `stripe_row` draws a marker stripe across the left half.
    pub(crate) fn listing(scroll: bool, more_coarse: bool, more_fine: bool, stripe_row: Option<u32>) -> RgbaImage {
        let probes = crate::automation::config::ProbeConfig::default();
        let mut img = RgbaImage::from_pixel(300, 361, BG);
        let red = |on: bool| if on { Rgba([200, 0, 0, 255]) } else { BG };

        img.put_pixel(probes.scroll_present.x, probes.scroll_present.y, red(scroll));
        img.put_pixel(probes.coarse_end.x, probes.coarse_end.y, red(!more_coarse));
        img.put_pixel(probes.fine_end.x, probes.fine_end.y, red(!more_fine));
        if let Some(y) = stripe_row {
            for x in 0..150 {
                img.put_pixel(x, y, Rgba([180, 20, 20, 255]));
            }
        }
        img
    }

    fn run_capture(
        device: &mut RecordingDevice,
        screen: &mut ScriptedScreen,
        config: &AutomationConfig,
    ) -> Result<CaptureOutcome> {
        CaptureController::new(device, screen, config, Point::new(100, 200)).run()
    }

    #[test]
    fn test_no_scroll_single_frame() {
        let config = AutomationConfig::default();
        let mut device = RecordingDevice::default();
        let mut screen = ScriptedScreen::new(vec![listing(false, true, true, None)]);

        let outcome = run_capture(&mut device, &mut screen, &config).unwrap();

        assert_eq!(outcome.reason, TerminalReason::NoScroll);
        assert_eq!(outcome.frame_count, 1);
        assert!(device.actions.is_empty());
        assert_eq!(outcome.composite.dimensions(), (300 - 40 - 17, 361 - 22));
        assert_eq!(screen.regions, vec![Region::new(100, 200, 300, 361)]);
    }

    #[test]
    fn test_coarse_then_fine_with_measured_offset() {
        let config = AutomationConfig::default();
        let mut device = RecordingDevice::default();
        let mut screen = ScriptedScreen::new(vec![
            listing(true, true, true, None),
            listing(true, true, true, None),
            listing(true, false, true, None),
            listing(true, false, true, Some(100)),
            listing(true, false, false, Some(80)),
        ]);

        let outcome = run_capture(&mut device, &mut screen, &config).unwrap();

        assert_eq!(
            device.actions,
            vec![
                "scroll_down:1",
                "scroll_down:1",
                "click:397,542",
                "fast_click",
                "fast_click",
                "scroll_up:11",
            ]
        );
        assert_eq!(outcome.reason, TerminalReason::ContentEnd);
        assert_eq!(outcome.frame_count, 5);
        assert_eq!(outcome.placement, FinalPlacement::Measured(20));
        // Frames at 0, 30, 60, 70, 90.
        assert_eq!(outcome.composite.height(), 90 + 361 - 22);
    }

    #[test]
    fn test_missing_stripe_falls_back_to_nominal() {
        let config = AutomationConfig::default();
        let mut device = RecordingDevice::default();
        let mut screen = ScriptedScreen::new(vec![
            listing(true, false, true, None),
            listing(true, false, false, None),
        ]);

        let outcome = run_capture(&mut device, &mut screen, &config).unwrap();

        assert_eq!(outcome.placement, FinalPlacement::Nominal);
        assert_eq!(outcome.frame_count, 2);
        assert_eq!(outcome.composite.height(), 10 + 361 - 22);
        assert_eq!(device.actions.last().map(String::as_str), Some("scroll_up:8"));
    }

    #[test]
    fn test_single_fine_frame_measured_against_last_coarse() {
        let config = AutomationConfig::default();
        let mut device = RecordingDevice::default();
        let mut screen = ScriptedScreen::new(vec![
            listing(true, false, true, Some(100)),
            listing(true, false, false, Some(70)),
        ]);

        let outcome = run_capture(&mut device, &mut screen, &config).unwrap();

        assert_eq!(device.actions, vec!["click:397,542", "fast_click", "scroll_up:8"]);
        assert_eq!(outcome.frame_count, 2);
        assert_eq!(outcome.placement, FinalPlacement::Measured(30));
        assert_eq!(outcome.composite.height(), 30 + 361 - 22);
    }

    #[test]
    fn test_backward_shift_falls_back_to_nominal() {
        let config = AutomationConfig::default();
        let mut device = RecordingDevice::default();
        let mut screen = ScriptedScreen::new(vec![
            listing(true, false, true, Some(70)),
            listing(true, false, false, Some(100)),
        ]);

        let outcome = run_capture(&mut device, &mut screen, &config).unwrap();

        assert_eq!(outcome.placement, FinalPlacement::Nominal);
        assert_eq!(outcome.composite.height(), 10 + 361 - 22);
    }

    #[test]
    fn test_zero_shift_falls_back_to_nominal() {
        let config = AutomationConfig::default();
        let mut device = RecordingDevice::default();
        let mut screen = ScriptedScreen::new(vec![
            listing(true, false, true, Some(90)),
            listing(true, false, false, Some(90)),
        ]);

        let outcome = run_capture(&mut device, &mut screen, &config).unwrap();
        assert_eq!(outcome.placement, FinalPlacement::Nominal);
    }

    #[test]
    fn test_iteration_limit_shared_by_both_phases() {
        let mut config = AutomationConfig::default();
        config.capture.max_iterations = 3;
        let mut device = RecordingDevice::default();
        let frames = (0..4).map(|_| listing(true, true, true, None)).collect();
        let mut screen = ScriptedScreen::new(frames);

        let outcome = run_capture(&mut device, &mut screen, &config).unwrap();

        assert_eq!(outcome.reason, TerminalReason::IterationLimit);
        assert_eq!(outcome.frame_count, 4);
        assert!(!device.actions.contains(&"fast_click".to_string()));
        assert_eq!(device.actions.last().map(String::as_str), Some("scroll_up:8"));
    }

    #[test]
    fn test_device_failure_aborts() {
        let config = AutomationConfig::default();
        let mut device = RecordingDevice {
            fail_on: Some("scroll_down"),
            ..Default::default()
        };
        let mut screen = ScriptedScreen::new(vec![listing(true, true, true, None)]);

        let mut controller =
            CaptureController::new(&mut device, &mut screen, &config, Point::new(0, 0));
        while controller.step() {}
        assert!(matches!(controller.state, CaptureState::Aborted(_)));
    }

    #[test]
    fn test_capture_failure_aborts() {
        let config = AutomationConfig::default();
        let mut device = RecordingDevice::default();
        let mut screen = ScriptedScreen::new(vec![listing(true, true, true, None)]);

        let err = run_capture(&mut device, &mut screen, &config).unwrap_err();
        assert!(err.to_string().contains("Capture aborted"));
        assert_eq!(device.actions, vec!["scroll_down:1"]);
    }

    #[test]
    fn test_restore_failure_still_completes() {
        let config = AutomationConfig::default();
        let mut device = RecordingDevice {
            fail_on: Some("scroll_up"),
            ..Default::default()
        };
        let mut screen = ScriptedScreen::new(vec![listing(true, false, false, None)]);

        let outcome = run_capture(&mut device, &mut screen, &config).unwrap();
        assert_eq!(outcome.reason, TerminalReason::ContentEnd);
        assert_eq!(outcome.frame_count, 1);
        assert_eq!(device.resets, 1);
    }

    #[test]
    fn test_session_invariant() {
        let config = AutomationConfig::default();
        let frame = |i| Frame::new(i, listing(true, true, true, None));
        let mut session = CaptureSession::new(frame(0));
        session.push_coarse(frame(1));
        session.push_fine(frame(2));
        session.seal(TerminalReason::ContentEnd, FinalPlacement::Measured(4), &config);

        assert_eq!(session.frame_count(), session.offsets().len() + 1);
        assert_eq!(session.offsets(), &[30, 4]);
        assert_eq!(session.last_frame().index(), 2);
    }
}
