//! Start/cancel signals from global hotkeys.
//!
//! The hotkey listener runs on its own thread for the lifetime of the
//! process and posts onto a single-slot queue. The capture loop only looks
//! at that queue at safe points, through a `CancellationToken`; a
//! half-finished device round trip is never interrupted.

use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError, TrySendError};

use thiserror::Error;

/// A user request posted by the hotkey listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Start a capture run
    Start,
    /// Stop the current run at the next safe point
    Cancel,
    /// Stop the current run and exit
    Quit,
}

/// Sending half of the signal queue.
#[derive(Clone)]
pub struct SignalPoster {
    tx: SyncSender<Signal>,
}

impl SignalPoster {
    /// Posts without blocking. Returns `false` if the signal was dropped.
    ///
    /// A full slot means an earlier signal has not been consumed yet; the
    /// new one is discarded rather than queued behind it.
    pub fn post(&self, signal: Signal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(TrySendError::Full(s)) => {
                crate::log(&format!("Signal {:?} dropped: previous signal still pending", s));
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Receiving half of the signal queue.
pub struct SignalQueue {
    rx: Receiver<Signal>,
}

/// Creates the single-slot signal queue.
pub fn signal_channel() -> (SignalPoster, SignalQueue) {
    let (tx, rx) = mpsc::sync_channel(1);
    (SignalPoster { tx }, SignalQueue { rx })
}

impl SignalQueue {
    /// Blocks until a signal arrives; `None` once every poster is gone.
    pub fn wait(&self) -> Option<Signal> {
        self.rx.recv().ok()
    }

    /// Takes a pending signal without blocking.
    pub fn poll(&self) -> Option<Signal> {
        match self.rx.try_recv() {
            Ok(s) => Some(s),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// The run was stopped at a checkpoint.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("run cancelled ({0:?})")]
pub struct Cancelled(pub Signal);

/// Cooperative cancellation for one run.
///
/// Once Cancel or Quit is seen it stays latched for the rest of the run.
pub struct CancellationToken<'a> {
    queue: Option<&'a SignalQueue>,
    latched: Option<Signal>,
}

impl<'a> CancellationToken<'a> {
    pub fn new(queue: &'a SignalQueue) -> Self {
        Self {
            queue: Some(queue),
            latched: None,
        }
    }

    /// A token nothing can cancel.
    pub fn never() -> Self {
        Self {
            queue: None,
            latched: None,
        }
    }

    /// Safe point: drains pending signals and reports a latched cancellation.
    ///
    /// `Start` while a run is in progress is ignored.
    pub fn checkpoint(&mut self) -> Result<(), Cancelled> {
        if let Some(queue) = self.queue {
            while let Some(signal) = queue.poll() {
                match signal {
                    Signal::Start => crate::log("Start ignored: a run is already in progress"),
                    Signal::Cancel => {
                        self.latched.get_or_insert(Signal::Cancel);
                    }
                    Signal::Quit => self.latched = Some(Signal::Quit),
                }
            }
        }

        match self.latched {
            Some(signal) => Err(Cancelled(signal)),
            None => Ok(()),
        }
    }

    /// Whether Quit was requested during this run.
    pub fn quit_requested(&self) -> bool {
        self.latched == Some(Signal::Quit)
    }
}

/// Starts the global hotkey listener thread, which takes over `poster`.
///
/// Returns `true` once the hotkeys are registered. Returns `false` when
/// hotkeys are unavailable on this platform or registration failed; the
/// poster is gone in that case, so `SignalQueue::wait` returns `None`.
#[cfg(windows)]
pub fn spawn_listener(poster: SignalPoster) -> bool {
    spawn_reporting(poster, |poster, ready| {
        if let Err(e) = hotkeys::listen(poster, ready) {
            crate::log(&format!("Hotkey listener stopped: {}", e));
        }
    })
}

#[cfg(not(windows))]
pub fn spawn_listener(_poster: SignalPoster) -> bool {
    crate::log("Global hotkeys are only available on Windows");
    false
}

/// Runs `listen` on its own thread and waits for it to signal readiness.
///
/// `listen` sends on `ready` when it is up. If it returns without doing so
/// this returns `false`. The poster lives exactly as long as the thread.
#[cfg_attr(not(windows), allow(dead_code))]
fn spawn_reporting<F>(poster: SignalPoster, listen: F) -> bool
where
    F: FnOnce(&SignalPoster, &Sender<()>) + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel();
    std::thread::spawn(move || listen(&poster, &ready_tx));
    ready_rx.recv().is_ok()
}

/// Registers every binding in order. If one fails, those already
/// registered are released before the error is returned.
#[cfg_attr(not(windows), allow(dead_code))]
fn register_each<T: Copy, E>(
    bindings: &[T],
    mut register: impl FnMut(T) -> Result<(), E>,
    mut unregister: impl FnMut(T),
) -> Result<(), E> {
    for (n, &binding) in bindings.iter().enumerate() {
        if let Err(e) = register(binding) {
            bindings[..n].iter().for_each(|&done| unregister(done));
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(windows)]
mod hotkeys {
    use std::sync::mpsc::Sender;

    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetMessageW, MSG, WM_HOTKEY};

    use super::{register_each, Signal, SignalPoster};

    const HOTKEY_START: i32 = 1;
    const HOTKEY_CANCEL: i32 = 2;
    const HOTKEY_QUIT: i32 = 3;

    const BINDINGS: [(i32, u32); 3] = [
        (HOTKEY_START, 0x41),  // 'A'
        (HOTKEY_CANCEL, 0x51), // 'Q'
        (HOTKEY_QUIT, 0x58),   // 'X'
    ];

    fn unregister((id, _): (i32, u32)) {
        unsafe {
            let _ = UnregisterHotKey(HWND::default(), id);
        }
    }

    /// Registers the hotkeys on this thread and pumps its message queue.
    pub(super) fn listen(poster: &SignalPoster, ready: &Sender<()>) -> windows::core::Result<()> {
        register_each(
            &BINDINGS,
            |(id, vk)| unsafe {
                RegisterHotKey(HWND::default(), id, MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT, vk)
            },
            unregister,
        )?;

        crate::log("Hotkey: Ctrl+Shift+A (start capture run)");
        crate::log("Hotkey: Ctrl+Shift+Q (cancel run)");
        crate::log("Hotkey: Ctrl+Shift+X (quit)");
        let _ = ready.send(());

        let mut msg = MSG::default();
        unsafe {
            while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
                if msg.message != WM_HOTKEY {
                    continue;
                }
                let signal = match msg.wParam.0 as i32 {
                    HOTKEY_START => Signal::Start,
                    HOTKEY_CANCEL => Signal::Cancel,
                    HOTKEY_QUIT => Signal::Quit,
                    _ => continue,
                };
                crate::log(&format!("Hotkey pressed: {:?}", signal));
                poster.post(signal);
            }
        }

        BINDINGS.into_iter().for_each(unregister);
        Ok(())
    }
}
